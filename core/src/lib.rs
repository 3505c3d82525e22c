pub mod error;
pub mod features;
pub mod index;
pub mod logistic;
pub mod pairwise;
pub mod persist;
pub mod standardize;
pub mod tokenizer;

pub use error::{Error, Result};
pub use features::{Features, FEATURE_COUNT, FEATURE_NAMES};
pub use index::*;
pub use tokenizer::Query;
