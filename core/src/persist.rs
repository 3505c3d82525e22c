use crate::error::{Error, Result};
use crate::features::{Features, FEATURE_COUNT, FEATURE_NAMES};
use crate::logistic::TrainedModel;
use crate::pairwise::Dataset;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const MODEL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Binary,
    Csv,
}

impl DatasetFormat {
    /// `.csv` selects CSV, anything else the binary layout.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => DatasetFormat::Csv,
            _ => DatasetFormat::Binary,
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bin" | "binary" | "gob" => Ok(DatasetFormat::Binary),
            "csv" => Ok(DatasetFormat::Csv),
            other => Err(Error::InvalidConfig(format!("unknown dataset format {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub version: u32,
    pub created_at: String,
    pub model: TrainedModel,
}

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

fn finish(writer: BufWriter<File>, path: &Path) -> Result<()> {
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    if let Err(e) = file.sync_all() {
        tracing::warn!(path = %path.display(), error = %e, "failed to sync file");
    }
    Ok(())
}

/// Features then labels, as two consecutive bincode values.
pub fn save_dataset_bin<P: AsRef<Path>>(path: P, dataset: &Dataset) -> Result<()> {
    let path = path.as_ref();
    let mut w = BufWriter::new(create_file(path)?);
    bincode::serialize_into(&mut w, &dataset.features)?;
    bincode::serialize_into(&mut w, &dataset.labels)?;
    finish(w, path)
}

pub fn load_dataset_bin<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let mut r = BufReader::new(File::open(path)?);
    let features: Vec<Features> = bincode::deserialize_from(&mut r)?;
    let labels: Vec<i32> = bincode::deserialize_from(&mut r)?;
    Dataset::new(features, labels)
}

fn csv_header() -> String {
    let mut header = FEATURE_NAMES.join(",");
    header.push_str(",Y");
    header
}

/// One row per example; counts print as integers, everything else with six decimals.
pub fn save_dataset_csv<P: AsRef<Path>>(path: P, dataset: &Dataset) -> Result<()> {
    let path = path.as_ref();
    let mut w = BufWriter::new(create_file(path)?);
    writeln!(w, "{}", csv_header())?;
    for (f, label) in dataset.features.iter().zip(&dataset.labels) {
        let v = f.to_vector();
        for (j, x) in v.iter().enumerate() {
            if Features::is_integer(j) {
                write!(w, "{},", *x as i64)?;
            } else {
                write!(w, "{x:.6},")?;
            }
        }
        writeln!(w, "{label}")?;
    }
    w.flush()?;
    finish(w, path)
}

pub fn load_dataset_csv<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(Error::Csv { line: 1, message: "missing header".into() }),
    };
    if header.trim_end() != csv_header() {
        return Err(Error::Csv { line: 1, message: "unexpected header".into() });
    }

    let mut features = Vec::new();
    let mut labels = Vec::new();
    for (i, line) in lines.enumerate() {
        let line_no = i + 2;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.trim_end().split(',').collect();
        if cols.len() != FEATURE_COUNT + 1 {
            return Err(Error::Csv {
                line: line_no,
                message: format!("expected {} columns, found {}", FEATURE_COUNT + 1, cols.len()),
            });
        }
        let mut f = Features::default();
        for (j, col) in cols[..FEATURE_COUNT].iter().enumerate() {
            let value: f64 = col.parse().map_err(|_| Error::Csv {
                line: line_no,
                message: format!("bad value {col:?} for {}", FEATURE_NAMES[j]),
            })?;
            f.set(j, value);
        }
        let label: i32 = cols[FEATURE_COUNT]
            .parse()
            .ok()
            .filter(|l| *l == 1 || *l == -1)
            .ok_or_else(|| Error::Csv { line: line_no, message: format!("bad label {:?}", cols[FEATURE_COUNT]) })?;
        features.push(f);
        labels.push(label);
    }
    Dataset::new(features, labels)
}

pub fn save_dataset<P: AsRef<Path>>(path: P, dataset: &Dataset, format: DatasetFormat) -> Result<()> {
    match format {
        DatasetFormat::Binary => save_dataset_bin(path, dataset),
        DatasetFormat::Csv => save_dataset_csv(path, dataset),
    }
}

/// Format is picked from the file extension.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    match DatasetFormat::from_path(&path) {
        DatasetFormat::Binary => load_dataset_bin(path),
        DatasetFormat::Csv => load_dataset_csv(path),
    }
}

pub fn save_model<P: AsRef<Path>>(path: P, model: &ModelFile) -> Result<()> {
    let path = path.as_ref();
    let mut w = BufWriter::new(create_file(path)?);
    let json = serde_json::to_string_pretty(model)?;
    w.write_all(json.as_bytes())?;
    w.flush()?;
    finish(w, path)
}

pub fn load_model<P: AsRef<Path>>(path: P) -> Result<ModelFile> {
    let mut f = File::open(path)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let file: ModelFile = serde_json::from_str(&buf)?;
    if file.version != MODEL_VERSION {
        return Err(Error::InvalidConfig(format!("unsupported model version {}", file.version)));
    }
    file.model.validate()?;
    Ok(file)
}
