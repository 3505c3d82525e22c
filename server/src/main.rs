use anyhow::Result;
use axum::Router;
use clap::Parser;
use server::build_app;
use server::config::{RankerConfig, ServiceConfig, UpstreamConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 6060)]
    port: u16,
    /// Index service base URL
    #[arg(long, default_value = "http://localhost:8080")]
    index_url: String,
    /// PageRank service prefix; the document URL is appended
    #[arg(long, default_value = "http://localhost:1234/ranking/")]
    pagerank_url: String,
    /// Per upstream call timeout seconds
    #[arg(long, default_value_t = 10)]
    upstream_timeout_secs: u64,
    /// Whole request deadline seconds
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,
    #[arg(long, default_value_t = 100)]
    max_documents: usize,
    /// Concurrent upstream calls per request
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = ServiceConfig {
        upstream: UpstreamConfig {
            index_base_url: args.index_url,
            pagerank_base_url: args.pagerank_url,
            timeout: Duration::from_secs(args.upstream_timeout_secs),
        },
        ranker: RankerConfig {
            max_documents: args.max_documents,
            concurrency: args.concurrency,
            request_deadline: Duration::from_secs(args.request_timeout_secs),
        },
    };
    let app: Router = build_app(config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}
