//! Marketing Report Binary
//!
//! Run with: `cargo run --bin marketing-report`
//!
//! Loads the channel and business CSVs from a data directory, runs the full
//! pipeline, and prints the report as JSON on stdout.

use marketing_analytics::{run, Channel, PipelineInput, PipelineParams};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g.:
    //   RUST_LOG=debug cargo run --bin marketing-report
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));

    let facebook = data_dir.join("Facebook.csv");
    let google = data_dir.join("Google.csv");
    let tiktok = data_dir.join("TikTok.csv");
    let channel_paths: Vec<(Channel, &Path)> = vec![
        (Channel::Facebook, facebook.as_path()),
        (Channel::Google, google.as_path()),
        (Channel::TikTok, tiktok.as_path()),
    ];
    let business_path = data_dir.join("Business.csv");

    let input = PipelineInput::load(&channel_paths, &business_path)?;
    let report = run(&input, &PipelineParams::default())?;

    for warning in &report.data_quality_warnings {
        eprintln!("warning: {}", warning);
    }
    for warning in &report.reconciliation_warnings {
        eprintln!("warning: {}", warning);
    }

    serde_json::to_writer_pretty(std::io::stdout().lock(), &report)?;
    println!();

    Ok(())
}
