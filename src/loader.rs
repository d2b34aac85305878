//! Source Loading
//!
//! The only I/O in the pipeline: reads tabular CSV sources into loosely-typed
//! `SourceTable`s for the normalizer. Fully synchronous batch reads, no
//! retries; a missing or unreadable source is fatal and carries the source
//! identity.

use crate::channel::Channel;
use crate::normalize::SourceTable;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Fatal source-loading errors. Each variant names the source it came from.
#[derive(Debug)]
pub enum LoadError {
    /// The source file does not exist
    Missing { source: String },
    /// The source exists but could not be read
    Io { source: String, detail: std::io::Error },
    /// The source was read but is not valid CSV
    Malformed { source: String, detail: csv::Error },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Missing { source } => write!(f, "Source '{}' not found", source),
            LoadError::Io { source, detail } => {
                write!(f, "Failed to read source '{}': {}", source, detail)
            }
            LoadError::Malformed { source, detail } => {
                write!(f, "Source '{}' is not valid CSV: {}", source, detail)
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Missing { .. } => None,
            LoadError::Io { detail, .. } => Some(detail),
            LoadError::Malformed { detail, .. } => Some(detail),
        }
    }
}

/// Reads one CSV source into a `SourceTable`.
///
/// # Arguments
/// * `path` - Path to the CSV file; its display form becomes the source
///   identity used in errors and warnings
///
/// # Errors
/// Returns `LoadError::Missing` when the file does not exist, `Io` when it
/// cannot be read, and `Malformed` when a row cannot be decoded as CSV.
pub fn load_source_table(path: &Path) -> Result<SourceTable, LoadError> {
    let source = path.display().to_string();
    if !path.exists() {
        return Err(LoadError::Missing { source });
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| {
            if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                LoadError::Io {
                    source: source.clone(),
                    detail: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                }
            } else {
                LoadError::Malformed {
                    source: source.clone(),
                    detail: e,
                }
            }
        })?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| LoadError::Malformed {
            source: source.clone(),
            detail: e,
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| LoadError::Malformed {
            source: source.clone(),
            detail: e,
        })?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }

    info!(source = %source, rows = rows.len(), "loaded source");
    Ok(SourceTable {
        source,
        columns,
        rows,
    })
}

/// Loads a set of channel CSVs, pairing each table with its channel identity
/// in input order.
///
/// # Errors
/// Returns the first `LoadError` encountered, aborting the run.
pub fn load_channel_sources(
    paths: &[(Channel, &Path)],
) -> Result<Vec<(Channel, SourceTable)>, LoadError> {
    paths
        .iter()
        .map(|(channel, path)| Ok((channel.clone(), load_source_table(path)?)))
        .collect()
}
