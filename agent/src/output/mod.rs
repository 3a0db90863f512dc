//! Output writers for aggregated call trees
//!
//! - JSON flamegraph documents
//! - SVG flamegraphs
//! - Collapsed (folded) stacks

pub mod collapsed;
pub mod flamegraph;
pub mod json;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub use collapsed::{to_collapsed, write_collapsed};
pub use flamegraph::{layout, render_svg, write_svg, SvgOptions};
pub use json::{to_document, write_json};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Write text to `output_path`, creating parent directories as needed
pub(crate) fn write_text(content: &str, output_path: &Path) -> Result<(), OutputError> {
    if output_path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }
    if output_path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            output_path.display()
        )));
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(output_path)?);
    writer.write_all(content.as_bytes())?;
    writer.flush()?;
    Ok(())
}
