use std::path::{Path, PathBuf};
use thiserror::Error;

/// Text formats accepted as pipeline input.
pub const INPUT_EXTENSIONS: [&str; 5] = ["txt", "log", "json", "yaml", "yml"];

#[derive(Debug, Error)]
pub enum InputError {
    #[error("unsupported input file type: {0} (expected one of .txt .log .json .yaml .yml)")]
    UnsupportedExtension(String),
    #[error("failed to read input {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedInput {
    /// File name without directories, used for export names.
    pub name: String,
    pub text: String,
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| INPUT_EXTENSIONS.iter().any(|ok| ext.eq_ignore_ascii_case(ok)))
        .unwrap_or(false)
}

pub fn read_input(path: &Path) -> Result<LoadedInput, InputError> {
    if !is_supported(path) {
        return Err(InputError::UnsupportedExtension(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::info!(file = %name, bytes = text.len(), "input loaded");
    Ok(LoadedInput { name, text })
}
