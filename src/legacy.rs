//! Flat per-language prompt files (`.copilot-prompt-<language>`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

const FILE_PREFIX: &str = ".copilot-prompt-";

/// Path of the prompt file for `language`, directly under `root`.
pub fn prompt_path(root: &Path, language: &str) -> PathBuf {
    root.join(format!("{}{}", FILE_PREFIX, language))
}

/// Read the raw prompt for `language`, or an empty string if there is none.
pub fn read(root: &Path, language: &str) -> Result<String> {
    let path = prompt_path(root, language);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Create or overwrite the prompt file for `language`.
pub fn write(root: &Path, language: &str, text: &str) -> Result<()> {
    let path = prompt_path(root, language);
    fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = ?path, language, "legacy_prompt_saved");
    Ok(())
}
