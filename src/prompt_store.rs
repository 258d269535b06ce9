//! Prompt store embedded in `.github/copilot-instructions.md`.
//!
//! The store maps a language (or `"global"`) to instruction-kind keys and
//! their prompt text. On disk it lives as a fenced JSON block inside a short
//! markdown document so the file stays readable by humans and by Copilot.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::registry::{GLOBAL_KEY, InstructionKind};

/// Directory holding the instructions document, relative to the workspace root.
pub const GITHUB_DIR: &str = ".github";

/// File name of the instructions document inside [`GITHUB_DIR`].
pub const INSTRUCTIONS_FILE: &str = "copilot-instructions.md";

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "\n```";

/// Language (or `"global"`) → instruction-kind key → prompt text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptStore(BTreeMap<String, BTreeMap<String, String>>);

impl PromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Language keys present in the store, including `"global"`.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Look up a prompt.
    ///
    /// A non-empty `language` whose sub-mapping exists is authoritative: a
    /// missing kind there yields `None` rather than the global prompt. Only
    /// when the language has no sub-mapping at all is `"global"` consulted.
    pub fn get(&self, language: Option<&str>, kind: InstructionKind) -> Option<&str> {
        let scope = match language.filter(|l| !l.is_empty()) {
            Some(lang) if self.0.contains_key(lang) => lang,
            _ => GLOBAL_KEY,
        };
        self.0
            .get(scope)
            .and_then(|prompts| prompts.get(kind.key()))
            .map(String::as_str)
    }

    /// Set a prompt, creating the language (or `"global"`) sub-mapping if absent.
    pub fn set(&mut self, language: Option<&str>, kind: InstructionKind, text: impl Into<String>) {
        let scope = language.filter(|l| !l.is_empty()).unwrap_or(GLOBAL_KEY);
        self.0
            .entry(scope.to_string())
            .or_default()
            .insert(kind.key().to_string(), text.into());
    }
}

impl From<BTreeMap<String, BTreeMap<String, String>>> for PromptStore {
    fn from(map: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self(map)
    }
}

/// Path of the instructions document under `root`.
pub fn instructions_path(root: &Path) -> PathBuf {
    root.join(GITHUB_DIR).join(INSTRUCTIONS_FILE)
}

/// Extract the body of the first ```` ```json ```` fence that ends its line.
///
/// Openers like ```` ```jsonc ```` or an inline mention are skipped.
fn json_block(markdown: &str) -> Option<&str> {
    markdown.match_indices(FENCE_OPEN).find_map(|(start, _)| {
        let after_fence = &markdown[start + FENCE_OPEN.len()..];
        let body = after_fence
            .strip_prefix("\r\n")
            .or_else(|| after_fence.strip_prefix('\n'))?;
        let end = body.find(FENCE_CLOSE)?;
        Some(body[..end].trim_end_matches('\r'))
    })
}

/// Decode a store from the instructions document.
///
/// A missing block or a block that is not a two-level string mapping yields
/// an empty store. Nothing from a malformed block is kept.
pub fn decode(markdown: &str) -> PromptStore {
    let Some(block) = json_block(markdown) else {
        debug!("prompt_store_block_missing");
        return PromptStore::new();
    };

    match serde_json::from_str::<PromptStore>(block) {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "prompt_store_parse_failed");
            PromptStore::new()
        }
    }
}

/// Encode a store into the instructions document template.
pub fn encode(store: &PromptStore) -> String {
    // A map of strings always serializes; the fallback only guards the type.
    let json = serde_json::to_string_pretty(store).unwrap_or_else(|_| "{}".to_string());
    format!(
        "# Copilot Instructions\n\
         \n\
         This file contains language-specific prompts for GitHub Copilot.\n\
         \n\
         ```json\n\
         {}\n\
         ```\n",
        json
    )
}

/// Read the store under `root`. A missing document is an empty store.
pub fn read_from_disk(root: &Path) -> Result<PromptStore> {
    let path = instructions_path(root);
    match fs::read_to_string(&path) {
        Ok(contents) => {
            let store = decode(&contents);
            debug!(path = ?path, empty = store.is_empty(), "prompt_store_loaded");
            Ok(store)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = ?path, "prompt_store_not_found");
            Ok(PromptStore::new())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Write the store under `root`, creating `.github/` when needed.
pub fn write_to_disk(root: &Path, store: &PromptStore) -> Result<()> {
    let dir = root.join(GITHUB_DIR);
    if !dir.exists() {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let path = dir.join(INSTRUCTIONS_FILE);
    fs::write(&path, encode(store))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = ?path, "prompt_store_saved");
    Ok(())
}
