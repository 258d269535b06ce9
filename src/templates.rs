//! File templates for workspace initialization.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::PROJECT_CONFIG_FILE;
use crate::prompt_store::{self, GITHUB_DIR, INSTRUCTIONS_FILE, PromptStore};
use crate::reconcile::{COPILOT_CONFIG_FILE, PROMPTS_DIR};

/// Example `.vscode/copilot.json`: instruction kind → settings value.
pub const COPILOT_JSON: &str = r#"{
  "CODE_REVIEW": [
    { "text": "Point out missing error handling before style issues." }
  ]
}
"#;

/// Example reusable prompt file.
pub const EXAMPLE_PROMPT_MD: &str = r#"# Example prompt

Describe a task you ask Copilot for often. Files named `*.prompt.md` in
this directory can be attached to a chat request.
"#;

/// Commented per-workspace configuration.
pub const PROJECT_CONFIG: &str = r#"# promptsync workspace configuration
# Values set here override the global config.toml for this workspace.

# [workspace]
# enable_workspace_prompts = true
# enable_language_specific = true
# enable_prompt_files = true

# [host]
# settings_file = ".vscode/settings.json"
# reload_pause_ms = 1000

# [host.actions]
# "github.copilot.reload" = ["code", "--reuse-window"]

# [logging]
# level = "info"
"#;

/// Status of a file in the init plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitFileStatus {
    /// File will be created (doesn't exist).
    WillCreate,
    /// File already exists and is left untouched.
    Conflict,
}

#[derive(Debug, Clone)]
pub struct InitFileEntry {
    /// Path relative to the workspace root, for display.
    pub display_path: String,
    pub full_path: PathBuf,
    pub status: InitFileStatus,
    contents: String,
}

/// The files `init` would create under a workspace root.
#[derive(Debug, Clone)]
pub struct InitPlan {
    pub files: Vec<InitFileEntry>,
}

impl InitPlan {
    /// Build the plan by checking which files already exist.
    pub fn new(root: &Path) -> Self {
        let files_to_check = [
            (
                format!("{}/{}", GITHUB_DIR, INSTRUCTIONS_FILE),
                prompt_store::encode(&PromptStore::new()),
            ),
            (COPILOT_CONFIG_FILE.to_string(), COPILOT_JSON.to_string()),
            (
                format!("{}/example.prompt.md", PROMPTS_DIR),
                EXAMPLE_PROMPT_MD.to_string(),
            ),
            (PROJECT_CONFIG_FILE.to_string(), PROJECT_CONFIG.to_string()),
        ];

        let files = files_to_check
            .into_iter()
            .map(|(display_path, contents)| {
                let full_path = root.join(&display_path);
                let status = if full_path.exists() {
                    InitFileStatus::Conflict
                } else {
                    InitFileStatus::WillCreate
                };
                InitFileEntry {
                    display_path,
                    full_path,
                    status,
                    contents,
                }
            })
            .collect();

        Self { files }
    }

    pub fn has_conflicts(&self) -> bool {
        self.files
            .iter()
            .any(|f| f.status == InitFileStatus::Conflict)
    }

    pub fn conflicting_files(&self) -> Vec<&InitFileEntry> {
        self.files
            .iter()
            .filter(|f| f.status == InitFileStatus::Conflict)
            .collect()
    }

    /// Create every file that does not exist yet. Returns how many were written.
    pub fn create_files(&self) -> Result<usize> {
        let mut created = 0;
        for file in &self.files {
            if file.status == InitFileStatus::Conflict {
                debug!(path = %file.display_path, "init_file_exists");
                continue;
            }

            if let Some(parent) = file.full_path.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }

            fs::write(&file.full_path, &file.contents)
                .with_context(|| format!("Failed to write {}", file.display_path))?;
            info!(path = %file.display_path, "init_file_created");
            created += 1;
        }
        Ok(created)
    }
}
