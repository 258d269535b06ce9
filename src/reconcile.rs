//! Applies workspace prompt files to the host settings store.
//!
//! Every pass recomputes from disk: nothing is cached between passes, so
//! running a pass again with unchanged files leaves the settings unchanged.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::WorkspaceConfig;
use crate::host::{HostActions, Notifier, reload_chain, run_reload_chain};
use crate::prompt_store;
use crate::registry::{InstructionKind, PROMPT_FILES_KEY, USE_INSTRUCTION_FILES_KEY};
use crate::settings::{SettingsPayload, SettingsStore};

/// Per-workspace kind → settings value mapping, relative to the root.
pub const COPILOT_CONFIG_FILE: &str = ".vscode/copilot.json";

/// Directory of `*.prompt.md` files, relative to the root.
pub const PROMPTS_DIR: &str = ".github/prompts";

/// Settings keys that override the configured flags for a workspace.
pub const ENABLE_WORKSPACE_PROMPTS_KEY: &str = "copilotPrompt.enableWorkspacePrompts";
pub const ENABLE_LANGUAGE_SPECIFIC_KEY: &str = "copilotPrompt.enableLanguageSpecific";
pub const ENABLE_PROMPT_FILES_KEY: &str = "copilotPrompt.enablePromptFiles";

/// The open workspace folders. The first one is the active root.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    folders: Vec<PathBuf>,
}

impl Workspace {
    pub fn new(folders: Vec<PathBuf>) -> Self {
        Self { folders }
    }

    /// The active root, or `None` when no usable folder is open.
    pub fn root(&self) -> Option<&Path> {
        let first = self.folders.first()?;
        if first.is_dir() {
            Some(first.as_path())
        } else {
            debug!(path = ?first, "workspace_folder_missing");
            None
        }
    }
}

/// Which reconciliation steps may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileFlags {
    /// Gates the global-instructions step and the language-specific step.
    pub workspace_prompts: bool,
    /// Gates the language-specific step (also requires `workspace_prompts`).
    pub language_specific: bool,
    /// Gates the prompts-directory step.
    pub prompt_files: bool,
}

impl From<&WorkspaceConfig> for ReconcileFlags {
    fn from(config: &WorkspaceConfig) -> Self {
        Self {
            workspace_prompts: config.enable_workspace_prompts,
            language_specific: config.enable_language_specific,
            prompt_files: config.enable_prompt_files,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub flags: ReconcileFlags,
    /// Pause between the two toggle invocations of the reload chain.
    pub reload_pause: Duration,
}

/// Result of one reconciliation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Turned off by a flag.
    Disabled,
    /// The step's input file or directory does not exist.
    NothingToDo,
    /// Number of settings written.
    Applied(usize),
    /// The step aborted; the message was reported to the user.
    Failed(String),
}

impl StepOutcome {
    pub fn label(&self) -> String {
        match self {
            Self::Disabled => "disabled".to_string(),
            Self::NothingToDo => "nothing to do".to_string(),
            Self::Applied(n) => format!("{} written", n),
            Self::Failed(_) => "failed".to_string(),
        }
    }
}

/// Outcome of a whole pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// `None` when no workspace was open and nothing ran.
    pub root: Option<PathBuf>,
    pub global: StepOutcome,
    pub language_specific: StepOutcome,
    pub prompt_files: StepOutcome,
}

impl PassReport {
    fn no_workspace() -> Self {
        Self {
            root: None,
            global: StepOutcome::NothingToDo,
            language_specific: StepOutcome::NothingToDo,
            prompt_files: StepOutcome::NothingToDo,
        }
    }

    pub fn steps(&self) -> [(&'static str, &StepOutcome); 3] {
        [
            ("global instructions", &self.global),
            ("language settings", &self.language_specific),
            ("prompt files", &self.prompt_files),
        ]
    }

    pub fn has_failures(&self) -> bool {
        self.steps()
            .iter()
            .any(|(_, outcome)| matches!(outcome, StepOutcome::Failed(_)))
    }

    /// One-line summary for status displays.
    pub fn summary(&self) -> String {
        if self.root.is_none() {
            return "no workspace open".to_string();
        }
        self.steps()
            .iter()
            .map(|(name, outcome)| format!("{}: {}", name, outcome.label()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Reads the workspace's prompt files and writes them to the settings store.
pub struct Reconciler<S, A> {
    workspace: Workspace,
    settings: S,
    actions: A,
    notifier: Rc<dyn Notifier>,
    options: ReconcileOptions,
}

impl<S: SettingsStore, A: HostActions> Reconciler<S, A> {
    pub fn new(
        workspace: Workspace,
        settings: S,
        actions: A,
        notifier: Rc<dyn Notifier>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            workspace,
            settings,
            actions,
            notifier,
            options,
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.workspace.root()
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    /// Run every enabled step against the current workspace.
    ///
    /// Does nothing when no workspace is open. A failing step is reported and
    /// the remaining steps still run.
    pub async fn reconcile(&self) -> PassReport {
        let Some(root) = self.root() else {
            debug!("reconcile_skipped_no_workspace");
            return PassReport::no_workspace();
        };

        let flags = self.resolve_flags().await;
        info!(root = ?root, flags = ?flags, "reconcile_start");

        let global = if flags.workspace_prompts {
            self.run_step("global instructions", self.apply_global_instructions(root))
                .await
        } else {
            StepOutcome::Disabled
        };

        let language_specific = if flags.workspace_prompts && flags.language_specific {
            self.run_step("language settings", self.apply_language_specific(root))
                .await
        } else {
            StepOutcome::Disabled
        };

        let prompt_files = if flags.prompt_files {
            self.run_step("prompt files", self.setup_prompt_files(root))
                .await
        } else {
            StepOutcome::Disabled
        };

        let report = PassReport {
            root: Some(root.to_path_buf()),
            global,
            language_specific,
            prompt_files,
        };
        info!(summary = %report.summary(), "reconcile_done");
        report
    }

    async fn run_step(
        &self,
        name: &str,
        step: impl Future<Output = Result<StepOutcome>>,
    ) -> StepOutcome {
        match step.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(step = name, error = %format!("{:#}", e), "reconcile_step_failed");
                let message = format!("Failed to apply {}: {:#}", name, e);
                self.notifier.error(&message);
                StepOutcome::Failed(message)
            }
        }
    }

    /// Configured flags, overridden by boolean values in the settings store.
    async fn resolve_flags(&self) -> ReconcileFlags {
        let defaults = self.options.flags;
        ReconcileFlags {
            workspace_prompts: self
                .flag(ENABLE_WORKSPACE_PROMPTS_KEY, defaults.workspace_prompts)
                .await,
            language_specific: self
                .flag(ENABLE_LANGUAGE_SPECIFIC_KEY, defaults.language_specific)
                .await,
            prompt_files: self
                .flag(ENABLE_PROMPT_FILES_KEY, defaults.prompt_files)
                .await,
        }
    }

    async fn flag(&self, key: &str, default: bool) -> bool {
        match self.settings.get(key).await {
            Ok(Some(Value::Bool(value))) => value,
            Ok(_) => default,
            Err(e) => {
                warn!(key, error = %format!("{:#}", e), "flag_read_failed");
                default
            }
        }
    }

    /// Push the whole instructions document as the code-generation setting.
    pub async fn apply_global_instructions(&self, root: &Path) -> Result<StepOutcome> {
        let path = prompt_store::instructions_path(root);
        let Some(instructions) = read_optional(&path).await? else {
            return Ok(StepOutcome::NothingToDo);
        };

        let key = InstructionKind::CodeGeneration.setting_key();
        if !self
            .push_setting(key, SettingsPayload::single(instructions, None))
            .await
        {
            return Ok(StepOutcome::Failed(format!("Failed to update {}", key)));
        }
        Ok(StepOutcome::Applied(1))
    }

    /// Push every recognized kind from `.vscode/copilot.json` verbatim.
    pub async fn apply_language_specific(&self, root: &Path) -> Result<StepOutcome> {
        let path = root.join(COPILOT_CONFIG_FILE);
        let Some(contents) = read_optional(&path).await? else {
            return Ok(StepOutcome::NothingToDo);
        };

        let entries: Map<String, Value> = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid {}", COPILOT_CONFIG_FILE))?;

        let mut written = 0;
        let mut failed = Vec::new();
        for (name, value) in entries {
            let Some(kind) = InstructionKind::parse(&name) else {
                debug!(key = %name, "copilot_config_key_skipped");
                continue;
            };
            if self
                .push_setting(kind.setting_key(), SettingsPayload::Raw(value))
                .await
            {
                written += 1;
            } else {
                failed.push(kind.setting_key());
            }
        }

        if !failed.is_empty() {
            return Ok(StepOutcome::Failed(format!(
                "Failed to update {}",
                failed.join(", ")
            )));
        }
        Ok(StepOutcome::Applied(written))
    }

    /// Register `.github/prompts` as a prompt-file source.
    ///
    /// Both settings are written concurrently and both are attempted even if
    /// one fails.
    pub async fn setup_prompt_files(&self, root: &Path) -> Result<StepOutcome> {
        let prompts_dir = root.join(PROMPTS_DIR);
        if !prompts_dir.is_dir() {
            return Ok(StepOutcome::NothingToDo);
        }

        let mut sources = Map::new();
        sources.insert(prompts_dir.display().to_string(), Value::Bool(true));

        let (sources_result, instruction_files_result) = futures::join!(
            self.settings
                .update(PROMPT_FILES_KEY, Value::Object(sources)),
            self.settings
                .update(USE_INSTRUCTION_FILES_KEY, Value::Bool(true))
        );

        let errors: Vec<String> = [sources_result, instruction_files_result]
            .into_iter()
            .filter_map(|r| r.err().map(|e| format!("{:#}", e)))
            .collect();
        if !errors.is_empty() {
            return Err(anyhow!(errors.join("; ")));
        }

        info!(path = ?prompts_dir, "prompt_files_registered");
        Ok(StepOutcome::Applied(2))
    }

    /// Write one setting, then ask the host to reload Copilot.
    ///
    /// Returns whether the write succeeded. Failures are reported to the
    /// user and never propagate.
    pub async fn push_setting(&self, key: &str, payload: SettingsPayload) -> bool {
        if let Err(e) = self.settings.update(key, payload.into_value()).await {
            warn!(key, error = %format!("{:#}", e), "setting_update_failed");
            self.notifier
                .error(&format!("Failed to update Copilot configuration: {:#}", e));
            return false;
        }

        let outcome = run_reload_chain(
            &self.actions,
            &reload_chain(self.options.reload_pause),
            self.notifier.as_ref(),
        )
        .await;
        debug!(key, outcome = ?outcome, "copilot_reload");

        self.notifier
            .info(&format!("Copilot configuration updated for {}", key));
        true
    }
}

/// Read a file, treating a missing file as `None`.
async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}
