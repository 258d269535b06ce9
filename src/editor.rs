//! Interactive prompt editor sessions.
//!
//! A session answers two requests: load the prompt for a kind and language,
//! and save one. The view in front of it (terminal modal or a client speaking
//! the line protocol) only renders text.

use std::rc::Rc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::host::HostActions;
use crate::prompt_store;
use crate::reconcile::Reconciler;
use crate::registry::InstructionKind;
use crate::settings::{SettingsPayload, SettingsStore};

/// Request sent by an editor view.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command")]
pub enum EditorRequest {
    #[serde(rename = "loadTypeLanguagePrompt")]
    Load {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        lang: String,
    },
    #[serde(rename = "saveInstructions")]
    Save {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        lang: String,
        #[serde(default)]
        prompt: String,
    },
}

/// Response sent back to an editor view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command")]
pub enum EditorResponse {
    #[serde(rename = "setPrompt")]
    SetPrompt { prompt: String },
}

/// Treat an empty language as "global".
fn scoped(language: &str) -> Option<&str> {
    Some(language).filter(|l| !l.is_empty())
}

/// Load/save façade over the prompt store and the reconciler.
pub struct EditorSession<S, A> {
    reconciler: Rc<Reconciler<S, A>>,
    focus_count: u32,
}

impl<S: SettingsStore, A: HostActions> EditorSession<S, A> {
    pub fn new(reconciler: Rc<Reconciler<S, A>>) -> Self {
        Self {
            reconciler,
            focus_count: 0,
        }
    }

    /// How many times an open request was redirected to this session.
    pub fn focus_count(&self) -> u32 {
        self.focus_count
    }

    /// Read a prompt from the store. `Ok("")` when there is none or no
    /// workspace is open.
    pub fn read_prompt(&self, kind: InstructionKind, language: &str) -> Result<String> {
        let Some(root) = self.reconciler.root() else {
            return Ok(String::new());
        };
        let store = prompt_store::read_from_disk(root)?;
        Ok(store
            .get(scoped(language), kind)
            .unwrap_or_default()
            .to_string())
    }

    /// Load a prompt for display. Failures are reported and yield "".
    pub fn load(&self, kind: InstructionKind, language: &str) -> String {
        match self.read_prompt(kind, language) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(kind = %kind, language, error = %format!("{:#}", e), "prompt_load_failed");
                self.reconciler
                    .notifier()
                    .error("Failed to load Copilot prompt");
                String::new()
            }
        }
    }

    /// Persist a prompt and push it to the settings store.
    ///
    /// The store file is written before the settings push, so a failed push
    /// still leaves the prompt saved. Returns whether the file was saved.
    pub async fn save(&self, kind: InstructionKind, language: &str, text: &str) -> bool {
        let Some(root) = self.reconciler.root() else {
            debug!("save_skipped_no_workspace");
            return false;
        };

        let persisted = prompt_store::read_from_disk(root).and_then(|mut store| {
            store.set(scoped(language), kind, text);
            prompt_store::write_to_disk(root, &store)
        });
        if let Err(e) = persisted {
            warn!(kind = %kind, language, error = %format!("{:#}", e), "prompt_save_failed");
            self.reconciler
                .notifier()
                .error("Failed to save Copilot instructions");
            return false;
        }

        self.reconciler
            .push_setting(
                kind.setting_key(),
                SettingsPayload::single(text, scoped(language)),
            )
            .await;

        info!(kind = %kind, language, "prompt_saved");
        self.reconciler
            .notifier()
            .info("Copilot instructions saved successfully");
        true
    }

    /// Handle one protocol request.
    pub async fn handle(&self, request: EditorRequest) -> Option<EditorResponse> {
        match request {
            EditorRequest::Load { kind, lang } => {
                let prompt = match InstructionKind::parse(&kind) {
                    Some(kind) => self.load(kind, &lang),
                    None => {
                        warn!(kind = %kind, "unknown_instruction_kind");
                        self.reconciler
                            .notifier()
                            .error("Failed to load Copilot prompt");
                        String::new()
                    }
                };
                Some(EditorResponse::SetPrompt { prompt })
            }
            EditorRequest::Save { kind, lang, prompt } => {
                match InstructionKind::parse(&kind) {
                    Some(kind) => {
                        self.save(kind, &lang, &prompt).await;
                    }
                    None => {
                        warn!(kind = %kind, "unknown_instruction_kind");
                        self.reconciler
                            .notifier()
                            .error("Failed to save Copilot instructions");
                    }
                }
                None
            }
        }
    }
}

/// Whether `open_or_focus` created a session or reused the open one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOpen {
    Created,
    Focused,
}

/// Owns at most one editor session.
pub struct SessionManager<S, A> {
    active: Option<EditorSession<S, A>>,
}

impl<S, A> Default for SessionManager<S, A> {
    fn default() -> Self {
        Self { active: None }
    }
}

impl<S: SettingsStore, A: HostActions> SessionManager<S, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the open session, or create one with `create` if none is open.
    pub fn open_or_focus(
        &mut self,
        create: impl FnOnce() -> EditorSession<S, A>,
    ) -> (&mut EditorSession<S, A>, SessionOpen) {
        let opened = if self.active.is_some() {
            SessionOpen::Focused
        } else {
            SessionOpen::Created
        };

        let session = self.active.get_or_insert_with(create);
        if opened == SessionOpen::Focused {
            session.focus_count += 1;
        }
        debug!(opened = ?opened, "editor_session_open");
        (session, opened)
    }

    pub fn active(&self) -> Option<&EditorSession<S, A>> {
        self.active.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Dispose of the open session, if any.
    pub fn close(&mut self) {
        if self.active.take().is_some() {
            debug!("editor_session_closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{NoticeLevel, NoticeLog};
    use crate::reconcile::{ReconcileFlags, ReconcileOptions, Workspace};
    use crate::settings::MemorySettings;
    use crate::testing::{RecordingActions, shared_notices};
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    type TestSession = EditorSession<MemorySettings, RecordingActions>;

    fn session(root: &Path) -> (TestSession, Rc<NoticeLog>) {
        let (log, notifier) = shared_notices();
        let reconciler = Reconciler::new(
            Workspace::new(vec![root.to_path_buf()]),
            MemorySettings::new(),
            RecordingActions::new(),
            notifier,
            ReconcileOptions {
                flags: ReconcileFlags {
                    workspace_prompts: true,
                    language_specific: true,
                    prompt_files: true,
                },
                reload_pause: Duration::ZERO,
            },
        );
        (EditorSession::new(Rc::new(reconciler)), log)
    }

    #[tokio::test]
    async fn test_save_then_load_language_prompt() {
        let dir = TempDir::new().unwrap();
        let (session, _log) = session(dir.path());
        let kind = InstructionKind::TestGeneration;
        let global_before = session.load(kind, "");

        assert!(session.save(kind, "rust", "Use #[test].").await);

        assert_eq!(session.load(kind, "rust"), "Use #[test].");
        assert_eq!(session.load(kind, ""), global_before);
    }

    #[tokio::test]
    async fn test_language_and_global_do_not_affect_each_other() {
        let dir = TempDir::new().unwrap();
        let (session, _log) = session(dir.path());
        let kind = InstructionKind::CodeGeneration;

        session.save(kind, "", "Global rule.").await;
        session.save(kind, "python", "Python rule.").await;
        session.save(kind, "", "Global rule 2.").await;

        assert_eq!(session.load(kind, "python"), "Python rule.");
        assert_eq!(session.load(kind, ""), "Global rule 2.");
    }

    #[tokio::test]
    async fn test_load_missing_kind_in_present_language_is_empty() {
        let dir = TempDir::new().unwrap();
        let (session, _log) = session(dir.path());

        session
            .save(InstructionKind::CodeGeneration, "", "Global rule.")
            .await;
        session
            .save(InstructionKind::CodeReview, "python", "Review rule.")
            .await;

        assert_eq!(session.load(InstructionKind::CodeGeneration, "python"), "");
    }

    #[tokio::test]
    async fn test_save_writes_store_and_pushes_setting() {
        let dir = TempDir::new().unwrap();
        let (session, log) = session(dir.path());

        session
            .save(InstructionKind::TestGeneration, "rust", "Use #[test].")
            .await;

        let store = prompt_store::read_from_disk(dir.path()).unwrap();
        assert_eq!(
            store.get(Some("rust"), InstructionKind::TestGeneration),
            Some("Use #[test].")
        );
        assert_eq!(
            session.reconciler.settings().writes(),
            vec![(
                "github.copilot.chat.testGeneration.instructions".to_string(),
                json!([{ "text": "Use #[test].", "language": "rust" }])
            )]
        );
        let messages: Vec<String> = log.entries().into_iter().map(|n| n.message).collect();
        assert_eq!(
            messages.last().map(String::as_str),
            Some("Copilot instructions saved successfully")
        );
    }

    #[tokio::test]
    async fn test_save_global_payload_has_no_language() {
        let dir = TempDir::new().unwrap();
        let (session, _log) = session(dir.path());

        session
            .save(InstructionKind::CommitMessage, "", "Imperative mood.")
            .await;

        assert_eq!(
            session.reconciler.settings().writes()[0].1,
            json!([{ "text": "Imperative mood." }])
        );
    }

    #[tokio::test]
    async fn test_save_keeps_file_when_settings_push_fails() {
        let dir = TempDir::new().unwrap();
        let (session, log) = session(dir.path());
        session
            .reconciler
            .settings()
            .fail_on(InstructionKind::CodeReview.setting_key());

        assert!(session.save(InstructionKind::CodeReview, "", "be terse").await);

        assert_eq!(session.load(InstructionKind::CodeReview, ""), "be terse");
        assert!(
            log.entries()
                .iter()
                .any(|n| n.level == NoticeLevel::Error)
        );
    }

    #[tokio::test]
    async fn test_save_failure_reports_single_notice() {
        let dir = TempDir::new().unwrap();
        // A file where the .github directory should be makes the write fail.
        std::fs::write(dir.path().join(".github"), "not a directory").unwrap();
        let (session, log) = session(dir.path());

        assert!(!session.save(InstructionKind::CodeReview, "", "x").await);

        assert_eq!(
            log.entries()
                .iter()
                .map(|n| n.message.as_str())
                .collect::<Vec<_>>(),
            vec!["Failed to save Copilot instructions"]
        );
        assert!(session.reconciler.settings().writes().is_empty());
    }

    #[tokio::test]
    async fn test_no_workspace_is_noop() {
        let dir = TempDir::new().unwrap();
        let (session, log) = session(&dir.path().join("missing"));

        assert!(!session.save(InstructionKind::CodeReview, "", "x").await);
        assert_eq!(session.load(InstructionKind::CodeReview, ""), "");
        assert_eq!(log.len(), 0);
    }

    #[tokio::test]
    async fn test_handle_load_and_save_requests() {
        let dir = TempDir::new().unwrap();
        let (session, _log) = session(dir.path());

        let save: EditorRequest = serde_json::from_str(
            r#"{"command":"saveInstructions","type":"CODE_REVIEW","lang":"go","prompt":"Check errors."}"#,
        )
        .unwrap();
        assert_eq!(session.handle(save).await, None);

        let load: EditorRequest = serde_json::from_str(
            r#"{"command":"loadTypeLanguagePrompt","type":"CODE_REVIEW","lang":"go"}"#,
        )
        .unwrap();
        let response = session.handle(load).await.unwrap();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "command": "setPrompt", "prompt": "Check errors." })
        );
    }

    #[tokio::test]
    async fn test_handle_unknown_kind_reports_failure() {
        let dir = TempDir::new().unwrap();
        let (session, log) = session(dir.path());

        let response = session
            .handle(EditorRequest::Load {
                kind: "DOCS".to_string(),
                lang: String::new(),
            })
            .await;

        assert_eq!(
            response,
            Some(EditorResponse::SetPrompt {
                prompt: String::new()
            })
        );
        assert_eq!(log.entries()[0].level, NoticeLevel::Error);
    }

    #[test]
    fn test_request_lang_defaults_to_global() {
        let request: EditorRequest =
            serde_json::from_str(r#"{"command":"loadTypeLanguagePrompt","type":"CODE_REVIEW"}"#)
                .unwrap();
        assert_eq!(
            request,
            EditorRequest::Load {
                kind: "CODE_REVIEW".to_string(),
                lang: String::new(),
            }
        );
    }

    #[test]
    fn test_session_manager_focuses_existing_session() {
        let dir = TempDir::new().unwrap();
        let mut manager: SessionManager<MemorySettings, RecordingActions> = SessionManager::new();
        let mut created = 0;

        let (_, first) = manager.open_or_focus(|| {
            created += 1;
            session(dir.path()).0
        });
        let (session_ref, second) = manager.open_or_focus(|| {
            created += 1;
            session(dir.path()).0
        });

        assert_eq!(first, SessionOpen::Created);
        assert_eq!(second, SessionOpen::Focused);
        assert_eq!(session_ref.focus_count(), 1);
        assert_eq!(created, 1);
    }

    #[test]
    fn test_session_manager_close() {
        let dir = TempDir::new().unwrap();
        let mut manager: SessionManager<MemorySettings, RecordingActions> = SessionManager::new();

        manager.open_or_focus(|| session(dir.path()).0);
        assert!(manager.is_open());
        manager.close();
        assert!(!manager.is_open());
        assert!(manager.active().is_none());

        let (_, opened) = manager.open_or_focus(|| session(dir.path()).0);
        assert_eq!(opened, SessionOpen::Created);
    }
}
