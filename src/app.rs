//! Application state and core logic for the terminal UI.

use std::path::PathBuf;
use std::rc::Rc;

use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::editor::{EditorSession, SessionManager, SessionOpen};
use crate::host::{CommandActions, NoticeLevel, NoticeLog, Notifier};
use crate::modals::EditorModalState;
use crate::reconcile::{PassReport, ReconcileFlags, Reconciler};
use crate::settings::FileSettings;
use crate::watcher::WatchedChange;

pub type TuiReconciler = Reconciler<FileSettings, CommandActions>;

pub struct App {
    pub reconciler: Rc<TuiReconciler>,
    pub notices: Rc<NoticeLog>,
    pub sessions: SessionManager<FileSettings, CommandActions>,
    /// Kept while the session is open, even when the modal is hidden.
    pub editor_state: Option<EditorModalState>,
    pub show_editor_modal: bool,
    /// `None` when the workspace is not watched.
    pub changes: Option<UnboundedReceiver<WatchedChange>>,
    pub flags: ReconcileFlags,
    pub last_report: Option<PassReport>,
    pub last_trigger: Option<String>,
    pub pass_count: usize,
    pub scroll_offset: u16,
    pub is_auto_following: bool,
    pub notices_pane_height: u16,
    pub config_path: Option<PathBuf>,
    pub log_directory: Option<PathBuf>,
    pub session_id: Option<String>,
    runtime: Runtime,
}

impl App {
    pub fn new(
        reconciler: TuiReconciler,
        notices: Rc<NoticeLog>,
        flags: ReconcileFlags,
        runtime: Runtime,
    ) -> Self {
        Self {
            reconciler: Rc::new(reconciler),
            notices,
            sessions: SessionManager::new(),
            editor_state: None,
            show_editor_modal: false,
            changes: None,
            flags,
            last_report: None,
            last_trigger: None,
            pass_count: 0,
            scroll_offset: 0,
            is_auto_following: true,
            notices_pane_height: 0,
            config_path: None,
            log_directory: None,
            session_id: None,
            runtime,
        }
    }

    /// Run one full reconciliation pass and remember its report.
    pub fn run_pass(&mut self, trigger: &str) {
        let report = self.runtime.block_on(self.reconciler.reconcile());
        self.pass_count += 1;
        info!(trigger, pass = self.pass_count, summary = %report.summary(), "tui_pass_completed");
        self.last_report = Some(report);
        self.last_trigger = Some(trigger.to_string());
        if self.is_auto_following {
            self.scroll_to_bottom();
        }
    }

    /// Drain pending watcher events, running one pass per change.
    pub fn poll_changes(&mut self) {
        loop {
            let Some(changes) = self.changes.as_mut() else {
                return;
            };
            match changes.try_recv() {
                Ok(change) => {
                    let trigger = format!("{:?} {:?}", change.file, change.kind);
                    self.run_pass(&trigger);
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    warn!("watch_channel_disconnected");
                    self.notices.error("File watching stopped");
                    self.changes = None;
                    return;
                }
            }
        }
    }

    /// Open the editor, or bring back the one already open.
    pub fn open_editor(&mut self) {
        let reconciler = self.reconciler.clone();
        let (_, opened) = self
            .sessions
            .open_or_focus(move || EditorSession::new(reconciler));

        if opened == SessionOpen::Created || self.editor_state.is_none() {
            self.editor_state = Some(EditorModalState::new());
            self.load_editor_prompt();
        }
        self.show_editor_modal = true;
    }

    /// Hide the modal; the session and its unsaved text stay.
    pub fn hide_editor(&mut self) {
        self.show_editor_modal = false;
    }

    /// Dispose of the session and its modal state.
    pub fn close_editor(&mut self) {
        self.sessions.close();
        self.editor_state = None;
        self.show_editor_modal = false;
    }

    /// Load the prompt for the selected kind and language into the modal.
    pub fn load_editor_prompt(&mut self) {
        let (Some(session), Some(state)) = (self.sessions.active(), self.editor_state.as_mut())
        else {
            return;
        };
        let prompt = session.load(state.kind(), state.language());
        state.set_text(prompt);
    }

    /// Save the modal's text through the session.
    pub fn save_editor_prompt(&mut self) -> bool {
        let (Some(session), Some(state)) = (self.sessions.active(), self.editor_state.as_mut())
        else {
            return false;
        };
        let saved = self
            .runtime
            .block_on(session.save(state.kind(), state.language(), &state.text));
        if saved {
            state.mark_saved();
        }
        debug!(saved, "editor_save");
        if self.is_auto_following {
            self.scroll_to_bottom();
        }
        saved
    }

    pub fn max_scroll(&self) -> u16 {
        let lines = u16::try_from(self.notices.len()).unwrap_or(u16::MAX);
        lines.saturating_sub(self.notices_pane_height)
    }

    pub fn scroll_up(&mut self, amount: u16) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
        self.is_auto_following = false;
    }

    pub fn scroll_down(&mut self, amount: u16) {
        self.scroll_offset = self.scroll_offset.saturating_add(amount).min(self.max_scroll());
        if self.scroll_offset >= self.max_scroll() {
            self.is_auto_following = true;
        }
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = self.max_scroll();
        self.is_auto_following = true;
    }

    pub fn error_count(&self) -> usize {
        self.notices
            .entries()
            .iter()
            .filter(|n| n.level == NoticeLevel::Error)
            .count()
    }
}
