//! Host editor collaborators: named actions, user notices, and the reload chain.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Action that toggles Copilot off and on, making it re-read its settings.
pub const TOGGLE_COPILOT_ACTION: &str = "github.copilot.toggleCopilot";

/// Older action that reloads Copilot directly.
pub const RELOAD_COPILOT_ACTION: &str = "github.copilot.reload";

/// Notice shown when no reload action worked.
pub const MANUAL_RELOAD_NOTICE: &str = "Please reload VS Code to apply the new Copilot settings";

/// Named host actions without arguments.
#[allow(async_fn_in_trait)]
pub trait HostActions {
    async fn execute(&self, action: &str) -> Result<()>;
}

/// Runs host actions as external commands bound in configuration.
#[derive(Debug, Clone, Default)]
pub struct CommandActions {
    bindings: BTreeMap<String, Vec<String>>,
}

impl CommandActions {
    pub fn new(bindings: BTreeMap<String, Vec<String>>) -> Self {
        Self { bindings }
    }
}

impl HostActions for CommandActions {
    async fn execute(&self, action: &str) -> Result<()> {
        let Some((program, args)) = self.bindings.get(action).and_then(|argv| argv.split_first())
        else {
            bail!("no command bound for action {}", action);
        };

        debug!(action, program = %program, "host_action_start");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| anyhow!("failed to run {}: {}", program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", program, output.status, stderr.trim());
        }

        info!(action, "host_action_done");
        Ok(())
    }
}

/// Accepts every action without doing anything. Used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopActions;

impl HostActions for NoopActions {
    async fn execute(&self, action: &str) -> Result<()> {
        debug!(action, "host_action_skipped");
        Ok(())
    }
}

/// Severity of a user notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Where user-visible notices go.
pub trait Notifier {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Prints notices to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn info(&self, message: &str) {
        info!(notice = %message, "notice");
        eprintln!("{}", message);
    }

    fn error(&self, message: &str) {
        error!(notice = %message, "notice");
        eprintln!("error: {}", message);
    }
}

/// Keeps notices in memory for the terminal UI.
#[derive(Debug, Default)]
pub struct NoticeLog {
    entries: RefCell<Vec<Notice>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Notice> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    fn push(&self, level: NoticeLevel, message: &str) {
        self.entries.borrow_mut().push(Notice {
            level,
            message: message.to_string(),
        });
    }
}

impl Notifier for NoticeLog {
    fn info(&self, message: &str) {
        info!(notice = %message, "notice");
        self.push(NoticeLevel::Info, message);
    }

    fn error(&self, message: &str) {
        error!(notice = %message, "notice");
        self.push(NoticeLevel::Error, message);
    }
}

/// One stage of the reload fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadStep {
    /// Invoke the action, wait, then invoke it again to restore its state.
    Toggle {
        action: &'static str,
        pause: Duration,
    },
    /// Invoke the action once.
    Invoke(&'static str),
    /// Ask the user to reload manually. Cannot fail.
    AskManualReload,
}

/// Which stage of the chain took effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Completed(ReloadStep),
    ManualReloadRequested,
}

/// The reload chain in the order it is tried.
pub fn reload_chain(pause: Duration) -> Vec<ReloadStep> {
    vec![
        ReloadStep::Toggle {
            action: TOGGLE_COPILOT_ACTION,
            pause,
        },
        ReloadStep::Invoke(RELOAD_COPILOT_ACTION),
        ReloadStep::AskManualReload,
    ]
}

async fn run_step<A: HostActions>(actions: &A, step: &ReloadStep) -> Result<()> {
    match step {
        ReloadStep::Toggle { action, pause } => {
            actions.execute(action).await?;
            tokio::time::sleep(*pause).await;
            actions.execute(action).await
        }
        ReloadStep::Invoke(action) => actions.execute(action).await,
        ReloadStep::AskManualReload => Ok(()),
    }
}

/// Try each step until one succeeds. Failures before the last step are
/// swallowed; the manual-reload step always ends the chain.
pub async fn run_reload_chain<A: HostActions>(
    actions: &A,
    chain: &[ReloadStep],
    notifier: &dyn Notifier,
) -> ReloadOutcome {
    for step in chain {
        if *step == ReloadStep::AskManualReload {
            break;
        }
        match run_step(actions, step).await {
            Ok(()) => {
                debug!(step = ?step, "reload_step_succeeded");
                return ReloadOutcome::Completed(step.clone());
            }
            Err(e) => debug!(step = ?step, error = %e, "reload_step_failed"),
        }
    }

    warn!("reload_chain_exhausted");
    notifier.info(MANUAL_RELOAD_NOTICE);
    ReloadOutcome::ManualReloadRequested
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingActions;

    #[tokio::test]
    async fn test_toggle_success_invokes_twice() {
        let actions = RecordingActions::new();
        let notices = NoticeLog::new();

        let outcome = run_reload_chain(&actions, &reload_chain(Duration::ZERO), &notices).await;

        assert_eq!(
            outcome,
            ReloadOutcome::Completed(ReloadStep::Toggle {
                action: TOGGLE_COPILOT_ACTION,
                pause: Duration::ZERO,
            })
        );
        assert_eq!(
            actions.calls(),
            vec![TOGGLE_COPILOT_ACTION, TOGGLE_COPILOT_ACTION]
        );
        assert_eq!(notices.len(), 0);
    }

    #[tokio::test]
    async fn test_toggle_failure_falls_back_to_reload() {
        let actions = RecordingActions::failing(&[TOGGLE_COPILOT_ACTION]);
        let notices = NoticeLog::new();

        let outcome = run_reload_chain(&actions, &reload_chain(Duration::ZERO), &notices).await;

        assert_eq!(
            outcome,
            ReloadOutcome::Completed(ReloadStep::Invoke(RELOAD_COPILOT_ACTION))
        );
        assert_eq!(
            actions.calls(),
            vec![TOGGLE_COPILOT_ACTION, RELOAD_COPILOT_ACTION]
        );
        assert_eq!(notices.len(), 0);
    }

    #[tokio::test]
    async fn test_all_failing_asks_for_manual_reload() {
        let actions = RecordingActions::failing(&[TOGGLE_COPILOT_ACTION, RELOAD_COPILOT_ACTION]);
        let notices = NoticeLog::new();

        let outcome = run_reload_chain(&actions, &reload_chain(Duration::ZERO), &notices).await;

        assert_eq!(outcome, ReloadOutcome::ManualReloadRequested);
        assert_eq!(
            notices.entries(),
            vec![Notice {
                level: NoticeLevel::Info,
                message: MANUAL_RELOAD_NOTICE.to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_unbound_command_actions_fall_through() {
        let actions = CommandActions::default();
        let notices = NoticeLog::new();

        let outcome = run_reload_chain(&actions, &reload_chain(Duration::ZERO), &notices).await;

        assert_eq!(outcome, ReloadOutcome::ManualReloadRequested);
    }

    #[tokio::test]
    async fn test_command_actions_reports_exit_status() {
        let mut bindings = BTreeMap::new();
        bindings.insert("ok".to_string(), vec!["true".to_string()]);
        bindings.insert("bad".to_string(), vec!["false".to_string()]);
        bindings.insert("empty".to_string(), vec![]);
        let actions = CommandActions::new(bindings);

        if cfg!(unix) {
            assert!(actions.execute("ok").await.is_ok());
            assert!(actions.execute("bad").await.is_err());
        }
        assert!(actions.execute("empty").await.is_err());
        assert!(actions.execute("missing").await.is_err());
    }

    #[test]
    fn test_chain_order() {
        let chain = reload_chain(Duration::from_millis(1000));
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1], ReloadStep::Invoke(RELOAD_COPILOT_ACTION));
        assert_eq!(chain[2], ReloadStep::AskManualReload);
    }
}
