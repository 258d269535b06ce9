//! Re-runs reconciliation whenever a watched workspace file changes.

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::host::HostActions;
use crate::reconcile::{PassReport, Reconciler};
use crate::settings::SettingsStore;

/// The files whose changes trigger a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedFile {
    /// `**/.github/copilot-instructions.md`
    Instructions,
    /// `**/.github/prompts/*.prompt.md`
    PromptFile,
    /// `**/.vscode/copilot.json`
    CopilotConfig,
}

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchedChange {
    pub file: WatchedFile,
    pub kind: ChangeKind,
}

/// Classify a path against the watched patterns. The patterns match at any
/// depth, so nested workspace folders are picked up as well.
pub fn classify(path: &Path) -> Option<WatchedFile> {
    let name = path.file_name()?.to_str()?;
    let parent = path.parent();
    let parent_name = parent.and_then(Path::file_name).and_then(|n| n.to_str());
    let grandparent_name = parent
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .and_then(|n| n.to_str());

    match (grandparent_name, parent_name, name) {
        (_, Some(".github"), "copilot-instructions.md") => Some(WatchedFile::Instructions),
        (_, Some(".vscode"), "copilot.json") => Some(WatchedFile::CopilotConfig),
        (Some(".github"), Some("prompts"), file)
            if file.ends_with(".prompt.md") && file.len() > ".prompt.md".len() =>
        {
            Some(WatchedFile::PromptFile)
        }
        _ => None,
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        _ => None,
    }
}

/// Changes in a raw notify event that concern watched files.
fn watched_changes(event: &Event) -> Vec<WatchedChange> {
    let Some(kind) = change_kind(&event.kind) else {
        return Vec::new();
    };
    event
        .paths
        .iter()
        .filter_map(|path| classify(path))
        .map(|file| WatchedChange { file, kind })
        .collect()
}

/// Watches a workspace root and forwards relevant changes over a channel.
///
/// Dropping the subscription stops the watcher and closes the channel.
pub struct Subscription {
    _watcher: RecommendedWatcher,
}

/// Start watching `root` recursively.
pub fn subscribe(root: &Path) -> Result<(Subscription, UnboundedReceiver<WatchedChange>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        forward(&tx, res);
    })
    .context("Failed to create file watcher")?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", root.display()))?;

    info!(root = ?root, "watch_started");
    Ok((Subscription { _watcher: watcher }, rx))
}

fn forward(tx: &UnboundedSender<WatchedChange>, res: notify::Result<Event>) {
    match res {
        Ok(event) => {
            for change in watched_changes(&event) {
                debug!(change = ?change, "watched_file_changed");
                // The receiver is gone only while shutting down.
                let _ = tx.send(change);
            }
        }
        Err(e) => warn!(error = %e, "watch_error"),
    }
}

/// Run a full pass for every change until `shutdown` resolves or the channel
/// closes. Passes are neither merged nor cancelled; each runs to completion.
pub async fn drive<S, A>(
    reconciler: &Reconciler<S, A>,
    changes: &mut UnboundedReceiver<WatchedChange>,
    shutdown: impl Future<Output = ()>,
    mut on_pass: impl FnMut(&WatchedChange, &PassReport),
) -> usize
where
    S: SettingsStore,
    A: HostActions,
{
    tokio::pin!(shutdown);
    let mut passes = 0;

    loop {
        let change = tokio::select! {
            _ = &mut shutdown => break,
            change = changes.recv() => change,
        };
        let Some(change) = change else {
            debug!("watch_channel_closed");
            break;
        };

        let report = reconciler.reconcile().await;
        passes += 1;
        on_pass(&change, &report);
    }

    info!(passes, "watch_stopped");
    passes
}
