mod app;
mod config;
mod editor;
mod host;
mod legacy;
mod logging;
mod modal_ui;
mod modals;
mod prompt_store;
mod reconcile;
mod registry;
mod settings;
mod templates;
#[cfg(test)]
mod testing;
mod ui;
mod watcher;

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crossterm::event::{
    DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::{DefaultTerminal, Terminal};
use serde_json::Value;
use similar::TextDiff;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::config::{Config, ConfigLoadStatus, LoadedConfig};
use crate::editor::{EditorRequest, EditorSession};
use crate::host::{CommandActions, ConsoleNotifier, NoopActions, NoticeLog, Notifier};
use crate::modals::handle_editor_modal_input;
use crate::reconcile::{ReconcileFlags, ReconcileOptions, Reconciler, Workspace};
use crate::registry::{InstructionKind, LANGUAGES, parse_kind_arg};
use crate::settings::{FileSettings, MemorySettings};
use crate::templates::InitPlan;
use crate::ui::draw_ui;

/// Sync per-language Copilot prompt files from a workspace into editor settings.
#[derive(Debug, Parser)]
#[command(name = "promptsync", version, about)]
struct Cli {
    /// Workspace folder; repeatable, the first one is the active root.
    #[arg(long = "workspace", value_name = "DIR", global = true)]
    workspaces: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one reconciliation pass
    Apply {
        /// Print the settings changes instead of writing them
        #[arg(long)]
        diff: bool,
    },
    /// Reconcile, then again on every change to a watched file
    Watch,
    /// Dashboard with the interactive prompt editor
    Edit,
    /// Print a prompt from the instructions document
    Get {
        #[arg(long, value_parser = parse_kind_arg)]
        kind: InstructionKind,
        /// Language identifier; omit for the global prompt
        #[arg(long, default_value = "")]
        language: String,
    },
    /// Save a prompt and push it to the settings
    Set {
        #[arg(long, value_parser = parse_kind_arg)]
        kind: InstructionKind,
        #[arg(long, default_value = "")]
        language: String,
        /// Prompt text; read from stdin when omitted
        #[arg(long)]
        text: Option<String>,
    },
    /// Answer editor requests on stdin, one JSON object per line
    Session,
    /// Per-language `.copilot-prompt-<language>` files
    Legacy {
        #[command(subcommand)]
        action: LegacyCommand,
    },
    /// List recognized language identifiers
    Languages,
    /// Create the watched workspace files that are missing
    Init,
}

#[derive(Debug, Subcommand)]
enum LegacyCommand {
    Get {
        #[arg(long)]
        language: String,
    },
    Set {
        #[arg(long)]
        language: String,
        #[arg(long)]
        text: Option<String>,
    },
}

type CliReconciler = Reconciler<FileSettings, CommandActions>;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    // Initialize logging before anything else
    let logging_ctx = match logging::init() {
        Ok(ctx) => {
            logging::cleanup_old_logs(&ctx.log_directory);
            Some(ctx)
        }
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {:#}", e);
            None
        }
    };

    let workspace = workspace_from_args(&cli.workspaces)?;
    let loaded_config = config::load_config(workspace.root());
    debug!(
        config_path = %loaded_config.config_path.display(),
        project_config = ?loaded_config.project_config_path,
        status = ?loaded_config.status,
        "config_loaded"
    );
    if let ConfigLoadStatus::Error(e) = &loaded_config.status {
        eprintln!("Warning: {}; using default configuration", e);
    }
    if let Some(ctx) = &logging_ctx {
        ctx.apply_level(&loaded_config.config.logging.level);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = run(
        cli.command,
        workspace,
        loaded_config,
        runtime,
        logging_ctx.as_ref(),
    );
    if let Err(e) = &result {
        warn!(error = %format!("{:#}", e), "command_failed");
    }

    if let Some(ctx) = &logging_ctx {
        info!(
            session_id = %ctx.session_id,
            duration_secs = start_time.elapsed().as_secs_f64(),
            "session_end"
        );
    }

    result
}

fn workspace_from_args(folders: &[PathBuf]) -> Result<Workspace> {
    if folders.is_empty() {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        return Ok(Workspace::new(vec![cwd]));
    }
    Ok(Workspace::new(folders.to_vec()))
}

fn reconcile_options(config: &Config) -> ReconcileOptions {
    ReconcileOptions {
        flags: ReconcileFlags::from(&config.workspace),
        reload_pause: config.reload_pause(),
    }
}

fn settings_path(workspace: &Workspace, config: &Config) -> PathBuf {
    workspace
        .root()
        .map(|root| config.settings_path(root))
        .unwrap_or_else(|| Config::expand_tilde(&config.host.settings_file))
}

fn build_reconciler(
    workspace: Workspace,
    config: &Config,
    notifier: Rc<dyn Notifier>,
) -> CliReconciler {
    let settings = FileSettings::new(settings_path(&workspace, config));
    Reconciler::new(
        workspace,
        settings,
        CommandActions::new(config.host.actions.clone()),
        notifier,
        reconcile_options(config),
    )
}

fn require_root(workspace: &Workspace) -> Result<PathBuf> {
    match workspace.root() {
        Some(root) => Ok(root.to_path_buf()),
        None => bail!("no workspace open"),
    }
}

/// Read the rest of stdin, without the trailing newline.
fn read_stdin_text() -> Result<String> {
    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read text from stdin")?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

fn run(
    command: Command,
    workspace: Workspace,
    loaded_config: LoadedConfig,
    runtime: Runtime,
    logging_ctx: Option<&logging::LoggingContext>,
) -> Result<()> {
    let config = &loaded_config.config;
    let console: Rc<dyn Notifier> = Rc::new(ConsoleNotifier);

    match command {
        Command::Apply { diff: true } => runtime.block_on(apply_dry_run(workspace, config)),
        Command::Apply { diff: false } => {
            let reconciler = build_reconciler(workspace, config, console);
            let report = runtime.block_on(reconciler.reconcile());
            println!("{}", report.summary());
            if report.has_failures() {
                bail!("reconciliation finished with failures");
            }
            Ok(())
        }
        Command::Watch => {
            let reconciler = build_reconciler(workspace, config, console);
            runtime.block_on(watch(&reconciler))
        }
        Command::Edit => run_tui(workspace, &loaded_config, runtime, logging_ctx),
        Command::Get { kind, language } => {
            let session = EditorSession::new(Rc::new(build_reconciler(workspace, config, console)));
            let prompt = session.read_prompt(kind, &language)?;
            println!("{}", prompt);
            Ok(())
        }
        Command::Set {
            kind,
            language,
            text,
        } => {
            let text = match text {
                Some(text) => text,
                None => read_stdin_text()?,
            };
            require_root(&workspace)?;
            let session = EditorSession::new(Rc::new(build_reconciler(workspace, config, console)));
            if !runtime.block_on(session.save(kind, &language, &text)) {
                bail!("prompt was not saved");
            }
            Ok(())
        }
        Command::Session => {
            let session = EditorSession::new(Rc::new(build_reconciler(workspace, config, console)));
            runtime.block_on(serve_session(&session))
        }
        Command::Legacy { action } => {
            let root = require_root(&workspace)?;
            match action {
                LegacyCommand::Get { language } => {
                    println!("{}", legacy::read(&root, &language)?);
                }
                LegacyCommand::Set { language, text } => {
                    let text = match text {
                        Some(text) => text,
                        None => read_stdin_text()?,
                    };
                    legacy::write(&root, &language, &text)?;
                    eprintln!("Saved {}", legacy::prompt_path(&root, &language).display());
                }
            }
            Ok(())
        }
        Command::Languages => {
            let stored: Vec<String> = match workspace.root() {
                Some(root) => prompt_store::read_from_disk(root)?
                    .languages()
                    .map(str::to_string)
                    .collect(),
                None => Vec::new(),
            };
            for language in LANGUAGES {
                if stored.iter().any(|s| s == language) {
                    println!("{} *", language);
                } else {
                    println!("{}", language);
                }
            }
            Ok(())
        }
        Command::Init => init(&require_root(&workspace)?),
    }
}

/// Run a pass against an in-memory copy of the settings and print what
/// would change.
async fn apply_dry_run(workspace: Workspace, config: &Config) -> Result<()> {
    let file = FileSettings::new(settings_path(&workspace, config));
    let before = file.snapshot().await?;

    let notifier: Rc<dyn Notifier> = Rc::new(ConsoleNotifier);
    let reconciler = Reconciler::new(
        workspace,
        MemorySettings::seeded(before.clone()),
        NoopActions,
        notifier,
        ReconcileOptions {
            reload_pause: Duration::ZERO,
            ..reconcile_options(config)
        },
    );
    let report = reconciler.reconcile().await;
    let writes = reconciler.settings().writes().len();
    let after = reconciler.settings().snapshot();

    let old = settings_document(before)?;
    let new = settings_document(after)?;
    if old == new {
        println!("No settings changes ({})", report.summary());
        return Ok(());
    }

    eprintln!("{} setting write(s) would be made", writes);
    let label = file.path().display().to_string();
    print!(
        "{}",
        TextDiff::from_lines(&old, &new)
            .unified_diff()
            .context_radius(3)
            .header(&label, &label)
    );
    Ok(())
}

fn settings_document(values: serde_json::Map<String, Value>) -> Result<String> {
    let mut doc = serde_json::to_string_pretty(&Value::Object(values))
        .context("Failed to serialize settings")?;
    doc.push('\n');
    Ok(doc)
}

/// Initial pass, then one pass per watched change until Ctrl-C.
async fn watch(reconciler: &CliReconciler) -> Result<()> {
    let root = require_root_of(reconciler)?;
    let report = reconciler.reconcile().await;
    eprintln!("initial pass: {}", report.summary());

    let (_subscription, mut changes) = watcher::subscribe(&root)?;
    eprintln!("watching {} (Ctrl-C to stop)", root.display());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_listener_failed");
            std::future::pending::<()>().await;
        }
    };
    let passes = watcher::drive(reconciler, &mut changes, shutdown, |change, report| {
        eprintln!("{:?} {:?}: {}", change.file, change.kind, report.summary());
    })
    .await;

    eprintln!("stopped after {} passes", passes);
    Ok(())
}

fn require_root_of(reconciler: &CliReconciler) -> Result<PathBuf> {
    match reconciler.root() {
        Some(root) => Ok(root.to_path_buf()),
        None => bail!("no workspace open"),
    }
}

/// Answer protocol requests until stdin closes.
async fn serve_session(session: &EditorSession<FileSettings, CommandActions>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let request: EditorRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "session_request_malformed");
                continue;
            }
        };
        debug!(request = ?request, "session_request");

        if let Some(response) = session.handle(request).await {
            let mut out = serde_json::to_string(&response).context("Failed to encode response")?;
            out.push('\n');
            stdout.write_all(out.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

fn init(root: &Path) -> Result<()> {
    let plan = InitPlan::new(root);
    if plan.has_conflicts() {
        for file in plan.conflicting_files() {
            eprintln!("exists, skipped: {}", file.display_path);
        }
    }
    let created = plan.create_files()?;
    println!("Created {} file(s) in {}", created, root.display());
    Ok(())
}

fn run_tui(
    workspace: Workspace,
    loaded_config: &LoadedConfig,
    runtime: Runtime,
    logging_ctx: Option<&logging::LoggingContext>,
) -> Result<()> {
    let config = &loaded_config.config;
    let notices = Rc::new(NoticeLog::new());
    let notifier: Rc<dyn Notifier> = notices.clone();
    let reconciler = build_reconciler(workspace, config, notifier);

    let mut app = App::new(
        reconciler,
        notices,
        ReconcileFlags::from(&config.workspace),
        runtime,
    );
    app.config_path = Some(loaded_config.config_path.clone());
    app.log_directory = logging_ctx.map(|ctx| ctx.log_directory.clone());
    app.session_id = logging_ctx.map(|ctx| ctx.session_id.clone());

    // The watcher stops when this is dropped at the end of the function.
    let _subscription = match app.reconciler.root().map(watcher::subscribe) {
        Some(Ok((subscription, changes))) => {
            app.changes = Some(changes);
            Some(subscription)
        }
        Some(Err(e)) => {
            warn!(error = %format!("{:#}", e), "watch_failed");
            app.notices.error(&format!("File watching unavailable: {:#}", e));
            None
        }
        None => None,
    };
    app.run_pass("startup");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let terminal = Terminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

    let result = run_app(terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture)?;

    result
}

fn run_app(mut terminal: DefaultTerminal, app: &mut App) -> Result<()> {
    loop {
        app.poll_changes();

        terminal.draw(|f| draw_ui(f, app))?;

        // Short timeout so watcher events are picked up between keys
        if !crossterm::event::poll(Duration::from_millis(50))? {
            continue;
        }

        match crossterm::event::read()? {
            Event::Key(key) if app.show_editor_modal => {
                handle_editor_modal_input(app, key.code, key.modifiers);
            }
            Event::Key(key) => match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(());
                }
                KeyCode::Char('e') => app.open_editor(),
                KeyCode::Char('r') => app.run_pass("manual"),
                KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
                KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
                KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    let half_page = app.notices_pane_height / 2;
                    app.scroll_up(half_page);
                }
                KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    let half_page = app.notices_pane_height / 2;
                    app.scroll_down(half_page);
                }
                KeyCode::Char('G') | KeyCode::End => app.scroll_to_bottom(),
                _ => {}
            },
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => app.scroll_up(3),
                MouseEventKind::ScrollDown => app.scroll_down(3),
                _ => {}
            },
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses_set_with_kind_aliases() {
        let cli = Cli::try_parse_from([
            "promptsync",
            "--workspace",
            "/tmp/ws",
            "set",
            "--kind",
            "code-review",
            "--language",
            "rust",
            "--text",
            "be terse",
        ])
        .unwrap();

        assert_eq!(cli.workspaces, vec![PathBuf::from("/tmp/ws")]);
        match cli.command {
            Command::Set {
                kind,
                language,
                text,
            } => {
                assert_eq!(kind, InstructionKind::CodeReview);
                assert_eq!(language, "rust");
                assert_eq!(text.as_deref(), Some("be terse"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["promptsync", "get", "--kind", "DOCS"]).is_err());
    }

    #[test]
    fn test_cli_workspace_is_global_and_repeatable() {
        let cli = Cli::try_parse_from([
            "promptsync",
            "apply",
            "--diff",
            "--workspace",
            "a",
            "--workspace",
            "b",
        ])
        .unwrap();
        assert_eq!(cli.workspaces, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(matches!(cli.command, Command::Apply { diff: true }));
    }

    #[test]
    fn test_workspace_defaults_to_current_dir() {
        let workspace = workspace_from_args(&[]).unwrap();
        assert_eq!(
            workspace.root().map(Path::to_path_buf),
            std::env::current_dir().ok()
        );
    }

    #[test]
    fn test_settings_path_relative_to_root() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(vec![dir.path().to_path_buf()]);
        assert_eq!(
            settings_path(&workspace, &Config::default()),
            dir.path().join(".vscode/settings.json")
        );
    }

    #[tokio::test]
    async fn test_dry_run_leaves_settings_file_alone() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".github")).unwrap();
        std::fs::write(dir.path().join(".github/copilot-instructions.md"), "Use tabs.").unwrap();

        let workspace = Workspace::new(vec![dir.path().to_path_buf()]);
        apply_dry_run(workspace, &Config::default()).await.unwrap();

        assert!(!dir.path().join(".vscode/settings.json").exists());
    }

    #[test]
    fn test_settings_document_keeps_key_order() {
        let mut values = serde_json::Map::new();
        values.insert("z.key".to_string(), Value::Bool(true));
        values.insert("a.key".to_string(), Value::Bool(false));
        let doc = settings_document(values).unwrap();
        assert!(doc.find("z.key").unwrap() < doc.find("a.key").unwrap());
        assert!(doc.ends_with("}\n"));
    }
}
