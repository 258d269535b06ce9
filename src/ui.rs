//! UI rendering functions.

use std::path::Path;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::App;
use crate::host::NoticeLevel;
use crate::modal_ui::draw_editor_modal;
use crate::reconcile::{ReconcileFlags, StepOutcome};

/// Truncates a string to the given display width, appending "..." if truncated.
pub fn truncate_str(s: &str, max_width: usize) -> String {
    // Replace newlines with spaces for single-line display
    let single_line: String = s.chars().map(|c| if c == '\n' { ' ' } else { c }).collect();

    if single_line.width() <= max_width {
        return single_line;
    }

    let budget = max_width.saturating_sub(3);
    let mut used = 0;
    let mut out = String::new();
    for c in single_line.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push_str("...");
    out
}

/// Contract a path by replacing the home directory with `~` for display.
pub fn contract_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(suffix) = path.strip_prefix(&home)
    {
        return format!("~/{}", suffix.display());
    }
    path.display().to_string()
}

/// One-line summary of which steps are enabled.
pub fn format_flags(flags: &ReconcileFlags) -> String {
    let mark = |on: bool| if on { "on" } else { "off" };
    format!(
        "workspace prompts {} · language specific {} · prompt files {}",
        mark(flags.workspace_prompts),
        mark(flags.language_specific),
        mark(flags.prompt_files)
    )
}

fn outcome_color(outcome: &StepOutcome) -> Color {
    match outcome {
        StepOutcome::Applied(_) => Color::Green,
        StepOutcome::Failed(_) => Color::Red,
        StepOutcome::Disabled | StepOutcome::NothingToDo => Color::DarkGray,
    }
}

/// Calculate a centered rectangle within the given area.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

/// Draw the main UI.
pub fn draw_ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Status panel (border + 3 rows + border)
            Constraint::Min(1),    // Notices
            Constraint::Length(1), // Footer
        ])
        .split(f.area());

    draw_status_panel(f, app, chunks[0]);
    draw_notices(f, app, chunks[1]);
    draw_footer(f, app, chunks[2]);

    if app.show_editor_modal {
        draw_editor_modal(f, app);
    }
}

fn draw_status_panel(f: &mut Frame, app: &App, area: Rect) {
    let label_style = Style::default().fg(Color::DarkGray);
    let width = usize::from(area.width.saturating_sub(16));

    let workspace = app
        .reconciler
        .root()
        .map(contract_path)
        .unwrap_or_else(|| "(no workspace open)".to_string());
    let watching = if app.changes.is_some() {
        Span::styled(" watching", Style::default().fg(Color::Green))
    } else {
        Span::styled(" not watching", Style::default().fg(Color::Yellow))
    };

    let mut last_pass = vec![Span::styled("  Last pass: ", label_style)];
    match &app.last_report {
        Some(report) => {
            for (i, (name, outcome)) in report.steps().into_iter().enumerate() {
                if i > 0 {
                    last_pass.push(Span::styled(" · ", label_style));
                }
                last_pass.push(Span::raw(format!("{}: ", name)));
                last_pass.push(Span::styled(
                    outcome.label(),
                    Style::default().fg(outcome_color(outcome)),
                ));
            }
            if let Some(trigger) = &app.last_trigger {
                last_pass.push(Span::styled(format!("  ({})", trigger), label_style));
            }
        }
        None => last_pass.push(Span::styled("none yet", label_style)),
    }

    let lines = vec![
        Line::from(vec![
            Span::styled("  Workspace: ", label_style),
            Span::raw(truncate_str(&workspace, width)),
            watching,
        ]),
        Line::from(vec![
            Span::styled("  Steps:     ", label_style),
            Span::raw(truncate_str(&format_flags(&app.flags), width)),
        ]),
        Line::from(last_pass),
    ];

    let title = format!(" promptsync · {} passes ", app.pass_count);
    let border_color = if app.error_count() > 0 {
        Color::Red
    } else {
        Color::Cyan
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border_color));

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_notices(f: &mut Frame, app: &mut App, area: Rect) {
    app.notices_pane_height = area.height.saturating_sub(2);
    if app.is_auto_following {
        app.scroll_to_bottom();
    }

    let width = usize::from(area.width.saturating_sub(4));
    let lines: Vec<Line> = app
        .notices
        .entries()
        .into_iter()
        .map(|notice| {
            let (marker, color) = match notice.level {
                NoticeLevel::Info => ("•", Color::White),
                NoticeLevel::Error => ("✗", Color::Red),
            };
            Line::from(Span::styled(
                format!("{} {}", marker, truncate_str(&notice.message, width)),
                Style::default().fg(color),
            ))
        })
        .collect();
    let total = lines.len();

    let block = Block::default()
        .title(" Notices ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let paragraph = Paragraph::new(lines)
        .block(block)
        .scroll((app.scroll_offset, 0));
    f.render_widget(paragraph, area);

    if total > usize::from(app.notices_pane_height) {
        let mut scrollbar_state =
            ScrollbarState::new(usize::from(app.max_scroll())).position(usize::from(app.scroll_offset));
        f.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area,
            &mut scrollbar_state,
        );
    }
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let key_style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let text_style = Style::default().fg(Color::DarkGray);

    let editor_label = if app.sessions.is_open() && !app.show_editor_modal {
        " resume editor  "
    } else {
        " editor  "
    };

    let mut spans = vec![
        Span::styled(" e", key_style),
        Span::styled(editor_label, text_style),
        Span::styled("r", key_style),
        Span::styled(" reconcile  ", text_style),
        Span::styled("j/k", key_style),
        Span::styled(" scroll  ", text_style),
        Span::styled("q", key_style),
        Span::styled(" quit", text_style),
    ];
    if let Some(dir) = &app.log_directory {
        spans.push(Span::styled(
            format!("   logs: {}", contract_path(dir)),
            text_style,
        ));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
