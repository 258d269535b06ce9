//! Modal UI rendering functions.

use ratatui::Frame;
use ratatui::layout::Alignment;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::app::App;
use crate::modals::{EditorModalField, EditorModalState};
use crate::ui::{centered_rect, truncate_str};

const TEXT_AREA_ROWS: usize = 12;

/// Draw the prompt editor modal.
pub fn draw_editor_modal(f: &mut Frame, app: &App) {
    let Some(state) = app.editor_state.as_ref() else {
        return;
    };

    let modal_width: u16 = 76;
    let modal_height: u16 = TEXT_AREA_ROWS as u16 + 10;
    let modal_area = centered_rect(modal_width, modal_height, f.area());
    f.render_widget(Clear, modal_area);

    let inner_width = usize::from(modal_width.saturating_sub(6));
    let separator = "─".repeat(usize::from(modal_width.saturating_sub(4)));

    let label_style = Style::default().fg(Color::DarkGray);
    let focused_label_style = Style::default().fg(Color::Cyan);
    let label_for = |field: EditorModalField| {
        if state.focus == field {
            focused_label_style
        } else {
            label_style
        }
    };

    let mut content: Vec<Line> = Vec::new();

    content.push(Line::from(vec![
        Span::styled("  Kind:     ", label_for(EditorModalField::Kind)),
        selector(state.kind().label(), state.focus == EditorModalField::Kind),
    ]));
    content.push(Line::from(vec![
        Span::styled("  Language: ", label_for(EditorModalField::Language)),
        selector(
            state.language_label(),
            state.focus == EditorModalField::Language,
        ),
    ]));

    let dirty_marker = if state.dirty { " (modified)" } else { "" };
    content.push(Line::from(vec![
        Span::styled("  Prompt", label_for(EditorModalField::Text)),
        Span::styled(dirty_marker, Style::default().fg(Color::Yellow)),
    ]));
    content.push(Line::from(format!("  {separator}")));
    content.extend(text_area_lines(
        state,
        state.focus == EditorModalField::Text,
        inner_width,
    ));
    content.push(Line::from(format!("  {separator}")));

    content.push(Line::from(vec![
        Span::raw("  "),
        button("Save", state.focus == EditorModalField::SaveButton),
        Span::raw("  "),
        button("Cancel", state.focus == EditorModalField::CancelButton),
    ]));

    let title = if app.sessions.active().is_some_and(|s| s.focus_count() > 0) {
        " Copilot Prompt Editor (resumed) "
    } else {
        " Copilot Prompt Editor "
    };
    let block = Block::default()
        .title(title)
        .title_alignment(Alignment::Center)
        .title_bottom(
            Line::from(" Tab next · ←/→ change · Ctrl-S save · Esc hide ").centered(),
        )
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    f.render_widget(Paragraph::new(content).block(block), modal_area);
}

fn selector(value: &str, focused: bool) -> Span<'static> {
    let text = format!("◀ {} ▶", value);
    if focused {
        Span::styled(text, Style::default().fg(Color::Black).bg(Color::Cyan))
    } else {
        Span::styled(text, Style::default().fg(Color::White))
    }
}

fn button(label: &str, focused: bool) -> Span<'static> {
    let text = format!("[ {} ]", label);
    if focused {
        Span::styled(
            text,
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled(text, Style::default().fg(Color::White))
    }
}

/// Rows of the text area, scrolled so the cursor line stays visible.
fn text_area_lines(
    state: &EditorModalState,
    focused: bool,
    width: usize,
) -> Vec<Line<'static>> {
    let (cursor_line, cursor_col) = state.cursor_line_col();
    let lines: Vec<&str> = state.text.split('\n').collect();
    let first = (cursor_line + 1).saturating_sub(TEXT_AREA_ROWS);

    let mut rows: Vec<Line<'static>> = lines
        .iter()
        .enumerate()
        .skip(first)
        .take(TEXT_AREA_ROWS)
        .map(|(i, line)| {
            if focused && i == cursor_line {
                cursor_row(line, cursor_col, width)
            } else {
                Line::from(vec![
                    Span::raw("  "),
                    Span::styled(truncate_str(line, width), Style::default().fg(Color::White)),
                ])
            }
        })
        .collect();

    while rows.len() < TEXT_AREA_ROWS {
        rows.push(Line::from(""));
    }
    rows
}

/// Render one line with a block cursor at `col` (in characters).
fn cursor_row(line: &str, col: usize, width: usize) -> Line<'static> {
    let chars: Vec<char> = line.chars().collect();
    let start = (col + 1).saturating_sub(width);
    let visible: Vec<char> = chars.iter().skip(start).take(width).copied().collect();
    let cursor = col - start;

    let before: String = visible.iter().take(cursor).collect();
    let cursor_char = visible.get(cursor).copied().unwrap_or(' ').to_string();
    let rest: String = visible.iter().skip(cursor + 1).collect();

    Line::from(vec![
        Span::raw("  "),
        Span::styled(before, Style::default().fg(Color::White)),
        Span::styled(
            cursor_char,
            Style::default().fg(Color::Black).bg(Color::White),
        ),
        Span::styled(rest, Style::default().fg(Color::White)),
    ])
}
