//! Editor modal state and input handling.

use crossterm::event::{KeyCode, KeyModifiers};
use tracing::debug;

use crate::app::App;
use crate::registry::{InstructionKind, LANGUAGES};

/// First entry of the language selector; saves and loads the global prompts.
pub const GLOBAL_LANGUAGE_LABEL: &str = "Global";

/// Which field is focused in the editor modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorModalField {
    Kind,
    Language,
    Text,
    SaveButton,
    CancelButton,
}

impl EditorModalField {
    pub fn next(self) -> Self {
        match self {
            Self::Kind => Self::Language,
            Self::Language => Self::Text,
            Self::Text => Self::SaveButton,
            Self::SaveButton => Self::CancelButton,
            Self::CancelButton => Self::Kind,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Self::Kind => Self::CancelButton,
            Self::Language => Self::Kind,
            Self::Text => Self::Language,
            Self::SaveButton => Self::Text,
            Self::CancelButton => Self::SaveButton,
        }
    }
}

/// State for the editor modal.
#[derive(Debug, Clone)]
pub struct EditorModalState {
    kind_index: usize,
    /// 0 is "Global"; `i > 0` is `LANGUAGES[i - 1]`.
    language_index: usize,
    pub text: String,
    /// Cursor position in characters.
    pub cursor_pos: usize,
    pub focus: EditorModalField,
    /// Text changed since the last load or save.
    pub dirty: bool,
}

impl Default for EditorModalState {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorModalState {
    pub fn new() -> Self {
        Self {
            kind_index: 0,
            language_index: 0,
            text: String::new(),
            cursor_pos: 0,
            focus: EditorModalField::Kind,
            dirty: false,
        }
    }

    pub fn kind(&self) -> InstructionKind {
        InstructionKind::ALL[self.kind_index % InstructionKind::ALL.len()]
    }

    /// Selected language, `""` for global.
    pub fn language(&self) -> &'static str {
        match self.language_index {
            0 => "",
            i => LANGUAGES.get(i - 1).copied().unwrap_or(""),
        }
    }

    pub fn language_label(&self) -> &'static str {
        match self.language() {
            "" => GLOBAL_LANGUAGE_LABEL,
            lang => lang,
        }
    }

    pub fn cycle_kind(&mut self, forward: bool) {
        self.kind_index = cycle(self.kind_index, InstructionKind::ALL.len(), forward);
    }

    pub fn cycle_language(&mut self, forward: bool) {
        self.language_index = cycle(self.language_index, LANGUAGES.len() + 1, forward);
    }

    /// Replace the text with freshly loaded content.
    pub fn set_text(&mut self, text: String) {
        self.cursor_pos = text.chars().count();
        self.text = text;
        self.dirty = false;
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn focus_next(&mut self) {
        self.focus = self.focus.next();
    }

    pub fn focus_prev(&mut self) {
        self.focus = self.focus.prev();
    }

    fn byte_index(&self, char_pos: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }

    /// Insert a character at the cursor.
    pub fn insert_char(&mut self, c: char) {
        let idx = self.byte_index(self.cursor_pos);
        self.text.insert(idx, c);
        self.cursor_pos += 1;
        self.dirty = true;
    }

    /// Delete the character before the cursor (backspace).
    pub fn delete_char_before(&mut self) {
        if self.cursor_pos == 0 {
            return;
        }
        let idx = self.byte_index(self.cursor_pos - 1);
        self.text.remove(idx);
        self.cursor_pos -= 1;
        self.dirty = true;
    }

    /// Delete the character at the cursor (delete key).
    pub fn delete_char_at(&mut self) {
        if self.cursor_pos >= self.text.chars().count() {
            return;
        }
        let idx = self.byte_index(self.cursor_pos);
        self.text.remove(idx);
        self.dirty = true;
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        self.cursor_pos = (self.cursor_pos + 1).min(self.text.chars().count());
    }

    /// Line and column (both in characters) of the cursor.
    pub fn cursor_line_col(&self) -> (usize, usize) {
        let before: String = self.text.chars().take(self.cursor_pos).collect();
        let line = before.matches('\n').count();
        let col = before
            .rsplit('\n')
            .next()
            .map(|l| l.chars().count())
            .unwrap_or(0);
        (line, col)
    }
}

fn cycle(index: usize, len: usize, forward: bool) -> usize {
    if forward {
        (index + 1) % len
    } else {
        (index + len - 1) % len
    }
}

/// Handle keyboard input while the editor modal is shown.
pub fn handle_editor_modal_input(app: &mut App, key_code: KeyCode, modifiers: KeyModifiers) {
    let Some(state) = app.editor_state.as_mut() else {
        return;
    };

    if key_code == KeyCode::Char('s') && modifiers.contains(KeyModifiers::CONTROL) {
        app.save_editor_prompt();
        return;
    }

    match key_code {
        KeyCode::Tab => {
            if modifiers.contains(KeyModifiers::SHIFT) {
                state.focus_prev();
            } else {
                state.focus_next();
            }
        }
        KeyCode::BackTab => state.focus_prev(),

        KeyCode::Esc => {
            debug!("editor_modal_hidden");
            app.hide_editor();
        }

        KeyCode::Enter => match state.focus {
            EditorModalField::SaveButton => {
                app.save_editor_prompt();
            }
            EditorModalField::CancelButton => app.close_editor(),
            EditorModalField::Text => state.insert_char('\n'),
            EditorModalField::Kind | EditorModalField::Language => state.focus_next(),
        },

        KeyCode::Left | KeyCode::Right | KeyCode::Up | KeyCode::Down => {
            let forward = matches!(key_code, KeyCode::Right | KeyCode::Down);
            match state.focus {
                EditorModalField::Kind => {
                    state.cycle_kind(forward);
                    app.load_editor_prompt();
                }
                EditorModalField::Language => {
                    state.cycle_language(forward);
                    app.load_editor_prompt();
                }
                EditorModalField::Text => match key_code {
                    KeyCode::Left => state.move_cursor_left(),
                    KeyCode::Right => state.move_cursor_right(),
                    _ => {}
                },
                EditorModalField::SaveButton | EditorModalField::CancelButton => {
                    if matches!(key_code, KeyCode::Left | KeyCode::Right) {
                        state.focus = if state.focus == EditorModalField::SaveButton {
                            EditorModalField::CancelButton
                        } else {
                            EditorModalField::SaveButton
                        };
                    }
                }
            }
        }

        KeyCode::Backspace if state.focus == EditorModalField::Text => state.delete_char_before(),
        KeyCode::Delete if state.focus == EditorModalField::Text => state.delete_char_at(),
        KeyCode::Char(c)
            if state.focus == EditorModalField::Text
                && !modifiers.contains(KeyModifiers::CONTROL) =>
        {
            state.insert_char(c)
        }

        _ => {}
    }
}
