// src/scanner/keyboard.rs  -  Terminal keyboard (keyboard-wedge scanner)
//
// All terminal events are read in the main loop (single crossterm reader);
// this module only converts them.  There is no KeySource here because the
// main loop feeds the listener directly.
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::KeyInput;

/// Convert a crossterm key press.  Releases and repeats yield `None`.
pub fn key_input_from_crossterm(ev: &KeyEvent) -> Option<KeyInput> {
    if ev.kind != KeyEventKind::Press {
        return None;
    }
    match ev.code {
        // Ctrl+<char> is a shortcut, not scanner data
        KeyCode::Char(_) if ev.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => None,
        KeyCode::Char(c)   => Some(KeyInput::char(c)),
        KeyCode::Enter     => Some(KeyInput::named("Enter")),
        KeyCode::Tab       => Some(KeyInput::named("Tab")),
        KeyCode::Backspace => Some(KeyInput::named("Backspace")),
        KeyCode::Esc       => Some(KeyInput::named("Escape")),
        KeyCode::Modifier(_) => Some(KeyInput::modifier("Shift")),
        _ => None,
    }
}
