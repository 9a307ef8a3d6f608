// src/scanner/hid_usage.rs  -  USB HID boot-keyboard reports → KeyInput
//
// Boot protocol keyboard report (8 bytes):
//   byte 0     modifier bitmask (0x02 = LShift, 0x20 = RShift, ...)
//   byte 1     reserved
//   bytes 2-7  up to six usage IDs of keys currently held
//
// A scanner sends a "press" report followed by an all-zero "release" report
// per character, so a key counts as pressed when it shows up in a report
// and was absent from the previous one.
use super::KeyInput;

const SHIFT_MASK: u8 = 0x02 | 0x20;
const ROLLOVER:   u8 = 0x01;

/// Translate one usage ID under the given modifier byte.
pub fn usage_to_key(modifiers: u8, usage: u8) -> Option<KeyInput> {
    let shift = modifiers & SHIFT_MASK != 0;
    let named = match usage {
        0x28 | 0x58 => Some("Enter"),
        0x29        => Some("Escape"),
        0x2A        => Some("Backspace"),
        0x2B        => Some("Tab"),
        _           => None,
    };
    if let Some(n) = named {
        return Some(KeyInput::named(n));
    }

    let c = match usage {
        0x04..=0x1D => {
            let base = (b'a' + (usage - 0x04)) as char;
            if shift { base.to_ascii_uppercase() } else { base }
        }
        0x1E..=0x27 => {
            let idx = (usage - 0x1E) as usize;
            let (plain, shifted) = (b"1234567890", b"!@#$%^&*()");
            if shift { shifted[idx] as char } else { plain[idx] as char }
        }
        0x2C => ' ',
        0x2D => if shift { '_' } else { '-' },
        0x2E => if shift { '+' } else { '=' },
        0x2F => if shift { '{' } else { '[' },
        0x30 => if shift { '}' } else { ']' },
        0x31 => if shift { '|' } else { '\\' },
        0x33 => if shift { ':' } else { ';' },
        0x34 => if shift { '"' } else { '\'' },
        0x35 => if shift { '~' } else { '`' },
        0x36 => if shift { '<' } else { ',' },
        0x37 => if shift { '>' } else { '.' },
        0x38 => if shift { '?' } else { '/' },
        // keypad digits
        0x59..=0x61 => (b'1' + (usage - 0x59)) as char,
        0x62        => '0',
        _ => return None,
    };
    Some(KeyInput::char(c))
}

/// Remembers the previous report to turn held-key snapshots into key presses.
#[derive(Debug, Default)]
pub struct ReportTracker {
    held: Vec<u8>,
}

impl ReportTracker {
    pub fn new() -> Self { Self::default() }

    pub fn feed(&mut self, report: &[u8]) -> Vec<KeyInput> {
        if report.len() < 3 {
            return Vec::new();
        }
        let modifiers = report[0];
        let now_held: Vec<u8> = report[2..report.len().min(8)]
            .iter()
            .copied()
            .filter(|&u| u != 0)
            .collect();

        // Phantom state: keep the old snapshot, emit nothing.
        if now_held.iter().any(|&u| u == ROLLOVER) {
            log::debug!("[hid-usage] rollover report ignored");
            return Vec::new();
        }

        let pressed = now_held.iter()
            .filter(|u| !self.held.contains(u))
            .filter_map(|&u| {
                let key = usage_to_key(modifiers, u);
                if key.is_none() {
                    log::debug!("[hid-usage] unmapped usage 0x{u:02X}");
                }
                key
            })
            .collect();
        self.held = now_held;
        pressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(modifiers: u8, keys: &[u8]) -> [u8; 8] {
        let mut r = [0u8; 8];
        r[0] = modifiers;
        r[2..2 + keys.len()].copy_from_slice(keys);
        r
    }

    #[test]
    fn letters_digits_and_shift() {
        assert_eq!(usage_to_key(0, 0x04), Some(KeyInput::char('a')));
        assert_eq!(usage_to_key(0x02, 0x1D), Some(KeyInput::char('Z')));
        assert_eq!(usage_to_key(0x20, 0x05), Some(KeyInput::char('B')));
        assert_eq!(usage_to_key(0, 0x27), Some(KeyInput::char('0')));
        assert_eq!(usage_to_key(0x02, 0x1F), Some(KeyInput::char('@')));
        assert_eq!(usage_to_key(0x02, 0x2D), Some(KeyInput::char('_')));
        assert_eq!(usage_to_key(0, 0x28), Some(KeyInput::named("Enter")));
        assert_eq!(usage_to_key(0, 0x62), Some(KeyInput::char('0')));
        assert_eq!(usage_to_key(0, 0xE0), None);
    }

    #[test]
    fn press_release_sequence_yields_each_key_once() {
        let mut t = ReportTracker::new();
        let mut keys = Vec::new();
        // "A1" + Enter, each key followed by a release report
        for r in [
            report(0x02, &[0x04]), report(0, &[]),
            report(0, &[0x1E]),    report(0, &[]),
            report(0, &[0x28]),    report(0, &[]),
        ] {
            keys.extend(t.feed(&r));
        }
        assert_eq!(keys, vec![KeyInput::char('A'), KeyInput::char('1'), KeyInput::named("Enter")]);
    }

    #[test]
    fn held_key_is_not_repeated() {
        let mut t = ReportTracker::new();
        assert_eq!(t.feed(&report(0, &[0x06])).len(), 1);
        assert!(t.feed(&report(0, &[0x06])).is_empty());
        // second key pressed while first still held
        assert_eq!(t.feed(&report(0, &[0x06, 0x07])), vec![KeyInput::char('d')]);
    }

    #[test]
    fn rollover_and_short_reports_are_ignored() {
        let mut t = ReportTracker::new();
        assert!(t.feed(&report(0, &[0x01, 0x01])).is_empty());
        assert!(t.feed(&[0x00]).is_empty());
        assert_eq!(t.feed(&report(0, &[0x04])), vec![KeyInput::char('a')]);
    }
}
