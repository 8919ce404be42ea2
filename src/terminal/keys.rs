//! Translation of key presses into the bytes a remote shell expects.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Encodes `key` for the remote PTY.
///
/// Keys without a terminal encoding fall back to their textual name, e.g.
/// `ctrl+space`.
pub fn key_to_bytes(key: &KeyEvent) -> Vec<u8> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    let bytes: Option<Vec<u8>> = match key.code {
        KeyCode::Enter => Some(vec![b'\r']),
        KeyCode::Backspace => Some(vec![0x7f]),
        KeyCode::Tab => Some(vec![b'\t']),
        KeyCode::BackTab => Some(b"\x1b[Z".to_vec()),
        KeyCode::Esc => Some(vec![0x1b]),
        KeyCode::Up => Some(b"\x1b[A".to_vec()),
        KeyCode::Down => Some(b"\x1b[B".to_vec()),
        KeyCode::Right => Some(b"\x1b[C".to_vec()),
        KeyCode::Left => Some(b"\x1b[D".to_vec()),
        KeyCode::Home => Some(b"\x1b[H".to_vec()),
        KeyCode::End => Some(b"\x1b[F".to_vec()),
        KeyCode::PageUp => Some(b"\x1b[5~".to_vec()),
        KeyCode::PageDown => Some(b"\x1b[6~".to_vec()),
        KeyCode::Insert => Some(b"\x1b[2~".to_vec()),
        KeyCode::Delete => Some(b"\x1b[3~".to_vec()),
        KeyCode::F(n) => function_key(n),
        KeyCode::Char(ch) if ctrl => control_byte(ch).map(|b| vec![b]),
        KeyCode::Char(ch) => {
            let mut tmp = [0u8; 4];
            Some(ch.encode_utf8(&mut tmp).as_bytes().to_vec())
        }
        _ => None,
    };

    match bytes {
        // ALT/META prefixes ESC
        Some(bytes) if alt && matches!(key.code, KeyCode::Char(_)) => {
            let mut out = Vec::with_capacity(bytes.len() + 1);
            out.push(0x1b);
            out.extend_from_slice(&bytes);
            out
        }
        Some(bytes) => bytes,
        None => key_name(key).into_bytes(),
    }
}

/// Ctrl+letter maps to 1..=26
fn control_byte(ch: char) -> Option<u8> {
    let lower = ch.to_ascii_lowercase();
    lower
        .is_ascii_lowercase()
        .then(|| lower as u8 - b'a' + 1)
}

fn function_key(n: u8) -> Option<Vec<u8>> {
    let seq: &[u8] = match n {
        1 => b"\x1bOP",
        2 => b"\x1bOQ",
        3 => b"\x1bOR",
        4 => b"\x1bOS",
        5 => b"\x1b[15~",
        6 => b"\x1b[17~",
        7 => b"\x1b[18~",
        8 => b"\x1b[19~",
        9 => b"\x1b[20~",
        10 => b"\x1b[21~",
        11 => b"\x1b[23~",
        12 => b"\x1b[24~",
        _ => return None,
    };
    Some(seq.to_vec())
}

/// Lowercase `modifier+key` name of a key press
pub fn key_name(key: &KeyEvent) -> String {
    let mut name = String::new();
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        name.push_str("ctrl+");
    }
    if key.modifiers.contains(KeyModifiers::ALT) {
        name.push_str("alt+");
    }
    if key.modifiers.contains(KeyModifiers::SHIFT) {
        name.push_str("shift+");
    }
    match key.code {
        KeyCode::Char(' ') => name.push_str("space"),
        KeyCode::Char(ch) => name.push(ch.to_ascii_lowercase()),
        KeyCode::F(n) => name.push_str(&format!("f{n}")),
        other => name.push_str(&format!("{other:?}").to_lowercase()),
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_named_keys() {
        let cases = vec![
            (KeyCode::Enter, vec![0x0d]),
            (KeyCode::Backspace, vec![0x7f]),
            (KeyCode::Tab, vec![0x09]),
            (KeyCode::Esc, vec![0x1b]),
            (KeyCode::Up, b"\x1b[A".to_vec()),
            (KeyCode::Down, b"\x1b[B".to_vec()),
            (KeyCode::Right, b"\x1b[C".to_vec()),
            (KeyCode::Left, b"\x1b[D".to_vec()),
            (KeyCode::Home, b"\x1b[H".to_vec()),
            (KeyCode::End, b"\x1b[F".to_vec()),
            (KeyCode::PageUp, b"\x1b[5~".to_vec()),
            (KeyCode::PageDown, b"\x1b[6~".to_vec()),
            (KeyCode::Delete, b"\x1b[3~".to_vec()),
            (KeyCode::F(1), b"\x1bOP".to_vec()),
            (KeyCode::F(12), b"\x1b[24~".to_vec()),
        ];
        for (code, expected) in cases {
            assert_eq!(key_to_bytes(&key(code)), expected, "{code:?}");
        }
    }

    #[test]
    fn alt_function_key_sends_the_plain_sequence() {
        let alt_f10 = KeyEvent::new(KeyCode::F(10), KeyModifiers::ALT);
        assert_eq!(key_to_bytes(&alt_f10), b"\x1b[21~".to_vec());
    }

    #[test]
    fn test_control_letters() {
        let cases = [
            ('c', 3),
            ('d', 4),
            ('z', 26),
            ('a', 1),
            ('e', 5),
            ('k', 11),
            ('u', 21),
            ('w', 23),
            ('C', 3),
        ];
        for (ch, expected) in cases {
            assert_eq!(key_to_bytes(&ctrl(ch)), vec![expected], "ctrl+{ch}");
        }
    }

    #[test]
    fn test_printable_and_alt() {
        assert_eq!(key_to_bytes(&key(KeyCode::Char('a'))), b"a");
        assert_eq!(
            key_to_bytes(&KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT)),
            b"A"
        );
        assert_eq!(key_to_bytes(&key(KeyCode::Char('é'))), "é".as_bytes());
        assert_eq!(
            key_to_bytes(&KeyEvent::new(KeyCode::Char('b'), KeyModifiers::ALT)),
            b"\x1bb"
        );
    }

    #[test]
    fn unmapped_keys_fall_back_to_their_name() {
        assert_eq!(key_to_bytes(&ctrl(' ')), b"ctrl+space");
        assert_eq!(key_to_bytes(&key(KeyCode::F(13))), b"f13");
        assert_eq!(key_to_bytes(&key(KeyCode::CapsLock)), b"capslock");
    }
}
