//! Crossterm bridge: local terminal events to session traffic.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::{
    protocol::Dimensions,
    session::{AgentSession, SessionError},
};

/// Convert a key press to the bytes a terminal would send.
#[must_use]
pub fn key_to_bytes(key: &KeyEvent) -> Option<Vec<u8>> {
    let bytes = match key.code {
        KeyCode::Char(c) => {
            if key.modifiers.contains(KeyModifiers::CONTROL) && c.is_ascii_alphabetic() {
                // Ctrl+A through Ctrl+Z
                return Some(vec![(c.to_ascii_lowercase() as u8) - b'a' + 1]);
            }
            let mut buf = [0; 4];
            let encoded = c.encode_utf8(&mut buf).as_bytes().to_vec();
            if key.modifiers.contains(KeyModifiers::ALT) {
                let mut prefixed = vec![0x1b];
                prefixed.extend(encoded);
                prefixed
            } else {
                encoded
            }
        }
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::F(n) => match n {
            1 => b"\x1bOP".to_vec(),
            2 => b"\x1bOQ".to_vec(),
            3 => b"\x1bOR".to_vec(),
            4 => b"\x1bOS".to_vec(),
            5 => b"\x1b[15~".to_vec(),
            6 => b"\x1b[17~".to_vec(),
            7 => b"\x1b[18~".to_vec(),
            8 => b"\x1b[19~".to_vec(),
            9 => b"\x1b[20~".to_vec(),
            10 => b"\x1b[21~".to_vec(),
            11 => b"\x1b[23~".to_vec(),
            12 => b"\x1b[24~".to_vec(),
            _ => return None,
        },
        _ => return None,
    };
    Some(bytes)
}

/// Forward a crossterm event to `session`.
///
/// Key presses become raw input and resizes become resize control frames.
/// Returns `true` if the event was forwarded.
///
/// # Errors
/// Returns [`SessionError::Closed`] once the session is closed.
pub fn forward_event(session: &AgentSession, event: &Event) -> Result<bool, SessionError> {
    match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => match key_to_bytes(key) {
            Some(bytes) => {
                session.send_input(&bytes)?;
                Ok(true)
            }
            None => Ok(false),
        },
        Event::Paste(text) => {
            session.send_input(text.as_bytes())?;
            Ok(true)
        }
        Event::Resize(cols, rows) => {
            session.resize(Dimensions::new(*cols, *rows))?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Size of the local terminal.
///
/// # Errors
/// Returns an error if the terminal size cannot be queried.
pub fn local_dimensions() -> std::io::Result<Dimensions> {
    let (cols, rows) = crossterm::terminal::size()?;
    Ok(Dimensions::new(cols, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_control_keys() {
        assert_eq!(
            key_to_bytes(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(vec![3])
        );
        assert_eq!(
            key_to_bytes(&key(KeyCode::Char('D'), KeyModifiers::CONTROL | KeyModifiers::SHIFT)),
            Some(vec![4])
        );
    }

    #[test]
    fn test_plain_and_special_keys() {
        assert_eq!(
            key_to_bytes(&key(KeyCode::Char('é'), KeyModifiers::NONE)),
            Some("é".as_bytes().to_vec())
        );
        assert_eq!(
            key_to_bytes(&key(KeyCode::Char('x'), KeyModifiers::ALT)),
            Some(b"\x1bx".to_vec())
        );
        assert_eq!(
            key_to_bytes(&key(KeyCode::Up, KeyModifiers::NONE)),
            Some(b"\x1b[A".to_vec())
        );
        assert_eq!(key_to_bytes(&key(KeyCode::F(13), KeyModifiers::NONE)), None);
        assert_eq!(key_to_bytes(&key(KeyCode::CapsLock, KeyModifiers::NONE)), None);
    }
}
