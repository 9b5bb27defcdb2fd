//! Local terminal plumbing for interactive sessions

use std::io::Write;

use bytes::Bytes;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use zl_protocol::TerminalSize;
use zl_session::OutputSink;

/// Current size of the controlling terminal, or 24x80 when there is none
pub fn current_size() -> TerminalSize {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => TerminalSize::new(rows, cols),
        _ => TerminalSize::default(),
    }
}

/// Raw mode for the lifetime of the guard
pub struct RawModeGuard(());

impl RawModeGuard {
    pub fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            tracing::warn!("Failed to restore terminal mode: {}", e);
        }
    }
}

/// Writes session output straight to stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write(&self, data: &[u8]) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(data);
        let _ = stdout.flush();
    }
}

/// Ctrl+] ends the local session without touching the remote shell
pub fn is_detach_key(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(']')
}

/// Bytes a terminal would send for `key`; empty for keys with no encoding
pub fn key_to_bytes(key: &KeyEvent) -> Bytes {
    if key.kind == KeyEventKind::Release {
        return Bytes::new();
    }

    let mut out = Vec::with_capacity(4);
    if key.modifiers.contains(KeyModifiers::ALT) {
        out.push(0x1b);
    }

    match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            match c.to_ascii_lowercase() {
                c @ 'a'..='z' => out.push(c as u8 - b'a' + 1),
                ' ' | '@' => out.push(0x00),
                '[' => out.push(0x1b),
                '\\' => out.push(0x1c),
                '^' => out.push(0x1e),
                '_' => out.push(0x1f),
                _ => return Bytes::new(),
            }
        }
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        KeyCode::Enter => out.push(b'\r'),
        KeyCode::Tab => out.push(b'\t'),
        KeyCode::BackTab => out.extend_from_slice(b"\x1b[Z"),
        KeyCode::Backspace => out.push(0x7f),
        KeyCode::Esc => out.push(0x1b),
        KeyCode::Up => out.extend_from_slice(b"\x1b[A"),
        KeyCode::Down => out.extend_from_slice(b"\x1b[B"),
        KeyCode::Right => out.extend_from_slice(b"\x1b[C"),
        KeyCode::Left => out.extend_from_slice(b"\x1b[D"),
        KeyCode::Home => out.extend_from_slice(b"\x1b[H"),
        KeyCode::End => out.extend_from_slice(b"\x1b[F"),
        KeyCode::PageUp => out.extend_from_slice(b"\x1b[5~"),
        KeyCode::PageDown => out.extend_from_slice(b"\x1b[6~"),
        KeyCode::Delete => out.extend_from_slice(b"\x1b[3~"),
        KeyCode::Insert => out.extend_from_slice(b"\x1b[2~"),
        KeyCode::F(n) => {
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
                _ => return Bytes::new(),
            };
            out.extend_from_slice(seq);
        }
        _ => return Bytes::new(),
    }
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_ctrl_c_is_interrupt() {
        let bytes = key_to_bytes(&key(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(&bytes[..], b"\x03");
    }

    #[test]
    fn test_plain_and_unicode_chars() {
        assert_eq!(&key_to_bytes(&key(KeyCode::Char('x'), KeyModifiers::NONE))[..], b"x");
        assert_eq!(
            &key_to_bytes(&key(KeyCode::Char('é'), KeyModifiers::NONE))[..],
            "é".as_bytes()
        );
        assert_eq!(
            &key_to_bytes(&key(KeyCode::Char('b'), KeyModifiers::ALT))[..],
            b"\x1bb"
        );
    }

    #[test]
    fn test_navigation_keys() {
        assert_eq!(&key_to_bytes(&key(KeyCode::Up, KeyModifiers::NONE))[..], b"\x1b[A");
        assert_eq!(&key_to_bytes(&key(KeyCode::F(5), KeyModifiers::NONE))[..], b"\x1b[15~");
        assert!(key_to_bytes(&key(KeyCode::F(20), KeyModifiers::NONE)).is_empty());
    }

    #[test]
    fn test_detach_key() {
        assert!(is_detach_key(&key(KeyCode::Char(']'), KeyModifiers::CONTROL)));
        assert!(!is_detach_key(&key(KeyCode::Char(']'), KeyModifiers::NONE)));
    }
}
