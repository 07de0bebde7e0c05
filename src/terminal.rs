use std::io::{self, Write};
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use nback_core::{ButtonPress, Screen};
use nback_experiment::{CancelFlag, Presenter, ResponseDevice, ResponseKeys};

const ESC: u8 = 0x1b;

/// Draws each screen as plain text, clearing the terminal first.
pub struct TerminalPresenter<W: Write> {
    out: W,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn present(&mut self, screen: &Screen, _duration: Duration) -> io::Result<()> {
        write!(self.out, "\x1b[2J\x1b[H")?;
        match screen {
            Screen::Instructions { page, total, text } => {
                write!(self.out, "Instructions ({page}/{total})\r\n\r\n")?;
                for line in text.lines() {
                    write!(self.out, "{line}\r\n")?;
                }
            }
            Screen::Countdown { seconds_left } => {
                write!(self.out, "\r\n\r\n    The task will start in {seconds_left} seconds")?
            }
            Screen::Cue(condition) => write!(self.out, "\r\n\r\n    {}", condition.cue())?,
            Screen::Letter(letter) => write!(self.out, "\r\n\r\n\r\n            {letter}")?,
            Screen::Fixation => write!(self.out, "\r\n\r\n\r\n            +")?,
            Screen::Rest => write!(self.out, "\r\n\r\n    This is a rest period. Relax!")?,
            Screen::Goodbye => write!(self.out, "\r\n\r\n    Thank you!\r\n")?,
        }
        self.out.flush()
    }
}

/// How long a lone ESC waits for the rest of an escape sequence.
const ESC_GRACE: Duration = Duration::from_millis(30);
const CTRL_C: u8 = 0x03;

/// One decoded key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Byte(u8),
    Abort,
    /// Escape sequences from arrows, function keys and Alt chords.
    Ignored,
}

/// Decodes a key starting with `first`, pulling follow-up bytes from `next`.
/// A bare ESC, `q` and Ctrl-C abort.
fn decode_key<F>(first: u8, mut next: F) -> io::Result<Key>
where
    F: FnMut(Duration) -> io::Result<Option<u8>>,
{
    if first != ESC {
        let abort = first == CTRL_C || ResponseKeys::ABORT_KEYS.contains(&char::from(first));
        return Ok(if abort { Key::Abort } else { Key::Byte(first) });
    }
    match next(ESC_GRACE)? {
        None => Ok(Key::Abort),
        Some(b'[') => {
            // CSI: parameter and intermediate bytes up to a final byte
            while let Some(byte) = next(ESC_GRACE)? {
                if (0x40..=0x7e).contains(&byte) {
                    break;
                }
            }
            Ok(Key::Ignored)
        }
        Some(b'O') => {
            next(ESC_GRACE)?;
            Ok(Key::Ignored)
        }
        Some(_) => Ok(Key::Ignored),
    }
}

/// Keyboard on stdin in non-canonical mode with signals off. Esc, `q` and
/// Ctrl-C request an abort so the session can still save its log.
pub struct KeyboardDevice {
    fd: RawFd,
    original: libc::termios,
    cancel: CancelFlag,
}

impl KeyboardDevice {
    pub fn open(cancel: CancelFlag) -> io::Result<Self> {
        let fd = libc::STDIN_FILENO;
        let mut original = std::mem::MaybeUninit::<libc::termios>::uninit();
        let original = unsafe {
            if libc::tcgetattr(fd, original.as_mut_ptr()) != 0 {
                return Err(io::Error::last_os_error());
            }
            original.assume_init()
        };

        let mut raw = original;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG);
        raw.c_cc[libc::VMIN] = 0;
        raw.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            fd,
            original,
            cancel,
        })
    }

    /// Waits up to `timeout` (forever if `None`) for one byte.
    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>> {
        let timeout_ms = match timeout {
            Some(t) => t.as_micros().div_ceil(1000).min(i32::MAX as u128) as libc::c_int,
            None => -1,
        };
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            return if err.kind() == io::ErrorKind::Interrupted {
                Ok(None)
            } else {
                Err(err)
            };
        }
        if ready == 0 {
            return Ok(None);
        }
        let mut byte = 0u8;
        let n = unsafe { libc::read(self.fd, (&mut byte as *mut u8).cast(), 1) };
        match n {
            1 => Ok(Some(byte)),
            0 => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed")),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Waits up to `timeout` for one key; abort keys set the cancel flag.
    fn read_key(&mut self, timeout: Option<Duration>) -> io::Result<Option<Key>> {
        let Some(first) = self.read_byte(timeout)? else {
            return Ok(None);
        };
        let key = decode_key(first, |grace| self.read_byte(Some(grace)))?;
        if key == Key::Abort {
            self.cancel.cancel();
        }
        Ok(Some(key))
    }

    /// Drops keys pressed outside a response window, keeping abort requests.
    fn drain_pending(&mut self) -> io::Result<()> {
        while self.read_key(Some(Duration::ZERO))?.is_some() {}
        Ok(())
    }
}

impl ResponseDevice for KeyboardDevice {
    fn wait_for_response(
        &mut self,
        valid: &[char],
        window: Duration,
    ) -> io::Result<Option<ButtonPress>> {
        self.drain_pending()?;
        let start = Instant::now();
        while !self.cancel.is_cancelled() {
            let Some(remaining) = window.checked_sub(start.elapsed()) else {
                break;
            };
            if remaining.is_zero() {
                break;
            }
            let Some(key) = self.read_key(Some(remaining))? else {
                continue;
            };
            let latency = start.elapsed();
            let Key::Byte(byte) = key else {
                continue;
            };
            let code = char::from(byte);
            if valid.contains(&code) && latency < window {
                return Ok(Some(ButtonPress { code, latency }));
            }
        }
        Ok(None)
    }

    fn wait_for_key(&mut self) -> io::Result<()> {
        self.drain_pending()?;
        while !self.cancel.is_cancelled() {
            if self.read_key(None)?.is_some() {
                break;
            }
        }
        Ok(())
    }
}

impl Drop for KeyboardDevice {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSANOW, &self.original);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nback_core::Condition;

    fn render(screen: Screen) -> String {
        let mut presenter = TerminalPresenter::new(Vec::new());
        presenter.present(&screen, Duration::ZERO).unwrap();
        String::from_utf8(presenter.out).unwrap()
    }

    #[test]
    fn screens_start_by_clearing() {
        assert!(render(Screen::Fixation).starts_with("\x1b[2J\x1b[H"));
    }

    #[test]
    fn renders_screen_text() {
        assert!(render(Screen::Letter('T')).ends_with("T"));
        assert!(render(Screen::Cue(Condition::TwoBack)).contains("Get ready for 2-back."));
        assert!(render(Screen::Countdown { seconds_left: 4 }).contains("start in 4 seconds"));
        let page = render(Screen::Instructions {
            page: 2,
            total: 3,
            text: "one\ntwo",
        });
        assert!(page.contains("Instructions (2/3)"));
        assert!(page.contains("one\r\ntwo\r\n"));
    }

    fn decode(bytes: &[u8]) -> Key {
        let mut rest = bytes[1..].iter().copied();
        decode_key(bytes[0], |_| Ok(rest.next())).unwrap()
    }

    #[test]
    fn plain_keys_pass_through() {
        assert_eq!(decode(b"3"), Key::Byte(b'3'));
        assert_eq!(decode(b"x"), Key::Byte(b'x'));
    }

    #[test]
    fn bare_escape_q_and_ctrl_c_abort() {
        assert_eq!(decode(&[ESC]), Key::Abort);
        assert_eq!(decode(b"q"), Key::Abort);
        assert_eq!(decode(&[CTRL_C]), Key::Abort);
    }

    #[test]
    fn escape_sequences_are_ignored() {
        // arrow up, F5, F1 (SS3), Alt-x
        assert_eq!(decode(b"\x1b[A"), Key::Ignored);
        assert_eq!(decode(b"\x1b[15~"), Key::Ignored);
        assert_eq!(decode(b"\x1bOP"), Key::Ignored);
        assert_eq!(decode(b"\x1bx"), Key::Ignored);
    }

    #[test]
    fn escape_sequence_consumes_only_its_own_bytes() {
        let bytes = b"\x1b[1;5C3";
        let mut rest = bytes[1..].iter().copied();
        assert_eq!(decode_key(bytes[0], |_| Ok(rest.next())).unwrap(), Key::Ignored);
        assert_eq!(rest.next(), Some(b'3'));
    }
}
