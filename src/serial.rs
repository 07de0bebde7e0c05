use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;

use nback_experiment::{NoTrigger, TriggerConfig, TriggerPort};

/// Writes the start payload to a serial line, opening and closing the port
/// around the single write.
#[derive(Debug, Clone)]
pub struct SerialTrigger {
    port: PathBuf,
    baud: u32,
    payload: Vec<u8>,
}

impl SerialTrigger {
    pub fn new(port: PathBuf, baud: u32, payload: &str) -> Self {
        Self {
            port,
            baud,
            payload: payload.as_bytes().to_vec(),
        }
    }
}

impl TriggerPort for SerialTrigger {
    fn send_trigger(&mut self) -> io::Result<()> {
        let speed = baud_constant(self.baud).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {}", self.baud),
            )
        })?;
        let mut port = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&self.port)
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", self.port.display())))?;
        configure_raw(port.as_raw_fd(), speed)?;
        port.write_all(&self.payload)?;
        port.flush()?;
        if unsafe { libc::tcdrain(port.as_raw_fd()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    Some(match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        _ => return None,
    })
}

fn configure_raw(fd: RawFd, speed: libc::speed_t) -> io::Result<()> {
    let mut tty = std::mem::MaybeUninit::<libc::termios>::uninit();
    unsafe {
        if libc::tcgetattr(fd, tty.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut tty = tty.assume_init();
        libc::cfmakeraw(&mut tty);
        tty.c_cflag |= libc::CLOCAL | libc::CREAD;
        if libc::cfsetispeed(&mut tty, speed) != 0 || libc::cfsetospeed(&mut tty, speed) != 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tty) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Trigger chosen from the session configuration.
pub enum ScannerTrigger {
    Serial(SerialTrigger),
    Disabled(NoTrigger),
}

impl ScannerTrigger {
    pub fn from_config(config: &TriggerConfig) -> Self {
        match &config.port {
            Some(port) => {
                ScannerTrigger::Serial(SerialTrigger::new(port.clone(), config.baud, &config.payload))
            }
            None => ScannerTrigger::Disabled(NoTrigger),
        }
    }
}

impl TriggerPort for ScannerTrigger {
    fn send_trigger(&mut self) -> io::Result<()> {
        match self {
            ScannerTrigger::Serial(port) => port.send_trigger(),
            ScannerTrigger::Disabled(none) => none.send_trigger(),
        }
    }
}
