//! Capabilities a session needs from the outside world.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nback_core::{ButtonPress, Screen};
use tracing::warn;

/// Puts a screen up and returns without waiting; `duration` is how long the
/// session intends to leave it there.
pub trait Presenter {
    fn present(&mut self, screen: &Screen, duration: Duration) -> io::Result<()>;
}

pub trait ResponseDevice {
    /// Blocks until one of `valid` is pressed or `window` elapses. Other keys
    /// are ignored.
    fn wait_for_response(
        &mut self,
        valid: &[char],
        window: Duration,
    ) -> io::Result<Option<ButtonPress>>;

    /// Blocks until any key is pressed (instruction pages).
    fn wait_for_key(&mut self) -> io::Result<()>;
}

/// Fire-and-forget start signal for the recording equipment.
pub trait TriggerPort {
    fn send_trigger(&mut self) -> io::Result<()>;
}

/// Used when no scanner is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrigger;

impl TriggerPort for NoTrigger {
    fn send_trigger(&mut self) -> io::Result<()> {
        warn!("no trigger port configured, session is not synchronized to a scanner");
        Ok(())
    }
}

/// Operator abort request, shared between the runner and the input device.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
