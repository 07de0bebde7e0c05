use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic session clock with nanosecond timestamps.
pub trait Timer: Clone + Send + Sync {
    /// Nanoseconds since the timer was created.
    fn now(&self) -> u64;
    fn sleep(&self, d: Duration);

    fn elapsed(&self, since: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(since))
    }

    /// Sleeps until `deadline` (a value of [`Timer::now`]); returns at once if
    /// the deadline has already passed.
    fn sleep_until(&self, deadline: u64) {
        let now = self.now();
        if deadline > now {
            self.sleep(Duration::from_nanos(deadline - now));
        }
    }
}

/// Sleep accuracy measured on the running machine.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStats {
    pub requested_ns: f64,
    pub average_sleep_ns: f64,
    pub jitter_ns: f64,
    pub min_sleep_ns: f64,
    pub max_sleep_ns: f64,
    pub samples: usize,
}

impl CalibrationStats {
    pub fn from_samples(requested: Duration, samples: &[Duration]) -> Self {
        let requested_ns = requested.as_nanos() as f64;
        if samples.is_empty() {
            return CalibrationStats {
                requested_ns,
                average_sleep_ns: 0.0,
                jitter_ns: 0.0,
                min_sleep_ns: 0.0,
                max_sleep_ns: 0.0,
                samples: 0,
            };
        }
        let times: Vec<f64> = samples.iter().map(|d| d.as_nanos() as f64).collect();
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        CalibrationStats {
            requested_ns,
            average_sleep_ns: avg,
            jitter_ns: var.sqrt(),
            min_sleep_ns: min,
            max_sleep_ns: max,
            samples: times.len(),
        }
    }

    /// Mean time slept past the requested duration.
    pub fn mean_overshoot_ns(&self) -> f64 {
        (self.average_sleep_ns - self.requested_ns).max(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    start: Instant,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Sleeps `samples` times for `interval` and reports how long each sleep
    /// actually took.
    pub fn calibrate(&self, samples: usize, interval: Duration) -> CalibrationStats {
        let measured: Vec<Duration> = (0..samples)
            .map(|_| {
                let before = self.now();
                self.sleep(interval);
                self.elapsed(before)
            })
            .collect();
        CalibrationStats::from_samples(interval, &measured)
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(target_os = "macos")]
        self.macos_sleep(duration);
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // resume with the remainder when a signal interrupts the sleep
        loop {
            let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
            if rc != EINTR {
                break;
            }
            req = rem;
        }
    }

    #[cfg(target_os = "macos")]
    fn macos_sleep(&self, duration: Duration) {
        use mach2::mach_time::{mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t};

        if duration.as_nanos() < 100_000 {
            unsafe {
                let start = mach_absolute_time();
                let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
                mach_timebase_info(&mut timebase);

                let target_ticks =
                    duration.as_nanos() as u64 * timebase.denom as u64 / timebase.numer as u64;

                while mach_absolute_time() - start < target_ticks {
                    std::hint::spin_loop();
                }
            }
        } else {
            std::thread::sleep(duration);
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Virtual clock that only moves when slept on or advanced.
///
/// Clones share the same clock, so a fake device can advance time that the
/// code under test observes.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now_ns: Arc<AtomicU64>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Timer for ManualTimer {
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}
