use log::{info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Single output line (run indicator LED).
pub trait DigitalOutput: Send {
    fn set_level(&mut self, level: bool) -> io::Result<()>;
}

/// GPIO line exported through the legacy sysfs interface, direction `out`.
pub struct SysfsGpioOutput {
    value_path: PathBuf,
    active_low: bool,
}

impl SysfsGpioOutput {
    pub fn new<P: AsRef<Path>>(value_path: P, active_low: bool) -> io::Result<Self> {
        let value_path = value_path.as_ref().to_path_buf();
        std::fs::metadata(&value_path)?;
        info!("💡 Run indicator on {} (active low: {})", value_path.display(), active_low);
        Ok(Self { value_path, active_low })
    }
}

impl DigitalOutput for SysfsGpioOutput {
    fn set_level(&mut self, level: bool) -> io::Result<()> {
        let raw = if level != self.active_low { "1" } else { "0" };
        std::fs::write(&self.value_path, raw)
    }
}

/// Output observed from code; clones share the same line.
#[derive(Clone, Default)]
pub struct SimulatedOutput {
    level: Arc<AtomicBool>,
    writes: Arc<AtomicU32>,
}

impl SimulatedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl DigitalOutput for SimulatedOutput {
    fn set_level(&mut self, level: bool) -> io::Result<()> {
        self.level.store(level, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Blinks an output at a fixed half period while the control loop is alive.
pub struct RunIndicator {
    output: Box<dyn DigitalOutput>,
    period_ms: u64,
    level: bool,
    last_toggle_ms: u64,
    failing: bool,
}

impl RunIndicator {
    /// The first toggle happens `period_ms` after `start_ms`.
    pub fn new(output: Box<dyn DigitalOutput>, period_ms: u64, start_ms: u64) -> Self {
        Self {
            output,
            period_ms,
            level: false,
            last_toggle_ms: start_ms,
            failing: false,
        }
    }

    /// Toggles the line once a period has passed since the last toggle.
    /// Returns whether it toggled.
    pub fn update(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.last_toggle_ms) < self.period_ms {
            return false;
        }
        self.last_toggle_ms = now;
        self.level = !self.level;
        self.write(self.level);
        true
    }

    pub fn switch_off(&mut self) {
        self.level = false;
        self.write(false);
    }

    pub fn level(&self) -> bool {
        self.level
    }

    pub fn is_failing(&self) -> bool {
        self.failing
    }

    fn write(&mut self, level: bool) {
        match self.output.set_level(level) {
            Ok(()) => {
                if self.failing {
                    info!("✅ Run indicator writable again");
                    self.failing = false;
                }
            }
            Err(e) => {
                if !self.failing {
                    warn!("❌ Failed to drive run indicator: {}", e);
                    self.failing = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenOutput;

    impl DigitalOutput for BrokenOutput {
        fn set_level(&mut self, _level: bool) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only line"))
        }
    }

    #[test]
    fn test_sysfs_output_writes_value_file() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let mut output = SysfsGpioOutput::new(file.path(), false).unwrap();
        output.set_level(true).unwrap();
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "1");

        let mut inverted = SysfsGpioOutput::new(file.path(), true).unwrap();
        inverted.set_level(true).unwrap();
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "0");
    }

    #[test]
    fn test_sysfs_output_requires_existing_line() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SysfsGpioOutput::new(dir.path().join("gpio6/value"), false).is_err());
    }

    #[test]
    fn test_indicator_toggles_every_period() {
        let led = SimulatedOutput::new();
        let mut indicator = RunIndicator::new(Box::new(led.clone()), 100, 0);

        assert!(!indicator.update(99));
        assert!(indicator.update(100));
        assert!(led.level());
        assert!(!indicator.update(150));
        assert!(indicator.update(220));
        assert!(!led.level());
        assert_eq!(led.writes(), 2);

        indicator.update(320);
        indicator.switch_off();
        assert!(!led.level());
        assert!(!indicator.level());
    }

    #[test]
    fn test_indicator_keeps_blinking_state_when_output_fails() {
        let mut indicator = RunIndicator::new(Box::new(BrokenOutput), 100, 0);
        assert!(indicator.update(100));
        assert!(indicator.is_failing());
        assert!(indicator.level());
        assert!(indicator.update(200));
        assert!(!indicator.level());
    }
}
