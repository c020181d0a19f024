use log::info;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One level read per loop iteration (rain gauge reed switch).
pub trait DigitalInput: Send {
    fn read_level(&mut self) -> io::Result<bool>;
}

/// GPIO line exported through the legacy sysfs interface.
pub struct SysfsGpioInput {
    value_path: PathBuf,
    active_low: bool,
}

impl SysfsGpioInput {
    pub fn new<P: AsRef<Path>>(value_path: P, active_low: bool) -> io::Result<Self> {
        let value_path = value_path.as_ref().to_path_buf();
        // Fail at startup rather than on the first loop iteration
        std::fs::metadata(&value_path)?;
        info!("🌧️  Rain gauge input on {} (active low: {})", value_path.display(), active_low);
        Ok(Self { value_path, active_low })
    }
}

impl DigitalInput for SysfsGpioInput {
    fn read_level(&mut self) -> io::Result<bool> {
        let raw = std::fs::read_to_string(&self.value_path)?;
        let level = match raw.trim() {
            "0" => false,
            "1" => true,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unexpected GPIO value '{}'", other),
                ))
            }
        };
        Ok(level != self.active_low)
    }
}

/// Level driven from code; clones share the same line.
#[derive(Clone, Default)]
pub struct SimulatedInput {
    level: Arc<AtomicBool>,
}

impl SimulatedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, level: bool) {
        self.level.store(level, Ordering::SeqCst);
    }
}

impl DigitalInput for SimulatedInput {
    fn read_level(&mut self) -> io::Result<bool> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sysfs_input_reads_value_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1").unwrap();

        let mut input = SysfsGpioInput::new(file.path(), false).unwrap();
        assert!(input.read_level().unwrap());

        let mut inverted = SysfsGpioInput::new(file.path(), true).unwrap();
        assert!(!inverted.read_level().unwrap());
    }

    #[test]
    fn test_sysfs_input_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "high").unwrap();

        let mut input = SysfsGpioInput::new(file.path(), false).unwrap();
        assert!(input.read_level().is_err());
    }

    #[test]
    fn test_simulated_input_is_shared() {
        let line = SimulatedInput::new();
        let mut reader = line.clone();
        assert!(!reader.read_level().unwrap());
        line.set(true);
        assert!(reader.read_level().unwrap());
    }
}
