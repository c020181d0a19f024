use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use uuid::Uuid;

use crate::devices::{field_specs, DeviceKind};
use crate::filters::MAX_MOVING_AVERAGE_DEPTH;
use crate::modbus::protocol::{MAX_READ_REGISTERS, MAX_WRITE_REGISTERS};
use crate::scheduler::SchedulingMode;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Station identification
    pub station_uuid: String,
    pub station_name: String,
    pub station_version: String,

    // Field bus (Modbus RTU master)
    pub serial: SerialConfig,

    // Supervisory network (Modbus TCP slave)
    pub slave_server: SlaveServerConfig,

    // Control loop
    pub scheduler: SchedulerConfig,
    pub tasks: Vec<TaskConfig>,

    // Field devices, polled in this order
    pub devices: Vec<DeviceConfig>,

    pub rain_gauge: RainGaugeConfig,

    #[serde(default)]
    pub run_led: RunLedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveServerConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl SlaveServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ModbusError> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .map_err(|e| ModbusError::ConfigError(format!("Invalid slave server address: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub loop_duration_ms: u64,
    #[serde(default)]
    pub mode: SchedulingMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub period_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBlock {
    pub base: u16,
    pub count: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub kind: DeviceKind,
    pub slave_id: u8,
    pub task: String,
    pub enabled: bool,
    // Overrides the register block of the device kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<RegisterBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<RegisterBlock>,
    // Field name -> smoothing applied to that field
    #[serde(default)]
    pub filters: BTreeMap<String, FilterConfig>,
}

impl DeviceConfig {
    pub fn read_block(&self) -> RegisterBlock {
        self.read.unwrap_or_else(|| self.kind.default_read_block())
    }

    pub fn filter_for(&self, field: &str) -> FilterConfig {
        self.filters.get(field).cloned().unwrap_or(FilterConfig::None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterConfig {
    None,
    MovingAverage { depth: usize },
    Exponential { gain: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RainGaugeConfig {
    pub enabled: bool,
    pub input: RainInputConfig,
    // mm of rain for each tipping of the bucket
    pub rain_constant_mm: f32,
    pub filtering_ms: u64,
    pub end_of_event_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RainInputConfig {
    SysfsGpio {
        path: String,
        #[serde(default)]
        active_low: bool,
    },
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLedConfig {
    pub enabled: bool,
    pub output: RunLedOutputConfig,
    // Time between two toggles of the LED
    pub period_ms: u64,
}

impl Default for RunLedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output: RunLedOutputConfig::SysfsGpio {
                path: "/sys/class/gpio/gpio6/value".to_string(),
                active_low: false,
            },
            period_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunLedOutputConfig {
    SysfsGpio {
        path: String,
        #[serde(default)]
        active_low: bool,
    },
    Simulated,
}

impl Default for Config {
    fn default() -> Self {
        let mut bme280_filters = BTreeMap::new();
        bme280_filters.insert("temperature".to_string(), FilterConfig::MovingAverage { depth: 10 });
        bme280_filters.insert("pressure".to_string(), FilterConfig::MovingAverage { depth: 10 });
        bme280_filters.insert("humidity".to_string(), FilterConfig::MovingAverage { depth: 10 });

        let mut anemometer_filters = BTreeMap::new();
        anemometer_filters.insert("wind_speed".to_string(), FilterConfig::Exponential { gain: 0.25 });

        Self {
            station_uuid: Uuid::new_v4().to_string(),
            station_name: "Weather Station".to_string(),
            station_version: crate::VERSION.to_string(),

            serial: SerialConfig {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 9600,
                parity: ParityConfig::None,
                timeout_ms: 500,
            },

            slave_server: SlaveServerConfig {
                enabled: true,
                address: "0.0.0.0".to_string(),
                port: 502,
            },

            scheduler: SchedulerConfig {
                loop_duration_ms: 20,
                mode: SchedulingMode::ResetOnFire,
            },
            tasks: vec![
                TaskConfig { name: "fast".to_string(), period_ms: 1000 },
                TaskConfig { name: "medium".to_string(), period_ms: 2000 },
                TaskConfig { name: "slow".to_string(), period_ms: 5000 },
            ],

            devices: vec![
                DeviceConfig {
                    name: "Temperature/Humidity/Pressure".to_string(),
                    kind: DeviceKind::Bme280,
                    slave_id: 1,
                    task: "slow".to_string(),
                    enabled: true,
                    read: None,
                    write: None,
                    filters: bme280_filters,
                },
                DeviceConfig {
                    name: "Anemometer".to_string(),
                    kind: DeviceKind::Anemometer,
                    slave_id: 2,
                    task: "fast".to_string(),
                    enabled: true,
                    read: None,
                    write: None,
                    filters: anemometer_filters,
                },
                DeviceConfig {
                    name: "Wind Vane".to_string(),
                    kind: DeviceKind::WindVane,
                    slave_id: 3,
                    task: "medium".to_string(),
                    enabled: true,
                    read: None,
                    write: None,
                    filters: BTreeMap::new(),
                },
            ],

            rain_gauge: RainGaugeConfig {
                enabled: true,
                input: RainInputConfig::SysfsGpio {
                    path: "/sys/class/gpio/gpio5/value".to_string(),
                    active_low: false,
                },
                rain_constant_mm: 0.3,
                filtering_ms: 7_500,
                end_of_event_ms: 300_000,
            },

            run_led: RunLedConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Config = toml::from_str(&content)?;

        // Generate station UUID if not present
        if config.station_uuid.is_empty() {
            config.station_uuid = Uuid::new_v4().to_string();
        }

        if config.station_name.is_empty() {
            config.station_name = "Weather Station".to_string();
        }

        if config.station_version.is_empty() {
            config.station_version = crate::VERSION.to_string();
        }

        config.validate()?;
        info!("📄 Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        // Create directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Rejects configurations the control loop cannot run with.
    pub fn validate(&self) -> Result<(), ModbusError> {
        if self.scheduler.loop_duration_ms == 0 {
            return Err(config_error("scheduler.loop_duration_ms must be greater than 0"));
        }
        if self.serial.timeout_ms == 0 {
            return Err(config_error("serial.timeout_ms must be greater than 0"));
        }
        if self.slave_server.enabled {
            self.slave_server.socket_addr()?;
        }

        self.validate_tasks()?;
        self.validate_devices()?;
        self.validate_rain_gauge()?;

        if self.run_led.enabled && self.run_led.period_ms == 0 {
            return Err(config_error("run_led.period_ms must be greater than 0"));
        }
        Ok(())
    }

    fn validate_tasks(&self) -> Result<(), ModbusError> {
        if self.tasks.is_empty() {
            return Err(config_error("at least one task is required"));
        }

        let mut names = HashSet::new();
        for task in &self.tasks {
            if task.period_ms == 0 {
                return Err(config_error(&format!("task '{}' has a zero period", task.name)));
            }
            if !names.insert(task.name.as_str()) {
                return Err(config_error(&format!("duplicate task name '{}'", task.name)));
            }
        }
        Ok(())
    }

    fn validate_devices(&self) -> Result<(), ModbusError> {
        let mut names = HashSet::new();
        let mut slave_ids = HashSet::new();

        for device in &self.devices {
            if !names.insert(device.name.as_str()) {
                return Err(config_error(&format!("duplicate device name '{}'", device.name)));
            }
            if !self.tasks.iter().any(|t| t.name == device.task) {
                return Err(config_error(&format!(
                    "device '{}' refers to unknown task '{}'",
                    device.name, device.task
                )));
            }
            if !device.enabled {
                continue;
            }
            if device.slave_id == 0 || device.slave_id > 247 {
                return Err(config_error(&format!(
                    "device '{}' has slave id {} outside 1..=247",
                    device.name, device.slave_id
                )));
            }
            if !slave_ids.insert(device.slave_id) {
                return Err(config_error(&format!("slave id {} is used twice", device.slave_id)));
            }

            let read = device.read_block();
            let fields = field_specs(device.kind);
            if read.count == 0 || read.count > MAX_READ_REGISTERS {
                return Err(config_error(&format!("device '{}' read count {} is invalid", device.name, read.count)));
            }
            if (read.count as usize) < fields.len() {
                return Err(config_error(&format!(
                    "device '{}' reads {} registers but its kind decodes {}",
                    device.name,
                    read.count,
                    fields.len()
                )));
            }
            if let Some(write) = device.write {
                if write.count == 0 || write.count > MAX_WRITE_REGISTERS {
                    return Err(config_error(&format!(
                        "device '{}' write count {} is invalid",
                        device.name, write.count
                    )));
                }
            }

            for (field, filter) in &device.filters {
                if !fields.iter().any(|f| f.name == field.as_str()) {
                    return Err(config_error(&format!("device '{}' has no field '{}'", device.name, field)));
                }
                match filter {
                    FilterConfig::MovingAverage { depth } if *depth == 0 || *depth > MAX_MOVING_AVERAGE_DEPTH => {
                        return Err(config_error(&format!(
                            "moving average depth {} for '{}.{}' outside 1..={}",
                            depth, device.name, field, MAX_MOVING_AVERAGE_DEPTH
                        )));
                    }
                    FilterConfig::Exponential { gain } if !(0.0..=1.0).contains(gain) => {
                        warn!(
                            "⚠️  Exponential gain {} for '{}.{}' will be clamped to [0, 1]",
                            gain, device.name, field
                        );
                    }
                    _ => {}
                }
            }
        }

        if self.enabled_devices().is_empty() {
            warn!("⚠️  No field device is enabled, only the rain gauge will be published");
        }
        Ok(())
    }

    fn validate_rain_gauge(&self) -> Result<(), ModbusError> {
        let rain = &self.rain_gauge;
        if !rain.enabled {
            return Ok(());
        }
        if rain.rain_constant_mm <= 0.0 {
            return Err(config_error("rain_gauge.rain_constant_mm must be positive"));
        }
        if rain.filtering_ms >= rain.end_of_event_ms {
            return Err(config_error("rain_gauge.filtering_ms must be shorter than end_of_event_ms"));
        }
        Ok(())
    }

    // Get list of enabled devices, in polling order
    pub fn enabled_devices(&self) -> Vec<&DeviceConfig> {
        self.devices.iter().filter(|d| d.enabled).collect()
    }

    pub fn device_by_name(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.name == name)
    }
}

fn config_error(message: &str) -> ModbusError {
    ModbusError::ConfigError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.enabled_devices().len(), 3);
        assert_eq!(config.scheduler.loop_duration_ms, 20);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.toml");

        let mut config = Config::default();
        config.scheduler.mode = SchedulingMode::FixedOrigin;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.station_uuid, config.station_uuid);
        assert_eq!(loaded.scheduler.mode, SchedulingMode::FixedOrigin);
        assert_eq!(loaded.devices.len(), 3);
        assert_eq!(
            loaded.device_by_name("Anemometer").unwrap().filter_for("wind_speed"),
            FilterConfig::Exponential { gain: 0.25 }
        );
    }

    #[test]
    fn test_parses_hand_written_device() {
        let content = r#"
            station_uuid = ""
            station_name = ""
            station_version = ""

            [serial]
            port = "/dev/ttyAMA0"
            baud_rate = 19200
            parity = "Even"
            timeout_ms = 300

            [slave_server]
            enabled = false
            address = "127.0.0.1"
            port = 5020

            [scheduler]
            loop_duration_ms = 50

            [[tasks]]
            name = "only"
            period_ms = 1000

            [[devices]]
            name = "Vane"
            kind = "wind_vane"
            slave_id = 9
            task = "only"
            enabled = true
            write = { base = 10, count = 1 }

            [rain_gauge]
            enabled = true
            rain_constant_mm = 0.2
            filtering_ms = 5000
            end_of_event_ms = 600000
            input = { kind = "simulated" }
        "#;

        let config: Config = toml::from_str(content).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.mode, SchedulingMode::ResetOnFire);
        let vane = &config.devices[0];
        assert_eq!(vane.kind, DeviceKind::WindVane);
        assert_eq!(vane.read_block(), RegisterBlock { base: 0, count: 1 });
        assert_eq!(vane.write, Some(RegisterBlock { base: 10, count: 1 }));
        assert!(config.run_led.enabled);
        assert_eq!(config.run_led.period_ms, 100);
    }

    #[test]
    fn test_parses_simulated_run_led() {
        let mut config = Config::default();
        config.run_led = toml::from_str(
            r#"
            enabled = true
            period_ms = 250
            output = { kind = "simulated" }
            "#,
        )
        .unwrap();
        assert!(matches!(config.run_led.output, RunLedOutputConfig::Simulated));
        assert!(config.validate().is_ok());

        config.run_led.period_ms = 0;
        assert!(config.validate().is_err());
        config.run_led.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_task() {
        let mut config = Config::default();
        config.devices[0].task = "hourly".to_string();
        assert!(matches!(config.validate(), Err(ModbusError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_zero_depth_filter() {
        let mut config = Config::default();
        config.devices[0]
            .filters
            .insert("temperature".to_string(), FilterConfig::MovingAverage { depth: 0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_filter_on_unknown_field() {
        let mut config = Config::default();
        config.devices[2]
            .filters
            .insert("temperature".to_string(), FilterConfig::Exponential { gain: 0.5 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_slave_ids() {
        let mut config = Config::default();
        config.devices[1].slave_id = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_window_longer_than_event() {
        let mut config = Config::default();
        config.rain_gauge.filtering_ms = config.rain_gauge.end_of_event_ms;
        assert!(config.validate().is_err());
    }
}
