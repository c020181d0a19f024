//! Weather station acquisition and bridging core.
//!
//! Polls the field devices of a weather station over Modbus RTU, smooths
//! their readings, counts rain gauge tips and republishes everything as a
//! register table on a Modbus TCP slave.

pub mod cli;
pub mod config;
pub mod devices;
pub mod filters;
pub mod hal;
pub mod modbus;
pub mod output;
pub mod polling;
pub mod rain;
pub mod scheduler;
pub mod services;
pub mod slave;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use devices::{DeviceKind, PollableDevice};
pub use modbus::{ConnectionStatus, ModbusClient, ModbusClientTrait};
pub use output::{ConsoleFormatter, CsvFormatter, DataFormatter, JsonFormatter};
pub use polling::{PollOutcome, PollingEngine};
pub use rain::RainGauge;
pub use scheduler::Scheduler;
pub use services::StationService;
pub use slave::RegisterMap;
pub use utils::error::ModbusError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
