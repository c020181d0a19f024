pub mod settings;

pub use settings::{
    Config,
    DeviceConfig,
    FilterConfig,
    ParityConfig,
    RainGaugeConfig,
    RainInputConfig,
    RegisterBlock,
    RunLedConfig,
    RunLedOutputConfig,
    SchedulerConfig,
    SerialConfig,
    SlaveServerConfig,
    TaskConfig,
};
