use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::settings::{Config, RainInputConfig, RunLedOutputConfig};
use crate::devices::{create_device, field_specs, FieldSpec, PollableDevice};
use crate::filters::{ChannelFilter, SignalFilter};
use crate::hal::{
    Clock, DigitalInput, DigitalOutput, RunIndicator, SimulatedInput, SimulatedOutput, SysfsGpioInput, SysfsGpioOutput,
};
use crate::modbus::client::ModbusClientTrait;
use crate::modbus::status::ConnectionStatus;
use crate::polling::{PollOutcome, PollingEngine};
use crate::rain::RainGauge;
use crate::scheduler::Scheduler;
use crate::slave::register_map::{rain_words, RecordId, RegisterMap, RAIN_FIELDS};
use crate::utils::error::ModbusError;

const STATISTICS_INTERVAL_MS: u64 = 60_000;

/// Owns the control loop: rain sampling, task dispatch, polling, filtering
/// and publishing, all on one task.
pub struct StationService {
    config: Config,
    client: Arc<dyn ModbusClientTrait>,
    clock: Arc<dyn Clock>,

    scheduler: Scheduler,
    engine: PollingEngine,
    // One filter per field, indexed like the engine's devices
    filters: Vec<Vec<ChannelFilter>>,
    registers: RegisterMap,

    rain_gauge: Option<RainGauge>,
    rain_input: Option<Box<dyn DigitalInput>>,
    rain_input_failing: bool,
    rain_record: RecordId,

    run_led: Option<RunIndicator>,

    cycles: u64,
    overruns: u64,
    last_statistics_ms: u64,
}

impl StationService {
    pub fn new(
        config: Config,
        client: Arc<dyn ModbusClientTrait>,
        clock: Arc<dyn Clock>,
        rain_input: Option<Box<dyn DigitalInput>>,
    ) -> Result<Self, ModbusError> {
        info!("🚀 Initializing Station Service");
        info!("🌦️  Station: {} [{}]", config.station_name, config.station_uuid);
        info!("📦 Version: {}", config.station_version);

        let start_ms = clock.now_ms();
        let scheduler = Scheduler::new(
            config.tasks.iter().map(|t| (t.name.clone(), t.period_ms)),
            config.scheduler.mode,
            start_ms,
        );
        for task in scheduler.tasks() {
            info!("⏱️  Task {} '{}' every {} ms", task.id(), task.name(), task.period_ms());
        }

        let mut devices: Vec<(Box<dyn PollableDevice>, _)> = Vec::new();
        let mut filters: Vec<Vec<ChannelFilter>> = Vec::new();
        for device_config in &config.devices {
            if !device_config.enabled {
                info!("⏸️  Device '{}' at slave {} is disabled", device_config.name, device_config.slave_id);
                continue;
            }

            let task = scheduler.task_id(&device_config.task).ok_or_else(|| {
                ModbusError::ConfigError(format!(
                    "device '{}' refers to unknown task '{}'",
                    device_config.name, device_config.task
                ))
            })?;

            let device = create_device(device_config);
            filters.push(
                device
                    .fields()
                    .iter()
                    .map(|field| ChannelFilter::from_config(&device_config.filter_for(field.name)))
                    .collect(),
            );

            info!(
                "📋 Registered {} '{}' at slave {} on task {}",
                device.kind(),
                device.name(),
                device.slave_id(),
                task
            );
            devices.push((device, task));
        }

        let registers = register_map_for(&config);
        let rain_record = registers.layout().len() - 1;

        let (rain_gauge, rain_input) = if config.rain_gauge.enabled {
            (Some(RainGauge::from_config(&config.rain_gauge)), rain_input)
        } else {
            info!("⏸️  Rain gauge is disabled");
            (None, None)
        };

        info!("✅ Station Service initialized: {} devices, {} registers", devices.len(), registers.len());
        Ok(Self {
            config,
            client,
            clock,
            scheduler,
            engine: PollingEngine::new(devices),
            filters,
            registers,
            rain_gauge,
            rain_input,
            rain_input_failing: false,
            rain_record,
            run_led: None,
            cycles: 0,
            overruns: 0,
            last_statistics_ms: start_ms,
        })
    }

    /// Blinks `output` from the control loop while it runs. Ignored when the
    /// run LED is disabled in the configuration.
    pub fn with_run_led(mut self, output: Box<dyn DigitalOutput>) -> Self {
        let led = &self.config.run_led;
        if led.enabled {
            info!("💡 Run LED toggles every {} ms", led.period_ms);
            self.run_led = Some(RunIndicator::new(output, led.period_ms, self.clock.now_ms()));
        }
        self
    }

    /// Handle to the published dataset, for the slave server and formatters.
    pub fn registers(&self) -> RegisterMap {
        self.registers.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One control loop iteration: sample the rain gauge, then poll one
    /// device for every task that is due.
    pub async fn run_cycle(&mut self) -> Result<Vec<PollOutcome>, ModbusError> {
        let now = self.clock.now_ms();
        self.cycles += 1;
        if let Some(led) = self.run_led.as_mut() {
            led.update(now);
        }
        self.sample_rain(now)?;

        let mut outcomes = Vec::new();
        for task in self.scheduler.tick(now) {
            if let Some(outcome) = self.engine.poll_task(self.client.as_ref(), task).await {
                self.apply_outcome(&outcome)?;
                outcomes.push(outcome);
            }
        }

        if now.saturating_sub(self.last_statistics_ms) >= STATISTICS_INTERVAL_MS {
            self.last_statistics_ms = now;
            self.log_statistics();
        }

        Ok(outcomes)
    }

    /// Polls every enabled device once, regardless of its task.
    pub async fn poll_all(&mut self) -> Result<Vec<PollOutcome>, ModbusError> {
        let now = self.clock.now_ms();
        self.sample_rain(now)?;

        let mut outcomes = Vec::new();
        for index in 0..self.engine.device_count() {
            if let Some(outcome) = self.engine.poll_device(self.client.as_ref(), index).await {
                self.apply_outcome(&outcome)?;
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    /// Runs the control loop until `shutdown` completes.
    ///
    /// Iterations are paced by a fixed tick; a slow iteration delays the
    /// following ones instead of bunching them up.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), ModbusError>
    where
        F: Future<Output = ()>,
    {
        let budget = Duration::from_millis(self.config.scheduler.loop_duration_ms);
        let mut ticker = interval(budget);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("🚀 Starting control loop ({} ms per iteration)", budget.as_millis());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            self.run_cycle().await?;

            let elapsed = started.elapsed();
            if elapsed > budget {
                self.overruns += 1;
                warn!(
                    "⚠️  Loop iteration took {} ms (budget {} ms), later tasks are delayed",
                    elapsed.as_millis(),
                    budget.as_millis()
                );
            }
        }

        if let Some(led) = self.run_led.as_mut() {
            led.switch_off();
        }
        self.log_statistics();
        Ok(())
    }

    fn sample_rain(&mut self, now: u64) -> Result<(), ModbusError> {
        let (Some(gauge), Some(input)) = (self.rain_gauge.as_mut(), self.rain_input.as_mut()) else {
            return Ok(());
        };

        match input.read_level() {
            Ok(level) => {
                if self.rain_input_failing {
                    info!("✅ Rain gauge input readable again");
                    self.rain_input_failing = false;
                }
                gauge.sample(level, now);
                self.registers
                    .publish_record(self.rain_record, ConnectionStatus::Success, &rain_words(&gauge.reading()))
            }
            Err(e) => {
                if !self.rain_input_failing {
                    warn!("❌ Failed to read rain gauge input: {}", e);
                    self.rain_input_failing = true;
                }
                self.registers
                    .publish_status(self.rain_record, ConnectionStatus::SlaveDeviceFailure)
            }
        }
    }

    /// Filters and publishes a successful poll; a failed one only updates the
    /// status word so the last good values stay in place.
    fn apply_outcome(&mut self, outcome: &PollOutcome) -> Result<(), ModbusError> {
        let record = outcome.device;
        let Some(samples) = &outcome.samples else {
            return self.registers.publish_status(record, outcome.status);
        };

        let device = self
            .engine
            .device(record)
            .ok_or_else(|| ModbusError::InvalidData(format!("no device #{}", record)))?;

        let words: Vec<u16> = device
            .fields()
            .iter()
            .zip(self.filters[record].iter_mut())
            .zip(samples)
            .map(|((field, filter), sample)| field.to_word(filter.update(*sample)))
            .collect();

        debug!("🗂️  {} -> {:?}", device.name(), words);
        self.registers.publish_record(record, outcome.status, &words)
    }

    pub fn log_statistics(&self) {
        info!("📈 Control loop: {} iterations, {} overruns", self.cycles, self.overruns);
        for index in 0..self.engine.device_count() {
            if let (Some(device), Some(stats)) = (self.engine.device(index), self.engine.statistics(index)) {
                info!(
                    "📈 {}: {} polls, {:.1}% ok, last status {}",
                    device.name(),
                    stats.polls,
                    stats.success_rate(),
                    stats.last_status
                );
            }
        }
        if let Some(gauge) = &self.rain_gauge {
            let reading = gauge.reading();
            info!(
                "📈 Rain gauge: {} tips ({} rejected), {:.1} mm total, {:?}",
                reading.tip_count,
                gauge.rejected_edges(),
                reading.total_mm,
                reading.state
            );
        }
    }
}

/// Register table of a configuration: enabled device records in polling
/// order, then the rain record.
pub fn register_map_for(config: &Config) -> RegisterMap {
    let mut records: Vec<(String, &'static [FieldSpec])> = config
        .enabled_devices()
        .into_iter()
        .map(|device| (device.name.clone(), field_specs(device.kind)))
        .collect();
    records.push(("Rain Gauge".to_string(), &RAIN_FIELDS[..]));
    RegisterMap::new(records)
}

/// Opens the rain gauge switch input described by the configuration.
pub fn open_rain_input(input: &RainInputConfig) -> Result<Box<dyn DigitalInput>, ModbusError> {
    match input {
        RainInputConfig::SysfsGpio { path, active_low } => {
            let gpio = SysfsGpioInput::new(path, *active_low)
                .map_err(|e| ModbusError::ConnectionError(format!("Failed to open rain gauge input {}: {}", path, e)))?;
            Ok(Box::new(gpio))
        }
        RainInputConfig::Simulated => {
            info!("🌧️  Rain gauge input: simulated");
            Ok(Box::new(SimulatedInput::new()))
        }
    }
}

/// Opens the run indicator output described by the configuration.
pub fn open_run_led(output: &RunLedOutputConfig) -> Result<Box<dyn DigitalOutput>, ModbusError> {
    match output {
        RunLedOutputConfig::SysfsGpio { path, active_low } => {
            let gpio = SysfsGpioOutput::new(path, *active_low)
                .map_err(|e| ModbusError::ConnectionError(format!("Failed to open run LED {}: {}", path, e)))?;
            Ok(Box::new(gpio))
        }
        RunLedOutputConfig::Simulated => Ok(Box::new(SimulatedOutput::new())),
    }
}
