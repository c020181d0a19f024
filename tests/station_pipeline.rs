use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_modbus::prelude::{Request, Response};
use tokio_modbus::server::Service;

use meteo_bridge::config::{Config, FilterConfig, RainInputConfig};
use meteo_bridge::hal::{ManualClock, SimulatedInput};
use meteo_bridge::slave::SlaveService;
use meteo_bridge::{ConnectionStatus, ModbusClientTrait, ModbusError, StationService};

/// Field bus stand-in: reads are answered from a script, in order.
#[derive(Default)]
struct ScriptedBus {
    reads: Mutex<VecDeque<Result<Vec<u16>, ModbusError>>>,
}

impl ScriptedBus {
    fn answer(&self, result: Result<Vec<u16>, ModbusError>) {
        self.reads.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl ModbusClientTrait for ScriptedBus {
    async fn read_holding_registers(&self, _slave_id: u8, _start_addr: u16, _count: u16) -> Result<Vec<u16>, ModbusError> {
        self.reads.lock().unwrap().pop_front().unwrap_or(Err(ModbusError::Timeout))
    }

    async fn write_multiple_registers(&self, _slave_id: u8, _start_addr: u16, _values: &[u16]) -> Result<(), ModbusError> {
        Ok(())
    }
}

fn bme280_record(temperature: u16) -> Vec<u16> {
    vec![temperature, 10132, 4500, 1480, 930, 2100, 850, 0]
}

/// Only the BME280 board, polled every second with a 3 deep moving average
/// on the temperature.
fn bme280_station(bus: Arc<ScriptedBus>, clock: &ManualClock) -> StationService {
    let mut config = Config::default();
    config.devices.truncate(1);
    config.devices[0].task = "fast".to_string();
    config.devices[0].filters.clear();
    config.devices[0]
        .filters
        .insert("temperature".to_string(), FilterConfig::MovingAverage { depth: 3 });
    config.rain_gauge.enabled = false;
    config.validate().unwrap();

    StationService::new(config, bus, Arc::new(clock.clone()), None).unwrap()
}

async fn poll_at(station: &mut StationService, clock: &ManualClock, now: u64) {
    clock.set(now);
    let outcomes = station.run_cycle().await.unwrap();
    assert_eq!(outcomes.len(), 1, "one poll expected at {} ms", now);
}

#[tokio::test]
async fn timeout_keeps_filtered_temperature_and_flags_the_link() {
    let bus = Arc::new(ScriptedBus::default());
    for _ in 0..3 {
        bus.answer(Ok(bme280_record(2150)));
    }
    bus.answer(Err(ModbusError::Timeout));

    let clock = ManualClock::new(0);
    let mut station = bme280_station(bus, &clock);
    let registers = station.registers();

    for now in [1_000, 2_000, 3_000] {
        poll_at(&mut station, &clock, now).await;
        assert_eq!(registers.read(0, 2).unwrap(), vec![0x00, 2150]);
    }

    poll_at(&mut station, &clock, 4_000).await;
    assert_eq!(registers.read(0, 2).unwrap(), vec![0xE2, 2150]);
    assert_eq!(registers.status(0).unwrap(), ConnectionStatus::ResponseTimedOut);

    let snapshot = registers.snapshot().unwrap();
    assert!((snapshot[0].fields[0].value - 21.5).abs() < 1e-4);
}

#[tokio::test]
async fn moving_average_divides_by_samples_seen() {
    let bus = Arc::new(ScriptedBus::default());
    bus.answer(Ok(bme280_record(2000)));
    bus.answer(Ok(bme280_record(2300)));
    bus.answer(Ok(bme280_record(2600)));
    bus.answer(Ok(bme280_record(2900)));

    let clock = ManualClock::new(0);
    let mut station = bme280_station(bus, &clock);
    let registers = station.registers();

    poll_at(&mut station, &clock, 1_000).await;
    assert_eq!(registers.read(1, 1).unwrap(), vec![2000]);

    poll_at(&mut station, &clock, 2_000).await;
    assert_eq!(registers.read(1, 1).unwrap(), vec![2150]);

    poll_at(&mut station, &clock, 3_000).await;
    assert_eq!(registers.read(1, 1).unwrap(), vec![2300]);

    // Oldest sample drops out once the buffer is full
    poll_at(&mut station, &clock, 4_000).await;
    assert_eq!(registers.read(1, 1).unwrap(), vec![2600]);

    // Unfiltered fields pass straight through
    assert_eq!(registers.read(2, 1).unwrap(), vec![10132]);
}

#[tokio::test]
async fn slave_serves_the_published_record() {
    let bus = Arc::new(ScriptedBus::default());
    bus.answer(Ok(bme280_record((-450i16) as u16)));

    let clock = ManualClock::new(0);
    let mut station = bme280_station(bus, &clock);
    poll_at(&mut station, &clock, 1_000).await;

    let service = SlaveService::new(station.registers());
    let response = service.call(Request::ReadHoldingRegisters(0, 2)).await;
    assert_eq!(response, Ok(Response::ReadHoldingRegisters(vec![0x00, 0xFE3E])));

    // BME280 record (9 words) then the rain record (6 words)
    let response = service.call(Request::ReadInputRegisters(9, 1)).await;
    assert_eq!(response, Ok(Response::ReadInputRegisters(vec![0xFF])));
}

#[tokio::test]
async fn rain_tips_are_debounced_end_to_end() {
    let mut config = Config::default();
    config.devices.clear();
    config.rain_gauge.input = RainInputConfig::Simulated;

    let clock = ManualClock::new(0);
    let input = SimulatedInput::new();
    let mut station = StationService::new(
        config,
        Arc::new(ScriptedBus::default()),
        Arc::new(clock.clone()),
        Some(Box::new(input.clone())),
    )
    .unwrap();
    let registers = station.registers();

    let toggle = |now: u64, level: bool| {
        clock.set(now);
        input.set(level);
    };

    // Primes the edge detector
    toggle(0, false);
    station.run_cycle().await.unwrap();

    // A clean tip, then contact bounce 40 ms later
    for (now, level) in [(1_000, true), (1_020, false), (1_040, true), (1_060, false)] {
        toggle(now, level);
        station.run_cycle().await.unwrap();
    }
    assert_eq!(registers.read(0, 6).unwrap(), vec![0x00, 0, 0, 1, 3, 1]);

    // Second tip 30 s later: 0.3 mm / 30 s = 36 mm/h
    for (now, level) in [(31_000, true), (31_100, false)] {
        toggle(now, level);
        station.run_cycle().await.unwrap();
    }
    assert_eq!(registers.read(0, 6).unwrap(), vec![0x00, 360, 100, 2, 6, 1]);

    // Five quiet minutes end the event; totals remain
    toggle(331_000, false);
    station.run_cycle().await.unwrap();
    assert_eq!(registers.read(0, 6).unwrap(), vec![0x00, 0, 0, 2, 6, 0]);
}
