pub mod station_service;

pub use station_service::{open_rain_input, open_run_led, register_map_for, StationService};
