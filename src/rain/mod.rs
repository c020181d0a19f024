//! Tipping-bucket rain gauge: debounced tip counting and rain rate.

pub mod gauge;

pub use gauge::{RainGauge, RainReading, RainState, SampleEvent};
