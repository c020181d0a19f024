//! Per-channel smoothing of raw field readings.
//!
//! Both filters work on one sample at a time and only depend on the order in
//! which samples arrive, never on wall-clock time.

pub mod exponential;
pub mod moving_average;

pub use exponential::ExponentialFilter;
pub use moving_average::{MovingAverage, MAX_MOVING_AVERAGE_DEPTH};

use crate::config::settings::FilterConfig;

pub trait SignalFilter: Send {
    /// Feeds one sample and returns the new filter output.
    fn update(&mut self, sample: f32) -> f32;

    fn output(&self) -> f32;

    fn reset(&mut self);
}

/// Filter selected for one field of one device.
#[derive(Debug, Clone)]
pub enum ChannelFilter {
    Passthrough { last: f32 },
    MovingAverage(MovingAverage),
    Exponential(ExponentialFilter),
}

impl ChannelFilter {
    pub fn from_config(config: &FilterConfig) -> Self {
        match config {
            FilterConfig::None => ChannelFilter::Passthrough { last: 0.0 },
            FilterConfig::MovingAverage { depth } => ChannelFilter::MovingAverage(MovingAverage::new(*depth)),
            FilterConfig::Exponential { gain } => ChannelFilter::Exponential(ExponentialFilter::new(*gain)),
        }
    }
}

impl SignalFilter for ChannelFilter {
    fn update(&mut self, sample: f32) -> f32 {
        match self {
            ChannelFilter::Passthrough { last } => {
                *last = sample;
                sample
            }
            ChannelFilter::MovingAverage(filter) => filter.update(sample),
            ChannelFilter::Exponential(filter) => filter.update(sample),
        }
    }

    fn output(&self) -> f32 {
        match self {
            ChannelFilter::Passthrough { last } => *last,
            ChannelFilter::MovingAverage(filter) => filter.output(),
            ChannelFilter::Exponential(filter) => filter.output(),
        }
    }

    fn reset(&mut self) {
        match self {
            ChannelFilter::Passthrough { last } => *last = 0.0,
            ChannelFilter::MovingAverage(filter) => filter.reset(),
            ChannelFilter::Exponential(filter) => filter.reset(),
        }
    }
}
