use log::{debug, info};
use serde::Serialize;

use crate::config::settings::RainGaugeConfig;

const SECONDS_PER_HOUR: f32 = 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RainState {
    /// No rain event in progress.
    Idle,
    /// A tip was just confirmed; further edges are chatter until the
    /// filtering window has passed.
    Debouncing,
    /// At least one tip inside the end-of-event window.
    EventActive,
}

/// What a single input sample did to the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEvent {
    None,
    TipConfirmed,
    EdgeRejected,
    EventEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RainReading {
    pub state: RainState,
    pub tip_count: u32,
    pub total_mm: f32,
    pub rate_mm_per_sec: f32,
    pub rate_mm_per_hour: f32,
}

pub struct RainGauge {
    rain_constant_mm: f32,
    filtering_ms: u64,
    end_of_event_ms: u64,

    state: RainState,
    last_level: Option<bool>,
    last_tip_ms: Option<u64>,
    tip_count: u32,
    total_mm: f32,
    rate_mm_per_sec: f32,
    rejected_edges: u32,
}

impl RainGauge {
    pub fn new(rain_constant_mm: f32, filtering_ms: u64, end_of_event_ms: u64) -> Self {
        Self {
            rain_constant_mm,
            filtering_ms,
            end_of_event_ms,
            state: RainState::Idle,
            last_level: None,
            last_tip_ms: None,
            tip_count: 0,
            total_mm: 0.0,
            rate_mm_per_sec: 0.0,
            rejected_edges: 0,
        }
    }

    pub fn from_config(config: &RainGaugeConfig) -> Self {
        Self::new(config.rain_constant_mm, config.filtering_ms, config.end_of_event_ms)
    }

    /// Feeds one level sample taken at `now` (ms).
    ///
    /// The very first sample only primes the edge detector, so a switch that
    /// happens to be closed at boot is not counted as a tip.
    pub fn sample(&mut self, level: bool, now: u64) -> SampleEvent {
        let mut event = self.update_timers(now);

        let rising_edge = matches!(self.last_level, Some(false)) && level;
        self.last_level = Some(level);

        if rising_edge {
            event = if self.tip_allowed(now) {
                self.confirm_tip(now);
                SampleEvent::TipConfirmed
            } else {
                self.rejected_edges += 1;
                debug!("🌧️  Rain gauge edge rejected at {} ms (inside filtering window)", now);
                SampleEvent::EdgeRejected
            };
        }

        event
    }

    fn update_timers(&mut self, now: u64) -> SampleEvent {
        let Some(last_tip) = self.last_tip_ms else {
            return SampleEvent::None;
        };
        let since_tip = now.saturating_sub(last_tip);

        if self.state == RainState::Debouncing && since_tip > self.filtering_ms {
            self.state = RainState::EventActive;
        }

        if self.state == RainState::EventActive && since_tip >= self.end_of_event_ms {
            self.state = RainState::Idle;
            self.rate_mm_per_sec = 0.0;
            info!(
                "🌤️  Rain event ended after {} s without tips (total {:.1} mm, {} tips)",
                since_tip / 1000,
                self.total_mm,
                self.tip_count
            );
            return SampleEvent::EventEnded;
        }

        SampleEvent::None
    }

    fn tip_allowed(&self, now: u64) -> bool {
        match self.last_tip_ms {
            None => true,
            Some(last_tip) => now.saturating_sub(last_tip) > self.filtering_ms,
        }
    }

    fn confirm_tip(&mut self, now: u64) {
        // A tip that opens an event has no earlier tip in the same event
        self.rate_mm_per_sec = match self.last_tip_ms {
            Some(last_tip) if self.state != RainState::Idle && now > last_tip => {
                let elapsed_sec = (now - last_tip) as f32 / 1000.0;
                self.rain_constant_mm / elapsed_sec
            }
            _ => 0.0,
        };

        if self.state == RainState::Idle {
            info!("🌧️  Rain event started");
        }

        self.tip_count = self.tip_count.wrapping_add(1);
        self.total_mm += self.rain_constant_mm;
        self.last_tip_ms = Some(now);
        self.state = RainState::Debouncing;

        debug!(
            "🌧️  Tip #{} confirmed at {} ms, rate {:.2} mm/h",
            self.tip_count,
            now,
            self.rate_mm_per_sec * SECONDS_PER_HOUR
        );
    }

    pub fn reading(&self) -> RainReading {
        RainReading {
            state: self.state,
            tip_count: self.tip_count,
            total_mm: self.total_mm,
            rate_mm_per_sec: self.rate_mm_per_sec,
            rate_mm_per_hour: self.rate_mm_per_sec * SECONDS_PER_HOUR,
        }
    }

    pub fn state(&self) -> RainState {
        self.state
    }

    pub fn tip_count(&self) -> u32 {
        self.tip_count
    }

    pub fn rejected_edges(&self) -> u32 {
        self.rejected_edges
    }
}
