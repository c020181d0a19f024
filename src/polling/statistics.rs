use serde::Serialize;

use crate::modbus::status::ConnectionStatus;

#[derive(Debug, Clone, Serialize)]
pub struct PollStatistics {
    pub polls: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_status: ConnectionStatus,
}

impl Default for PollStatistics {
    fn default() -> Self {
        Self {
            polls: 0,
            successes: 0,
            failures: 0,
            consecutive_failures: 0,
            last_status: ConnectionStatus::NotPolled,
        }
    }
}

impl PollStatistics {
    pub fn record(&mut self, status: ConnectionStatus) {
        self.polls += 1;
        if status.is_success() {
            self.successes += 1;
            self.consecutive_failures = 0;
        } else {
            self.failures += 1;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        self.last_status = status;
    }

    pub fn success_rate(&self) -> f64 {
        if self.polls == 0 {
            return 0.0;
        }
        self.successes as f64 / self.polls as f64 * 100.0
    }
}
