use log::{debug, info, warn};
use std::collections::HashMap;

use super::statistics::PollStatistics;
use crate::devices::PollableDevice;
use crate::modbus::client::ModbusClientTrait;
use crate::modbus::status::ConnectionStatus;
use crate::scheduler::TaskId;
use crate::utils::error::ModbusError;

/// Result of one poll. `samples` is only present on success; a failed poll
/// never carries partial data.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub device: usize,
    pub status: ConnectionStatus,
    pub samples: Option<Vec<f32>>,
}

struct PolledDevice {
    device: Box<dyn PollableDevice>,
    task: TaskId,
    stats: PollStatistics,
}

pub struct PollingEngine {
    devices: Vec<PolledDevice>,
    cursors: HashMap<TaskId, usize>,
    sequence: u16,
}

impl PollingEngine {
    /// Devices keep the given order; it is both the round-robin order within
    /// a task and the device index used in outcomes.
    pub fn new(devices: Vec<(Box<dyn PollableDevice>, TaskId)>) -> Self {
        let devices = devices
            .into_iter()
            .map(|(device, task)| PolledDevice {
                device,
                task,
                stats: PollStatistics::default(),
            })
            .collect();

        Self {
            devices,
            cursors: HashMap::new(),
            sequence: 0,
        }
    }

    /// Picks the device of `task` whose turn it is and advances the cursor.
    pub fn next_device(&mut self, task: TaskId) -> Option<usize> {
        let group: Vec<usize> = self
            .devices
            .iter()
            .enumerate()
            .filter(|(_, polled)| polled.task == task)
            .map(|(index, _)| index)
            .collect();

        if group.is_empty() {
            return None;
        }

        let cursor = self.cursors.entry(task).or_insert(0);
        let index = group[*cursor % group.len()];
        *cursor = (*cursor + 1) % group.len();
        Some(index)
    }

    /// Polls the next device of `task`, if the task has any.
    pub async fn poll_task(&mut self, client: &dyn ModbusClientTrait, task: TaskId) -> Option<PollOutcome> {
        let index = self.next_device(task)?;
        self.poll_device(client, index).await
    }

    /// One read and, if it succeeded and the device has a write block, one
    /// write. No retries.
    pub async fn poll_device(&mut self, client: &dyn ModbusClientTrait, index: usize) -> Option<PollOutcome> {
        self.sequence = self.sequence.wrapping_add(1);
        let sequence = self.sequence;

        let polled = self.devices.get_mut(index)?;
        let result = transact(polled.device.as_ref(), client, sequence).await;

        let outcome = match result {
            Ok(samples) => {
                if polled.stats.consecutive_failures > 0 {
                    info!(
                        "✅ {} (slave {}) answering again after {} failed polls",
                        polled.device.name(),
                        polled.device.slave_id(),
                        polled.stats.consecutive_failures
                    );
                }
                debug!("📊 {} samples: {:?}", polled.device.name(), samples);
                PollOutcome {
                    device: index,
                    status: ConnectionStatus::Success,
                    samples: Some(samples),
                }
            }
            Err(e) => {
                let status = ConnectionStatus::from(&e);
                warn!(
                    "❌ Poll of {} (slave {}) failed: {} -> {} [{} in a row]",
                    polled.device.name(),
                    polled.device.slave_id(),
                    e,
                    status,
                    polled.stats.consecutive_failures + 1
                );
                PollOutcome {
                    device: index,
                    status,
                    samples: None,
                }
            }
        };

        polled.stats.record(outcome.status);
        Some(outcome)
    }

    pub fn device(&self, index: usize) -> Option<&dyn PollableDevice> {
        self.devices.get(index).map(|polled| polled.device.as_ref())
    }

    pub fn statistics(&self, index: usize) -> Option<&PollStatistics> {
        self.devices.get(index).map(|polled| &polled.stats)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }
}

async fn transact(
    device: &dyn PollableDevice,
    client: &dyn ModbusClientTrait,
    sequence: u16,
) -> Result<Vec<f32>, ModbusError> {
    let samples = device.read_samples(client).await?;
    device.write_heartbeat(client, sequence).await?;
    Ok(samples)
}
