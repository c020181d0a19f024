use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::settings::{DeviceConfig, RegisterBlock};
use crate::modbus::client::ModbusClientTrait;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Bme280,
    Anemometer,
    WindVane,
}

impl DeviceKind {
    /// Register block read when the device config does not override it.
    pub fn default_read_block(&self) -> RegisterBlock {
        match self {
            DeviceKind::Bme280 => RegisterBlock { base: 100, count: 8 },
            DeviceKind::Anemometer => RegisterBlock { base: 0, count: 1 },
            DeviceKind::WindVane => RegisterBlock { base: 0, count: 1 },
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Bme280 => write!(f, "BME280"),
            DeviceKind::Anemometer => write!(f, "Anemometer"),
            DeviceKind::WindVane => write!(f, "Wind Vane"),
        }
    }
}

/// One 16-bit field of a device record.
///
/// `scale` is the number of raw units per engineering unit, so a temperature
/// published as °C×100 has a scale of 100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub unit: &'static str,
    pub scale: f32,
    pub signed: bool,
}

impl FieldSpec {
    pub const fn unsigned(name: &'static str, unit: &'static str, scale: f32) -> Self {
        Self { name, unit, scale, signed: false }
    }

    pub const fn signed(name: &'static str, unit: &'static str, scale: f32) -> Self {
        Self { name, unit, scale, signed: true }
    }

    /// Raw register word as a sample, honouring the field's signedness.
    pub fn raw_sample(&self, word: u16) -> f32 {
        if self.signed {
            word as i16 as f32
        } else {
            word as f32
        }
    }

    /// Rounds a filtered sample back into a register word, saturating at
    /// the field's range.
    pub fn to_word(&self, sample: f32) -> u16 {
        let rounded = sample.round();
        if self.signed {
            rounded.clamp(i16::MIN as f32, i16::MAX as f32) as i16 as u16
        } else {
            rounded.clamp(0.0, u16::MAX as f32) as u16
        }
    }

    pub fn engineering(&self, word: u16) -> f32 {
        self.raw_sample(word) / self.scale
    }
}

/// What every field device shares: identity and register blocks.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub name: String,
    pub slave_id: u8,
    pub task: String,
    pub read: RegisterBlock,
    pub write: Option<RegisterBlock>,
}

impl DeviceDescriptor {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            name: config.name.clone(),
            slave_id: config.slave_id,
            task: config.task.clone(),
            read: config.read_block(),
            write: config.write,
        }
    }
}

#[async_trait]
pub trait PollableDevice: Send + Sync {
    fn descriptor(&self) -> &DeviceDescriptor;
    fn kind(&self) -> DeviceKind;
    fn fields(&self) -> &'static [FieldSpec];

    /// Turns the words of one read into one raw sample per field.
    fn decode(&self, registers: &[u16]) -> Result<Vec<f32>, ModbusError>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn slave_id(&self) -> u8 {
        self.descriptor().slave_id
    }

    async fn read_samples(&self, client: &dyn ModbusClientTrait) -> Result<Vec<f32>, ModbusError> {
        let block = self.descriptor().read;
        let registers = client.read_holding_registers(self.slave_id(), block.base, block.count).await?;
        self.decode(&registers)
    }

    /// Writes the poll sequence number followed by zeros into the write block,
    /// when the device has one.
    async fn write_heartbeat(&self, client: &dyn ModbusClientTrait, sequence: u16) -> Result<(), ModbusError> {
        let Some(block) = self.descriptor().write else {
            return Ok(());
        };

        let mut values = vec![0u16; block.count as usize];
        if let Some(first) = values.first_mut() {
            *first = sequence;
        }
        client.write_multiple_registers(self.slave_id(), block.base, &values).await
    }
}

/// Shared by the decoders: every field takes the word at its own offset.
pub(crate) fn decode_fields(fields: &[FieldSpec], registers: &[u16]) -> Result<Vec<f32>, ModbusError> {
    if registers.len() < fields.len() {
        return Err(ModbusError::InvalidData(format!(
            "expected at least {} registers, got {}",
            fields.len(),
            registers.len()
        )));
    }

    Ok(fields
        .iter()
        .zip(registers)
        .map(|(field, word)| field.raw_sample(*word))
        .collect())
}
