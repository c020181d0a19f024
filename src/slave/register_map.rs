use chrono::{DateTime, Utc};
use log::trace;
use serde::Serialize;
use std::sync::{Arc, RwLock};

use crate::devices::FieldSpec;
use crate::modbus::protocol::MAX_READ_REGISTERS;
use crate::modbus::status::{ConnectionStatus, SlaveException};
use crate::rain::{RainReading, RainState};
use crate::utils::error::ModbusError;

/// Fields of the rain record, after its status word.
pub const RAIN_FIELDS: [FieldSpec; 5] = [
    FieldSpec::unsigned("rate_mm_per_hour", "mm/h", 10.0),
    FieldSpec::unsigned("rate_mm_per_sec", "mm/s", 10_000.0),
    FieldSpec::unsigned("tip_count", "tips", 1.0),
    FieldSpec::unsigned("total_mm", "mm", 10.0),
    FieldSpec::unsigned("event_active", "", 1.0),
];

/// Index of a record in the table, in layout order.
pub type RecordId = usize;

/// Placement of one record: a status word at `start`, then one word per field.
#[derive(Debug, Clone)]
pub struct RecordLayout {
    pub name: String,
    pub start: u16,
    pub fields: &'static [FieldSpec],
}

impl RecordLayout {
    pub fn word_count(&self) -> u16 {
        1 + self.fields.len() as u16
    }

    pub fn end(&self) -> u16 {
        self.start + self.word_count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldValue {
    pub name: &'static str,
    pub unit: &'static str,
    pub raw: u16,
    pub value: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordSnapshot {
    pub name: String,
    pub start_address: u16,
    pub status: ConnectionStatus,
    pub status_word: u16,
    /// Time of the last value publish, `None` until one happened.
    pub updated_at: Option<DateTime<Utc>>,
    pub fields: Vec<FieldValue>,
}

struct RegisterTable {
    words: Vec<u16>,
    updated_at: Vec<Option<DateTime<Utc>>>,
}

/// Shared handle over the processed dataset.
///
/// Every publish rewrites one whole record under a single write lock and
/// every read copies its range under a single read lock, so a slave request
/// never observes a record halfway through an update.
#[derive(Clone)]
pub struct RegisterMap {
    layout: Arc<Vec<RecordLayout>>,
    table: Arc<RwLock<RegisterTable>>,
}

impl RegisterMap {
    /// Lays the records out back to back from address 0. Status words start
    /// as `NotPolled` and fields as 0.
    pub fn new<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (String, &'static [FieldSpec])>,
    {
        let mut layout = Vec::new();
        let mut next_start = 0u16;
        for (name, fields) in records {
            let record = RecordLayout {
                name,
                start: next_start,
                fields,
            };
            next_start = record.end();
            layout.push(record);
        }

        let mut words = vec![0u16; next_start as usize];
        for record in &layout {
            words[record.start as usize] = ConnectionStatus::NotPolled.word();
        }

        Self {
            table: Arc::new(RwLock::new(RegisterTable {
                words,
                updated_at: vec![None; layout.len()],
            })),
            layout: Arc::new(layout),
        }
    }

    pub fn layout(&self) -> &[RecordLayout] {
        &self.layout
    }

    /// Total number of registers served.
    pub fn len(&self) -> usize {
        self.layout.last().map(|r| r.end() as usize).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the status word and every field of `record` at once.
    pub fn publish_record(&self, record: RecordId, status: ConnectionStatus, words: &[u16]) -> Result<(), ModbusError> {
        let layout = self.record(record)?;
        if words.len() != layout.fields.len() {
            return Err(ModbusError::InvalidData(format!(
                "record '{}' has {} fields, got {} words",
                layout.name,
                layout.fields.len(),
                words.len()
            )));
        }

        let start = layout.start as usize;
        let mut table = self.table.write().map_err(|_| ModbusError::LockError)?;
        table.words[start] = status.word();
        table.words[start + 1..start + 1 + words.len()].copy_from_slice(words);
        table.updated_at[record] = Some(Utc::now());

        trace!("🗂️  Published '{}' at {}: {:?}", layout.name, layout.start, words);
        Ok(())
    }

    /// Updates only the status word; the fields keep their last published values.
    pub fn publish_status(&self, record: RecordId, status: ConnectionStatus) -> Result<(), ModbusError> {
        let start = self.record(record)?.start as usize;
        let mut table = self.table.write().map_err(|_| ModbusError::LockError)?;
        table.words[start] = status.word();
        Ok(())
    }

    /// Copies `count` registers starting at `address`, with the errors a Modbus
    /// slave would answer for a bad range.
    pub fn read(&self, address: u16, count: u16) -> Result<Vec<u16>, ModbusError> {
        if count == 0 || count > MAX_READ_REGISTERS {
            return Err(ModbusError::Exception(SlaveException::IllegalDataValue));
        }

        let start = address as usize;
        let end = start + count as usize;
        let table = self.table.read().map_err(|_| ModbusError::LockError)?;
        if end > table.words.len() {
            return Err(ModbusError::Exception(SlaveException::IllegalDataAddress));
        }
        Ok(table.words[start..end].to_vec())
    }

    pub fn status(&self, record: RecordId) -> Result<ConnectionStatus, ModbusError> {
        let start = self.record(record)?.start as usize;
        let table = self.table.read().map_err(|_| ModbusError::LockError)?;
        let word = table.words[start];
        ConnectionStatus::from_word(word)
            .ok_or_else(|| ModbusError::InvalidData(format!("unknown status word 0x{:04X}", word)))
    }

    /// Engineering values of every record, taken under one read lock.
    pub fn snapshot(&self) -> Result<Vec<RecordSnapshot>, ModbusError> {
        let table = self.table.read().map_err(|_| ModbusError::LockError)?;

        Ok(self
            .layout
            .iter()
            .enumerate()
            .map(|(index, layout)| {
                let start = layout.start as usize;
                let status_word = table.words[start];
                let fields = layout
                    .fields
                    .iter()
                    .zip(&table.words[start + 1..layout.end() as usize])
                    .map(|(field, raw)| FieldValue {
                        name: field.name,
                        unit: field.unit,
                        raw: *raw,
                        value: field.engineering(*raw),
                    })
                    .collect();

                RecordSnapshot {
                    name: layout.name.clone(),
                    start_address: layout.start,
                    status: ConnectionStatus::from_word(status_word).unwrap_or(ConnectionStatus::NotPolled),
                    status_word,
                    updated_at: table.updated_at[index],
                    fields,
                }
            })
            .collect())
    }

    fn record(&self, record: RecordId) -> Result<&RecordLayout, ModbusError> {
        self.layout
            .get(record)
            .ok_or_else(|| ModbusError::InvalidData(format!("no record #{}", record)))
    }
}

/// Register words of the rain record, in `RAIN_FIELDS` order.
pub fn rain_words(reading: &RainReading) -> Vec<u16> {
    let event_active = if reading.state == RainState::Idle { 0.0 } else { 1.0 };
    let samples = [
        reading.rate_mm_per_hour * RAIN_FIELDS[0].scale,
        reading.rate_mm_per_sec * RAIN_FIELDS[1].scale,
        reading.tip_count as f32,
        reading.total_mm * RAIN_FIELDS[3].scale,
        event_active,
    ];

    RAIN_FIELDS
        .iter()
        .zip(samples)
        .map(|(field, sample)| field.to_word(sample))
        .collect()
}
