use async_trait::async_trait;

use super::traits::{decode_fields, DeviceDescriptor, DeviceKind, FieldSpec, PollableDevice};
use crate::utils::error::ModbusError;

/// Record of the temperature/humidity/pressure board, starting at holding
/// register 100. Derived quantities are computed on the board itself.
pub const BME280_FIELDS: [FieldSpec; 8] = [
    FieldSpec::signed("temperature", "°C", 100.0),
    FieldSpec::unsigned("pressure", "hPa", 10.0),
    FieldSpec::unsigned("humidity", "%RH", 100.0),
    FieldSpec::signed("wet_bulb_temperature", "°C", 100.0),
    FieldSpec::signed("dew_point", "°C", 100.0),
    FieldSpec::signed("heat_index", "°C", 100.0),
    FieldSpec::unsigned("absolute_humidity", "g/m³", 100.0),
    FieldSpec::unsigned("board_status", "", 1.0),
];

#[derive(Debug, Clone)]
pub struct Bme280Device {
    descriptor: DeviceDescriptor,
}

impl Bme280Device {
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl PollableDevice for Bme280Device {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Bme280
    }

    fn fields(&self) -> &'static [FieldSpec] {
        &BME280_FIELDS
    }

    fn decode(&self, registers: &[u16]) -> Result<Vec<f32>, ModbusError> {
        decode_fields(&BME280_FIELDS, registers)
    }
}
