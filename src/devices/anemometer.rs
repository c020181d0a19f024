use async_trait::async_trait;

use super::traits::{decode_fields, DeviceDescriptor, DeviceKind, FieldSpec, PollableDevice};
use crate::utils::error::ModbusError;

// Holding register 0, wind speed as xy.z m/s
pub const ANEMOMETER_FIELDS: [FieldSpec; 1] = [FieldSpec::unsigned("wind_speed", "m/s", 10.0)];

#[derive(Debug, Clone)]
pub struct AnemometerDevice {
    descriptor: DeviceDescriptor,
}

impl AnemometerDevice {
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl PollableDevice for AnemometerDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Anemometer
    }

    fn fields(&self) -> &'static [FieldSpec] {
        &ANEMOMETER_FIELDS
    }

    fn decode(&self, registers: &[u16]) -> Result<Vec<f32>, ModbusError> {
        decode_fields(&ANEMOMETER_FIELDS, registers)
    }
}
