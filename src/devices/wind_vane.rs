use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use super::traits::{DeviceDescriptor, DeviceKind, FieldSpec, PollableDevice};
use crate::utils::error::ModbusError;

pub const WIND_VANE_FIELDS: [FieldSpec; 1] = [FieldSpec::unsigned("direction", "sector", 1.0)];

/// Sixteen compass points, clockwise from north, plus the out-of-range marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u16)]
pub enum WindDirection {
    N = 0,
    Nne,
    Ne,
    Ene,
    E,
    Ese,
    Se,
    Sse,
    S,
    Ssw,
    Sw,
    Wsw,
    W,
    Wnw,
    Nw,
    Nnw,
    NotValid,
}

const COMPASS: [WindDirection; 16] = [
    WindDirection::N,
    WindDirection::Nne,
    WindDirection::Ne,
    WindDirection::Ene,
    WindDirection::E,
    WindDirection::Ese,
    WindDirection::Se,
    WindDirection::Sse,
    WindDirection::S,
    WindDirection::Ssw,
    WindDirection::Sw,
    WindDirection::Wsw,
    WindDirection::W,
    WindDirection::Wnw,
    WindDirection::Nw,
    WindDirection::Nnw,
];

impl WindDirection {
    pub fn from_sector(sector: u16) -> Self {
        COMPASS.get(sector as usize).copied().unwrap_or(WindDirection::NotValid)
    }

    pub fn sector(self) -> u16 {
        self as u16
    }

    pub fn degrees(self) -> Option<f32> {
        match self {
            WindDirection::NotValid => None,
            direction => Some(direction.sector() as f32 * 22.5),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WindDirection::N => "N",
            WindDirection::Nne => "NNE",
            WindDirection::Ne => "NE",
            WindDirection::Ene => "ENE",
            WindDirection::E => "E",
            WindDirection::Ese => "ESE",
            WindDirection::Se => "SE",
            WindDirection::Sse => "SSE",
            WindDirection::S => "S",
            WindDirection::Ssw => "SSW",
            WindDirection::Sw => "SW",
            WindDirection::Wsw => "WSW",
            WindDirection::W => "W",
            WindDirection::Wnw => "WNW",
            WindDirection::Nw => "NW",
            WindDirection::Nnw => "NNW",
            WindDirection::NotValid => "NOT_VALID",
        }
    }
}

impl fmt::Display for WindDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone)]
pub struct WindVaneDevice {
    descriptor: DeviceDescriptor,
}

impl WindVaneDevice {
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl PollableDevice for WindVaneDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::WindVane
    }

    fn fields(&self) -> &'static [FieldSpec] {
        &WIND_VANE_FIELDS
    }

    fn decode(&self, registers: &[u16]) -> Result<Vec<f32>, ModbusError> {
        let word = registers
            .first()
            .ok_or_else(|| ModbusError::InvalidData("wind vane returned no register".to_string()))?;
        Ok(vec![WindDirection::from_sector(*word).sector() as f32])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> WindVaneDevice {
        WindVaneDevice::new(DeviceDescriptor {
            name: "Wind Vane".to_string(),
            slave_id: 3,
            task: "medium".to_string(),
            read: DeviceKind::WindVane.default_read_block(),
            write: None,
        })
    }

    #[test]
    fn test_compass_sectors() {
        assert_eq!(WindDirection::from_sector(0), WindDirection::N);
        assert_eq!(WindDirection::from_sector(5), WindDirection::Ese);
        assert_eq!(WindDirection::from_sector(15), WindDirection::Nnw);
        assert_eq!(WindDirection::Ese.degrees(), Some(112.5));
    }

    #[test]
    fn test_out_of_range_sector_is_not_valid() {
        assert_eq!(device().decode(&[16]).unwrap(), vec![16.0]);
        assert_eq!(device().decode(&[0xFFFF]).unwrap(), vec![16.0]);
        assert_eq!(WindDirection::from_sector(42), WindDirection::NotValid);
        assert_eq!(WindDirection::NotValid.degrees(), None);
    }

    #[test]
    fn test_empty_read_is_invalid() {
        assert!(device().decode(&[]).is_err());
    }
}
