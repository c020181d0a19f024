//! Per-device connection status words.
//!
//! The numeric values are the ones surfaced in the first register of every
//! device record, so the supervisory PLC can tell a slave exception from a
//! dead RS-485 link.

use serde::Serialize;
use std::fmt;

use crate::utils::error::ModbusError;

/// Exception codes a field device may answer with (function code | 0x80).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlaveException {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Other(u8),
}

impl SlaveException {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => SlaveException::IllegalFunction,
            0x02 => SlaveException::IllegalDataAddress,
            0x03 => SlaveException::IllegalDataValue,
            0x04 => SlaveException::SlaveDeviceFailure,
            other => SlaveException::Other(other),
        }
    }
}

impl fmt::Display for SlaveException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlaveException::IllegalFunction => write!(f, "illegal function"),
            SlaveException::IllegalDataAddress => write!(f, "illegal data address"),
            SlaveException::IllegalDataValue => write!(f, "illegal data value"),
            SlaveException::SlaveDeviceFailure => write!(f, "slave device failure"),
            SlaveException::Other(code) => write!(f, "exception 0x{:02X}", code),
        }
    }
}

/// Outcome of the last poll of a device, as exposed on the slave table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u16)]
pub enum ConnectionStatus {
    Success = 0x00,
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    SlaveDeviceFailure = 0x04,
    InvalidSlaveId = 0xE0,
    InvalidFunction = 0xE1,
    ResponseTimedOut = 0xE2,
    InvalidCrc = 0xE3,
    NotPolled = 0xFF,
}

impl ConnectionStatus {
    pub fn word(self) -> u16 {
        self as u16
    }

    pub fn from_word(word: u16) -> Option<Self> {
        let status = match word {
            0x00 => ConnectionStatus::Success,
            0x01 => ConnectionStatus::IllegalFunction,
            0x02 => ConnectionStatus::IllegalDataAddress,
            0x03 => ConnectionStatus::IllegalDataValue,
            0x04 => ConnectionStatus::SlaveDeviceFailure,
            0xE0 => ConnectionStatus::InvalidSlaveId,
            0xE1 => ConnectionStatus::InvalidFunction,
            0xE2 => ConnectionStatus::ResponseTimedOut,
            0xE3 => ConnectionStatus::InvalidCrc,
            0xFF => ConnectionStatus::NotPolled,
            _ => return None,
        };
        Some(status)
    }

    pub fn is_success(self) -> bool {
        self == ConnectionStatus::Success
    }

    /// Slave answered, but refused the request.
    pub fn is_protocol_error(self) -> bool {
        matches!(
            self,
            ConnectionStatus::IllegalFunction
                | ConnectionStatus::IllegalDataAddress
                | ConnectionStatus::IllegalDataValue
                | ConnectionStatus::SlaveDeviceFailure
        )
    }

    /// No usable answer came back over the wire.
    pub fn is_link_error(self) -> bool {
        matches!(
            self,
            ConnectionStatus::InvalidSlaveId
                | ConnectionStatus::InvalidFunction
                | ConnectionStatus::ResponseTimedOut
                | ConnectionStatus::InvalidCrc
        )
    }
}

impl From<&ModbusError> for ConnectionStatus {
    fn from(err: &ModbusError) -> Self {
        match err {
            ModbusError::Exception(SlaveException::IllegalFunction) => ConnectionStatus::IllegalFunction,
            ModbusError::Exception(SlaveException::IllegalDataAddress) => ConnectionStatus::IllegalDataAddress,
            ModbusError::Exception(SlaveException::IllegalDataValue) => ConnectionStatus::IllegalDataValue,
            // Vendor specific exception codes are reported as a device failure
            ModbusError::Exception(_) => ConnectionStatus::SlaveDeviceFailure,
            ModbusError::InvalidSlaveId { .. } => ConnectionStatus::InvalidSlaveId,
            ModbusError::InvalidFunction { .. } => ConnectionStatus::InvalidFunction,
            ModbusError::CrcError | ModbusError::MalformedFrame(_) | ModbusError::InvalidData(_) => {
                ConnectionStatus::InvalidCrc
            }
            ModbusError::Timeout
            | ModbusError::CommunicationError(_)
            | ModbusError::ConnectionError(_)
            | ModbusError::LockError
            | ModbusError::ConfigError(_) => ConnectionStatus::ResponseTimedOut,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionStatus::Success => "success",
            ConnectionStatus::IllegalFunction => "illegal function",
            ConnectionStatus::IllegalDataAddress => "illegal data address",
            ConnectionStatus::IllegalDataValue => "illegal data value",
            ConnectionStatus::SlaveDeviceFailure => "slave device failure",
            ConnectionStatus::InvalidSlaveId => "invalid slave id",
            ConnectionStatus::InvalidFunction => "invalid function",
            ConnectionStatus::ResponseTimedOut => "response timed out",
            ConnectionStatus::InvalidCrc => "invalid crc",
            ConnectionStatus::NotPolled => "not polled",
        };
        write!(f, "{} (0x{:02X})", text, self.word())
    }
}
