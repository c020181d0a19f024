use thiserror::Error;

use crate::modbus::status::SlaveException;

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Slave exception: {0}")]
    Exception(SlaveException),

    #[error("Response from unexpected slave: expected {expected}, got {received}")]
    InvalidSlaveId { expected: u8, received: u8 },

    #[error("Unexpected function code in response: expected 0x{expected:02X}, got 0x{received:02X}")]
    InvalidFunction { expected: u8, received: u8 },

    #[error("CRC checksum mismatch")]
    CrcError,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Lock acquisition failed")]
    LockError,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ModbusError::Timeout,
            _ => ModbusError::CommunicationError(format!("IO error: {}", err)),
        }
    }
}

impl From<tokio::time::error::Elapsed> for ModbusError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ModbusError::Timeout
    }
}

impl From<toml::de::Error> for ModbusError {
    fn from(err: toml::de::Error) -> Self {
        ModbusError::ConfigError(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for ModbusError {
    fn from(err: toml::ser::Error) -> Self {
        ModbusError::ConfigError(format!("TOML serialization error: {}", err))
    }
}
