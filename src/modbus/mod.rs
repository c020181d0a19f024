pub mod client;
pub mod protocol;
pub mod crc;
pub mod status;

pub use client::{ModbusClient, ModbusClientTrait};
pub use protocol::{ModbusRequest, ModbusResponse};
pub use crc::crc16_modbus;
pub use status::{ConnectionStatus, SlaveException};
