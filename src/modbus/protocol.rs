//! Modbus RTU frames used by the master side.
//!
//! Only the two transactions the field devices need are supported:
//! read holding registers (0x03) and write multiple registers (0x10).

use bytes::{BufMut, Bytes, BytesMut};

use super::crc::{crc16_modbus, frame_crc_is_valid};
use super::status::SlaveException;
use crate::utils::error::ModbusError;

pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
pub const EXCEPTION_FLAG: u8 = 0x80;

pub const MAX_READ_REGISTERS: u16 = 125;
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Length of an exception response: id, function, code, crc (2).
pub const EXCEPTION_RESPONSE_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum ModbusRequest {
    ReadHoldingRegisters {
        slave_id: u8,
        start_register: u16,
        quantity: u16,
    },
    WriteMultipleRegisters {
        slave_id: u8,
        start_register: u16,
        values: Vec<u16>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModbusResponse {
    Registers(Vec<u16>),
    WriteAck { start_register: u16, quantity: u16 },
}

impl ModbusRequest {
    pub fn read(slave_id: u8, start_register: u16, quantity: u16) -> Result<Self, ModbusError> {
        if quantity == 0 || quantity > MAX_READ_REGISTERS {
            return Err(ModbusError::InvalidData(format!(
                "Read quantity {} outside 1..={}",
                quantity, MAX_READ_REGISTERS
            )));
        }
        Ok(ModbusRequest::ReadHoldingRegisters { slave_id, start_register, quantity })
    }

    pub fn write(slave_id: u8, start_register: u16, values: &[u16]) -> Result<Self, ModbusError> {
        if values.is_empty() || values.len() > MAX_WRITE_REGISTERS as usize {
            return Err(ModbusError::InvalidData(format!(
                "Write quantity {} outside 1..={}",
                values.len(),
                MAX_WRITE_REGISTERS
            )));
        }
        Ok(ModbusRequest::WriteMultipleRegisters {
            slave_id,
            start_register,
            values: values.to_vec(),
        })
    }

    pub fn slave_id(&self) -> u8 {
        match self {
            ModbusRequest::ReadHoldingRegisters { slave_id, .. }
            | ModbusRequest::WriteMultipleRegisters { slave_id, .. } => *slave_id,
        }
    }

    pub fn function_code(&self) -> u8 {
        match self {
            ModbusRequest::ReadHoldingRegisters { .. } => FC_READ_HOLDING_REGISTERS,
            ModbusRequest::WriteMultipleRegisters { .. } => FC_WRITE_MULTIPLE_REGISTERS,
        }
    }

    /// Length of a normal (non exception) response frame including the CRC.
    pub fn expected_response_len(&self) -> usize {
        match self {
            ModbusRequest::ReadHoldingRegisters { quantity, .. } => 5 + (*quantity as usize) * 2,
            ModbusRequest::WriteMultipleRegisters { .. } => 8,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut frame = BytesMut::with_capacity(9 + self.payload_len());
        frame.put_u8(self.slave_id());
        frame.put_u8(self.function_code());

        match self {
            ModbusRequest::ReadHoldingRegisters { start_register, quantity, .. } => {
                frame.put_u16(*start_register);
                frame.put_u16(*quantity);
            }
            ModbusRequest::WriteMultipleRegisters { start_register, values, .. } => {
                frame.put_u16(*start_register);
                frame.put_u16(values.len() as u16);
                frame.put_u8((values.len() * 2) as u8);
                for value in values {
                    frame.put_u16(*value);
                }
            }
        }

        let crc = crc16_modbus(&frame);
        frame.put_u16_le(crc);
        frame.freeze()
    }

    fn payload_len(&self) -> usize {
        match self {
            ModbusRequest::ReadHoldingRegisters { .. } => 0,
            ModbusRequest::WriteMultipleRegisters { values, .. } => values.len() * 2,
        }
    }

    /// Validates a complete response frame against this request.
    pub fn decode_response(&self, frame: &[u8]) -> Result<ModbusResponse, ModbusError> {
        if frame.len() < EXCEPTION_RESPONSE_LEN {
            return Err(ModbusError::MalformedFrame(format!("{} byte response", frame.len())));
        }
        if !frame_crc_is_valid(frame) {
            return Err(ModbusError::CrcError);
        }
        if frame[0] != self.slave_id() {
            return Err(ModbusError::InvalidSlaveId {
                expected: self.slave_id(),
                received: frame[0],
            });
        }
        if frame[1] == self.function_code() | EXCEPTION_FLAG {
            return Err(ModbusError::Exception(SlaveException::from_code(frame[2])));
        }
        if frame[1] != self.function_code() {
            return Err(ModbusError::InvalidFunction {
                expected: self.function_code(),
                received: frame[1],
            });
        }

        match self {
            ModbusRequest::ReadHoldingRegisters { quantity, .. } => {
                let byte_count = frame[2] as usize;
                if byte_count != (*quantity as usize) * 2 || frame.len() != 5 + byte_count {
                    return Err(ModbusError::MalformedFrame(format!(
                        "byte count {} for {} registers",
                        byte_count, quantity
                    )));
                }
                let registers = frame[3..3 + byte_count]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Ok(ModbusResponse::Registers(registers))
            }
            ModbusRequest::WriteMultipleRegisters { start_register, values, .. } => {
                if frame.len() != 8 {
                    return Err(ModbusError::MalformedFrame(format!("{} byte write echo", frame.len())));
                }
                let echoed_start = u16::from_be_bytes([frame[2], frame[3]]);
                let echoed_quantity = u16::from_be_bytes([frame[4], frame[5]]);
                if echoed_start != *start_register || echoed_quantity as usize != values.len() {
                    return Err(ModbusError::MalformedFrame(format!(
                        "write echo {}+{} does not match request",
                        echoed_start, echoed_quantity
                    )));
                }
                Ok(ModbusResponse::WriteAck {
                    start_register: echoed_start,
                    quantity: echoed_quantity,
                })
            }
        }
    }
}
