use async_trait::async_trait;
use log::{debug, error, info};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::protocol::{ModbusRequest, ModbusResponse, EXCEPTION_FLAG, EXCEPTION_RESPONSE_LEN};
use crate::config::settings::{ParityConfig, SerialConfig};
use crate::utils::error::ModbusError;

/// Master side of the field bus. Every call is a single transaction bounded
/// by the transport timeout; retrying is up to the caller.
#[async_trait]
pub trait ModbusClientTrait: Send + Sync {
    async fn read_holding_registers(
        &self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError>;

    async fn write_multiple_registers(
        &self,
        slave_id: u8,
        start_addr: u16,
        values: &[u16],
    ) -> Result<(), ModbusError>;
}

/// Modbus RTU master over an RS-485 serial adapter.
pub struct ModbusClient {
    port: Arc<Mutex<Box<dyn SerialPort>>>,
}

impl ModbusClient {
    pub fn new(serial: &SerialConfig) -> Result<Self, ModbusError> {
        info!("🔌 Connecting to Modbus RTU port: {}", serial.port);
        info!(
            "⚙️  Configuration: {} baud, 8 data bits, {:?} parity, 1 stop bit, {} ms timeout",
            serial.baud_rate, serial.parity, serial.timeout_ms
        );

        let serial_parity = match serial.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(&serial.port, serial.baud_rate)
            .timeout(Duration::from_millis(serial.timeout_ms))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serial_parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", serial.port, e);
                ModbusError::ConnectionError(format!("Failed to open port: {}", e))
            })?;

        info!("✅ Modbus RTU connection established successfully");
        Ok(Self {
            port: Arc::new(Mutex::new(port)),
        })
    }

    async fn transact(&self, request: ModbusRequest) -> Result<ModbusResponse, ModbusError> {
        let port = Arc::clone(&self.port);
        tokio::task::spawn_blocking(move || {
            let mut port = port.lock().map_err(|_| ModbusError::LockError)?;
            // Drop stale bytes left over from a previous timed out exchange
            port.clear(serialport::ClearBuffer::Input)
                .map_err(|e| ModbusError::CommunicationError(format!("Clear failed: {}", e)))?;
            exchange(&mut **port, &request)
        })
        .await
        .map_err(|e| ModbusError::CommunicationError(format!("Serial task failed: {}", e)))?
    }
}

/// Sends one request frame and reads back exactly one response frame.
pub(crate) fn exchange<P>(port: &mut P, request: &ModbusRequest) -> Result<ModbusResponse, ModbusError>
where
    P: Read + Write + ?Sized,
{
    let frame = request.encode();
    debug!("📤 TX [{}]: {}", request.slave_id(), hex::encode(&frame));

    port.write_all(&frame)?;
    port.flush()?;

    let mut response = vec![0u8; 2];
    match read_available(port, &mut response)? {
        0 => return Err(ModbusError::Timeout),
        1 => return Err(truncated(&response[..1], 2)),
        _ => {}
    }

    let total_len = if response[1] & EXCEPTION_FLAG != 0 {
        EXCEPTION_RESPONSE_LEN
    } else {
        request.expected_response_len()
    };
    response.resize(total_len, 0);
    let received = 2 + read_available(port, &mut response[2..])?;
    if received < total_len {
        return Err(truncated(&response[..received], total_len));
    }

    debug!("📥 RX [{}]: {}", request.slave_id(), hex::encode(&response));
    request.decode_response(&response)
}

/// Fills `buf` until it is full or the line goes quiet, returning how many
/// bytes arrived. Only errors other than a timeout are propagated.
fn read_available<P>(port: &mut P, buf: &mut [u8]) -> Result<usize, ModbusError>
where
    P: Read + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match port.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn truncated(partial: &[u8], expected: usize) -> ModbusError {
    debug!("📥 RX (partial): {}", hex::encode(partial));
    ModbusError::MalformedFrame(format!("truncated frame: {} of {} bytes", partial.len(), expected))
}

#[async_trait]
impl ModbusClientTrait for ModbusClient {
    async fn read_holding_registers(
        &self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        debug!("📊 Reading {} registers from device {} starting at address {}", count, slave_id, start_addr);

        let request = ModbusRequest::read(slave_id, start_addr, count)?;
        match self.transact(request).await? {
            ModbusResponse::Registers(values) => Ok(values),
            other => Err(ModbusError::MalformedFrame(format!("unexpected response {:?}", other))),
        }
    }

    async fn write_multiple_registers(
        &self,
        slave_id: u8,
        start_addr: u16,
        values: &[u16],
    ) -> Result<(), ModbusError> {
        debug!("📝 Writing {} registers to device {} starting at address {}", values.len(), slave_id, start_addr);

        let request = ModbusRequest::write(slave_id, start_addr, values)?;
        match self.transact(request).await? {
            ModbusResponse::WriteAck { .. } => Ok(()),
            other => Err(ModbusError::MalformedFrame(format!("unexpected response {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::crc::crc16_modbus;
    use crate::modbus::status::ConnectionStatus;
    use std::io;

    /// In-memory serial line: scripted reply bytes, captured request bytes.
    struct LoopbackPort {
        reply: io::Cursor<Vec<u8>>,
        sent: Vec<u8>,
    }

    impl LoopbackPort {
        fn replying(reply: Vec<u8>) -> Self {
            Self {
                reply: io::Cursor::new(reply),
                sent: Vec::new(),
            }
        }
    }

    impl Read for LoopbackPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.reply.read(buf)?;
            if n == 0 && !buf.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply"));
            }
            Ok(n)
        }
    }

    impl Write for LoopbackPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn with_crc(mut frame: Vec<u8>) -> Vec<u8> {
        let crc = crc16_modbus(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    #[test]
    fn test_exchange_reads_registers() {
        let mut port = LoopbackPort::replying(with_crc(vec![0x01, 0x03, 0x02, 0x08, 0x66]));
        let request = ModbusRequest::read(1, 100, 1).unwrap();

        let response = exchange(&mut port, &request).unwrap();
        assert_eq!(response, ModbusResponse::Registers(vec![2150]));
        assert_eq!(port.sent, request.encode().to_vec());
    }

    #[test]
    fn test_exchange_reads_short_exception_frame() {
        let mut port = LoopbackPort::replying(with_crc(vec![0x01, 0x83, 0x04]));
        let request = ModbusRequest::read(1, 100, 8).unwrap();

        assert!(matches!(exchange(&mut port, &request), Err(ModbusError::Exception(_))));
    }

    #[test]
    fn test_exchange_silent_slave_times_out() {
        let mut port = LoopbackPort::replying(Vec::new());
        let request = ModbusRequest::read(1, 100, 1).unwrap();

        assert!(matches!(exchange(&mut port, &request), Err(ModbusError::Timeout)));
    }

    #[test]
    fn test_exchange_partial_reply_is_malformed() {
        // Header and two data bytes of an 8 register answer, then silence
        let mut port = LoopbackPort::replying(vec![0x01, 0x03, 0x10, 0x08]);
        let request = ModbusRequest::read(1, 100, 8).unwrap();

        let err = exchange(&mut port, &request).unwrap_err();
        assert!(matches!(err, ModbusError::MalformedFrame(_)));
        assert_eq!(ConnectionStatus::from(&err), ConnectionStatus::InvalidCrc);
    }

    #[test]
    fn test_exchange_single_byte_reply_is_malformed() {
        let mut port = LoopbackPort::replying(vec![0x01]);
        let request = ModbusRequest::read(1, 100, 1).unwrap();

        assert!(matches!(exchange(&mut port, &request), Err(ModbusError::MalformedFrame(_))));
    }
}
