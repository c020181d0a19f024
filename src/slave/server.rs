//! Modbus TCP slave answering the supervisory PLC from the register map.
//!
//! Holding (0x03) and input (0x04) register reads both see the same table.
//! The table is read-only from the network, so every write is refused.

use log::{debug, error, info, warn};
use std::future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use super::register_map::RegisterMap;
use crate::modbus::status::SlaveException;
use crate::utils::error::ModbusError;

#[derive(Clone)]
pub struct SlaveService {
    registers: RegisterMap,
}

impl SlaveService {
    pub fn new(registers: RegisterMap) -> Self {
        Self { registers }
    }

    fn read(&self, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
        self.registers.read(addr, cnt).map_err(|e| match e {
            ModbusError::Exception(SlaveException::IllegalDataAddress) => ExceptionCode::IllegalDataAddress,
            ModbusError::Exception(SlaveException::IllegalDataValue) => ExceptionCode::IllegalDataValue,
            other => {
                error!("❌ Register map read failed: {}", other);
                ExceptionCode::ServerDeviceFailure
            }
        })
    }
}

impl tokio_modbus::server::Service for SlaveService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("📨 Slave request: {:?}", req);

        let res = match req {
            Request::ReadHoldingRegisters(addr, cnt) => self.read(addr, cnt).map(Response::ReadHoldingRegisters),
            Request::ReadInputRegisters(addr, cnt) => self.read(addr, cnt).map(Response::ReadInputRegisters),
            _ => Err(ExceptionCode::IllegalFunction),
        };

        if let Err(e) = &res {
            warn!("⚠️  Slave request refused: {:?}", e);
        }

        future::ready(res)
    }
}

/// Binds `addr` and serves the register map until the returned task is
/// aborted. Binding happens before this returns, so an unusable address is
/// reported to the caller.
pub async fn start_slave_server(
    addr: SocketAddr,
    registers: RegisterMap,
) -> Result<(SocketAddr, JoinHandle<()>), ModbusError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ModbusError::ConnectionError(format!("Failed to bind {}: {}", addr, e)))?;
    let local_addr = listener.local_addr()?;
    info!("🌐 Modbus TCP slave listening on {} ({} registers)", local_addr, registers.len());

    let server = Server::new(listener);
    let handle = tokio::spawn(async move {
        let on_connected = move |stream, socket_addr: SocketAddr| {
            let service = SlaveService::new(registers.clone());
            async move {
                info!("🔗 Supervisory client connected: {}", socket_addr);
                accept_tcp_connection(stream, socket_addr, move |_socket_addr| Ok(Some(service.clone())))
            }
        };

        let on_process_error = |err| {
            error!("❌ Modbus TCP slave error: {}", err);
        };

        if let Err(e) = server.serve(&on_connected, on_process_error).await {
            error!("❌ Modbus TCP slave stopped: {}", e);
        }
    });

    Ok((local_addr, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::anemometer::ANEMOMETER_FIELDS;
    use crate::modbus::status::ConnectionStatus;
    use crate::slave::register_map::RAIN_FIELDS;
    use std::borrow::Cow;
    use tokio_modbus::server::Service;

    fn service() -> SlaveService {
        let map = RegisterMap::new(vec![
            ("Anemometer".to_string(), &ANEMOMETER_FIELDS[..]),
            ("Rain".to_string(), &RAIN_FIELDS[..]),
        ]);
        map.publish_record(0, ConnectionStatus::Success, &[42]).unwrap();
        SlaveService::new(map)
    }

    #[tokio::test]
    async fn test_holding_and_input_reads_share_the_table() {
        let service = service();
        let holding = service.call(Request::ReadHoldingRegisters(0, 3)).await;
        assert_eq!(holding, Ok(Response::ReadHoldingRegisters(vec![0x00, 42, 0xFF])));

        let input = service.call(Request::ReadInputRegisters(1, 1)).await;
        assert_eq!(input, Ok(Response::ReadInputRegisters(vec![42])));
    }

    #[tokio::test]
    async fn test_out_of_range_read() {
        let service = service();
        let res = service.call(Request::ReadHoldingRegisters(7, 2)).await;
        assert_eq!(res, Err(ExceptionCode::IllegalDataAddress));

        let res = service.call(Request::ReadHoldingRegisters(0, 0)).await;
        assert_eq!(res, Err(ExceptionCode::IllegalDataValue));
    }

    #[tokio::test]
    async fn test_writes_are_refused() {
        let service = service();
        let res = service
            .call(Request::WriteMultipleRegisters(0, Cow::Owned(vec![1, 2])))
            .await;
        assert_eq!(res, Err(ExceptionCode::IllegalFunction));

        let res = service.call(Request::WriteSingleRegister(1, 7)).await;
        assert_eq!(res, Err(ExceptionCode::IllegalFunction));
        assert_eq!(service.registers.read(1, 1).unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let map = RegisterMap::new(vec![("Rain".to_string(), &RAIN_FIELDS[..])]);
        let (addr, handle) = start_slave_server("127.0.0.1:0".parse().unwrap(), map).await.unwrap();
        assert_ne!(addr.port(), 0);
        handle.abort();
    }
}
