//! Supervisory side: the processed register table and the Modbus TCP slave
//! that serves it.

pub mod register_map;
pub mod server;

pub use register_map::{FieldValue, RecordId, RecordLayout, RecordSnapshot, RegisterMap, RAIN_FIELDS};
pub use server::{start_slave_server, SlaveService};
