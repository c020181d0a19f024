pub mod anemometer;
pub mod bme280;
pub mod traits;
pub mod wind_vane;

pub use anemometer::AnemometerDevice;
pub use bme280::Bme280Device;
pub use traits::{DeviceDescriptor, DeviceKind, FieldSpec, PollableDevice};
pub use wind_vane::{WindDirection, WindVaneDevice};

use crate::config::settings::DeviceConfig;

/// Field layout of a device kind, in register order.
pub fn field_specs(kind: DeviceKind) -> &'static [FieldSpec] {
    match kind {
        DeviceKind::Bme280 => &bme280::BME280_FIELDS,
        DeviceKind::Anemometer => &anemometer::ANEMOMETER_FIELDS,
        DeviceKind::WindVane => &wind_vane::WIND_VANE_FIELDS,
    }
}

pub fn create_device(config: &DeviceConfig) -> Box<dyn PollableDevice> {
    let descriptor = DeviceDescriptor::from_config(config);
    match config.kind {
        DeviceKind::Bme280 => Box::new(Bme280Device::new(descriptor)),
        DeviceKind::Anemometer => Box::new(AnemometerDevice::new(descriptor)),
        DeviceKind::WindVane => Box::new(WindVaneDevice::new(descriptor)),
    }
}
