//! Bluetooth device discovery controller.
//!
//! Starts and stops adapter discovery behind runtime permission checks and
//! publishes two deduplicated device collections: devices found during
//! discovery and devices bonded with this host.

pub mod domain;
pub mod infrastructure;

pub use domain::controller::{BluetoothController, DiscoveryController, DiscoveryHandle};
pub use domain::error::DiscoveryError;
pub use domain::models::{Capability, Device, DeviceList, Outcome};
