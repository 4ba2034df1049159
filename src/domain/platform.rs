//! Platform Ports
//!
//! Everything the discovery controller needs from the host OS, expressed as
//! small traits so backends (WinRT, simulated) can be swapped and faked.

use crate::domain::error::Result;
use crate::domain::models::{Capability, Device};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// First platform version that delivers device payloads as typed handles
pub const TYPED_PAYLOAD_VERSION: u32 = 33;

/// Device handle as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDevice {
    #[serde(default)]
    pub name: Option<String>,
    pub address: String,
}

impl PlatformDevice {
    pub fn new(name: Option<&str>, address: &str) -> Self {
        Self {
            name: name.map(str::to_string),
            address: address.to_string(),
        }
    }
}

impl From<&PlatformDevice> for Device {
    fn from(handle: &PlatformDevice) -> Self {
        Device::new(handle.name.clone(), handle.address.clone())
    }
}

impl From<PlatformDevice> for Device {
    fn from(handle: PlatformDevice) -> Self {
        Device::new(handle.name, handle.address)
    }
}

/// Broadcast actions a receiver can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastAction {
    DeviceFound,
    DiscoveryStarted,
    DiscoveryFinished,
}

/// Device payload attached to a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicePayload {
    /// Typed handle
    Handle(PlatformDevice),
    /// Serialized JSON record, as older platform versions deliver it
    Encoded(Vec<u8>),
}

/// A single OS broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub action: BroadcastAction,
    pub payload: Option<DevicePayload>,
}

impl Notification {
    pub fn new(action: BroadcastAction, payload: Option<DevicePayload>) -> Self {
        Self { action, payload }
    }

    pub fn device_found(payload: DevicePayload) -> Self {
        Self::new(BroadcastAction::DeviceFound, Some(payload))
    }
}

/// Identifies one receiver registration on a broadcast channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receives broadcasts on the OS event context
pub trait BroadcastReceiver: Send + Sync {
    fn on_receive(&self, notification: &Notification);
}

/// OS broadcast subscription management
pub trait BroadcastChannel: Send {
    /// Platform version, used to pick the payload decode strategy
    fn platform_version(&self) -> u32;

    fn register(
        &mut self,
        action: BroadcastAction,
        receiver: Arc<dyn BroadcastReceiver>,
    ) -> Result<RegistrationId>;

    fn unregister(&mut self, id: RegistrationId) -> Result<()>;
}

/// Handle to the local Bluetooth adapter.
///
/// Start and cancel are requests: they return once the OS accepted them and
/// do not wait for the scan to actually begin or end.
pub trait BluetoothAdapter: Send {
    fn start_discovery(&mut self) -> Result<()>;

    fn cancel_discovery(&mut self) -> Result<()>;

    /// Currently bonded devices in OS order
    fn bonded_devices(&self) -> Result<Vec<PlatformDevice>>;
}

/// Runtime permission query. Must reflect the grant state at call time.
pub trait PermissionGate: Send + Sync {
    fn has_permission(&self, capability: Capability) -> bool;
}

impl<F> PermissionGate for F
where
    F: Fn(Capability) -> bool + Send + Sync,
{
    fn has_permission(&self, capability: Capability) -> bool {
        self(capability)
    }
}
