use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A remote Bluetooth device as seen by the discovery controller.
///
/// Identity is the hardware address alone: two values with the same address
/// are the same device even if one of them carries no name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub name: Option<String>,
    pub address: String,
}

impl Device {
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        Self {
            name,
            address: address.into(),
        }
    }

    /// Name used in logs and listings
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown device")
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.address)
    }
}

/// Snapshot of one observable device collection.
///
/// Collections are never mutated in place; every update publishes a new list.
pub type DeviceList = Arc<Vec<Device>>;

/// Render a 48-bit hardware address as `AA:BB:CC:DD:EE:FF`
pub fn format_address(raw: u64) -> String {
    let bytes = raw.to_be_bytes();
    bytes[2..]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Runtime permissions the controller checks before touching the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Required to start and cancel discovery
    Scan,
    /// Required to enumerate bonded devices
    Connect,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan => write!(f, "BLUETOOTH_SCAN"),
            Self::Connect => write!(f, "BLUETOOTH_CONNECT"),
        }
    }
}

/// What a controller operation ended up doing.
///
/// Operations never fail towards the caller; a denied permission or a
/// redundant call degrades to a no-op that is reported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Denied(Capability),
    /// `release` was called with no receiver registered
    NotRegistered,
    /// The controller was released; its receiver cannot be registered again
    AlreadyReleased,
}

/// Commands accepted by the discovery service loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryCommand {
    StartDiscovery,
    StopDiscovery,
    Release,
}

/// Messages delivered from the OS event context into the controller
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    DeviceFound(Device),
}
