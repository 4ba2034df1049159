//! Bluetooth Module
//!
//! Platform backends implementing the discovery controller's ports.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  DiscoveryController                     │
//! │   (BluetoothAdapter + BroadcastChannel + PermissionGate) │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         │             │              │
//!         ▼             ▼              ▼
//! ┌────────────┐ ┌─────────────┐ ┌─────────────┐
//! │   WinRT    │ │  Simulated  │ │ Permissions │
//! │            │ │             │ │             │
//! │ - Watcher  │ │ - Scripted  │ │ - Static    │
//! │ - Paired   │ │   adverts   │ │   grants    │
//! │   devices  │ │ - Bonded    │ │ - App       │
//! │            │ │   set       │ │   capability│
//! └────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`registry`] - Receiver registrations shared by the backends
//! - [`simulated`] - In-memory platform
//! - [`permissions`] - Runtime-toggleable permission gate
//! - `winrt` - Windows backend (Windows only)

pub mod permissions;
pub mod registry;
pub mod simulated;
#[cfg(windows)]
pub mod winrt;

pub use permissions::StaticPermissions;
pub use simulated::SimulatedPlatform;
#[cfg(windows)]
pub use winrt::{AppCapabilityPermissions, WinRtBluetooth};
