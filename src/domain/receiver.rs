//! Found-device receiver
//!
//! Decodes device-found broadcasts into [`Device`] values and hands each one
//! to a callback. Runs on the OS event context, so the callback is expected
//! to forward the device elsewhere rather than touch shared state.

use crate::domain::error::{DiscoveryError, Result};
use crate::domain::models::Device;
use crate::domain::platform::{
    BroadcastAction, BroadcastReceiver, DevicePayload, Notification, PlatformDevice,
    TYPED_PAYLOAD_VERSION,
};
use tracing::{debug, info};

/// How the device handle is pulled out of a notification payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Only typed handles are accepted
    Typed,
    /// Untyped lookup: typed handles pass through, encoded records are parsed
    Legacy,
}

impl DecodeStrategy {
    pub fn for_platform(version: u32) -> Self {
        if version >= TYPED_PAYLOAD_VERSION {
            Self::Typed
        } else {
            Self::Legacy
        }
    }

    /// Decode a payload. `Ok(None)` means no device is attached.
    pub fn decode(self, payload: Option<&DevicePayload>) -> Result<Option<PlatformDevice>> {
        let device = match (self, payload) {
            (_, None) => return Ok(None),
            (_, Some(DevicePayload::Handle(handle))) => handle.clone(),
            (Self::Typed, Some(DevicePayload::Encoded(_))) => return Ok(None),
            (Self::Legacy, Some(DevicePayload::Encoded(bytes))) => {
                serde_json::from_slice::<PlatformDevice>(bytes)?
            }
        };

        if device.address.trim().is_empty() {
            return Err(DiscoveryError::MissingAddress);
        }
        Ok(Some(device))
    }
}

type DeviceCallback = Box<dyn Fn(Device) + Send + Sync>;

pub struct FoundDeviceReceiver {
    strategy: DecodeStrategy,
    on_device_found: DeviceCallback,
}

impl FoundDeviceReceiver {
    pub fn new<F>(strategy: DecodeStrategy, on_device_found: F) -> Self
    where
        F: Fn(Device) + Send + Sync + 'static,
    {
        Self {
            strategy,
            on_device_found: Box::new(on_device_found),
        }
    }
}

impl BroadcastReceiver for FoundDeviceReceiver {
    fn on_receive(&self, notification: &Notification) {
        if notification.action != BroadcastAction::DeviceFound {
            return;
        }

        match self.strategy.decode(notification.payload.as_ref()) {
            Ok(Some(handle)) => {
                info!("on_receive: device = {:?}", handle);
                (self.on_device_found)(Device::from(handle));
            }
            Ok(None) => debug!("on_receive: notification carried no device"),
            Err(e) => debug!("on_receive: dropping notification: {}", e),
        }
    }
}
