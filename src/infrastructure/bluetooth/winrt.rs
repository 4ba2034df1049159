//! WinRT Bluetooth backend
//!
//! Discovery runs on a `BluetoothLEAdvertisementWatcher`; every received
//! advertisement becomes a device-found notification for the registered
//! receivers. Bonded devices come from the paired-device selector.

use crate::domain::error::Result;
use crate::domain::models::{format_address, Capability};
use crate::domain::platform::{
    BluetoothAdapter, BroadcastAction, BroadcastChannel, BroadcastReceiver, DevicePayload,
    Notification, PermissionGate, PlatformDevice, RegistrationId, TYPED_PAYLOAD_VERSION,
};
use crate::domain::settings::ScanningMode;
use crate::infrastructure::bluetooth::registry::ReceiverRegistry;
use std::sync::Arc;
use tracing::{debug, info, warn};
use windows::core::{Ref, HSTRING};
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEAdvertisementWatcherStoppedEventArgs, BluetoothLEScanningMode,
};
use windows::Devices::Bluetooth::BluetoothDevice;
use windows::Devices::Enumeration::DeviceInformation;
use windows::Foundation::TypedEventHandler;
use windows::Security::Authorization::AppCapabilityAccess::{
    AppCapability, AppCapabilityAccessStatus,
};

fn non_empty(name: String) -> Option<String> {
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Advertisement watcher plus the receivers listening to it
#[derive(Clone)]
pub struct WinRtBluetooth {
    watcher: BluetoothLEAdvertisementWatcher,
    registry: ReceiverRegistry,
}

impl WinRtBluetooth {
    pub fn new(mode: ScanningMode) -> Result<Self> {
        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(match mode {
            ScanningMode::Active => BluetoothLEScanningMode::Active,
            ScanningMode::Passive => BluetoothLEScanningMode::Passive,
        })?;

        let registry = ReceiverRegistry::default();

        let found = registry.clone();
        let received = TypedEventHandler::new(
            move |_: Ref<BluetoothLEAdvertisementWatcher>,
                  args: Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let name = args.Advertisement()?.LocalName()?.to_string();
                    let device = PlatformDevice {
                        name: non_empty(name),
                        address: format_address(args.BluetoothAddress()?),
                    };
                    found.dispatch(&Notification::device_found(DevicePayload::Handle(device)));
                }
                Ok(())
            },
        );
        watcher.Received(&received)?;

        let finished = registry.clone();
        let stopped = TypedEventHandler::new(
            move |_: Ref<BluetoothLEAdvertisementWatcher>,
                  args: Ref<BluetoothLEAdvertisementWatcherStoppedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    debug!("Advertisement watcher stopped: {:?}", args.Error()?);
                }
                finished.dispatch(&Notification::new(BroadcastAction::DiscoveryFinished, None));
                Ok(())
            },
        );
        watcher.Stopped(&stopped)?;

        Ok(Self { watcher, registry })
    }
}

impl BluetoothAdapter for WinRtBluetooth {
    fn start_discovery(&mut self) -> Result<()> {
        info!("Starting BLE advertisement watcher...");
        self.watcher.Start()?;
        self.registry
            .dispatch(&Notification::new(BroadcastAction::DiscoveryStarted, None));
        Ok(())
    }

    fn cancel_discovery(&mut self) -> Result<()> {
        info!("Stopping BLE advertisement watcher...");
        self.watcher.Stop()?;
        Ok(())
    }

    fn bonded_devices(&self) -> Result<Vec<PlatformDevice>> {
        let selector = BluetoothDevice::GetDeviceSelectorFromPairingState(true)?;
        let infos = DeviceInformation::FindAllAsyncAqsFilter(&selector)?.join()?;

        let mut devices = Vec::new();
        for i in 0..infos.Size()? {
            let info = infos.GetAt(i)?;
            let device = match BluetoothDevice::FromIdAsync(&info.Id()?)?.join() {
                Ok(device) => device,
                Err(e) => {
                    warn!("Skipping paired device {:?}: {}", info.Name()?, e);
                    continue;
                }
            };
            devices.push(PlatformDevice {
                name: non_empty(info.Name()?.to_string()),
                address: format_address(device.BluetoothAddress()?),
            });
        }
        Ok(devices)
    }
}

impl BroadcastChannel for WinRtBluetooth {
    fn platform_version(&self) -> u32 {
        // Advertisements always arrive as typed handles
        TYPED_PAYLOAD_VERSION
    }

    fn register(
        &mut self,
        action: BroadcastAction,
        receiver: Arc<dyn BroadcastReceiver>,
    ) -> Result<RegistrationId> {
        Ok(self.registry.register(action, receiver))
    }

    fn unregister(&mut self, id: RegistrationId) -> Result<()> {
        self.registry.unregister(id)
    }
}

/// Checks app capability consent on every call
pub struct AppCapabilityPermissions;

impl AppCapabilityPermissions {
    fn capability_name(capability: Capability) -> &'static str {
        match capability {
            Capability::Scan => "radios",
            Capability::Connect => "bluetooth",
        }
    }
}

impl PermissionGate for AppCapabilityPermissions {
    fn has_permission(&self, capability: Capability) -> bool {
        let name = HSTRING::from(Self::capability_name(capability));
        let status = AppCapability::Create(&name).and_then(|c| c.CheckAccess());

        match status {
            Ok(AppCapabilityAccessStatus::Allowed) => true,
            // Unpackaged processes have no manifest to declare capabilities in
            Ok(AppCapabilityAccessStatus::NotDeclaredByApp) => true,
            Ok(other) => {
                debug!("{} access status: {:?}", capability, other);
                false
            }
            Err(e) => {
                warn!("Could not query {} access: {}", capability, e);
                false
            }
        }
    }
}
