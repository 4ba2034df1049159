//! Simulated Bluetooth platform
//!
//! In-memory adapter and broadcast channel. Used by the tests and by the
//! binary on hosts without a native backend.

use crate::domain::error::{DiscoveryError, Result};
use crate::domain::platform::{
    BluetoothAdapter, BroadcastAction, BroadcastChannel, BroadcastReceiver, DevicePayload,
    Notification, PlatformDevice, RegistrationId, TYPED_PAYLOAD_VERSION,
};
use crate::infrastructure::bluetooth::registry::ReceiverRegistry;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Default)]
struct AdapterState {
    bonded: Vec<PlatformDevice>,
    discovering: bool,
    start_requests: usize,
    cancel_requests: usize,
    bonded_queries: usize,
    powered_off: bool,
    refuse_registrations: bool,
}

/// Shared handle to one simulated platform. Clones see the same state.
#[derive(Clone)]
pub struct SimulatedPlatform {
    platform_version: u32,
    adapter: Arc<Mutex<AdapterState>>,
    registry: ReceiverRegistry,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new(TYPED_PAYLOAD_VERSION)
    }
}

impl SimulatedPlatform {
    pub fn new(platform_version: u32) -> Self {
        Self {
            platform_version,
            adapter: Arc::new(Mutex::new(AdapterState::default())),
            registry: ReceiverRegistry::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AdapterState> {
        self.adapter.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the bonded device set
    pub fn set_bonded(&self, devices: Vec<PlatformDevice>) {
        self.lock().bonded = devices;
    }

    /// While powered off every adapter request fails
    pub fn set_powered_off(&self, powered_off: bool) {
        self.lock().powered_off = powered_off;
    }

    /// While set, the broadcast channel rejects new registrations
    pub fn set_registrations_refused(&self, refused: bool) {
        self.lock().refuse_registrations = refused;
    }

    pub fn is_discovering(&self) -> bool {
        self.lock().discovering
    }

    pub fn start_requests(&self) -> usize {
        self.lock().start_requests
    }

    pub fn cancel_requests(&self) -> usize {
        self.lock().cancel_requests
    }

    pub fn bonded_queries(&self) -> usize {
        self.lock().bonded_queries
    }

    pub fn registration_count(&self) -> usize {
        self.registry.len()
    }

    /// Deliver a raw notification. Returns how many receivers saw it.
    pub fn broadcast(&self, notification: &Notification) -> usize {
        self.registry.dispatch(notification)
    }

    /// Announce a device the way this platform version encodes payloads
    pub fn announce(&self, device: &PlatformDevice) -> usize {
        let payload = if self.platform_version >= TYPED_PAYLOAD_VERSION {
            DevicePayload::Handle(device.clone())
        } else {
            match serde_json::to_vec(device) {
                Ok(bytes) => DevicePayload::Encoded(bytes),
                Err(e) => {
                    debug!("Could not encode {:?}: {}", device, e);
                    return 0;
                }
            }
        };
        self.broadcast(&Notification::device_found(payload))
    }

    /// Announce `devices` in a loop, one per tick, while discovery is active.
    /// Runs until the task is aborted.
    pub fn advertise(
        &self,
        devices: Vec<PlatformDevice>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let platform = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut next = devices.iter().cycle();
            loop {
                ticker.tick().await;
                if !platform.is_discovering() {
                    continue;
                }
                if let Some(device) = next.next() {
                    platform.announce(device);
                }
            }
        })
    }

    fn powered_off_error() -> DiscoveryError {
        DiscoveryError::Adapter("adapter is powered off".to_string())
    }
}

impl BluetoothAdapter for SimulatedPlatform {
    fn start_discovery(&mut self) -> Result<()> {
        {
            let mut state = self.lock();
            state.start_requests += 1;
            if state.powered_off {
                return Err(Self::powered_off_error());
            }
            if state.discovering {
                return Ok(());
            }
            state.discovering = true;
        }

        info!("Simulated adapter: discovery started");
        self.broadcast(&Notification::new(BroadcastAction::DiscoveryStarted, None));
        Ok(())
    }

    fn cancel_discovery(&mut self) -> Result<()> {
        {
            let mut state = self.lock();
            state.cancel_requests += 1;
            if state.powered_off {
                return Err(Self::powered_off_error());
            }
            if !state.discovering {
                return Ok(());
            }
            state.discovering = false;
        }

        info!("Simulated adapter: discovery finished");
        self.broadcast(&Notification::new(BroadcastAction::DiscoveryFinished, None));
        Ok(())
    }

    fn bonded_devices(&self) -> Result<Vec<PlatformDevice>> {
        let mut state = self.lock();
        state.bonded_queries += 1;
        if state.powered_off {
            return Err(Self::powered_off_error());
        }
        Ok(state.bonded.clone())
    }
}

impl BroadcastChannel for SimulatedPlatform {
    fn platform_version(&self) -> u32 {
        self.platform_version
    }

    fn register(
        &mut self,
        action: BroadcastAction,
        receiver: Arc<dyn BroadcastReceiver>,
    ) -> Result<RegistrationId> {
        if self.lock().refuse_registrations {
            return Err(DiscoveryError::Broadcast(format!(
                "registration for {:?} refused",
                action
            )));
        }
        Ok(self.registry.register(action, receiver))
    }

    fn unregister(&mut self, id: RegistrationId) -> Result<()> {
        self.registry.unregister(id)
    }
}
