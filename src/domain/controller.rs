//! Discovery Controller
//!
//! Owns the scanned and paired device collections, gates every adapter call
//! on a permission check, and drives the found-device receiver.
//!
//! ## Execution model
//!
//! ```text
//!  DiscoveryHandle ──commands──▶ ┌─────────────────────┐ ──watch──▶ observers
//!                                │ DiscoveryController │
//!  FoundDeviceReceiver ─events─▶ └─────────────────────┘
//!   (OS event thread)                 single owner
//! ```
//!
//! The receiver never touches controller state. It sends each decoded device
//! as a message, and the owner publishes a fresh collection per change.

use crate::domain::models::{
    Capability, ControllerEvent, Device, DeviceList, DiscoveryCommand, Outcome,
};
use crate::domain::platform::{
    BluetoothAdapter, BroadcastAction, BroadcastChannel, PermissionGate, RegistrationId,
};
use crate::domain::receiver::{DecodeStrategy, FoundDeviceReceiver};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Outbound interface consumed by the UI layer
pub trait BluetoothController {
    fn scanned_devices(&self) -> watch::Receiver<DeviceList>;

    fn paired_devices(&self) -> watch::Receiver<DeviceList>;

    fn start_discovery(&self);

    fn stop_discovery(&self);

    fn release(&self);
}

/// Receiver registration lifecycle. `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered(RegistrationId),
    Released,
}

pub struct DiscoveryController {
    adapter: Box<dyn BluetoothAdapter>,
    broadcasts: Box<dyn BroadcastChannel>,
    permissions: Arc<dyn PermissionGate>,

    receiver: Arc<FoundDeviceReceiver>,
    registration: RegistrationState,
    scanning: bool,

    events: Option<mpsc::UnboundedReceiver<ControllerEvent>>,
    scanned: watch::Sender<DeviceList>,
    paired: watch::Sender<DeviceList>,
}

impl DiscoveryController {
    /// Create a controller and load the current paired set
    pub fn new(
        adapter: Box<dyn BluetoothAdapter>,
        broadcasts: Box<dyn BroadcastChannel>,
        permissions: Arc<dyn PermissionGate>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let strategy = DecodeStrategy::for_platform(broadcasts.platform_version());
        let receiver = FoundDeviceReceiver::new(strategy, move |device| {
            let _ = event_tx.send(ControllerEvent::DeviceFound(device));
        });

        let (scanned, _) = watch::channel(DeviceList::default());
        let (paired, _) = watch::channel(DeviceList::default());

        let mut controller = Self {
            adapter,
            broadcasts,
            permissions,
            receiver: Arc::new(receiver),
            registration: RegistrationState::Unregistered,
            scanning: false,
            events: Some(event_rx),
            scanned,
            paired,
        };
        controller.refresh_paired_devices();
        controller
    }

    pub fn scanned_devices(&self) -> watch::Receiver<DeviceList> {
        self.scanned.subscribe()
    }

    pub fn paired_devices(&self) -> watch::Receiver<DeviceList> {
        self.paired.subscribe()
    }

    pub fn registration_state(&self) -> RegistrationState {
        self.registration
    }

    /// Whether a scan was requested and not cancelled through this controller
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Register the found-device receiver if needed, refresh the paired set
    /// and ask the adapter to scan.
    ///
    /// A failed registration is logged and leaves the state `Unregistered`;
    /// the scan is still requested and the outcome is still `Applied`. The
    /// next call retries the registration.
    pub fn start_discovery(&mut self) -> Outcome {
        const TAG: &str = "start_discovery";

        if !self.permissions.has_permission(Capability::Scan) {
            info!("{}: Don't have {} permission", TAG, Capability::Scan);
            return Outcome::Denied(Capability::Scan);
        }
        if self.registration == RegistrationState::Released {
            warn!("{}: controller already released", TAG);
            return Outcome::AlreadyReleased;
        }

        info!("{}: starting discovery...", TAG);

        if self.registration == RegistrationState::Unregistered {
            let receiver = self.receiver.clone();
            match self.broadcasts.register(BroadcastAction::DeviceFound, receiver) {
                Ok(id) => {
                    debug!("{}: receiver registered as {}", TAG, id);
                    self.registration = RegistrationState::Registered(id);
                }
                Err(e) => error!("{}: failed to register receiver: {}", TAG, e),
            }
        }

        self.refresh_paired_devices();

        match self.adapter.start_discovery() {
            Ok(()) => self.scanning = true,
            Err(e) => error!("{}: adapter refused to start: {}", TAG, e),
        }

        Outcome::Applied
    }

    pub fn stop_discovery(&mut self) -> Outcome {
        const TAG: &str = "stop_discovery";

        if !self.permissions.has_permission(Capability::Scan) {
            info!("{}: Don't have {} permission", TAG, Capability::Scan);
            return Outcome::Denied(Capability::Scan);
        }

        info!("{}: stopping discovery...", TAG);

        match self.adapter.cancel_discovery() {
            Ok(()) => self.scanning = false,
            Err(e) => error!("{}: adapter refused to cancel: {}", TAG, e),
        }

        Outcome::Applied
    }

    /// Unregister the found-device receiver.
    ///
    /// Calling this with no active registration is a no-op. After a
    /// successful release the controller cannot start discovery again.
    pub fn release(&mut self) -> Outcome {
        let RegistrationState::Registered(id) = self.registration else {
            debug!("release: no receiver registered");
            return Outcome::NotRegistered;
        };

        if let Err(e) = self.broadcasts.unregister(id) {
            error!("release: failed to unregister receiver {}: {}", id, e);
        }
        self.registration = RegistrationState::Released;
        info!("release: receiver {} unregistered", id);

        Outcome::Applied
    }

    /// Add a newly found device. The first entry seen for an address wins.
    pub fn on_device_found(&mut self, device: Device) -> bool {
        info!("on_device_found: device = {}", device);

        let current = self.scanned.borrow().clone();
        if current.contains(&device) {
            return false;
        }

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(device);
        self.scanned.send_replace(Arc::new(next));
        true
    }

    /// Replace the paired collection with the adapter's bonded set
    pub fn refresh_paired_devices(&mut self) -> Outcome {
        const TAG: &str = "refresh_paired_devices";

        if !self.permissions.has_permission(Capability::Connect) {
            info!("{}: Don't have {} permission", TAG, Capability::Connect);
            return Outcome::Denied(Capability::Connect);
        }

        info!("{}: updating paired devices...", TAG);

        let bonded = match self.adapter.bonded_devices() {
            Ok(bonded) => bonded,
            Err(e) => {
                error!("{}: failed to enumerate bonded devices: {}", TAG, e);
                return Outcome::Applied;
            }
        };

        let mut devices: Vec<Device> = Vec::with_capacity(bonded.len());
        for device in bonded.into_iter().map(Device::from) {
            if !devices.contains(&device) {
                devices.push(device);
            }
        }
        self.paired.send_replace(Arc::new(devices));

        Outcome::Applied
    }

    /// Apply device-found messages that are already queued
    pub fn process_pending_events(&mut self) -> usize {
        let mut pending = Vec::new();
        if let Some(events) = self.events.as_mut() {
            while let Ok(event) = events.try_recv() {
                pending.push(event);
            }
        }

        let count = pending.len();
        for event in pending {
            self.handle_event(event);
        }
        count
    }

    fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::DeviceFound(device) => {
                self.on_device_found(device);
            }
        }
    }

    fn handle_command(&mut self, command: DiscoveryCommand) -> Outcome {
        match command {
            DiscoveryCommand::StartDiscovery => self.start_discovery(),
            DiscoveryCommand::StopDiscovery => self.stop_discovery(),
            DiscoveryCommand::Release => self.release(),
        }
    }

    /// Run the owner loop until every handle is dropped
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<DiscoveryCommand>) {
        let Some(mut events) = self.events.take() else {
            error!("Discovery loop started without an event queue");
            return;
        };

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        let outcome = self.handle_command(command);
                        debug!("{:?} -> {:?}", command, outcome);
                    }
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        // Devices accepted before the last handle went away still count
        while let Ok(event) = events.try_recv() {
            self.handle_event(event);
        }

        info!("All discovery handles dropped, shutting down");
        self.release();
    }

    fn service_channel(&self) -> (DiscoveryHandle, mpsc::UnboundedReceiver<DiscoveryCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = DiscoveryHandle {
            commands: command_tx,
            scanned: self.scanned.subscribe(),
            paired: self.paired.subscribe(),
        };
        (handle, command_rx)
    }

    /// Run the controller as a task on the current tokio runtime
    pub fn spawn(self) -> DiscoveryHandle {
        let (handle, commands) = self.service_channel();
        tokio::spawn(self.run(commands));
        handle
    }

    /// Run the controller on a dedicated thread with its own runtime
    pub fn spawn_on_thread(self) -> anyhow::Result<(DiscoveryHandle, std::thread::JoinHandle<()>)> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (handle, commands) = self.service_channel();
        let thread = std::thread::Builder::new()
            .name("bluetooth-discovery".to_string())
            .spawn(move || rt.block_on(self.run(commands)))?;

        Ok((handle, thread))
    }
}

/// Cloneable front end to a running controller
#[derive(Clone)]
pub struct DiscoveryHandle {
    commands: mpsc::UnboundedSender<DiscoveryCommand>,
    scanned: watch::Receiver<DeviceList>,
    paired: watch::Receiver<DeviceList>,
}

impl DiscoveryHandle {
    fn send(&self, command: DiscoveryCommand) {
        if self.commands.send(command).is_err() {
            warn!("{:?} dropped: discovery loop is not running", command);
        }
    }
}

impl BluetoothController for DiscoveryHandle {
    fn scanned_devices(&self) -> watch::Receiver<DeviceList> {
        self.scanned.clone()
    }

    fn paired_devices(&self) -> watch::Receiver<DeviceList> {
        self.paired.clone()
    }

    fn start_discovery(&self) {
        self.send(DiscoveryCommand::StartDiscovery);
    }

    fn stop_discovery(&self) {
        self.send(DiscoveryCommand::StopDiscovery);
    }

    fn release(&self) {
        self.send(DiscoveryCommand::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::platform::{DevicePayload, Notification, PlatformDevice};
    use crate::infrastructure::bluetooth::{SimulatedPlatform, StaticPermissions};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const A: &str = "00:00:00:00:00:0A";
    const B: &str = "00:00:00:00:00:0B";
    const X: &str = "00:00:00:00:00:1A";
    const Y: &str = "00:00:00:00:00:1B";
    const Z: &str = "00:00:00:00:00:1C";

    fn dev(name: &str, address: &str) -> PlatformDevice {
        PlatformDevice::new(Some(name), address)
    }

    fn controller_with(
        platform: &SimulatedPlatform,
        permissions: Arc<StaticPermissions>,
    ) -> DiscoveryController {
        DiscoveryController::new(
            Box::new(platform.clone()),
            Box::new(platform.clone()),
            permissions,
        )
    }

    fn addresses(list: &DeviceList) -> Vec<&str> {
        list.iter().map(|d| d.address.as_str()).collect()
    }

    #[test]
    fn test_paired_devices_loaded_at_construction() {
        let platform = SimulatedPlatform::default();
        platform.set_bonded(vec![dev("Keyboard", X), dev("Mouse", Y)]);

        let controller = controller_with(&platform, Arc::new(StaticPermissions::all_granted()));

        assert_eq!(addresses(&controller.paired_devices().borrow()), vec![X, Y]);
        assert_eq!(platform.bonded_queries(), 1);
        assert_eq!(controller.registration_state(), RegistrationState::Unregistered);
    }

    #[test]
    fn test_duplicate_notifications_keep_first_seen() {
        let platform = SimulatedPlatform::default();
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));
        assert_eq!(controller.start_discovery(), Outcome::Applied);

        platform.announce(&dev("First name", A));
        platform.announce(&dev("Other", B));
        platform.announce(&PlatformDevice::new(None, A));
        assert_eq!(controller.process_pending_events(), 3);

        let scanned = controller.scanned_devices().borrow().clone();
        assert_eq!(addresses(&scanned), vec![A, B]);
        assert_eq!(scanned[0].name.as_deref(), Some("First name"));
    }

    #[test]
    fn test_on_device_found_reports_additions() {
        let platform = SimulatedPlatform::default();
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));

        assert!(controller.on_device_found(Device::new(None, A)));
        assert!(!controller.on_device_found(Device::new(Some("Late name".to_string()), A)));
        assert_eq!(controller.scanned_devices().borrow()[0].name, None);
    }

    #[test]
    fn test_published_snapshots_are_not_mutated() {
        let platform = SimulatedPlatform::default();
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));
        let scanned = controller.scanned_devices();

        controller.on_device_found(Device::new(None, A));
        let before = scanned.borrow().clone();
        controller.on_device_found(Device::new(None, B));

        assert_eq!(before.len(), 1);
        assert_eq!(scanned.borrow().len(), 2);
    }

    #[test]
    fn test_scan_denied_is_a_no_op() {
        let platform = SimulatedPlatform::default();
        platform.set_bonded(vec![dev("Keyboard", X)]);
        let permissions = Arc::new(StaticPermissions::with_granted(&[Capability::Connect]));
        let mut controller = controller_with(&platform, permissions);
        let paired_before = controller.paired_devices().borrow().clone();
        let queries_before = platform.bonded_queries();

        assert_eq!(
            controller.start_discovery(),
            Outcome::Denied(Capability::Scan)
        );
        assert_eq!(controller.stop_discovery(), Outcome::Denied(Capability::Scan));

        assert_eq!(platform.registration_count(), 0);
        assert_eq!(platform.start_requests(), 0);
        assert_eq!(platform.cancel_requests(), 0);
        assert_eq!(platform.bonded_queries(), queries_before);
        assert!(controller.scanned_devices().borrow().is_empty());
        let paired_after = controller.paired_devices().borrow().clone();
        assert!(Arc::ptr_eq(&paired_before, &paired_after));
        assert!(!controller.is_scanning());
    }

    #[test]
    fn test_connect_denied_keeps_paired_devices() {
        let platform = SimulatedPlatform::default();
        platform.set_bonded(vec![dev("Keyboard", X)]);
        let permissions = Arc::new(StaticPermissions::all_granted());
        let mut controller = controller_with(&platform, permissions.clone());

        permissions.revoke(Capability::Connect);
        platform.set_bonded(vec![dev("Headset", Z)]);

        assert_eq!(
            controller.refresh_paired_devices(),
            Outcome::Denied(Capability::Connect)
        );
        assert_eq!(addresses(&controller.paired_devices().borrow()), vec![X]);

        // Discovery itself only needs scan permission
        assert_eq!(controller.start_discovery(), Outcome::Applied);
        assert_eq!(addresses(&controller.paired_devices().borrow()), vec![X]);
        assert!(platform.is_discovering());
    }

    #[test]
    fn test_refresh_replaces_paired_devices() {
        let platform = SimulatedPlatform::default();
        platform.set_bonded(vec![dev("X", X), dev("Y", Y)]);
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));
        assert_eq!(addresses(&controller.paired_devices().borrow()), vec![X, Y]);

        platform.set_bonded(vec![dev("Y", Y), dev("Z", Z)]);
        assert_eq!(controller.refresh_paired_devices(), Outcome::Applied);

        assert_eq!(addresses(&controller.paired_devices().borrow()), vec![Y, Z]);
    }

    #[test]
    fn test_refresh_drops_repeated_bonded_addresses() {
        let platform = SimulatedPlatform::default();
        platform.set_bonded(vec![dev("X", X), dev("X again", X), dev("Y", Y)]);
        let controller = controller_with(&platform, Arc::new(StaticPermissions::all_granted()));

        let paired = controller.paired_devices().borrow().clone();
        assert_eq!(addresses(&paired), vec![X, Y]);
        assert_eq!(paired[0].name.as_deref(), Some("X"));
    }

    #[test]
    fn test_start_refreshes_paired_and_starts_adapter() {
        let platform = SimulatedPlatform::default();
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));
        platform.set_bonded(vec![dev("Z", Z)]);

        assert_eq!(controller.start_discovery(), Outcome::Applied);

        assert_eq!(addresses(&controller.paired_devices().borrow()), vec![Z]);
        assert_eq!(platform.bonded_queries(), 2);
        assert_eq!(platform.start_requests(), 1);
        assert!(controller.is_scanning());
        assert!(matches!(
            controller.registration_state(),
            RegistrationState::Registered(_)
        ));
    }

    #[test]
    fn test_repeated_start_registers_once_and_accumulates() {
        let platform = SimulatedPlatform::default();
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));

        controller.start_discovery();
        platform.announce(&dev("A", A));
        controller.process_pending_events();

        controller.stop_discovery();
        controller.start_discovery();
        platform.announce(&dev("B", B));
        controller.process_pending_events();

        assert_eq!(platform.registration_count(), 1);
        assert_eq!(platform.start_requests(), 2);
        assert_eq!(addresses(&controller.scanned_devices().borrow()), vec![A, B]);
    }

    #[test]
    fn test_stop_keeps_receiver_and_devices() {
        let platform = SimulatedPlatform::default();
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));
        controller.start_discovery();
        platform.announce(&dev("A", A));
        controller.process_pending_events();

        assert_eq!(controller.stop_discovery(), Outcome::Applied);

        assert!(!platform.is_discovering());
        assert!(!controller.is_scanning());
        assert_eq!(platform.registration_count(), 1);
        assert_eq!(addresses(&controller.scanned_devices().borrow()), vec![A]);
    }

    #[test]
    fn test_release_lifecycle() {
        let platform = SimulatedPlatform::default();
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));

        assert_eq!(controller.release(), Outcome::NotRegistered);

        controller.start_discovery();
        assert_eq!(controller.release(), Outcome::Applied);
        assert_eq!(platform.registration_count(), 0);
        assert_eq!(controller.registration_state(), RegistrationState::Released);

        assert_eq!(controller.release(), Outcome::NotRegistered);
        assert_eq!(controller.start_discovery(), Outcome::AlreadyReleased);
        assert_eq!(platform.registration_count(), 0);
        assert_eq!(platform.start_requests(), 1);
    }

    #[test]
    fn test_release_does_not_need_permission() {
        let platform = SimulatedPlatform::default();
        let permissions = Arc::new(StaticPermissions::all_granted());
        let mut controller = controller_with(&platform, permissions.clone());
        controller.start_discovery();

        permissions.revoke(Capability::Scan);
        assert_eq!(controller.release(), Outcome::Applied);
        assert_eq!(platform.registration_count(), 0);
    }

    #[test]
    fn test_notifications_after_release_are_ignored() {
        let platform = SimulatedPlatform::default();
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));
        controller.start_discovery();
        controller.release();

        assert_eq!(platform.announce(&dev("A", A)), 0);
        assert_eq!(controller.process_pending_events(), 0);
        assert!(controller.scanned_devices().borrow().is_empty());
    }

    #[test]
    fn test_adapter_failures_are_absorbed() {
        let platform = SimulatedPlatform::default();
        platform.set_bonded(vec![dev("X", X)]);
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));

        platform.set_powered_off(true);
        assert_eq!(controller.start_discovery(), Outcome::Applied);
        assert!(!controller.is_scanning());
        assert_eq!(addresses(&controller.paired_devices().borrow()), vec![X]);
        assert_eq!(controller.stop_discovery(), Outcome::Applied);
    }

    #[test]
    fn test_failed_cancel_keeps_scanning() {
        let platform = SimulatedPlatform::default();
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));
        controller.start_discovery();
        assert!(controller.is_scanning());

        platform.set_powered_off(true);
        assert_eq!(controller.stop_discovery(), Outcome::Applied);
        assert!(platform.is_discovering());
        assert!(controller.is_scanning());

        platform.set_powered_off(false);
        controller.stop_discovery();
        assert!(!platform.is_discovering());
        assert!(!controller.is_scanning());
    }

    #[test]
    fn test_failed_registration_is_retried() {
        let platform = SimulatedPlatform::default();
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));

        platform.set_registrations_refused(true);
        assert_eq!(controller.start_discovery(), Outcome::Applied);
        assert_eq!(controller.registration_state(), RegistrationState::Unregistered);
        assert!(controller.is_scanning());
        assert_eq!(platform.registration_count(), 0);

        platform.set_registrations_refused(false);
        controller.start_discovery();
        assert!(matches!(
            controller.registration_state(),
            RegistrationState::Registered(_)
        ));
        assert_eq!(platform.registration_count(), 1);
    }

    #[test]
    fn test_legacy_payloads_and_malformed_events() {
        let platform = SimulatedPlatform::new(30);
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));
        controller.start_discovery();

        platform.announce(&dev("A", A));
        platform.broadcast(&Notification::device_found(DevicePayload::Encoded(
            b"garbage".to_vec(),
        )));
        platform.broadcast(&Notification::new(BroadcastAction::DeviceFound, None));

        assert_eq!(controller.process_pending_events(), 1);
        assert_eq!(addresses(&controller.scanned_devices().borrow()), vec![A]);
    }

    #[test]
    fn test_late_subscriber_sees_latest_value() {
        let platform = SimulatedPlatform::default();
        platform.set_bonded(vec![dev("X", X)]);
        let mut controller =
            controller_with(&platform, Arc::new(StaticPermissions::all_granted()));
        controller.on_device_found(Device::new(None, A));

        let scanned = controller.scanned_devices();
        let paired = controller.paired_devices();
        assert_eq!(addresses(&scanned.borrow()), vec![A]);
        assert_eq!(addresses(&paired.borrow()), vec![X]);
    }

    async fn wait_for(
        rx: &mut watch::Receiver<DeviceList>,
        predicate: impl Fn(&DeviceList) -> bool,
    ) -> DeviceList {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|list| predicate(list)))
            .await
            .expect("timed out waiting for collection update")
            .expect("controller dropped")
            .clone()
    }

    #[tokio::test]
    async fn test_service_delivers_devices_from_event_thread() {
        let platform = SimulatedPlatform::default();
        platform.set_bonded(vec![dev("X", X)]);
        let handle = controller_with(&platform, Arc::new(StaticPermissions::all_granted())).spawn();

        let mut scanned = handle.scanned_devices();
        handle.start_discovery();

        let announcer = platform.clone();
        let devices = vec![dev("A", A), dev("B", B), dev("A", A)];
        tokio::time::timeout(Duration::from_secs(2), async {
            while !announcer.is_discovering() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("discovery never started");

        std::thread::spawn(move || {
            for device in &devices {
                announcer.announce(device);
            }
        })
        .join()
        .unwrap();

        let list = wait_for(&mut scanned, |list| list.len() == 2).await;
        assert_eq!(addresses(&list), vec![A, B]);

        let late = handle.scanned_devices();
        assert_eq!(addresses(&late.borrow()), vec![A, B]);
        assert_eq!(addresses(&handle.paired_devices().borrow()), vec![X]);
    }

    #[tokio::test]
    async fn test_queued_devices_survive_shutdown() {
        for _ in 0..50 {
            let platform = SimulatedPlatform::default();
            let mut controller =
                controller_with(&platform, Arc::new(StaticPermissions::all_granted()));
            controller.start_discovery();
            let scanned = controller.scanned_devices();

            platform.announce(&dev("A", A));
            let (handle, commands) = controller.service_channel();
            drop(handle);
            controller.run(commands).await;

            assert_eq!(addresses(&scanned.borrow()), vec![A]);
            assert_eq!(platform.registration_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_dropping_handles_releases_receiver() {
        let platform = SimulatedPlatform::default();
        let handle = controller_with(&platform, Arc::new(StaticPermissions::all_granted())).spawn();
        handle.start_discovery();

        tokio::time::timeout(Duration::from_secs(2), async {
            while platform.registration_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("receiver never registered");

        drop(handle);

        tokio::time::timeout(Duration::from_secs(2), async {
            while platform.registration_count() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("receiver still registered");
    }

    #[test]
    fn test_spawn_on_thread_runs_commands() {
        let platform = SimulatedPlatform::default();
        let controller = controller_with(&platform, Arc::new(StaticPermissions::all_granted()));
        let (handle, worker) = controller.spawn_on_thread().unwrap();

        handle.start_discovery();
        handle.stop_discovery();
        handle.release();
        drop(handle);
        worker.join().unwrap();

        assert_eq!(platform.start_requests(), 1);
        assert_eq!(platform.cancel_requests(), 1);
        assert_eq!(platform.registration_count(), 0);
    }
}
