//! Receiver bookkeeping shared by the platform backends

use crate::domain::error::{DiscoveryError, Result};
use crate::domain::platform::{BroadcastAction, BroadcastReceiver, Notification, RegistrationId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

struct Entry {
    action: BroadcastAction,
    receiver: Arc<dyn BroadcastReceiver>,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    entries: HashMap<RegistrationId, Entry>,
}

/// Registered receivers, keyed by registration id.
///
/// Cloning shares the same set, so a clone can live inside an OS event
/// handler while the backend keeps registering and unregistering.
#[derive(Clone, Default)]
pub struct ReceiverRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl ReceiverRegistry {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(
        &self,
        action: BroadcastAction,
        receiver: Arc<dyn BroadcastReceiver>,
    ) -> RegistrationId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = RegistrationId(state.next_id);
        state.entries.insert(id, Entry { action, receiver });
        id
    }

    pub fn unregister(&self, id: RegistrationId) -> Result<()> {
        self.lock()
            .entries
            .remove(&id)
            .map(|_| ())
            .ok_or(DiscoveryError::UnknownRegistration(id))
    }

    /// Deliver to every receiver registered for the notification's action.
    ///
    /// Receivers run outside the lock so they may register or unregister.
    pub fn dispatch(&self, notification: &Notification) -> usize {
        let receivers: Vec<Arc<dyn BroadcastReceiver>> = self
            .lock()
            .entries
            .values()
            .filter(|entry| entry.action == notification.action)
            .map(|entry| entry.receiver.clone())
            .collect();

        for receiver in &receivers {
            receiver.on_receive(notification);
        }
        receivers.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::platform::{DevicePayload, PlatformDevice};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReceiver(AtomicUsize);

    impl BroadcastReceiver for CountingReceiver {
        fn on_receive(&self, _notification: &Notification) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn found() -> Notification {
        Notification::device_found(DevicePayload::Handle(PlatformDevice::new(
            None,
            "00:00:00:00:00:01",
        )))
    }

    #[test]
    fn test_dispatch_filters_by_action() {
        let registry = ReceiverRegistry::default();
        let on_found = Arc::new(CountingReceiver(AtomicUsize::new(0)));
        let on_finished = Arc::new(CountingReceiver(AtomicUsize::new(0)));

        registry.register(BroadcastAction::DeviceFound, on_found.clone());
        registry.register(BroadcastAction::DiscoveryFinished, on_finished.clone());

        assert_eq!(registry.dispatch(&found()), 1);
        assert_eq!(on_found.0.load(Ordering::SeqCst), 1);
        assert_eq!(on_finished.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unregister() {
        let registry = ReceiverRegistry::default();
        let receiver = Arc::new(CountingReceiver(AtomicUsize::new(0)));
        let id = registry.register(BroadcastAction::DeviceFound, receiver.clone());

        assert!(registry.unregister(id).is_ok());
        assert!(registry.is_empty());
        assert_eq!(registry.dispatch(&found()), 0);
        assert!(matches!(
            registry.unregister(id),
            Err(DiscoveryError::UnknownRegistration(_))
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = ReceiverRegistry::default();
        let receiver = Arc::new(CountingReceiver(AtomicUsize::new(0)));
        let first = registry.register(BroadcastAction::DeviceFound, receiver.clone());
        let second = registry.register(BroadcastAction::DeviceFound, receiver);
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }
}
