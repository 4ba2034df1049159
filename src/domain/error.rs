//! Error types for the platform ports
//!
//! The controller never hands these to its callers. They surface from the
//! adapter, the broadcast channel and the payload decoder, and are logged
//! where the controller absorbs them.

use crate::domain::platform::RegistrationId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The adapter rejected a request
    #[error("Bluetooth adapter error: {0}")]
    Adapter(String),

    /// Receiver registration failed
    #[error("Broadcast registration error: {0}")]
    Broadcast(String),

    /// Unregistering a receiver the channel does not know about
    #[error("Receiver {0} is not registered")]
    UnknownRegistration(RegistrationId),

    /// Legacy payload could not be parsed
    #[error("Malformed device payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// Decoded payload carried no hardware address
    #[error("Device payload has no address")]
    MissingAddress,

    #[cfg(windows)]
    #[error("Platform error: {0}")]
    Platform(#[from] windows::core::Error),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
