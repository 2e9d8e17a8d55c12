use ulid::Ulid;

use crate::model::SlotKey;
use crate::password::PasswordError;

#[derive(Debug)]
pub enum EngineError {
    /// No booking with this id for the given owner.
    NotFound(Ulid),
    AlreadyExists(String),
    CapacityExceeded { key: SlotKey, capacity: u32 },
    /// The email already holds a booking in this slot.
    DuplicateSlot(SlotKey),
    LimitExceeded(&'static str),
    /// A first credential was offered for an email that already has one.
    CredentialExists(String),
    /// The email holds bookings but no credential, so nobody can claim it.
    Unclaimed(String),
    Hashing(PasswordError),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::AlreadyExists(what) => write!(f, "already exists: {what}"),
            EngineError::CapacityExceeded { key, capacity } => {
                write!(f, "capacity {capacity} exceeded for {key}")
            }
            EngineError::DuplicateSlot(key) => {
                write!(f, "email already booked for {key}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::CredentialExists(email) => write!(f, "credential already set for {email}"),
            EngineError::Unclaimed(email) => {
                write!(f, "{email} holds bookings without a credential")
            }
            EngineError::Hashing(e) => write!(f, "hashing error: {e}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Hashing(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PasswordError> for EngineError {
    fn from(e: PasswordError) -> Self {
        EngineError::Hashing(e)
    }
}
