//! In-memory session state
//!
//! Holds the current access credential for the lifetime of the process.
//! Nothing here is persisted; a page/process reload requires a fresh login or
//! the out-of-band renewal-credential exchange performed at startup.
//!
//! The holder is an explicitly owned, injectable instance (not a module-level
//! global) so tests can construct and reset one per case.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use tracing::debug;

/// Process-wide holder of the current access credential.
///
/// Only the gateway's renewal routine mutates the credential and the
/// in-flight flag; every other component reads through these accessors.
#[derive(Debug, Default)]
pub struct SessionHolder {
    credential: RwLock<Option<String>>,
    renewal_in_flight: AtomicBool,
}

impl SessionHolder {
    /// Create an empty session (no credential)
    pub fn new() -> Self {
        Self::default()
    }

    /// Current access credential, if any
    pub fn credential(&self) -> Option<String> {
        self.credential.read().expect("session lock poisoned").clone()
    }

    /// Replace the credential (`None` clears it)
    pub fn set_credential(&self, credential: Option<String>) {
        let mut slot = self.credential.write().expect("session lock poisoned");
        debug!(
            had_credential = slot.is_some(),
            has_credential = credential.is_some(),
            "session credential updated"
        );
        *slot = credential;
    }

    /// Drop the credential (logout or terminal renewal failure)
    pub fn clear(&self) {
        self.set_credential(None);
    }

    /// True while a credential renewal attempt is running
    pub fn renewal_in_flight(&self) -> bool {
        self.renewal_in_flight.load(Ordering::Acquire)
    }

    /// Toggle the renewal flag. Gateway-internal; held true for the
    /// entire duration of the single renewal attempt.
    pub(crate) fn set_renewal_in_flight(&self, in_flight: bool) {
        self.renewal_in_flight.store(in_flight, Ordering::Release);
    }
}
