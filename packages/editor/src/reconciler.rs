//! # Version Reconciliation
//!
//! Per-document sync state and the classification of failed remote calls.
//!
//! ```text
//!            begin                 success / other failure
//!   Clean ─────────▶ Mutating ──────────────────────────────▶ Clean
//!                        │
//!                        │ conflict (409, or 400 naming a stale target)
//!                        ▼
//!                   Conflicted ── reload finished ──▶ Clean
//!
//!   any state ── 401/403 ──▶ Unauthenticated
//! ```
//!
//! Reloading is the only recovery: no field-level merge is attempted.

use plaid_common::{ClientError, ErrorClass};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Clean,
    Mutating,
    Conflicted,
    Unauthenticated,
}

/// Substrings of a 400 message that mean the write hit a stale or removed
/// resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictMarkers(pub Vec<String>);

impl Default for ConflictMarkers {
    fn default() -> Self {
        Self(vec![
            "document-version".to_string(),
            "was provided but".to_string(),
            "no longer exists".to_string(),
        ])
    }
}

impl ConflictMarkers {
    pub fn matches(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.0.iter().any(|m| message.contains(&m.to_lowercase()))
    }
}

/// Sort a failed call into the error taxonomy
pub fn classify(error: &ClientError, markers: &ConflictMarkers) -> ErrorClass {
    match error {
        ClientError::Unauthorized(_) => ErrorClass::Authentication,
        ClientError::Conflict(_) => ErrorClass::Conflict,
        ClientError::BadRequest(message) if markers.matches(message) => ErrorClass::Conflict,
        ClientError::Validation(_) => ErrorClass::Validation,
        _ => ErrorClass::Transient,
    }
}

/// What the session has to do after a call settles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Settled,
    /// Notify once, then fetch the whole document again
    Reload,
    /// Drop local state; the user must sign in again
    Reauthenticate,
    /// Show a dismissible notice naming the attempted operation
    Report(String),
}

/// Sync state of one document session
#[derive(Debug, Clone)]
pub struct Reconciler {
    state: SyncState,
    in_flight: usize,
    markers: ConflictMarkers,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ConflictMarkers::default())
    }
}

impl Reconciler {
    pub fn new(markers: ConflictMarkers) -> Self {
        Self {
            state: SyncState::Clean,
            in_flight: 0,
            markers,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn markers(&self) -> &ConflictMarkers {
        &self.markers
    }

    /// A mutation is about to call the server. Refused while signed out.
    pub fn begin(&mut self) -> bool {
        if self.state == SyncState::Unauthenticated {
            return false;
        }
        self.in_flight += 1;
        if self.state == SyncState::Clean {
            self.state = SyncState::Mutating;
        }
        true
    }

    pub fn succeeded(&mut self) -> Outcome {
        self.settle();
        Outcome::Settled
    }

    /// A mutation stopped before reaching the server
    pub fn abandoned(&mut self) {
        self.settle();
    }

    /// A mutation's call failed while attempting `operation`
    pub fn failed(&mut self, error: &ClientError, operation: &str) -> Outcome {
        self.in_flight = self.in_flight.saturating_sub(1);
        let class = classify(error, &self.markers);
        tracing::debug!("'{}' failed ({:?}): {}", operation, class, error);

        match class {
            ErrorClass::Authentication => {
                self.state = SyncState::Unauthenticated;
                Outcome::Reauthenticate
            }
            ErrorClass::Conflict => match self.state {
                // a reload is already owed; don't ask for another
                SyncState::Conflicted => Outcome::Settled,
                SyncState::Unauthenticated => Outcome::Reauthenticate,
                _ => {
                    self.state = SyncState::Conflicted;
                    Outcome::Reload
                }
            },
            ErrorClass::Validation | ErrorClass::Transient => {
                if self.state == SyncState::Mutating && self.in_flight == 0 {
                    self.state = SyncState::Clean;
                }
                Outcome::Report(format!("Failed to {}: {}", operation, error.message()))
            }
        }
    }

    /// A full reload finished
    pub fn reloaded(&mut self, result: Result<(), &ClientError>) -> Outcome {
        match result {
            Ok(()) => {
                if self.state == SyncState::Conflicted || self.state == SyncState::Unauthenticated {
                    self.state = SyncState::Clean;
                }
                if self.in_flight > 0 {
                    self.state = SyncState::Mutating;
                }
                Outcome::Settled
            }
            Err(error) => match classify(error, &self.markers) {
                ErrorClass::Authentication => {
                    self.state = SyncState::Unauthenticated;
                    Outcome::Reauthenticate
                }
                _ => {
                    if self.state == SyncState::Conflicted {
                        self.state = if self.in_flight > 0 {
                            SyncState::Mutating
                        } else {
                            SyncState::Clean
                        };
                    }
                    Outcome::Report(format!("Failed to reload document: {}", error.message()))
                }
            },
        }
    }

    fn settle(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.state == SyncState::Mutating && self.in_flight == 0 {
            self.state = SyncState::Clean;
        }
    }
}
