//! Document lifecycles.
//!
//! Each document status enum carries an explicit transition table. Services
//! never assign a status directly; they ask the machine for the target state
//! and persist whatever it returns.

mod machines;

use std::fmt;
use std::str::FromStr;

use crate::entities::enums::DocumentType;
use crate::errors::ServiceError;

pub trait StatusMachine: Copy + Eq + fmt::Display + FromStr + Send + Sync + 'static {
    const DOCUMENT: DocumentType;

    /// Status a freshly created document starts in.
    const INITIAL: Self;

    /// Allowed `(from, to)` pairs. Anything else is rejected.
    const TRANSITIONS: &'static [(Self, Self)];

    fn can_transition_to(self, target: Self) -> bool {
        Self::TRANSITIONS
            .iter()
            .any(|&(from, to)| from == self && to == target)
    }

    /// No outgoing transition exists.
    fn is_terminal(self) -> bool {
        !Self::TRANSITIONS.iter().any(|&(from, _)| from == self)
    }

    fn allowed_targets(self) -> Vec<Self> {
        Self::TRANSITIONS
            .iter()
            .filter(|(from, _)| *from == self)
            .map(|&(_, to)| to)
            .collect()
    }

    /// Validates `self -> target` and returns the new status.
    fn transition(self, target: Self) -> Result<Self, ServiceError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(invalid_transition(
                Self::DOCUMENT,
                self.to_string(),
                target.to_string(),
            ))
        }
    }

    /// Parses a caller-supplied target state name.
    fn parse(value: &str) -> Result<Self, ServiceError> {
        Self::from_str(value.trim()).map_err(|_| {
            ServiceError::invalid_field(
                "target_state",
                format!("unknown {} state `{}`", Self::DOCUMENT, value),
            )
        })
    }
}

/// Builds the error for operations that are not status changes, such as
/// editing or deleting a document outside `DRAFT`.
pub fn invalid_transition(
    document: DocumentType,
    from: impl Into<String>,
    to: impl Into<String>,
) -> ServiceError {
    ServiceError::InvalidTransition {
        document,
        from: from.into(),
        to: to.into(),
    }
}

/// Pseudo-targets used in errors for structural changes.
pub const DELETED: &str = "DELETED";
pub const EDITED: &str = "EDITED";
