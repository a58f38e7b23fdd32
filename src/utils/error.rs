//! Error types shared across the dispatch core.
//!
//! Every fallible operation returns [`DispatchError`]. Callers that need to
//! decide how to react (reject, re-fetch, report as a normal negative
//! result, tear down a session) match on [`DispatchError::kind`] instead of
//! on individual variants.

use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

/// Broad category of a [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Bad input. Rejected, never retried internally.
    Validation,
    /// State machine violation or concurrent modification. The caller may
    /// re-fetch and retry.
    Conflict,
    /// Expected negative outcome such as no driver or an unusable promo.
    Unavailable,
    /// A session's transport is gone.
    Transport,
    /// The persistence layer failed.
    Persistence,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid coordinate: latitude={latitude}, longitude={longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("delivery {0} was modified concurrently")]
    Conflict(String),

    #[error("no driver available")]
    NoDriverAvailable,

    #[error("promo code rejected: {0}")]
    PromoInvalid(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("subscription denied: {0}")]
    SubscriptionDenied(String),

    #[error("unknown session {0}")]
    UnknownSession(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::InvalidCoordinate { .. }
            | DispatchError::InvalidInput(_)
            | DispatchError::NotFound(_)
            | DispatchError::SubscriptionDenied(_)
            | DispatchError::UnknownSession(_) => ErrorKind::Validation,
            DispatchError::InvalidTransition { .. } | DispatchError::Conflict(_) => {
                ErrorKind::Conflict
            }
            DispatchError::NoDriverAvailable | DispatchError::PromoInvalid(_) => {
                ErrorKind::Unavailable
            }
            DispatchError::Transport(_) => ErrorKind::Transport,
            DispatchError::Persistence(_) | DispatchError::Serialization(_) => {
                ErrorKind::Persistence
            }
        }
    }

    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        DispatchError::InvalidInput(msg.into())
    }
}
