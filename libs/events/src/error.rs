//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when building, deferring or restoring events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A stored handle path could not be parsed.
    #[error("attempted to restore invalid handle path {0}")]
    InvalidHandlePath(String),

    /// A unit name without the `app/N` shape.
    #[error("invalid unit name: {0}")]
    InvalidUnitName(String),

    /// A relation event whose unit does not belong to its application.
    #[error("cannot create relation event with application {app:?} and unit {unit}")]
    UnitAppMismatch { app: Option<String>, unit: String },

    /// The event type refuses deferral.
    #[error("cannot defer {0} events")]
    NotDeferrable(String),

    /// An action event restored while a different action is running.
    #[error("action event kind {event_action} does not match current action {env_action:?}")]
    ActionMismatch {
        event_action: String,
        env_action: Option<String>,
    },

    /// The snapshot is missing a field or has the wrong shape.
    #[error("invalid snapshot for {handle}: {reason}")]
    InvalidSnapshot { handle: String, reason: String },

    /// An entity referenced by a snapshot could not be resolved.
    #[error("cannot resolve {entity}: {reason}")]
    Unresolved { entity: String, reason: String },
}
