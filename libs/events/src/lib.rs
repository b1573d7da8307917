//! # charm-events
//!
//! Lifecycle event model for charm operators.
//!
//! ## Design Principles
//!
//! - Every event instance is addressed by a [`Handle`], a path-like key
//!   `emitter/kind[sequence]` used to persist it
//! - Events carry only the payload needed to rebuild them; live entities
//!   (relations, apps, units) are re-resolved on restore
//! - Snapshots are plain JSON objects so stored events survive code changes
//!
//! ## Event Types
//!
//! - Hook events (`install`, `config-changed`, ...) fired by the platform
//! - Relation events (`<name>_relation_{joined,changed,departed,broken}`)
//! - Storage events (`<name>_storage_{attached,detaching}`)
//! - Action events (`<name>_action`), which can never be deferred
//! - Custom events defined by charm code
//! - Framework `pre_commit` / `commit` events

mod entity;
mod error;
mod event;
mod handle;
mod types;

pub use entity::{Application, Relation, Unit};
pub use error::EventError;
pub use event::*;
pub use handle::Handle;
pub use types::*;
