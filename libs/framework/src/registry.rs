//! Event source registry.
//!
//! Maps `(emitter path, kind)` to the event type the source produces. The
//! registry is populated once at startup from the built-in hook list and the
//! charm metadata, then consulted when observing, emitting and restoring.

use std::collections::HashMap;

use charm_events::{EventType, HookKind, RelationPhase, StoragePhase};
use thiserror::Error;
use tracing::debug;

use crate::CharmMeta;

/// Emitter path of the framework's own events.
pub const FRAMEWORK_EMITTER: &str = "Framework/on";

/// Errors from defining event sources.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unable to define an event with name {kind:?}: {reason}")]
    InvalidName { kind: String, reason: &'static str },

    #[error("unable to define an event with name {kind:?} on {emitter}: name already in use")]
    Collision { emitter: String, kind: String },
}

/// Registry of named event sources.
#[derive(Debug, Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<(String, String), EventType>,
}

/// Replaces every character outside `[A-Za-z0-9_]` with `_`.
pub fn source_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for a charm whose events are emitted from `charm_emitter`.
    ///
    /// Defines the built-in hooks, four relation sources per relation, two
    /// storage sources per storage, one source per action and the framework's
    /// commit sources.
    pub fn for_charm(meta: &CharmMeta, charm_emitter: &str) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        registry.define(FRAMEWORK_EMITTER, "pre_commit", EventType::PreCommit)?;
        registry.define(FRAMEWORK_EMITTER, "commit", EventType::Commit)?;

        for hook in HookKind::ALL {
            registry.define(charm_emitter, hook.as_str(), EventType::Hook(hook))?;
        }
        for name in meta.relations.keys() {
            for phase in RelationPhase::ALL {
                let kind = format!("{}_{}", name, phase.suffix());
                registry.define(charm_emitter, &kind, EventType::Relation(phase))?;
            }
        }
        for name in meta.storages.keys() {
            for phase in StoragePhase::ALL {
                let kind = format!("{}_{}", name, phase.suffix());
                registry.define(charm_emitter, &kind, EventType::Storage(phase))?;
            }
        }
        for name in meta.actions.keys() {
            registry.define(charm_emitter, &format!("{name}_action"), EventType::Action)?;
        }

        debug!(sources = registry.len(), emitter = charm_emitter, "event sources defined");
        Ok(registry)
    }

    /// Defines a source and returns its substituted kind.
    pub fn define(
        &mut self,
        emitter: &str,
        name: &str,
        event_type: EventType,
    ) -> Result<String, RegistryError> {
        let kind = source_name(name);
        if kind.is_empty() {
            return Err(RegistryError::InvalidName {
                kind,
                reason: "name is empty",
            });
        }
        if kind.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(RegistryError::InvalidName {
                kind,
                reason: "must be a valid identifier",
            });
        }

        let key = (emitter.to_string(), kind.clone());
        if self.sources.contains_key(&key) {
            return Err(RegistryError::Collision {
                emitter: emitter.to_string(),
                kind,
            });
        }
        self.sources.insert(key, event_type);
        Ok(kind)
    }

    /// The event type of a source, if defined.
    pub fn event_type(&self, emitter: &str, kind: &str) -> Option<EventType> {
        self.sources
            .get(&(emitter.to_string(), kind.to_string()))
            .copied()
    }

    pub fn contains(&self, emitter: &str, kind: &str) -> bool {
        self.event_type(emitter, kind).is_some()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
