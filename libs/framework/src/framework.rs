//! Observer registration and event delivery.
//!
//! Provides the building blocks of one process invocation:
//! - `Observer` trait implemented by charm objects
//! - `EventContext` handed to observers during delivery
//! - `Framework`, which emits, re-emits and commits events

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use charm_events::{Event, EventError, EventType, Handle, Payload};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::registry::FRAMEWORK_EMITTER;
use crate::store::Notice;
use crate::{EnvError, EventStore, Model, ModelError, RegistryError, SourceRegistry, StoreError};

/// File name of the durable event store inside the charm directory.
pub const CHARM_STATE_FILE: &str = ".unit-state.db";

/// Handle under which the framework keeps its own persistent state.
const STORED_STATE_HANDLE: &str = "StoredStateData[_stored]";

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while emitting or delivering events.
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("event source {emitter}/{kind} is not defined")]
    UnknownSource { emitter: String, kind: String },

    #[error("observer {0} is not registered")]
    UnknownObserver(String),

    #[error("no snapshot stored for {0}")]
    MissingSnapshot(String),

    /// An observer method returned an error.
    #[error("{observer}.{method} failed handling {event}")]
    Handler {
        observer: String,
        method: String,
        event: String,
        #[source]
        source: anyhow::Error,
    },
}

// =============================================================================
// Observers
// =============================================================================

/// A charm object that reacts to events.
///
/// Observers are identified by their handle path, which is what the store
/// records, so the same object must be registered under the same path on
/// every invocation for deferred events to reach it.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Handle path identifying this observer.
    fn handle_path(&self) -> &str;

    /// Deliver `event` to `method`. An error aborts the invocation.
    async fn notify(
        &self,
        method: &str,
        event: &mut Event,
        ctx: &mut EventContext<'_>,
    ) -> anyhow::Result<()>;
}

/// Context available to an observer while it handles an event.
pub struct EventContext<'a> {
    model: &'a Model,
    queue: &'a mut VecDeque<PendingEvent>,
}

impl<'a> EventContext<'a> {
    pub fn model(&self) -> &'a Model {
        self.model
    }

    /// Emit a derived event.
    ///
    /// The event is delivered once the current event has been handled by all
    /// of its observers, in the order emitted.
    pub fn emit(&mut self, emitter: impl Into<String>, kind: impl Into<String>, payload: Payload) {
        self.queue.push_back(PendingEvent {
            emitter: emitter.into(),
            kind: kind.into(),
            payload,
        });
    }
}

#[derive(Debug)]
struct PendingEvent {
    emitter: String,
    kind: String,
    payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observation {
    observer_path: String,
    method: String,
    emitter: String,
    kind: String,
}

// =============================================================================
// Framework
// =============================================================================

/// Event delivery for a single process invocation.
pub struct Framework {
    store: EventStore,
    registry: SourceRegistry,
    model: Model,
    observers: HashMap<String, Arc<dyn Observer>>,
    observations: Vec<Observation>,
    event_count: u64,
    pending: VecDeque<PendingEvent>,
}

impl Framework {
    /// Create a framework, restoring the persistent event counter.
    pub fn new(
        store: EventStore,
        registry: SourceRegistry,
        model: Model,
    ) -> Result<Self, FrameworkError> {
        let event_count = store
            .load_snapshot(STORED_STATE_HANDLE)?
            .and_then(|state| state.get("event_count").and_then(Value::as_u64))
            .unwrap_or(0);

        Ok(Self {
            store,
            registry,
            model,
            observers: HashMap::new(),
            observations: Vec::new(),
            event_count,
            pending: VecDeque::new(),
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Number of events emitted over the lifetime of the store.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Define a charm-specific event source and return its kind.
    pub fn define_source(
        &mut self,
        emitter: &str,
        name: &str,
        event_type: EventType,
    ) -> Result<String, FrameworkError> {
        Ok(self.registry.define(emitter, name, event_type)?)
    }

    /// Make an observer reachable by its handle path.
    pub fn register_observer(&mut self, observer: Arc<dyn Observer>) {
        self.observers
            .insert(observer.handle_path().to_string(), observer);
    }

    /// Route events from `emitter`/`kind` to `method` on a registered observer.
    ///
    /// Observers of the same source are notified in registration order.
    pub fn observe(
        &mut self,
        emitter: &str,
        kind: &str,
        observer_path: &str,
        method: &str,
    ) -> Result<(), FrameworkError> {
        if !self.registry.contains(emitter, kind) {
            return Err(FrameworkError::UnknownSource {
                emitter: emitter.to_string(),
                kind: kind.to_string(),
            });
        }
        if !self.observers.contains_key(observer_path) {
            return Err(FrameworkError::UnknownObserver(observer_path.to_string()));
        }

        self.observations.push(Observation {
            observer_path: observer_path.to_string(),
            method: method.to_string(),
            emitter: emitter.to_string(),
            kind: kind.to_string(),
        });
        Ok(())
    }

    /// Emit an event and deliver it, followed by any events it caused.
    pub async fn emit(
        &mut self,
        emitter: &str,
        kind: &str,
        payload: Payload,
    ) -> Result<(), FrameworkError> {
        self.emit_one(emitter, kind, payload).await?;
        self.drain_pending().await
    }

    /// Re-deliver previously deferred events to the observers that deferred them.
    pub async fn reemit(&mut self) -> Result<(), FrameworkError> {
        self.reemit_notices(None).await?;
        self.drain_pending().await
    }

    /// Emit the commit events and persist everything for the next invocation.
    pub async fn commit(&mut self) -> Result<(), FrameworkError> {
        self.emit(FRAMEWORK_EMITTER, "pre_commit", Payload::Empty)
            .await?;
        self.emit(FRAMEWORK_EMITTER, "commit", Payload::Empty).await?;

        let mut state = Map::new();
        state.insert("event_count".into(), self.event_count.into());
        self.store.save_snapshot(STORED_STATE_HANDLE, &state)?;
        self.store.commit()?;

        debug!(event_count = self.event_count, "framework state committed");
        Ok(())
    }

    async fn drain_pending(&mut self) -> Result<(), FrameworkError> {
        while let Some(next) = self.pending.pop_front() {
            self.emit_one(&next.emitter, &next.kind, next.payload)
                .await?;
        }
        Ok(())
    }

    async fn emit_one(
        &mut self,
        emitter: &str,
        kind: &str,
        payload: Payload,
    ) -> Result<(), FrameworkError> {
        let event_type =
            self.registry
                .event_type(emitter, kind)
                .ok_or_else(|| FrameworkError::UnknownSource {
                    emitter: emitter.to_string(),
                    kind: kind.to_string(),
                })?;

        let parent = Handle::from_path(emitter)?;
        self.event_count += 1;
        let handle = parent.nest(kind, Some(self.event_count.to_string()));
        let event = Event::new(handle.clone(), event_type, payload);

        let targets: Vec<(String, String)> = self
            .observations
            .iter()
            .filter(|obs| obs.emitter == emitter && obs.kind == kind)
            .map(|obs| (obs.observer_path.clone(), obs.method.clone()))
            .collect();

        if targets.is_empty() {
            debug!(event = %handle, "no observers for event");
            return Ok(());
        }

        // Everything interested is recorded before the first delivery.
        self.store.save_snapshot(handle.path(), &event.snapshot())?;
        for (observer_path, method) in &targets {
            self.store
                .save_notice(handle.path(), observer_path, method)?;
        }

        info!(event = %handle, observers = targets.len(), "emitting event");
        self.reemit_notices(Some(handle.path())).await
    }

    async fn reemit_notices(&mut self, single_event: Option<&str>) -> Result<(), FrameworkError> {
        let notices = self.store.notices(single_event)?;

        let mut last_event_path: Option<String> = None;
        let mut deferred = true;

        for notice in notices {
            if last_event_path.as_deref() != Some(notice.event_path.as_str()) {
                if let (false, Some(last)) = (deferred, &last_event_path) {
                    self.store.drop_snapshot(last)?;
                }
                last_event_path = Some(notice.event_path.clone());
                deferred = false;
            }

            let Some(mut event) = self.load_event(&notice.event_path).await? else {
                debug!(event = %notice.event_path, "dropping notice for unknown event type");
                self.store.drop_notice(&notice)?;
                continue;
            };

            self.deliver(&notice, &mut event).await?;

            if event.is_deferred() {
                deferred = true;
            } else {
                self.store.drop_notice(&notice)?;
            }
        }

        if let (false, Some(last)) = (deferred, &last_event_path) {
            self.store.drop_snapshot(last)?;
        }
        Ok(())
    }

    async fn deliver(&mut self, notice: &Notice, event: &mut Event) -> Result<(), FrameworkError> {
        let Some(observer) = self.observers.get(&notice.observer_path).cloned() else {
            debug!(
                event = %notice.event_path,
                observer = %notice.observer_path,
                "observer not registered, treating notice as delivered"
            );
            return Ok(());
        };

        let mut ctx = EventContext {
            model: &self.model,
            queue: &mut self.pending,
        };
        observer
            .notify(&notice.method_name, event, &mut ctx)
            .await
            .map_err(|source| FrameworkError::Handler {
                observer: notice.observer_path.clone(),
                method: notice.method_name.clone(),
                event: notice.event_path.clone(),
                source,
            })?;

        if event.is_deferred() {
            info!(
                event = %notice.event_path,
                observer = %notice.observer_path,
                method = %notice.method_name,
                "event deferred"
            );
        }
        Ok(())
    }

    /// Rebuild a stored event. `None` when its source is no longer defined.
    async fn load_event(&self, event_path: &str) -> Result<Option<Event>, FrameworkError> {
        let handle = Handle::from_path(event_path)?;
        let Some(event_type) = handle
            .parent_path()
            .and_then(|parent| self.registry.event_type(parent, handle.kind()))
        else {
            return Ok(None);
        };

        let snapshot = self
            .store
            .load_snapshot(event_path)?
            .ok_or_else(|| FrameworkError::MissingSnapshot(event_path.to_string()))?;

        let event = Event::restore(handle, event_type, &snapshot, &self.model).await?;
        Ok(Some(event))
    }
}
