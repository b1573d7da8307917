//! Event instances and the snapshot/restore contract.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{Application, EventError, EventType, Handle, Relation, Unit};

/// Serialized form of an event payload.
pub type Snapshot = Map<String, Value>;

/// Looks up live entities while restoring events.
///
/// Implemented by the model so restored events point at current relation
/// membership rather than what was true when the event was stored.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// Re-resolve a relation by its compound key. Fails if it no longer exists.
    async fn resolve_relation(&self, name: &str, id: u64) -> Result<Relation, EventError>;

    /// Resolve an application by name.
    fn resolve_app(&self, name: &str) -> Application {
        Application::new(name)
    }

    /// Resolve a unit by name.
    fn resolve_unit(&self, name: &str) -> Result<Unit, EventError> {
        Unit::parse(name)
    }

    /// Name of the action this process was invoked for, if any.
    fn current_action(&self) -> Option<String>;

    /// Parameters of the running action.
    async fn action_params(&self) -> Result<Map<String, Value>, EventError>;
}

/// Payload of a relation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEvent {
    pub relation: Relation,
    /// The remote application that triggered the event.
    pub app: Option<Application>,
    /// The remote unit that triggered the event; `None` for app-level events.
    pub unit: Option<Unit>,
}

impl RelationEvent {
    /// Builds a relation payload, rejecting a unit that belongs to another app.
    pub fn new(
        relation: Relation,
        app: Option<Application>,
        unit: Option<Unit>,
    ) -> Result<Self, EventError> {
        if let Some(unit) = &unit {
            if app.as_ref() != Some(&unit.app) {
                return Err(EventError::UnitAppMismatch {
                    app: app.map(|a| a.name),
                    unit: unit.name.clone(),
                });
            }
        }
        Ok(Self {
            relation,
            app,
            unit,
        })
    }
}

/// Payload of an action event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionEvent {
    /// Action parameters, loaded when the event is restored for delivery.
    pub params: Map<String, Value>,
}

/// Event payload by subtype.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Empty,
    Relation(RelationEvent),
    Action(ActionEvent),
    Custom(Snapshot),
}

/// A single lifecycle occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    handle: Handle,
    event_type: EventType,
    payload: Payload,
    deferred: bool,
}

impl Event {
    pub fn new(handle: Handle, event_type: EventType, payload: Payload) -> Self {
        Self {
            handle,
            event_type,
            payload,
            deferred: false,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The relation payload, for relation events.
    pub fn relation(&self) -> Option<&RelationEvent> {
        match &self.payload {
            Payload::Relation(rel) => Some(rel),
            _ => None,
        }
    }

    /// Action parameters, for action events.
    pub fn action_params(&self) -> Option<&Map<String, Value>> {
        match &self.payload {
            Payload::Action(action) => Some(&action.params),
            _ => None,
        }
    }

    /// Ask for this event to be delivered again on a later invocation.
    pub fn defer(&mut self) -> Result<(), EventError> {
        if !self.event_type.is_deferrable() {
            return Err(EventError::NotDeferrable(self.event_type.to_string()));
        }
        self.deferred = true;
        Ok(())
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Action name encoded in the handle kind (`backup_now_action` -> `backup-now`).
    pub fn action_name(&self) -> Option<String> {
        action_name_from_kind(self.handle.kind())
    }

    /// Data to persist for this event. The handle is not included.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        match &self.payload {
            Payload::Empty | Payload::Action(_) => {}
            Payload::Relation(rel) => {
                snapshot.insert("relation_name".into(), rel.relation.name.clone().into());
                snapshot.insert("relation_id".into(), rel.relation.id.into());
                if let Some(app) = &rel.app {
                    snapshot.insert("app_name".into(), app.name.clone().into());
                }
                if let Some(unit) = &rel.unit {
                    snapshot.insert("unit_name".into(), unit.name.clone().into());
                }
            }
            Payload::Custom(data) => snapshot.clone_from(data),
        }
        snapshot
    }

    /// Rebuild an event from a snapshot, re-resolving referenced entities.
    pub async fn restore(
        handle: Handle,
        event_type: EventType,
        snapshot: &Snapshot,
        resolver: &dyn EntityResolver,
    ) -> Result<Self, EventError> {
        let payload = match event_type {
            EventType::Relation(_) => {
                Payload::Relation(restore_relation(&handle, snapshot, resolver).await?)
            }
            EventType::Action => {
                let event_action = action_name_from_kind(handle.kind()).unwrap_or_default();
                let env_action = resolver.current_action();
                if env_action.as_deref() != Some(event_action.as_str()) {
                    return Err(EventError::ActionMismatch {
                        event_action,
                        env_action,
                    });
                }
                Payload::Action(ActionEvent {
                    params: resolver.action_params().await?,
                })
            }
            EventType::Custom if !snapshot.is_empty() => Payload::Custom(snapshot.clone()),
            _ => Payload::Empty,
        };
        Ok(Self::new(handle, event_type, payload))
    }
}

fn action_name_from_kind(kind: &str) -> Option<String> {
    kind.strip_suffix("_action").map(|name| name.replace('_', "-"))
}

async fn restore_relation(
    handle: &Handle,
    snapshot: &Snapshot,
    resolver: &dyn EntityResolver,
) -> Result<RelationEvent, EventError> {
    let invalid = |reason: &str| EventError::InvalidSnapshot {
        handle: handle.path().to_string(),
        reason: reason.to_string(),
    };

    let name = snapshot
        .get("relation_name")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing relation_name"))?;
    let id = snapshot
        .get("relation_id")
        .and_then(Value::as_u64)
        .ok_or_else(|| invalid("missing relation_id"))?;

    let relation = resolver.resolve_relation(name, id).await?;
    let app = snapshot
        .get("app_name")
        .and_then(Value::as_str)
        .map(|name| resolver.resolve_app(name));
    let unit = match snapshot.get("unit_name").and_then(Value::as_str) {
        Some(name) => Some(resolver.resolve_unit(name)?),
        None => None,
    };

    Ok(RelationEvent {
        relation,
        app,
        unit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HookKind, RelationPhase};

    struct StaticResolver {
        relations: Vec<Relation>,
        action: Option<String>,
    }

    #[async_trait]
    impl EntityResolver for StaticResolver {
        async fn resolve_relation(&self, name: &str, id: u64) -> Result<Relation, EventError> {
            self.relations
                .iter()
                .find(|r| r.name == name && r.id == id)
                .cloned()
                .ok_or_else(|| EventError::Unresolved {
                    entity: format!("relation {name}:{id}"),
                    reason: "relation not found".to_string(),
                })
        }

        fn current_action(&self) -> Option<String> {
            self.action.clone()
        }

        async fn action_params(&self) -> Result<Map<String, Value>, EventError> {
            let mut params = Map::new();
            params.insert("force".into(), Value::Bool(true));
            Ok(params)
        }
    }

    fn prometheus_relation() -> Relation {
        let unit = Unit::parse("prometheus/0").unwrap();
        Relation {
            name: "prometheus".to_string(),
            id: 3,
            app: Some(unit.app.clone()),
            units: vec![unit],
        }
    }

    fn event_handle(kind: &str) -> Handle {
        Handle::root("AlertmanagerCharm")
            .nest("on", None)
            .nest(kind, Some("1".to_string()))
    }

    #[test]
    fn test_relation_event_rejects_foreign_unit() {
        let err = RelationEvent::new(
            prometheus_relation(),
            Some(Application::new("prometheus")),
            Some(Unit::parse("grafana/1").unwrap()),
        )
        .unwrap_err();
        assert!(matches!(err, EventError::UnitAppMismatch { .. }));

        let err = RelationEvent::new(
            prometheus_relation(),
            None,
            Some(Unit::parse("prometheus/0").unwrap()),
        )
        .unwrap_err();
        assert!(matches!(err, EventError::UnitAppMismatch { app: None, .. }));
    }

    #[tokio::test]
    async fn test_relation_event_round_trip() {
        let relation = prometheus_relation();
        let payload = RelationEvent::new(
            relation.clone(),
            Some(Application::new("prometheus")),
            Some(Unit::parse("prometheus/0").unwrap()),
        )
        .unwrap();
        let event = Event::new(
            event_handle("prometheus_relation_changed"),
            EventType::Relation(RelationPhase::Changed),
            Payload::Relation(payload),
        );

        let snapshot = event.snapshot();
        assert_eq!(snapshot["relation_name"], "prometheus");
        assert_eq!(snapshot["relation_id"], 3);
        assert_eq!(snapshot["unit_name"], "prometheus/0");

        let resolver = StaticResolver {
            relations: vec![relation],
            action: None,
        };
        let restored = Event::restore(
            event.handle().clone(),
            event.event_type(),
            &snapshot,
            &resolver,
        )
        .await
        .unwrap();
        assert_eq!(restored, event);
    }

    #[tokio::test]
    async fn test_restore_fails_for_vanished_relation() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("relation_name".into(), "prometheus".into());
        snapshot.insert("relation_id".into(), 9.into());

        let resolver = StaticResolver {
            relations: vec![prometheus_relation()],
            action: None,
        };
        let err = Event::restore(
            event_handle("prometheus_relation_broken"),
            EventType::Relation(RelationPhase::Broken),
            &snapshot,
            &resolver,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EventError::Unresolved { .. }));
    }

    #[tokio::test]
    async fn test_action_restore_checks_running_action() {
        let resolver = StaticResolver {
            relations: vec![],
            action: Some("other-action".to_string()),
        };
        let err = Event::restore(
            event_handle("backup_now_action"),
            EventType::Action,
            &Snapshot::new(),
            &resolver,
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            EventError::ActionMismatch {
                event_action: "backup-now".to_string(),
                env_action: Some("other-action".to_string()),
            }
        );

        let resolver = StaticResolver {
            relations: vec![],
            action: Some("backup-now".to_string()),
        };
        let event = Event::restore(
            event_handle("backup_now_action"),
            EventType::Action,
            &Snapshot::new(),
            &resolver,
        )
        .await
        .unwrap();
        assert_eq!(event.action_params().unwrap()["force"], true);
    }

    #[test]
    fn test_action_events_cannot_be_deferred() {
        let mut event = Event::new(
            event_handle("backup_now_action"),
            EventType::Action,
            Payload::Action(ActionEvent::default()),
        );
        assert_eq!(
            event.defer(),
            Err(EventError::NotDeferrable("action".to_string()))
        );
        assert!(!event.is_deferred());

        let mut event = Event::new(
            event_handle("config_changed"),
            EventType::Hook(HookKind::ConfigChanged),
            Payload::Empty,
        );
        event.defer().unwrap();
        assert!(event.is_deferred());
    }

    #[tokio::test]
    async fn test_custom_payload_round_trip() {
        let mut data = Snapshot::new();
        data.insert("reason".into(), "scrape".into());
        let event = Event::new(
            event_handle("new_prom_rel"),
            EventType::Custom,
            Payload::Custom(data),
        );
        let resolver = StaticResolver {
            relations: vec![],
            action: None,
        };
        let restored = Event::restore(
            event.handle().clone(),
            EventType::Custom,
            &event.snapshot(),
            &resolver,
        )
        .await
        .unwrap();
        assert_eq!(restored, event);
    }
}
