//! Event delivery across process invocations.
//!
//! Each "invocation" builds a fresh framework over the same on-disk store,
//! the way the platform runs one process per hook.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use charm_events::{ActionEvent, Event, EventType, Payload, RelationEvent};
use charm_framework::testing::FakeGateway;
use charm_framework::{
    CharmMeta, EventContext, EventStore, Framework, FrameworkError, Model, Observer, RuntimeEnv,
    SourceRegistry, CHARM_STATE_FILE,
};

const CHARM: &str = "Charm/on";
const INTERFACE: &str = "Charm/Interface[prometheus]/on";

const METADATA: &str = "provides:\n  prometheus:\n    interface: prometheus-alerting\n";
const ACTIONS: &str = "backup-now:\n  description: snapshot\n";

/// Records every delivery as `observer:kind` and defers on request.
struct Recorder {
    path: String,
    log: Arc<Mutex<Vec<String>>>,
    defer: bool,
    emit_on_start: bool,
}

#[async_trait]
impl Observer for Recorder {
    fn handle_path(&self) -> &str {
        &self.path
    }

    async fn notify(
        &self,
        _method: &str,
        event: &mut Event,
        ctx: &mut EventContext<'_>,
    ) -> anyhow::Result<()> {
        let kind = event.handle().kind().to_string();
        self.log.lock().unwrap().push(format!("{}:{}", self.path, kind));

        if self.emit_on_start && kind == "start" {
            ctx.emit(INTERFACE, "new_prom_rel", Payload::Empty);
        }
        if self.defer && kind != "pre_commit" && kind != "commit" {
            event.defer()?;
        }
        Ok(())
    }
}

struct Invocation {
    framework: Framework,
    log: Arc<Mutex<Vec<String>>>,
}

fn invocation(dir: &Path, gateway: Arc<FakeGateway>, action: Option<&str>) -> Invocation {
    let meta = CharmMeta::from_yaml(METADATA, Some(ACTIONS)).unwrap();
    let mut registry = SourceRegistry::for_charm(&meta, CHARM).unwrap();
    registry
        .define(INTERFACE, "new_prom_rel", EventType::Custom)
        .unwrap();

    let env = RuntimeEnv {
        unit_name: "alertmanager/0".to_string(),
        charm_dir: dir.to_path_buf(),
        action_name: action.map(str::to_string),
        ..RuntimeEnv::default()
    };
    let model = Model::new(Arc::new(meta), env, gateway).unwrap();
    let store = EventStore::open(dir.join(CHARM_STATE_FILE)).unwrap();

    Invocation {
        framework: Framework::new(store, registry, model).unwrap(),
        log: Arc::new(Mutex::new(Vec::new())),
    }
}

impl Invocation {
    fn observe(&mut self, path: &str, kinds: &[(&str, &str)], defer: bool) {
        self.observe_with(path, kinds, defer, false);
    }

    fn observe_with(&mut self, path: &str, kinds: &[(&str, &str)], defer: bool, emit_on_start: bool) {
        self.framework.register_observer(Arc::new(Recorder {
            path: path.to_string(),
            log: self.log.clone(),
            defer,
            emit_on_start,
        }));
        for (emitter, kind) in kinds {
            self.framework
                .observe(emitter, kind, path, &format!("on_{kind}"))
                .unwrap();
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_deferred_event_is_redelivered_before_new_event() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());

    // First invocation defers config_changed.
    let mut first = invocation(dir.path(), gateway.clone(), None);
    first.observe("Charm", &[(CHARM, "config_changed")], true);
    first
        .framework
        .emit(CHARM, "config_changed", Payload::Empty)
        .await
        .unwrap();
    first.framework.commit().await.unwrap();
    assert_eq!(first.log(), ["Charm:config_changed"]);
    drop(first);

    // Second invocation handles it, then sees the new event.
    let mut second = invocation(dir.path(), gateway, None);
    second.observe("Charm", &[(CHARM, "config_changed"), (CHARM, "update_status")], false);
    second.framework.reemit().await.unwrap();
    second
        .framework
        .emit(CHARM, "update_status", Payload::Empty)
        .await
        .unwrap();
    second.framework.commit().await.unwrap();
    assert_eq!(
        second.log(),
        ["Charm:config_changed", "Charm:update_status"]
    );
    drop(second);

    // Nothing is left for a third invocation.
    let mut third = invocation(dir.path(), Arc::new(FakeGateway::new()), None);
    third.observe("Charm", &[(CHARM, "config_changed")], false);
    third.framework.reemit().await.unwrap();
    assert!(third.log().is_empty());
}

#[tokio::test]
async fn test_only_deferring_observer_sees_event_again() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());

    let mut first = invocation(dir.path(), gateway.clone(), None);
    first.observe("A", &[(CHARM, "start")], false);
    first.observe("B", &[(CHARM, "start")], true);
    first.framework.emit(CHARM, "start", Payload::Empty).await.unwrap();
    first.framework.commit().await.unwrap();
    assert_eq!(first.log(), ["A:start", "B:start"]);
    drop(first);

    let mut second = invocation(dir.path(), gateway, None);
    second.observe("A", &[(CHARM, "start")], false);
    second.observe("B", &[(CHARM, "start")], false);
    second.framework.reemit().await.unwrap();
    assert_eq!(second.log(), ["B:start"]);
}

#[tokio::test]
async fn test_event_keys_continue_across_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());

    let mut first = invocation(dir.path(), gateway.clone(), None);
    first.framework.emit(CHARM, "install", Payload::Empty).await.unwrap();
    first.framework.commit().await.unwrap();
    let count = first.framework.event_count();
    drop(first);

    let second = invocation(dir.path(), gateway, None);
    assert_eq!(second.framework.event_count(), count);
}

#[tokio::test]
async fn test_derived_events_follow_current_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut inv = invocation(dir.path(), Arc::new(FakeGateway::new()), None);
    inv.observe_with("Charm", &[(CHARM, "start")], false, true);
    inv.observe("Interface", &[(INTERFACE, "new_prom_rel")], false);
    inv.observe("Late", &[(CHARM, "start")], false);

    inv.framework.emit(CHARM, "start", Payload::Empty).await.unwrap();

    assert_eq!(
        inv.log(),
        ["Charm:start", "Late:start", "Interface:new_prom_rel"]
    );
}

#[tokio::test]
async fn test_deferring_an_action_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());

    let mut first = invocation(dir.path(), gateway.clone(), Some("backup-now"));
    first.observe("Charm", &[(CHARM, "backup_now_action")], true);
    let err = first
        .framework
        .emit(CHARM, "backup_now_action", Payload::Action(ActionEvent::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, FrameworkError::Handler { .. }));
    assert_eq!(first.log(), ["Charm:backup_now_action"]);
    drop(first);

    let mut second = invocation(dir.path(), gateway, Some("backup-now"));
    second.observe("Charm", &[(CHARM, "backup_now_action")], false);
    second.framework.reemit().await.unwrap();
    assert!(second.log().is_empty());
    assert_eq!(second.framework.event_count(), 0);
}

#[tokio::test]
async fn test_deferred_relation_event_fails_when_relation_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());
    let id = gateway.add_relation("prometheus", &["prometheus/0"]).await;

    let mut first = invocation(dir.path(), gateway.clone(), None);
    first.observe("Charm", &[(CHARM, "prometheus_relation_changed")], true);
    let relation = first
        .framework
        .model()
        .get_relation("prometheus", id)
        .await
        .unwrap();
    let app = relation.app.clone();
    let payload = Payload::Relation(RelationEvent::new(relation, app, None).unwrap());
    first
        .framework
        .emit(CHARM, "prometheus_relation_changed", payload)
        .await
        .unwrap();
    first.framework.commit().await.unwrap();
    drop(first);

    gateway.remove_relation(id).await;

    let mut second = invocation(dir.path(), gateway, None);
    second.observe("Charm", &[(CHARM, "prometheus_relation_changed")], false);
    let err = second.framework.reemit().await.unwrap_err();
    assert!(matches!(err, FrameworkError::Event(_)));
}

#[tokio::test]
async fn test_notices_for_undefined_sources_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());

    let mut first = invocation(dir.path(), gateway.clone(), None);
    first.observe("Interface", &[(INTERFACE, "new_prom_rel")], true);
    first
        .framework
        .emit(INTERFACE, "new_prom_rel", Payload::Empty)
        .await
        .unwrap();
    first.framework.commit().await.unwrap();
    drop(first);

    // A charm build without the interface no longer knows the source.
    let meta = CharmMeta::from_yaml(METADATA, None).unwrap();
    let registry = SourceRegistry::for_charm(&meta, CHARM).unwrap();
    let env = RuntimeEnv {
        unit_name: "alertmanager/0".to_string(),
        ..RuntimeEnv::default()
    };
    let model = Model::new(Arc::new(meta), env, gateway).unwrap();
    let store = EventStore::open(dir.path().join(CHARM_STATE_FILE)).unwrap();
    let mut framework = Framework::new(store, registry, model).unwrap();
    framework.reemit().await.unwrap();
    framework.commit().await.unwrap();
    drop(framework);

    let store = EventStore::open(dir.path().join(CHARM_STATE_FILE)).unwrap();
    assert!(store.notices(None).unwrap().is_empty());
}

#[tokio::test]
async fn test_dispatcher_builds_relation_event_from_env() {
    use charm_framework::Dispatcher;

    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new());
    let id = gateway.add_relation("prometheus", &["prometheus/0"]).await;

    let meta = CharmMeta::from_yaml(METADATA, None).unwrap();
    let registry = SourceRegistry::for_charm(&meta, CHARM).unwrap();
    let env = RuntimeEnv {
        unit_name: "alertmanager/0".to_string(),
        relation_name: Some("prometheus".to_string()),
        relation_id: Some(id),
        remote_unit: Some("prometheus/0".to_string()),
        ..RuntimeEnv::default()
    };
    let dispatcher = Dispatcher::new(
        &dir.path().join("hooks/prometheus-relation-joined"),
        &env,
        CHARM,
    );
    let model = Model::new(Arc::new(meta), env, gateway).unwrap();
    let store = EventStore::open(dir.path().join(CHARM_STATE_FILE)).unwrap();
    let mut framework = Framework::new(store, registry, model).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    framework.register_observer(Arc::new(Recorder {
        path: "Charm".to_string(),
        log: log.clone(),
        defer: false,
        emit_on_start: false,
    }));
    framework
        .observe(CHARM, "prometheus_relation_joined", "Charm", "on_joined")
        .unwrap();

    dispatcher.run(&mut framework).await.unwrap();
    assert_eq!(*log.lock().unwrap(), ["Charm:prometheus_relation_joined"]);
}
