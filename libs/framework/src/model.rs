//! Model facade and the platform capability it wraps.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use charm_events::{Application, EntityResolver, EventError, Relation, Unit};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::{CharmMeta, RuntimeEnv};

/// Errors from model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("relation {id} not found")]
    RelationNotFound { id: u64 },

    #[error("relation {0} is not declared in metadata")]
    UnknownRelation(String),

    #[error("resource {0} is not declared in metadata")]
    UndeclaredResource(String),

    #[error("permission denied: {0}")]
    Permission(String),

    /// The platform tooling reported a failure.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid data from backend: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Unit or application status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Active(String),
    Blocked(String),
    Maintenance(String),
    Waiting(String),
    Unknown,
}

impl Status {
    pub fn active() -> Self {
        Status::Active(String::new())
    }

    pub fn maintenance(message: impl Into<String>) -> Self {
        Status::Maintenance(message.into())
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Status::Blocked(message.into())
    }

    /// Name understood by the platform.
    pub fn name(&self) -> &'static str {
        match self {
            Status::Active(_) => "active",
            Status::Blocked(_) => "blocked",
            Status::Maintenance(_) => "maintenance",
            Status::Waiting(_) => "waiting",
            Status::Unknown => "unknown",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Status::Active(m) | Status::Blocked(m) | Status::Maintenance(m) | Status::Waiting(m) => {
                m
            }
            Status::Unknown => "",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Status::Active(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message().is_empty() {
            f.write_str(self.name())
        } else {
            write!(f, "{}: {}", self.name(), self.message())
        }
    }
}

/// Narrow capability interface onto the orchestration platform.
///
/// Everything charm code does to the outside world goes through this trait,
/// so handlers can be exercised against an in-memory implementation.
#[async_trait]
pub trait PlatformGateway: Send + Sync {
    /// Whether this unit currently holds leadership.
    async fn is_leader(&self) -> Result<bool, ModelError>;

    /// Charm configuration values.
    async fn config_get(&self) -> Result<Map<String, Value>, ModelError>;

    /// Ids of the established relations for an endpoint.
    async fn relation_ids(&self, name: &str) -> Result<Vec<u64>, ModelError>;

    /// Remote unit names in a relation.
    async fn relation_list(&self, relation_id: u64) -> Result<Vec<String>, ModelError>;

    /// Data bag of `member` (a unit or application name) in a relation.
    async fn relation_get(
        &self,
        relation_id: u64,
        member: &str,
        is_app: bool,
    ) -> Result<BTreeMap<String, String>, ModelError>;

    /// Write a key in this unit's (or, with `is_app`, this application's)
    /// bag. An empty value removes the key.
    async fn relation_set(
        &self,
        relation_id: u64,
        key: &str,
        value: &str,
        is_app: bool,
    ) -> Result<(), ModelError>;

    /// Local path of a resource file.
    async fn resource_get(&self, name: &str) -> Result<PathBuf, ModelError>;

    /// Submit the desired pod spec.
    async fn pod_spec_set(&self, spec: &Value) -> Result<(), ModelError>;

    async fn status_set(&self, status: &Status, is_app: bool) -> Result<(), ModelError>;

    async fn action_get(&self) -> Result<Map<String, Value>, ModelError>;

    async fn action_set(&self, results: &Map<String, Value>) -> Result<(), ModelError>;

    async fn action_log(&self, message: &str) -> Result<(), ModelError>;

    async fn action_fail(&self, message: &str) -> Result<(), ModelError>;

    /// Write a line to the platform's debug log.
    async fn juju_log(&self, level: &str, message: &str) -> Result<(), ModelError>;
}

/// View of the model from the perspective of this unit.
#[derive(Clone)]
pub struct Model {
    gateway: Arc<dyn PlatformGateway>,
    meta: Arc<CharmMeta>,
    env: RuntimeEnv,
    unit: Unit,
}

impl Model {
    pub fn new(
        meta: Arc<CharmMeta>,
        env: RuntimeEnv,
        gateway: Arc<dyn PlatformGateway>,
    ) -> Result<Self, ModelError> {
        let unit = Unit::parse(&env.unit_name)?;
        Ok(Self {
            gateway,
            meta,
            env,
            unit,
        })
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn app(&self) -> &Application {
        &self.unit.app
    }

    pub fn meta(&self) -> &CharmMeta {
        &self.meta
    }

    pub fn env(&self) -> &RuntimeEnv {
        &self.env
    }

    pub fn gateway(&self) -> &Arc<dyn PlatformGateway> {
        &self.gateway
    }

    /// Model name; also the namespace the unit runs in.
    pub fn name(&self) -> Option<&str> {
        self.env.model_name.as_deref()
    }

    pub async fn is_leader(&self) -> Result<bool, ModelError> {
        self.gateway.is_leader().await
    }

    pub async fn config(&self) -> Result<Map<String, Value>, ModelError> {
        self.gateway.config_get().await
    }

    /// All established relations for a declared endpoint.
    pub async fn relations(&self, name: &str) -> Result<Vec<Relation>, ModelError> {
        let meta = self
            .meta
            .relations
            .get(name)
            .ok_or_else(|| ModelError::UnknownRelation(name.to_string()))?;
        let is_peer = meta.role.is_peer();

        let mut relations = Vec::new();
        for id in self.gateway.relation_ids(name).await? {
            relations.push(self.load_relation(name, id, is_peer).await?);
        }
        Ok(relations)
    }

    /// A single relation by compound key. Fails if it does not exist.
    pub async fn get_relation(&self, name: &str, id: u64) -> Result<Relation, ModelError> {
        self.relations(name)
            .await?
            .into_iter()
            .find(|rel| rel.id == id)
            .ok_or(ModelError::RelationNotFound { id })
    }

    async fn load_relation(&self, name: &str, id: u64, is_peer: bool) -> Result<Relation, ModelError> {
        // A relation being torn down is still listed but has no members.
        let members = match self.gateway.relation_list(id).await {
            Ok(members) => members,
            Err(ModelError::RelationNotFound { .. }) => {
                debug!(relation = name, relation_id = id, "relation is going away");
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        let units = members
            .iter()
            .map(|unit| Unit::parse(unit))
            .collect::<Result<Vec<_>, _>>()?;

        let app = if is_peer {
            Some(self.app().clone())
        } else {
            units.first().map(|unit| unit.app.clone())
        };

        Ok(Relation {
            name: name.to_string(),
            id,
            app,
            units,
        })
    }

    /// Data bag of a relation member.
    pub async fn relation_data(
        &self,
        relation: &Relation,
        member: &str,
        is_app: bool,
    ) -> Result<BTreeMap<String, String>, ModelError> {
        self.gateway.relation_get(relation.id, member, is_app).await
    }

    /// Write into our own unit bag, or the application bag when leader.
    pub async fn set_relation_data(
        &self,
        relation: &Relation,
        key: &str,
        value: &str,
        is_app: bool,
    ) -> Result<(), ModelError> {
        if is_app && !self.is_leader().await? {
            return Err(ModelError::Permission(format!(
                "unit {} cannot write application data on relation {}:{} without leadership",
                self.unit.name, relation.name, relation.id
            )));
        }
        debug!(relation = %relation.name, relation_id = relation.id, key, is_app, "setting relation data");
        self.gateway
            .relation_set(relation.id, key, value, is_app)
            .await
    }

    /// Local path of a declared resource.
    pub async fn fetch_resource(&self, name: &str) -> Result<PathBuf, ModelError> {
        if !self.meta.resources.contains_key(name) {
            return Err(ModelError::UndeclaredResource(name.to_string()));
        }
        self.gateway.resource_get(name).await
    }

    /// Submit a pod spec. Only the leader may do so.
    pub async fn set_pod_spec(&self, spec: &Value) -> Result<(), ModelError> {
        if !self.is_leader().await? {
            return Err(ModelError::Permission(
                "cannot set a pod spec as this unit is not a leader".to_string(),
            ));
        }
        self.gateway.pod_spec_set(spec).await
    }

    pub async fn set_unit_status(&self, status: &Status) -> Result<(), ModelError> {
        self.gateway.status_set(status, false).await
    }

    pub async fn action_set_results(&self, results: &Map<String, Value>) -> Result<(), ModelError> {
        self.gateway.action_set(results).await
    }

    pub async fn action_log(&self, message: &str) -> Result<(), ModelError> {
        self.gateway.action_log(message).await
    }

    pub async fn action_fail(&self, message: &str) -> Result<(), ModelError> {
        self.gateway.action_fail(message).await
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("unit", &self.unit.name)
            .field("model", &self.env.model_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EntityResolver for Model {
    async fn resolve_relation(&self, name: &str, id: u64) -> Result<Relation, EventError> {
        self.get_relation(name, id)
            .await
            .map_err(|err| EventError::Unresolved {
                entity: format!("relation {name}:{id}"),
                reason: err.to_string(),
            })
    }

    fn current_action(&self) -> Option<String> {
        self.env.action_name.clone()
    }

    async fn action_params(&self) -> Result<Map<String, Value>, EventError> {
        self.gateway
            .action_get()
            .await
            .map_err(|err| EventError::Unresolved {
                entity: "action parameters".to_string(),
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGateway;

    fn model(gateway: Arc<FakeGateway>) -> Model {
        let meta = CharmMeta::from_yaml(
            r#"
provides:
  prometheus: {interface: prometheus-alerting}
peers:
  cluster: {interface: alertmanager-peers}
resources:
  alertmanager-image: {type: oci-image}
"#,
            None,
        )
        .unwrap();
        let env = RuntimeEnv {
            unit_name: "alertmanager/0".to_string(),
            ..RuntimeEnv::default()
        };
        Model::new(Arc::new(meta), env, gateway).unwrap()
    }

    #[tokio::test]
    async fn test_relations_resolve_remote_app() {
        let gateway = Arc::new(FakeGateway::new());
        let id = gateway
            .add_relation("prometheus", &["prometheus/0", "prometheus/1"])
            .await;
        let peer_id = gateway.add_relation("cluster", &[]).await;
        let model = model(gateway);

        let rel = model.get_relation("prometheus", id).await.unwrap();
        assert_eq!(rel.app, Some(Application::new("prometheus")));
        assert_eq!(rel.units.len(), 2);

        let peer = model.get_relation("cluster", peer_id).await.unwrap();
        assert_eq!(peer.app, Some(Application::new("alertmanager")));

        assert!(matches!(
            model.get_relation("prometheus", 99).await,
            Err(ModelError::RelationNotFound { id: 99, .. })
        ));
        assert!(matches!(
            model.relations("grafana").await,
            Err(ModelError::UnknownRelation(_))
        ));
    }

    #[tokio::test]
    async fn test_departing_relation_does_not_hide_live_ones() {
        let gateway = Arc::new(FakeGateway::new());
        let live = gateway.add_relation("prometheus", &["prometheus/0"]).await;
        let departing = gateway
            .add_relation("prometheus", &["prometheus-k8s/0"])
            .await;
        gateway.depart_relation(departing).await;
        let model = model(gateway);

        let relations = model.relations("prometheus").await.unwrap();
        assert_eq!(relations.len(), 2);

        let rel = model.get_relation("prometheus", live).await.unwrap();
        assert_eq!(rel.units, vec![Unit::parse("prometheus/0").unwrap()]);

        let gone = model.get_relation("prometheus", departing).await.unwrap();
        assert!(gone.units.is_empty());
        assert_eq!(gone.app, None);
    }

    #[tokio::test]
    async fn test_app_data_requires_leadership() {
        let gateway = Arc::new(FakeGateway::new());
        let id = gateway.add_relation("prometheus", &["prometheus/0"]).await;
        let model = model(gateway.clone());
        let rel = model.get_relation("prometheus", id).await.unwrap();

        assert!(matches!(
            model.set_relation_data(&rel, "k", "v", true).await,
            Err(ModelError::Permission(_))
        ));

        model.set_relation_data(&rel, "k", "v", false).await.unwrap();
        let bag = model
            .relation_data(&rel, "alertmanager/0", false)
            .await
            .unwrap();
        assert_eq!(bag.get("k").map(String::as_str), Some("v"));

        model.set_relation_data(&rel, "k", "", false).await.unwrap();
        let bag = model
            .relation_data(&rel, "alertmanager/0", false)
            .await
            .unwrap();
        assert!(bag.is_empty());

        gateway.set_leader(true).await;
        model.set_relation_data(&rel, "k", "v", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_pod_spec_and_resources_are_guarded() {
        let gateway = Arc::new(FakeGateway::new());
        let model = model(gateway.clone());

        assert!(matches!(
            model.set_pod_spec(&serde_json::json!({})).await,
            Err(ModelError::Permission(_))
        ));
        assert!(matches!(
            model.fetch_resource("other").await,
            Err(ModelError::UndeclaredResource(_))
        ));

        gateway.set_leader(true).await;
        model.set_pod_spec(&serde_json::json!({"containers": []})).await.unwrap();
        assert_eq!(gateway.pod_specs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_action_results_logs_and_failure() {
        let gateway = Arc::new(FakeGateway::new());
        let mut params = Map::new();
        params.insert("silence".into(), Value::from("30m"));
        gateway.set_action_params(params.clone()).await;
        let model = model(gateway.clone());

        assert_eq!(EntityResolver::action_params(&model).await.unwrap(), params);

        let mut results = Map::new();
        results.insert("reloaded".into(), Value::Bool(true));
        model.action_set_results(&results).await.unwrap();
        model.action_log("reloading configuration").await.unwrap();
        model.action_fail("alertmanager rejected the config").await.unwrap();

        assert_eq!(gateway.action_results().await, results);
        assert_eq!(gateway.action_logs().await, vec!["reloading configuration"]);
        assert_eq!(
            gateway.action_failure().await.as_deref(),
            Some("alertmanager rejected the config")
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::active().to_string(), "active");
        assert_eq!(
            Status::maintenance("Pod is starting").to_string(),
            "maintenance: Pod is starting"
        );
        assert_eq!(Status::Unknown.name(), "unknown");
    }
}
