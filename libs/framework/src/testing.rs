//! In-memory [`PlatformGateway`] for tests.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::{ModelError, PlatformGateway, Status};

#[derive(Debug, Default)]
struct FakeRelation {
    name: String,
    units: Vec<String>,
    /// Member name to data bag.
    data: BTreeMap<String, BTreeMap<String, String>>,
    app_data: BTreeMap<String, BTreeMap<String, String>>,
    /// Still listed by `relation_ids`, but membership queries fail.
    departing: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    unit_name: String,
    leader: bool,
    config: Map<String, Value>,
    next_relation_id: u64,
    relations: BTreeMap<u64, FakeRelation>,
    resources: BTreeMap<String, PathBuf>,
    pod_specs: Vec<Value>,
    unit_statuses: Vec<Status>,
    app_statuses: Vec<Status>,
    action_params: Map<String, Value>,
    action_results: Map<String, Value>,
    action_logs: Vec<String>,
    action_failure: Option<String>,
    logs: Vec<(String, String)>,
}

/// Records everything charm code asks of the platform.
#[derive(Debug)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    /// A non-leader gateway for unit `alertmanager/0`.
    pub fn new() -> Self {
        Self::for_unit("alertmanager/0")
    }

    pub fn for_unit(unit_name: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                unit_name: unit_name.to_string(),
                ..FakeState::default()
            }),
        }
    }

    pub async fn set_leader(&self, leader: bool) {
        self.state.lock().await.leader = leader;
    }

    pub async fn set_config(&self, key: &str, value: Value) {
        self.state.lock().await.config.insert(key.to_string(), value);
    }

    pub async fn set_resource(&self, name: &str, path: PathBuf) {
        self.state
            .lock()
            .await
            .resources
            .insert(name.to_string(), path);
    }

    pub async fn set_action_params(&self, params: Map<String, Value>) {
        self.state.lock().await.action_params = params;
    }

    /// Establish a relation with the given remote units and return its id.
    pub async fn add_relation(&self, name: &str, units: &[&str]) -> u64 {
        let mut state = self.state.lock().await;
        let id = state.next_relation_id;
        state.next_relation_id += 1;
        state.relations.insert(
            id,
            FakeRelation {
                name: name.to_string(),
                units: units.iter().map(|u| u.to_string()).collect(),
                ..FakeRelation::default()
            },
        );
        id
    }

    /// Keep the relation listed while its membership can no longer be read,
    /// as happens while the platform tears it down.
    pub async fn depart_relation(&self, id: u64) {
        if let Some(rel) = self.state.lock().await.relations.get_mut(&id) {
            rel.departing = true;
        }
    }

    pub async fn remove_relation(&self, id: u64) {
        self.state.lock().await.relations.remove(&id);
    }

    pub async fn relation_bag(&self, id: u64, member: &str) -> BTreeMap<String, String> {
        self.state
            .lock()
            .await
            .relations
            .get(&id)
            .and_then(|rel| rel.data.get(member).cloned())
            .unwrap_or_default()
    }

    pub async fn pod_specs(&self) -> Vec<Value> {
        self.state.lock().await.pod_specs.clone()
    }

    pub async fn unit_statuses(&self) -> Vec<Status> {
        self.state.lock().await.unit_statuses.clone()
    }

    pub async fn app_statuses(&self) -> Vec<Status> {
        self.state.lock().await.app_statuses.clone()
    }

    pub async fn action_results(&self) -> Map<String, Value> {
        self.state.lock().await.action_results.clone()
    }

    pub async fn action_logs(&self) -> Vec<String> {
        self.state.lock().await.action_logs.clone()
    }

    pub async fn action_failure(&self) -> Option<String> {
        self.state.lock().await.action_failure.clone()
    }

    /// `(level, message)` pairs sent to the debug log.
    pub async fn logs(&self) -> Vec<(String, String)> {
        self.state.lock().await.logs.clone()
    }
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn app_of(unit: &str) -> &str {
    unit.split_once('/').map_or(unit, |(app, _)| app)
}

#[async_trait]
impl PlatformGateway for FakeGateway {
    async fn is_leader(&self) -> Result<bool, ModelError> {
        Ok(self.state.lock().await.leader)
    }

    async fn config_get(&self) -> Result<Map<String, Value>, ModelError> {
        Ok(self.state.lock().await.config.clone())
    }

    async fn relation_ids(&self, name: &str) -> Result<Vec<u64>, ModelError> {
        Ok(self
            .state
            .lock()
            .await
            .relations
            .iter()
            .filter(|(_, rel)| rel.name == name)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn relation_list(&self, relation_id: u64) -> Result<Vec<String>, ModelError> {
        let state = self.state.lock().await;
        let rel = state
            .relations
            .get(&relation_id)
            .filter(|rel| !rel.departing)
            .ok_or(ModelError::RelationNotFound { id: relation_id })?;
        Ok(rel.units.clone())
    }

    async fn relation_get(
        &self,
        relation_id: u64,
        member: &str,
        is_app: bool,
    ) -> Result<BTreeMap<String, String>, ModelError> {
        let state = self.state.lock().await;
        let rel = state
            .relations
            .get(&relation_id)
            .ok_or(ModelError::RelationNotFound { id: relation_id })?;
        let bags = if is_app { &rel.app_data } else { &rel.data };
        Ok(bags.get(member).cloned().unwrap_or_default())
    }

    async fn relation_set(
        &self,
        relation_id: u64,
        key: &str,
        value: &str,
        is_app: bool,
    ) -> Result<(), ModelError> {
        let mut state = self.state.lock().await;
        let member = if is_app {
            app_of(&state.unit_name).to_string()
        } else {
            state.unit_name.clone()
        };
        let rel = state
            .relations
            .get_mut(&relation_id)
            .ok_or(ModelError::RelationNotFound { id: relation_id })?;
        let bags = if is_app {
            &mut rel.app_data
        } else {
            &mut rel.data
        };
        let bag = bags.entry(member).or_default();
        if value.is_empty() {
            bag.remove(key);
        } else {
            bag.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn resource_get(&self, name: &str) -> Result<PathBuf, ModelError> {
        self.state
            .lock()
            .await
            .resources
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::Backend(format!("resource {name} not found")))
    }

    async fn pod_spec_set(&self, spec: &Value) -> Result<(), ModelError> {
        self.state.lock().await.pod_specs.push(spec.clone());
        Ok(())
    }

    async fn status_set(&self, status: &Status, is_app: bool) -> Result<(), ModelError> {
        let mut state = self.state.lock().await;
        if is_app {
            state.app_statuses.push(status.clone());
        } else {
            state.unit_statuses.push(status.clone());
        }
        Ok(())
    }

    async fn action_get(&self) -> Result<Map<String, Value>, ModelError> {
        Ok(self.state.lock().await.action_params.clone())
    }

    async fn action_set(&self, results: &Map<String, Value>) -> Result<(), ModelError> {
        let mut state = self.state.lock().await;
        for (key, value) in results {
            state.action_results.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn action_log(&self, message: &str) -> Result<(), ModelError> {
        self.state.lock().await.action_logs.push(message.to_string());
        Ok(())
    }

    async fn action_fail(&self, message: &str) -> Result<(), ModelError> {
        self.state.lock().await.action_failure = Some(message.to_string());
        Ok(())
    }

    async fn juju_log(&self, level: &str, message: &str) -> Result<(), ModelError> {
        self.state
            .lock()
            .await
            .logs
            .push((level.to_string(), message.to_string()));
        Ok(())
    }
}
