//! The `prometheus` relation endpoint.
//!
//! Turns changes on the relation into a single `new_prom_rel` event that the
//! charm reacts to by publishing its alerting configuration.

use std::sync::Arc;

use async_trait::async_trait;
use charm_events::{Event, EventType, Payload};
use charm_framework::registry::source_name;
use charm_framework::{EventContext, Framework, FrameworkError, Observer};
use tracing::debug;

/// Kind of the event emitted when a Prometheus relation changes.
pub const NEW_PROM_REL: &str = "new_prom_rel";

pub struct PrometheusInterface {
    handle_path: String,
    emitter: String,
    relation_name: String,
}

impl PrometheusInterface {
    /// Interface for `relation_name`, owned by the object at `parent_path`.
    pub fn new(parent_path: &str, relation_name: &str) -> Self {
        let handle_path = format!("{parent_path}/PrometheusInterface[{relation_name}]");
        Self {
            emitter: format!("{handle_path}/on"),
            handle_path,
            relation_name: relation_name.to_string(),
        }
    }

    /// Emitter path of this interface's own events.
    pub fn emitter(&self) -> &str {
        &self.emitter
    }

    /// Define `new_prom_rel` and start listening to relation changes
    /// emitted from `charm_emitter`.
    pub fn register(
        self: Arc<Self>,
        framework: &mut Framework,
        charm_emitter: &str,
    ) -> Result<(), FrameworkError> {
        framework.define_source(&self.emitter, NEW_PROM_REL, EventType::Custom)?;
        framework.register_observer(self.clone());

        let changed = source_name(&format!("{}_relation_changed", self.relation_name));
        framework.observe(charm_emitter, &changed, &self.handle_path, "on_relation_changed")
    }
}

#[async_trait]
impl Observer for PrometheusInterface {
    fn handle_path(&self) -> &str {
        &self.handle_path
    }

    async fn notify(
        &self,
        method: &str,
        event: &mut Event,
        ctx: &mut EventContext<'_>,
    ) -> anyhow::Result<()> {
        if method != "on_relation_changed" {
            anyhow::bail!("{} has no handler {method}", self.handle_path);
        }
        if let Some(relation) = event.relation() {
            debug!(
                relation = %relation.relation.name,
                relation_id = relation.relation.id,
                "Prometheus relation changed"
            );
        }
        ctx.emit(self.emitter.clone(), NEW_PROM_REL, Payload::Empty);
        Ok(())
    }
}
