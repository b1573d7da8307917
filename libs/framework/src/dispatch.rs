//! Mapping a process invocation onto a charm event.

use std::path::Path;

use charm_events::{ActionEvent, Application, EventType, Payload, RelationEvent, Unit};
use tracing::{debug, info};

use crate::{EnvError, Framework, FrameworkError, RuntimeEnv};

/// Executable name the platform uses when it runs a single dispatch entry point.
const DISPATCH_EXECUTABLE: &str = "dispatch";

/// Derives the event to emit from how the process was invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatcher {
    event_name: String,
    charm_emitter: String,
}

impl Dispatcher {
    /// `exec_path` is the path the process was invoked as (`argv[0]`).
    ///
    /// When invoked as `dispatch`, the hook path comes from
    /// `JUJU_DISPATCH_PATH`. Executables under `actions/` map to
    /// `<name>_action`.
    pub fn new(exec_path: &Path, env: &RuntimeEnv, charm_emitter: impl Into<String>) -> Self {
        let invoked_as_dispatch = exec_path
            .file_name()
            .is_some_and(|name| name == DISPATCH_EXECUTABLE);

        let hook_path = match (&env.dispatch_path, invoked_as_dispatch) {
            (Some(dispatch_path), true) => Path::new(dispatch_path),
            _ => exec_path,
        };

        let mut event_name = hook_path
            .file_name()
            .map(|name| name.to_string_lossy().replace('-', "_"))
            .unwrap_or_default();
        let under_actions = hook_path
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|dir| dir == "actions");
        if under_actions {
            event_name.push_str("_action");
        }

        Self {
            event_name,
            charm_emitter: charm_emitter.into(),
        }
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Whether deferred events should be re-emitted before the new one.
    ///
    /// `collect_metrics` runs in a restricted context where charm code must
    /// not see unrelated events.
    pub fn reemits_deferred(&self) -> bool {
        self.event_name != "collect_metrics"
    }

    /// Re-emit deferred events, emit this invocation's event, and commit.
    pub async fn run(&self, framework: &mut Framework) -> Result<(), FrameworkError> {
        if self.reemits_deferred() {
            framework.reemit().await?;
        }

        match framework
            .registry()
            .event_type(&self.charm_emitter, &self.event_name)
        {
            Some(event_type) => {
                let payload = self.payload(framework, event_type).await?;
                info!(event = %self.event_name, "emitting platform event");
                framework
                    .emit(&self.charm_emitter, &self.event_name, payload)
                    .await?;
            }
            None => {
                debug!(event = %self.event_name, "event not defined for charm");
            }
        }

        framework.commit().await
    }

    /// Emit-time arguments taken from the environment.
    async fn payload(
        &self,
        framework: &Framework,
        event_type: EventType,
    ) -> Result<Payload, FrameworkError> {
        let model = framework.model();
        let env = model.env();
        match event_type {
            EventType::Relation(_) => {
                let name = env
                    .relation_name
                    .as_deref()
                    .ok_or(EnvError::Missing("JUJU_RELATION"))?;
                let id = env.relation_id.ok_or(EnvError::Missing("JUJU_RELATION_ID"))?;
                let relation = model.get_relation(name, id).await?;

                let (app, unit) = remote_entities(env)?;
                Ok(Payload::Relation(RelationEvent::new(relation, app, unit)?))
            }
            EventType::Action => Ok(Payload::Action(ActionEvent::default())),
            _ => Ok(Payload::Empty),
        }
    }
}

/// Remote app and unit of a relation hook. The app is inferred from the unit
/// name when the platform only supplies the unit.
fn remote_entities(env: &RuntimeEnv) -> Result<(Option<Application>, Option<Unit>), FrameworkError> {
    let unit = env.remote_unit.as_deref().map(Unit::parse).transpose()?;
    let app = match (&env.remote_app, &unit) {
        (Some(app), _) => Some(Application::new(app.as_str())),
        (None, Some(unit)) => Some(unit.app.clone()),
        (None, None) => None,
    };
    Ok((app, unit))
}
