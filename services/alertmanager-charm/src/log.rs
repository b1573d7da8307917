//! Logging setup.
//!
//! Records are forwarded to the platform's debug log through
//! [`PlatformGateway::juju_log`]. The platform also captures hook stderr, so
//! the JSON stderr layer is only added on request.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use charm_framework::{ModelError, PlatformGateway};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

/// Platform log level name for a tracing level.
pub fn platform_level(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG | Level::TRACE => "DEBUG",
    }
}

#[derive(Debug)]
struct LogRecord {
    level: &'static str,
    message: String,
}

type SharedSender = Arc<Mutex<Option<mpsc::UnboundedSender<LogRecord>>>>;

/// Queues every event that passes the filter for [`LogForwarder`].
///
/// `on_event` runs synchronously inside the tracing call, so records are
/// handed to a task instead of awaiting the gateway here.
pub struct JujuLogLayer {
    tx: SharedSender,
}

/// Task delivering queued records to the gateway, in order.
pub struct LogForwarder {
    tx: SharedSender,
    task: JoinHandle<Result<usize, ModelError>>,
}

/// Create the layer and the forwarding task. Must be called inside a tokio
/// runtime.
pub fn juju_log_forwarder(gateway: Arc<dyn PlatformGateway>) -> (JujuLogLayer, LogForwarder) {
    let (tx, mut rx) = mpsc::unbounded_channel::<LogRecord>();
    let tx: SharedSender = Arc::new(Mutex::new(Some(tx)));

    let task = tokio::spawn(async move {
        let mut forwarded = 0;
        while let Some(record) = rx.recv().await {
            gateway.juju_log(record.level, &record.message).await?;
            forwarded += 1;
        }
        Ok(forwarded)
    });

    (
        JujuLogLayer { tx: tx.clone() },
        LogForwarder { tx, task },
    )
}

impl LogForwarder {
    /// Stop accepting records and wait for the queued ones to be delivered.
    ///
    /// Returns the number of records forwarded. Records emitted after this
    /// call are dropped.
    pub async fn finish(self) -> anyhow::Result<usize> {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
        Ok(self.task.await??)
    }
}

impl<S> Layer<S> for JujuLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Ok(tx) = self.tx.lock() else {
            return;
        };
        let Some(tx) = tx.as_ref() else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        // A closed channel means forwarding already failed; finish() reports it.
        let _ = tx.send(LogRecord {
            level: platform_level(event.metadata().level()),
            message: visitor.finish(),
        });
    }
}

/// Renders `message` followed by the remaining fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }

    fn push_field(&mut self, field: &Field, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", field.name(), value);
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field, format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field, format_args!("{value:?}"));
        }
    }
}

/// Install the charm's subscriber for the current thread.
///
/// `RUST_LOG` wins over `level`; `debug` forces debug output. JSON output on
/// stderr is added only when `json_stderr` is set.
pub fn init(level: &str, debug: bool, json_stderr: bool, juju_log: JujuLogLayer) -> DefaultGuard {
    let default_level = if debug { "debug" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr = json_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(juju_log);

    tracing::subscriber::set_default(subscriber)
}
