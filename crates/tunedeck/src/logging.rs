//! Tracing setup.
//!
//! While the terminal UI owns the screen, events are formatted into single lines and sent
//! to the UI's log pane instead of stderr.

use crossbeam_channel::Sender;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info,tunedeck=info,tunedeck_player=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Plain stderr logging, for commands that never start the UI.
pub fn init_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Route all events to `log_tx` as formatted lines.
pub fn init_ui(log_tx: Sender<String>) {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(UiLogLayer::new(log_tx))
        .init();
}

pub struct UiLogLayer {
    log_tx: Sender<String>,
}

impl UiLogLayer {
    pub fn new(log_tx: Sender<String>) -> Self {
        Self { log_tx }
    }
}

impl<S> Layer<S> for UiLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        let mut line = format!(
            "{:>5} {}: {}",
            meta.level().to_string(),
            meta.target(),
            visitor.message.unwrap_or_default()
        );
        for field in &visitor.fields {
            line.push(' ');
            line.push_str(field);
        }
        // The UI may already be gone during shutdown.
        let _ = self.log_tx.send(line);
    }
}

#[derive(Default)]
struct LineVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let formatted = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(formatted);
        } else {
            self.fields.push(format!("{}={}", field.name(), formatted));
        }
    }
}
