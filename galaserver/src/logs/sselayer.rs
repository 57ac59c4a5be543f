use super::{LogEntry, LogState};
use std::{fmt, time::SystemTime};
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context};

/// Layer `tracing` qui recopie chaque événement dans le buffer partagé
///
/// Les entrées sont ensuite servies par `/log-dump` et diffusées par `/log-sse`.
pub struct SseLayer {
    state: LogState,
}

impl SseLayer {
    pub fn new(state: LogState) -> Self {
        Self { state }
    }
}

impl<S: Subscriber> Layer<S> for SseLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.state.push(LogEntry {
            timestamp: SystemTime::now(),
            level: metadata.level().as_str().to_string(),
            target: metadata.target().to_string(),
            message: visitor.finish(),
        });
    }
}

/// Concatène le message et les champs structurés d'un événement
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.join(" ")
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;
    use tracing_subscriber::{Registry, filter::LevelFilter, layer::SubscriberExt, reload};

    #[test]
    fn test_events_reach_the_buffer() {
        let (filter, handle) = reload::Layer::new(LevelFilter::TRACE);
        let state = LogState::new(16, Level::TRACE, handle);
        let subscriber = Registry::default()
            .with(filter)
            .with(SseLayer::new(state.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(element = "music", "playback started");
            tracing::warn!("retry armed");
        });

        let dump = state.dump();
        assert_eq!(dump.len(), 2);
        assert_eq!(dump[0].level, "INFO");
        assert_eq!(dump[0].message, "playback started element=music");
        assert_eq!(dump[1].level, "WARN");
        assert_eq!(dump[1].message, "retry armed");
    }
}
