//! `tracing` bridge to the host's log console

use std::ffi::CString;
use std::fmt::Write as _;
use std::sync::RwLock;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::scs::{
    SCS_LOG_TYPE_ERROR, SCS_LOG_TYPE_MESSAGE, SCS_LOG_TYPE_WARNING, scs_log_t, scs_log_type_t,
};

const LINE_PREFIX: &str = "[extra_utils] ";
const DEFAULT_DIRECTIVE: &str = "ts_extra=info";

/// Log function handed over by the host; cleared on shutdown
static HOST_LOG: RwLock<Option<scs_log_t>> = RwLock::new(None);

pub trait LogSink: Send + Sync + 'static {
    fn log(&self, severity: scs_log_type_t, line: &str);
}

/// Writes to whatever log function the host registered last
pub struct HostLog;

impl LogSink for HostLog {
    fn log(&self, severity: scs_log_type_t, line: &str) {
        let Ok(guard) = HOST_LOG.read() else {
            return;
        };
        let Some(log) = *guard else {
            return;
        };
        let Ok(line) = CString::new(line.replace('\0', " ")) else {
            return;
        };
        unsafe { log(severity, line.as_ptr()) };
    }
}

pub fn severity(level: &Level) -> scs_log_type_t {
    match *level {
        Level::ERROR => SCS_LOG_TYPE_ERROR,
        Level::WARN => SCS_LOG_TYPE_WARNING,
        _ => SCS_LOG_TYPE_MESSAGE,
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Forwards every event to a [`LogSink`] as one prefixed line
pub struct ScsLogLayer<S> {
    sink: S,
}

impl<S: LogSink> ScsLogLayer<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

impl<S, T> Layer<T> for ScsLogLayer<S>
where
    S: LogSink,
    T: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, T>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = format!("{}{}{}", LINE_PREFIX, visitor.message, visitor.fields);
        self.sink.log(severity(event.metadata().level()), &line);
    }
}

fn env_filter() -> EnvFilter {
    let filter = EnvFilter::from_default_env();
    match DEFAULT_DIRECTIVE.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Point logging at the host's log function.
///
/// The global subscriber is installed on the first call; later calls (the host
/// may load the plugin again in the same process) only swap the sink.
pub fn init(log: Option<scs_log_t>) {
    if let Ok(mut guard) = HOST_LOG.write() {
        *guard = log;
    }

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(ScsLogLayer::new(HostLog))
        .try_init();
}

/// Stop forwarding to the host; its log function is invalid after shutdown
pub fn detach() {
    if let Ok(mut guard) = HOST_LOG.write() {
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<(scs_log_type_t, String)>>>);

    impl LogSink for Captured {
        fn log(&self, severity: scs_log_type_t, line: &str) {
            self.0.lock().unwrap().push((severity, line.to_string()));
        }
    }

    #[test]
    fn test_events_are_prefixed_and_mapped() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(ScsLogLayer::new(captured.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("Registered for {}", "trailer.0.connected");
            tracing::warn!(result = -4, "Failed to register");
            tracing::error!("Could not find 'connect_slave' function");
            tracing::debug!("Mouse hook is now active");
        });

        let lines = captured.0.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                (0, "[extra_utils] Registered for trailer.0.connected".to_string()),
                (1, "[extra_utils] Failed to register result=-4".to_string()),
                (2, "[extra_utils] Could not find 'connect_slave' function".to_string()),
                (0, "[extra_utils] Mouse hook is now active".to_string()),
            ]
        );
    }

    #[test]
    fn test_detached_host_log_is_silent() {
        detach();
        HostLog.log(SCS_LOG_TYPE_ERROR, "nobody listens");
    }

    #[test]
    fn test_default_filter_accepts_plugin_targets() {
        assert!(env_filter().to_string().contains("ts_extra=info"));
    }
}
