use std::ffi::CString;
use std::fmt::{self, Write};
use std::os::raw::{c_char, c_int};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Metadata, Subscriber};

pub(crate) type LoggerCallback = unsafe extern "C" fn(c_int, *const c_char);

// Set once by `init_logger`, read on every event from any thread
pub(crate) static LOGGER_CALLBACK: Mutex<Option<LoggerCallback>> = Mutex::new(None);

/// Forwards `tracing` events to the host's C callback.
///
/// Levels are passed as 1 (error) through 5 (trace); events above
/// `max_level` are filtered out before any formatting happens.
pub struct FfiSubscriber {
    max_level: AtomicU8,
    next_span: AtomicU64,
}

impl FfiSubscriber {
    pub fn new(max_level: c_int) -> Self {
        FfiSubscriber {
            max_level: AtomicU8::new(max_level.clamp(1, 5) as u8),
            next_span: AtomicU64::new(1),
        }
    }
}

pub(crate) fn level_code(level: &Level) -> c_int {
    match *level {
        Level::ERROR => 1,
        Level::WARN => 2,
        Level::INFO => 3,
        Level::DEBUG => 4,
        Level::TRACE => 5,
    }
}

/// Renders the message first, then the structured fields as `key=value`.
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

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

pub(crate) fn format_event(event: &Event<'_>) -> String {
    let mut visitor = LineVisitor::default();
    event.record(&mut visitor);
    visitor.message.push_str(&visitor.fields);
    visitor.message
}

impl Subscriber for FfiSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        level_code(metadata.level()) <= self.max_level.load(Ordering::Relaxed) as c_int
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        // spans are not forwarded, ids only need to be non-zero and distinct
        Id::from_u64(self.next_span.fetch_add(1, Ordering::Relaxed))
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let Ok(callback) = LOGGER_CALLBACK.lock() else {
            return;
        };
        let Some(cb) = callback.as_ref() else {
            return;
        };
        let line = format!("[{}] {}", event.metadata().target(), format_event(event));
        let c_message = CString::new(line.replace('\0', " ")).unwrap_or_default();
        unsafe {
            cb(level_code(event.metadata().level()), c_message.as_ptr());
        }
    }

    fn enter(&self, _span: &Id) {}
    fn exit(&self, _span: &Id) {}
}
