use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSON-lines trace of a bind run. Cloned handles share one writer, so worker
/// threads can log without coordinating.
#[derive(Clone)]
pub struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<Box<dyn Write + Send>>,
    counters: BTreeMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(file))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(Box::new(writer)),
                counters: BTreeMap::new(),
            })),
        }
    }

    pub fn log_json(&self, value: &Value) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{value}");
        }
    }

    /// Writes `{"type": event, ...fields}`.
    pub fn event(&self, event: &str, fields: Value) {
        let mut record = Map::new();
        record.insert("type".to_string(), Value::String(event.to_string()));
        if let Value::Object(extra) = fields {
            record.extend(extra);
        }
        self.log_json(&Value::Object(record));
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counters = std::mem::take(&mut state.counters);
            let line = json!({
                "type": "debug.summary",
                "context": context,
                "counts": counters,
            });
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}
