//! Diagnostics log: an append-only, in-memory record of every gateway
//! interaction, with synchronous fan-out to live subscribers.
//!
//! Not persisted and not a telemetry pipeline; it exists so the debug
//! overlay can show exactly what was sent and received.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
  Info,
  Success,
  Error,
  Warning,
}

#[derive(Clone, Debug, Serialize)]
pub struct LogEntry {
  pub id: String,
  /// Unix milliseconds.
  pub timestamp: i64,
  pub level: LogLevel,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<Value>,
}

pub type SubscriberId = u64;
type Subscriber = Box<dyn Fn(&LogEntry) + Send + Sync>;

struct Inner {
  entries: Vec<LogEntry>,
  subscribers: BTreeMap<SubscriberId, Subscriber>,
  next_id: SubscriberId,
}

/// Explicit event bus: subscription-token keyed callbacks, deterministic
/// in-order fan-out, explicit unsubscribe.
pub struct DiagLog {
  inner: Mutex<Inner>,
}

impl Default for DiagLog {
  fn default() -> Self {
    Self::new()
  }
}

impl DiagLog {
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        entries: Vec::new(),
        subscribers: BTreeMap::new(),
        next_id: 0,
      }),
    }
  }

  /// Append an entry and notify all current subscribers, in subscription
  /// order, before returning.
  pub fn log(&self, level: LogLevel, message: impl Into<String>, details: Option<Value>) {
    let entry = LogEntry {
      id: uuid::Uuid::new_v4().to_string(),
      timestamp: chrono::Utc::now().timestamp_millis(),
      level,
      message: message.into(),
      details,
    };
    let mut inner = self.inner.lock().expect("diag log lock poisoned");
    inner.entries.push(entry.clone());
    // Fan-out happens under the lock: a slow subscriber simply slows the
    // publisher. Callbacks must not call back into the log.
    for sub in inner.subscribers.values() {
      sub(&entry);
    }
  }

  pub fn subscribe(&self, callback: impl Fn(&LogEntry) + Send + Sync + 'static) -> SubscriberId {
    let mut inner = self.inner.lock().expect("diag log lock poisoned");
    let id = inner.next_id;
    inner.next_id += 1;
    inner.subscribers.insert(id, Box::new(callback));
    id
  }

  /// Removes a subscriber; unknown tokens are a no-op.
  #[allow(dead_code)]
  pub fn unsubscribe(&self, id: SubscriberId) {
    self
      .inner
      .lock()
      .expect("diag log lock poisoned")
      .subscribers
      .remove(&id);
  }

  pub fn entries(&self) -> Vec<LogEntry> {
    self
      .inner
      .lock()
      .expect("diag log lock poisoned")
      .entries
      .clone()
  }

  /// Empties the log. Subscribers are not notified of the clear.
  pub fn clear(&self) {
    self
      .inner
      .lock()
      .expect("diag log lock poisoned")
      .entries
      .clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  #[test]
  fn log_appends_and_notifies_in_subscription_order() {
    let log = DiagLog::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s1 = Arc::clone(&seen);
    log.subscribe(move |_| s1.lock().unwrap().push("first"));
    let s2 = Arc::clone(&seen);
    log.subscribe(move |_| s2.lock().unwrap().push("second"));

    log.log(LogLevel::Info, "hello", None);

    assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    assert_eq!(log.entries().len(), 1);
    assert_eq!(log.entries()[0].message, "hello");
  }

  #[test]
  fn unsubscribe_stops_delivery() {
    let log = DiagLog::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let token = log.subscribe(move |_| {
      c.fetch_add(1, Ordering::SeqCst);
    });

    log.log(LogLevel::Warning, "one", None);
    log.unsubscribe(token);
    log.log(LogLevel::Warning, "two", None);

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(log.entries().len(), 2);
  }

  #[test]
  fn clear_empties_without_notifying() {
    let log = DiagLog::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    log.subscribe(move |_| {
      c.fetch_add(1, Ordering::SeqCst);
    });

    log.log(LogLevel::Error, "boom", Some(serde_json::json!({"code": 500})));
    log.clear();

    assert!(log.entries().is_empty());
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }
}
