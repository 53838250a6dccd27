//! Checks the trace messages an invocation emits, using a subscriber that
//! writes into a buffer for the duration of each test.

use async_trait::async_trait;
use profit_enricher::config::Config;
use profit_enricher::events::EventData;
use profit_enricher::firestore::{Document, DocumentStore, ReadOptions, StoreError};
use profit_enricher::profit::ProfitCalculator;
use serde_json::{json, Value};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

struct StaticStore(Option<Value>);

#[async_trait]
impl DocumentStore for StaticStore {
    async fn read(&self, path: &str, _: &ReadOptions) -> Result<Document, StoreError> {
        match &self.0 {
            Some(Value::Object(data)) => Ok(Document {
                name: path.to_string(),
                data: data.clone(),
            }),
            _ => Err(StoreError::Decode("store unavailable".to_string())),
        }
    }
}

fn purchase_event() -> EventData {
    serde_json::from_value(json!({
        "event_name": "purchase",
        "items": [{"item_id": "A"}, {"item_id": "B"}, {"item_id": "A"}]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_successful_run_traces_each_item() {
    let (logs, _guard) = capture_logs();
    let store = StaticStore(Some(json!({"A": {"profit": 5}, "B": {"profit": 3.5}})));
    let calculator = ProfitCalculator::new(store, Config::new("shop-analytics"));

    assert_eq!(calculator.run(&purchase_event()).await.unwrap(), 13.5);

    let logs = logs.contents();
    assert!(logs.contains("Profit data:"), "logs: {}", logs);
    assert_eq!(logs.matches("Processing item: A").count(), 2, "logs: {}", logs);
    assert_eq!(logs.matches("Processing item: B").count(), 1, "logs: {}", logs);
    assert!(logs.contains("Profit is: 3.5"), "logs: {}", logs);
    assert!(logs.contains("The total profit is: 13.5"), "logs: {}", logs);
}

#[tokio::test]
async fn test_read_failure_scans_no_items() {
    let (logs, _guard) = capture_logs();
    let calculator = ProfitCalculator::new(StaticStore(None), Config::new("shop-analytics"));

    assert!(calculator.run(&purchase_event()).await.is_err());

    let logs = logs.contents();
    assert!(!logs.contains("Processing item"), "logs: {}", logs);
    assert!(!logs.contains("The total profit is"), "logs: {}", logs);
}

#[tokio::test]
async fn test_lookup_miss_stops_the_scan() {
    let (logs, _guard) = capture_logs();
    let store = StaticStore(Some(json!({"A": {"profit": 5}})));
    let calculator = ProfitCalculator::new(store, Config::new("shop-analytics"));
    let event: EventData = serde_json::from_value(json!({
        "items": [{"item_id": "Z"}, {"item_id": "A"}]
    }))
    .unwrap();

    assert!(calculator.run(&event).await.is_err());

    let logs = logs.contents();
    assert!(logs.contains("Processing item: Z"), "logs: {}", logs);
    assert!(!logs.contains("Processing item: A"), "logs: {}", logs);
    assert!(!logs.contains("The total profit is"), "logs: {}", logs);
}

#[tokio::test]
async fn test_item_without_id_is_traced_before_failing() {
    let (logs, _guard) = capture_logs();
    let store = StaticStore(Some(json!({"A": {"profit": 5}})));
    let calculator = ProfitCalculator::new(store, Config::new("shop-analytics"));
    let event: EventData = serde_json::from_value(json!({
        "items": [{"item_id": "A"}, {"item_name": "gift card"}, {"item_id": "A"}]
    }))
    .unwrap();

    assert!(calculator.run(&event).await.is_err());

    let logs = logs.contents();
    assert_eq!(logs.matches("Processing item: A").count(), 1, "logs: {}", logs);
    assert!(
        logs.contains("Processing item: <no item_id> at position 1"),
        "logs: {}",
        logs
    );
    assert!(!logs.contains("The total profit is"), "logs: {}", logs);
}
