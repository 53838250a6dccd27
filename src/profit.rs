use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::events::{EventData, EventError, PurchasedItem};
use crate::firestore::{Document, DocumentStore, ReadOptions, StoreError};

/// Per-item profit records keyed by item id, as read from the profit document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfitDataset(HashMap<String, Value>);

impl ProfitDataset {
    pub fn new(records: Map<String, Value>) -> Self {
        ProfitDataset(records.into_iter().collect())
    }

    pub fn record(&self, item_id: &str) -> Option<&Value> {
        self.0.get(item_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Document> for ProfitDataset {
    fn from(document: Document) -> Self {
        ProfitDataset::new(document.data)
    }
}

/// Coerces a profit value to a number.
///
/// Numbers pass through, numeric strings are parsed after trimming (an empty
/// string is 0) and booleans count as 1 or 0. Anything else, including results
/// that are not finite, yields `None`.
pub fn to_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    number.is_finite().then_some(number)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ReadFailure,
    LookupMiss,
    CoercionAnomaly,
    InvalidEvent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProfitError {
    #[error("failed to read profit data: {0}")]
    Read(#[from] StoreError),
    #[error("item {item_id} not found in the profit data")]
    LookupMiss { item_id: String },
    #[error("item at position {index} has no item_id")]
    MissingItemId { index: usize },
    #[error("profit for item {item_id} is not a number: {value}")]
    InvalidProfit { item_id: String, value: Value },
    #[error("total profit {total} is not a finite number")]
    InvalidTotal { total: f64 },
    #[error("invalid purchase event: {0}")]
    Event(#[from] EventError),
}

impl ProfitError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProfitError::Read(_) => FailureKind::ReadFailure,
            ProfitError::LookupMiss { .. } | ProfitError::MissingItemId { .. } => {
                FailureKind::LookupMiss
            }
            ProfitError::InvalidProfit { .. } | ProfitError::InvalidTotal { .. } => {
                FailureKind::CoercionAnomaly
            }
            ProfitError::Event(_) => FailureKind::InvalidEvent,
        }
    }
}

/// Sums the profit of purchased items using a dataset held in a document store.
pub struct ProfitCalculator<S> {
    store: S,
    config: Config,
}

impl<S: DocumentStore> ProfitCalculator<S> {
    pub fn new(store: S, config: Config) -> Self {
        ProfitCalculator { store, config }
    }

    pub async fn fetch_profit_dataset(&self) -> Result<ProfitDataset, ProfitError> {
        let options = ReadOptions::from(&self.config);
        let document = self
            .store
            .read(&self.config.document_path, &options)
            .await?;
        let profit_data = Value::Object(document.data.clone());
        debug!("Profit data: {}", profit_data);
        let dataset = ProfitDataset::from(document);
        if dataset.is_empty() {
            warn!("profit document {} has no records", self.config.document_path);
        }
        Ok(dataset)
    }

    /// Total profit of `items`. Stops at the first item without a record;
    /// the partial sum is never returned.
    pub fn compute_total_profit(
        &self,
        dataset: &ProfitDataset,
        items: &[PurchasedItem],
    ) -> Result<f64, ProfitError> {
        let mut total_profit = 0.0;
        for (index, item) in items.iter().enumerate() {
            let Some(item_id) = item.item_id.as_deref() else {
                debug!("Processing item: <no item_id> at position {}", index);
                warn!("Item at position {} has no item_id", index);
                return Err(ProfitError::MissingItemId { index });
            };
            debug!("Processing item: {}", item_id);

            let Some(record) = dataset.record(item_id) else {
                warn!("Item {} not found in the profit data", item_id);
                return Err(ProfitError::LookupMiss {
                    item_id: item_id.to_string(),
                });
            };

            let raw_profit = record.get("profit").unwrap_or(&Value::Null);
            let profit = to_number(raw_profit).ok_or_else(|| ProfitError::InvalidProfit {
                item_id: item_id.to_string(),
                value: raw_profit.clone(),
            })?;
            debug!("Profit is: {}", profit);
            total_profit += profit;
        }
        // finite profits can still overflow once summed
        if !total_profit.is_finite() {
            warn!("The total profit overflowed: {}", total_profit);
            return Err(ProfitError::InvalidTotal {
                total: total_profit,
            });
        }
        debug!("The total profit is: {}", total_profit);
        Ok(total_profit)
    }

    /// Runs one invocation: read the dataset, then fold the event's items against it.
    pub async fn run(&self, event: &EventData) -> Result<f64, ProfitError> {
        let items = event.purchased_items()?;
        let dataset = self.fetch_profit_dataset().await?;
        info!(
            "Scanning {} purchased items against {} profit records",
            items.len(),
            dataset.len()
        );
        self.compute_total_profit(&dataset, &items)
    }
}
