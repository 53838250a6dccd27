use async_trait::async_trait;
use http::header::USER_AGENT;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::{KeySourceError, TokenSource};
use crate::config::Config;

// unreserved characters plus the parentheses of `(default)` stay literal
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'(')
    .remove(b')');

/// Where to read a document from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    pub project_id: String,
    pub database: String,
}

impl From<&Config> for ReadOptions {
    fn from(config: &Config) -> Self {
        ReadOptions {
            project_id: config.project_id.clone(),
            database: config.database.clone(),
        }
    }
}

/// A document read from the store with its fields decoded to plain JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub name: String,
    pub data: Map<String, Value>,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(String),
    #[error("reading document {path} failed with status {status}: {body}")]
    Status {
        path: String,
        status: StatusCode,
        body: String,
    },
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to obtain access token: {0}")]
    Token(#[from] KeySourceError),
    #[error("failed to decode document: {0}")]
    Decode(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, path: &str, options: &ReadOptions) -> Result<Document, StoreError>;
}

pub type DynDocumentStore = Arc<dyn DocumentStore>;

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn read(&self, path: &str, options: &ReadOptions) -> Result<Document, StoreError> {
        (**self).read(path, options).await
    }
}

/// Reads documents through the Firestore REST API.
#[derive(Debug, Clone)]
pub struct FirestoreClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<TokenSource>,
}

impl FirestoreClient {
    pub fn new(config: &Config, tokens: TokenSource) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(FirestoreClient {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            tokens: Arc::new(tokens),
        })
    }

    pub fn document_url(&self, path: &str, options: &ReadOptions) -> String {
        let encoded_path = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/v1/projects/{}/databases/{}/documents/{}",
            self.endpoint,
            utf8_percent_encode(&options.project_id, PATH_SEGMENT),
            utf8_percent_encode(&options.database, PATH_SEGMENT),
            encoded_path
        )
    }

    async fn get(&self, url: &str, token: Option<&str>) -> Result<reqwest::Response, StoreError> {
        let mut request = self.http.get(url).header(
            USER_AGENT,
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
        );
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn read(&self, path: &str, options: &ReadOptions) -> Result<Document, StoreError> {
        let url = self.document_url(path, options);
        debug!("reading firestore document: {}", url);
        let started = Instant::now();

        let token = self.tokens.token().await?;
        let mut response = self.get(&url, token.as_deref()).await?;
        // an expired token is replaced once; any other failure is final
        if response.status() == StatusCode::UNAUTHORIZED && self.tokens.is_refreshable() {
            warn!("firestore rejected the access token, reading it again");
            let token = self.tokens.refresh().await?;
            response = self.get(&url, token.as_deref()).await?;
        }

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                path: path.to_string(),
                status,
                body,
            });
        }

        let raw: RawDocument = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        info!(
            "read firestore document {} in {:?}",
            raw.name,
            started.elapsed()
        );
        raw.into_document()
    }
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl RawDocument {
    fn into_document(self) -> Result<Document, StoreError> {
        Ok(Document {
            name: self.name,
            data: decode_fields(self.fields)?,
        })
    }
}

/// Decodes a Firestore `fields` map of typed values into plain JSON.
pub fn decode_fields(fields: Map<String, Value>) -> Result<Map<String, Value>, StoreError> {
    fields
        .into_iter()
        .map(|(key, value)| {
            let decoded = decode_value(value)
                .map_err(|e| StoreError::Decode(format!("field {}: {}", key, e)))?;
            Ok((key, decoded))
        })
        .collect()
}

fn decode_value(value: Value) -> Result<Value, String> {
    let typed = match value {
        Value::Object(typed) => typed,
        other => return Err(format!("expected a typed value object, got {}", other)),
    };
    let mut entries = typed.into_iter();
    let (Some((kind, inner)), None) = (entries.next(), entries.next()) else {
        return Err("expected exactly one value type".to_string());
    };

    match (kind.as_str(), inner) {
        ("nullValue", _) => Ok(Value::Null),
        ("booleanValue", Value::Bool(b)) => Ok(Value::Bool(b)),
        // int64 values travel as decimal strings
        ("integerValue", Value::String(s)) => s
            .parse::<i64>()
            .map(|i| Value::Number(i.into()))
            .map_err(|e| format!("bad integerValue {:?}: {}", s, e)),
        ("integerValue", Value::Number(n)) => Ok(Value::Number(n)),
        ("doubleValue", Value::Number(n)) => Ok(Value::Number(n)),
        ("doubleValue", Value::String(s)) => match s.as_str() {
            "NaN" | "Infinity" | "-Infinity" => Ok(Value::Null),
            other => other
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("bad doubleValue {:?}", s)),
        },
        (
            "stringValue" | "timestampValue" | "referenceValue" | "bytesValue",
            Value::String(s),
        ) => Ok(Value::String(s)),
        ("geoPointValue", Value::Object(point)) => {
            let mut decoded = Map::new();
            for axis in ["latitude", "longitude"] {
                decoded.insert(
                    axis.to_string(),
                    point.get(axis).cloned().unwrap_or(Value::from(0.0)),
                );
            }
            Ok(Value::Object(decoded))
        }
        ("arrayValue", Value::Object(mut array)) => match array.remove("values") {
            None => Ok(Value::Array(Vec::new())),
            Some(Value::Array(values)) => values
                .into_iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Some(other) => Err(format!("bad arrayValue values: {}", other)),
        },
        ("mapValue", Value::Object(mut map)) => match map.remove("fields") {
            None => Ok(Value::Object(Map::new())),
            Some(Value::Object(fields)) => fields
                .into_iter()
                .map(|(k, v)| decode_value(v).map(|v| (k, v)))
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            Some(other) => Err(format!("bad mapValue fields: {}", other)),
        },
        (kind, inner) => Err(format!("unsupported value {}: {}", kind, inner)),
    }
}
