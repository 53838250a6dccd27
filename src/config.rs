use std::env;
use std::string::String;
use std::time::Duration;

pub const DEFAULT_DOCUMENT_PATH: &str = "profit/products";
pub const DEFAULT_DATABASE: &str = "(default)";
pub const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TOKEN_CACHE_TTL_SECS: u64 = 300;

const SECRETS_MANAGER_ARN_PREFIX: &str = "arn:aws:secretsmanager:";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Firestore project holding the profit document.
    pub project_id: String,
    pub database: String,
    /// Document path relative to the database root, e.g. `profit/products`.
    pub document_path: String,
    pub endpoint: String,
    /// Bearer token, or the ARN of a Secrets Manager secret holding it.
    pub access_token: Option<String>,
    pub request_timeout: Duration,
    /// How long a token read from Secrets Manager is reused before re-reading it.
    pub token_cache_ttl: Duration,
}

impl Config {
    /// Config for `project_id` with every other setting at its default.
    pub fn new(project_id: impl Into<String>) -> Self {
        Config {
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_string(),
            document_path: DEFAULT_DOCUMENT_PATH.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            token_cache_ttl: Duration::from_secs(DEFAULT_TOKEN_CACHE_TTL_SECS),
        }
    }

    pub fn load_from_env() -> Result<Config, String> {
        let project_id = env::var("GCP_PROJECT_ID")
            .map_err(|e| format!("GCP_PROJECT_ID not set - {}", e))?;
        if project_id.trim().is_empty() {
            return Err("GCP_PROJECT_ID is empty".to_string());
        }

        let document_path = env::var("PROFIT_DOCUMENT_PATH")
            .unwrap_or(DEFAULT_DOCUMENT_PATH.to_string())
            .trim_matches('/')
            .to_string();
        if document_path.is_empty() {
            return Err("PROFIT_DOCUMENT_PATH is empty".to_string());
        }

        let conf = Config {
            project_id,
            database: env::var("FIRESTORE_DATABASE").unwrap_or(DEFAULT_DATABASE.to_string()),
            document_path,
            endpoint: env::var("FIRESTORE_ENDPOINT")
                .unwrap_or(DEFAULT_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
            access_token: env::var("FIRESTORE_ACCESS_TOKEN")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            request_timeout: env::var("FIRESTORE_REQUEST_TIMEOUT")
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS.to_string())
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| format!("Error parsing FIRESTORE_REQUEST_TIMEOUT to u64 - {}", e))?,
            token_cache_ttl: env::var("FIRESTORE_TOKEN_CACHE_TTL_SECONDS")
                .unwrap_or(DEFAULT_TOKEN_CACHE_TTL_SECS.to_string())
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| {
                    format!("Error parsing FIRESTORE_TOKEN_CACHE_TTL_SECONDS to u64 - {}", e)
                })?,
        };

        Ok(conf)
    }

    /// True when the configured token is a Secrets Manager ARN rather than a token.
    pub fn access_token_is_secret_arn(&self) -> bool {
        self.access_token
            .as_deref()
            .is_some_and(|t| t.starts_with(SECRETS_MANAGER_ARN_PREFIX))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_load_from_env_defaults() {
        temp_env::with_vars(
            [
                ("GCP_PROJECT_ID", Some("shop-analytics")),
                ("FIRESTORE_DATABASE", None),
                ("PROFIT_DOCUMENT_PATH", None),
                ("FIRESTORE_ENDPOINT", None),
                ("FIRESTORE_ACCESS_TOKEN", None),
                ("FIRESTORE_REQUEST_TIMEOUT", None),
                ("FIRESTORE_TOKEN_CACHE_TTL_SECONDS", None),
            ],
            || {
                let config = Config::load_from_env().unwrap();
                assert_eq!(config, Config::new("shop-analytics"));
                assert!(!config.access_token_is_secret_arn());
            },
        );
    }

    #[test]
    fn test_load_from_env_overrides() {
        temp_env::with_vars(
            [
                ("GCP_PROJECT_ID", Some("shop-analytics")),
                ("FIRESTORE_DATABASE", Some("margins")),
                ("PROFIT_DOCUMENT_PATH", Some("/profit/2024/")),
                ("FIRESTORE_ENDPOINT", Some("http://localhost:8080/")),
                ("FIRESTORE_ACCESS_TOKEN", Some("arn:aws:secretsmanager:eu-west-1:123:secret:fs")),
                ("FIRESTORE_REQUEST_TIMEOUT", Some("3")),
                ("FIRESTORE_TOKEN_CACHE_TTL_SECONDS", Some("60")),
            ],
            || {
                let config = Config::load_from_env().unwrap();
                assert_eq!(config.database, "margins");
                assert_eq!(config.document_path, "profit/2024");
                assert_eq!(config.endpoint, "http://localhost:8080");
                assert_eq!(config.request_timeout, Duration::from_secs(3));
                assert_eq!(config.token_cache_ttl, Duration::from_secs(60));
                assert!(config.access_token_is_secret_arn());
            },
        );
    }

    #[test]
    fn test_load_from_env_requires_project() {
        temp_env::with_vars([("GCP_PROJECT_ID", None::<&str>)], || {
            let err = Config::load_from_env().unwrap_err();
            assert!(err.starts_with("GCP_PROJECT_ID not set"), "got: {}", err);
        });
    }

    #[test]
    fn test_load_from_env_rejects_bad_timeout() {
        temp_env::with_vars(
            [
                ("GCP_PROJECT_ID", Some("shop-analytics")),
                ("FIRESTORE_REQUEST_TIMEOUT", Some("soon")),
            ],
            || {
                let err = Config::load_from_env().unwrap_err();
                assert!(err.contains("FIRESTORE_REQUEST_TIMEOUT"), "got: {}", err);
            },
        );
    }
}
