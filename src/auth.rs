use aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(thiserror::Error, Debug)]
pub enum KeySourceError {
    #[error("could not read the Firestore access token from secret {secret_id}, check the function's secretsmanager:GetSecretValue permission. Error: {error:?}")]
    SecretUnavailable {
        secret_id: String,
        error: GetSecretValueError,
    },
    #[error("secret {secret_id} holds no access token string")]
    EmptySecret { secret_id: String },
}

enum Source {
    Fixed(Option<String>),
    SecretsManager {
        client: SecretsManagerClient,
        secret_id: String,
        ttl: Duration,
    },
}

/// Supplies the bearer token for Firestore requests.
///
/// OAuth access tokens expire after about an hour, so a token kept in Secrets
/// Manager is re-read once its cached copy is older than `ttl`, or on demand
/// through [`TokenSource::refresh`] when Firestore rejects it.
pub struct TokenSource {
    source: Source,
    cached: Mutex<Option<(String, Instant)>>,
}

impl TokenSource {
    pub fn fixed(token: Option<String>) -> Self {
        TokenSource {
            source: Source::Fixed(token),
            cached: Mutex::new(None),
        }
    }

    pub fn secrets_manager(client: SecretsManagerClient, secret_id: String, ttl: Duration) -> Self {
        TokenSource {
            source: Source::SecretsManager {
                client,
                secret_id,
                ttl,
            },
            cached: Mutex::new(None),
        }
    }

    /// Whether asking again can produce a different token.
    pub fn is_refreshable(&self) -> bool {
        matches!(self.source, Source::SecretsManager { .. })
    }

    pub async fn token(&self) -> Result<Option<String>, KeySourceError> {
        let (client, secret_id, ttl) = match &self.source {
            Source::Fixed(token) => return Ok(token.clone()),
            Source::SecretsManager {
                client,
                secret_id,
                ttl,
            } => (client, secret_id, *ttl),
        };

        let mut cached = self.cached.lock().await;
        if let Some((token, fetched_at)) = cached.as_ref() {
            if fetched_at.elapsed() < ttl {
                return Ok(Some(token.clone()));
            }
            debug!("cached access token is older than {:?}", ttl);
        }
        let token = fetch_secret(client, secret_id).await?;
        *cached = Some((token.clone(), Instant::now()));
        Ok(Some(token))
    }

    /// Drops the cached token and reads it again.
    pub async fn refresh(&self) -> Result<Option<String>, KeySourceError> {
        if let Source::SecretsManager { secret_id, .. } = &self.source {
            info!("refreshing access token from secret {}", secret_id);
            self.cached.lock().await.take();
        }
        self.token().await
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Source::Fixed(None) => write!(f, "TokenSource::None"),
            Source::Fixed(Some(_)) => write!(f, "TokenSource::Fixed(..)"),
            Source::SecretsManager { secret_id, ttl, .. } => {
                write!(f, "TokenSource::SecretsManager({}, ttl {:?})", secret_id, ttl)
            }
        }
    }
}

async fn fetch_secret(
    client: &SecretsManagerClient,
    secret_id: &str,
) -> Result<String, KeySourceError> {
    let response = client
        .get_secret_value()
        .secret_id(secret_id)
        .send()
        .await
        .map_err(|error| KeySourceError::SecretUnavailable {
            secret_id: secret_id.to_string(),
            error: error.into_service_error(),
        })?;
    response
        .secret_string
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| KeySourceError::EmptySecret {
            secret_id: secret_id.to_string(),
        })
}
