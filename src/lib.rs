use aws_config::BehaviorVersion;
use lambda_runtime::{Error, LambdaEvent};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::auth::TokenSource;
use crate::config::Config;
use crate::events::EventData;
use crate::firestore::{DocumentStore, DynDocumentStore, FirestoreClient};
use crate::profit::ProfitCalculator;

pub mod auth;
pub mod config;
pub mod events;
pub mod firestore;
pub mod profit;

pub fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();
}

/// A token given as a Secrets Manager ARN is read from the secret, and re-read
/// while the function runs; anything else is used as the token itself.
pub async fn set_up_token_source(config: &Config) -> TokenSource {
    match config.access_token.as_deref() {
        Some(secret_id) if config.access_token_is_secret_arn() => {
            let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
            TokenSource::secrets_manager(
                aws_sdk_secretsmanager::Client::new(&aws_config),
                secret_id.to_string(),
                config.token_cache_ttl,
            )
        }
        token => TokenSource::fixed(token.map(str::to_string)),
    }
}

pub fn set_up_document_store(
    config: &Config,
    tokens: TokenSource,
) -> Result<DynDocumentStore, Error> {
    let client = FirestoreClient::new(config, tokens)?;
    Ok(Arc::new(client))
}

// lambda handler
// a failed computation is returned as the invocation error, so callers never
// see a partial total
pub async fn handler<S: DocumentStore>(
    calculator: &ProfitCalculator<S>,
    evt: LambdaEvent<EventData>,
) -> Result<f64, Error> {
    info!("Handling lambda invocation");
    debug!("Handling event payload: {:?}", evt.payload);

    match calculator.run(&evt.payload).await {
        Ok(total_profit) => {
            info!(
                "request {} total profit: {}",
                evt.context.request_id, total_profit
            );
            Ok(total_profit)
        }
        Err(e) => {
            error!(
                "request {} failed ({}): {}",
                evt.context.request_id,
                e.kind(),
                e
            );
            Err(e.into())
        }
    }
}
