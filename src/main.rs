use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use profit_enricher::config::Config;
use profit_enricher::events::EventData;
use profit_enricher::profit::ProfitCalculator;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    profit_enricher::set_up_logging();

    info!(
        "Initializing {} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::load_from_env()?;

    let tokens = profit_enricher::set_up_token_source(&config).await;
    let store = profit_enricher::set_up_document_store(&config, tokens)?;
    let calculator = ProfitCalculator::new(store, config);

    run(service_fn(|request: LambdaEvent<EventData>| {
        profit_enricher::handler(&calculator, request)
    }))
    .await
}
