use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use product_api::config::Config;
use product_api::cors::cors_layer;
use product_api::currency::GrpcCurrency;
use product_api::lifecycle::TerminationTrigger;
use product_api::store::InMemoryProducts;
use product_api::{app, telemetry, Docs, Error, Products, Server};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("product-api: {e}");
            return ExitCode::FAILURE;
        }
    };
    telemetry::init(&config.telemetry);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Error> {
    let currency = Arc::new(GrpcCurrency::connect_lazy(&config.currency.endpoint)?);
    let store = Arc::new(InMemoryProducts::seeded(currency));
    let router = app::routes(Products::new(store), Docs::new(&config.docs.spec_path));
    info!(routes = router.len(), currency = %config.currency.endpoint, "routes registered");

    let server = Server::new(config.server, router).with_cors(cors_layer(&config.cors.allowed_origins)?);

    // Signal handlers go in before binding so a signal during startup is not
    // lost; a bind failure returns before anything waits on them.
    let trigger = TerminationTrigger::os()?;
    let running = server.start().await?;

    let report = running.wait_for(trigger).await;
    if report.abandoned > 0 {
        info!(abandoned = report.abandoned, "exited with abandoned connections");
    }
    Ok(())
}
