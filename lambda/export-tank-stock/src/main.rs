//! Daily stock ledger of one tank as an xlsx download.

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use powertank_shared::{
    handle_export_tank_stock, respond, AppConfig, HttpRequest, HttpResponse, Requirements, ServiceResult, Services,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const FUNCTION_NAME: &str = "export-tank-stock";

async fn function_handler(
    services: &ServiceResult<Services>,
    event: LambdaEvent<HttpRequest>,
) -> Result<HttpResponse, Error> {
    let request = &event.payload;
    let response = respond(request, FUNCTION_NAME, || async move {
        let services = services.as_ref().map_err(|e| e.clone())?;
        handle_export_tank_stock(services, request).await
    })
    .await;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .without_time()
        .init();

    let services = AppConfig::from_env(Requirements::BACKEND_ONLY).and_then(Services::from_config);
    match &services {
        Ok(_) => info!("{} ready", FUNCTION_NAME),
        Err(e) => error!("{} started without valid configuration: {}", FUNCTION_NAME, e),
    }
    let services = &services;

    run(service_fn(move |event| async move { function_handler(services, event).await })).await
}
