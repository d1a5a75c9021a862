use anyhow::Result;
use warden::cli::{self, actions, telemetry};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    let (action, globals) = cli::start()?;

    let result = actions::server::handle(action, &globals).await;

    telemetry::shutdown_tracer();

    result
}
