//! querygate demo entry point.

use querygate_demo::config::DemoConfig;
use querygate_demo::error::DemoError;
use querygate_demo::{scenario, telemetry};

#[tokio::main]
async fn main() -> Result<(), DemoError> {
    let config = DemoConfig::load()?;
    telemetry::init(&config.log)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    scenario::run(&config, &mut out).await?;
    Ok(())
}
