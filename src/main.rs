use std::sync::Arc;

use clap::Parser;
use poemgen::config::setup_logging;
use poemgen::generator::ImageGenerator;
use poemgen::generator::http::SdWebUiLoader;
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = poemgen::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let loader = match SdWebUiLoader::new(
        cli.diffusion_url.clone(),
        &cli.model,
        cli.request_timeout(),
    ) {
        Ok(loader) => loader,
        Err(err) => {
            error!("Failed to build diffusion client: {}", err);
            return;
        }
    };
    info!(
        "Using diffusion backend {} with model {}",
        cli.diffusion_url, cli.model
    );
    let generator = ImageGenerator::new(Arc::new(loader), cli.spinner_delay());

    if let Err(err) = poemgen::web::setup_server(&cli.listen_address, cli.port, generator).await {
        error!("Application error: {}", err);
    }
}
