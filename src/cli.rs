//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::time::Duration;
use url::Url;

use crate::constants::{DEFAULT_DIFFUSION_URL, DEFAULT_MODEL, DEFAULT_SPINNER_DELAY};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "POEMGEN_DEBUG")]
    /// Enable debug logging. Env: POEMGEN_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "POEMGEN_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: POEMGEN_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "POEMGEN_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: POEMGEN_LISTEN_ADDRESS
    pub listen_address: String,
    #[clap(long, default_value = DEFAULT_DIFFUSION_URL, env = "POEMGEN_DIFFUSION_URL")]
    /// Base URL of the Stable Diffusion WebUI API.
    /// Env: POEMGEN_DIFFUSION_URL
    pub diffusion_url: Url,
    #[clap(long, short, default_value = DEFAULT_MODEL, env = "POEMGEN_MODEL")]
    /// Checkpoint loaded before every generation.
    /// Env: POEMGEN_MODEL
    pub model: String,
    #[clap(long, default_value_t = DEFAULT_SPINNER_DELAY.as_secs(), env = "POEMGEN_SPINNER_DELAY_SECS")]
    /// Seconds to wait before sampling so the loading indicator shows.
    /// Env: POEMGEN_SPINNER_DELAY_SECS
    pub spinner_delay_secs: u64,
    #[clap(long, default_value = "600", env = "POEMGEN_REQUEST_TIMEOUT_SECS")]
    /// Timeout for each request to the diffusion backend.
    /// Env: POEMGEN_REQUEST_TIMEOUT_SECS
    pub request_timeout_secs: u64,
}

impl CliOptions {
    /// Cosmetic delay before sampling.
    pub fn spinner_delay(&self) -> Duration {
        Duration::from_secs(self.spinner_delay_secs)
    }

    /// Per-request timeout for the diffusion backend.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_webui() {
        let cli = CliOptions::try_parse_from(["poemgen"]).expect("parse defaults");
        assert_eq!(cli.port.get(), 9000);
        assert_eq!(cli.diffusion_url.as_str(), "http://127.0.0.1:7860/");
        assert_eq!(cli.model, DEFAULT_MODEL);
        assert_eq!(cli.spinner_delay(), DEFAULT_SPINNER_DELAY);
        assert_eq!(cli.request_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn rejects_bad_diffusion_url() {
        assert!(CliOptions::try_parse_from(["poemgen", "--diffusion-url", "not a url"]).is_err());
    }
}
