//! Stable Diffusion WebUI client.
//!
//! Loading selects the checkpoint through `POST /sdapi/v1/options`, sampling
//! goes through `POST /sdapi/v1/txt2img` which answers with base64 images.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::{DiffusionLoader, DiffusionPipeline, GenerationError, SamplingParams};

const OPTIONS_PATH: &str = "sdapi/v1/options";
const TXT2IMG_PATH: &str = "sdapi/v1/txt2img";

/// Request body for POST /sdapi/v1/options
#[derive(Serialize, Debug)]
struct OptionsRequest<'a> {
    sd_model_checkpoint: &'a str,
}

/// Request body for POST /sdapi/v1/txt2img
#[derive(Serialize, Debug)]
struct Txt2ImgRequest<'a> {
    prompt: &'a str,
    cfg_scale: f32,
    steps: u32,
    batch_size: u32,
    n_iter: u32,
    send_images: bool,
    save_images: bool,
}

#[derive(Deserialize, Debug)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

fn endpoint(base_url: &Url, path: &str) -> String {
    format!("{}/{}", base_url.as_str().trim_end_matches('/'), path)
}

/// Loads a checkpoint on a WebUI server.
#[derive(Clone, Debug)]
pub struct SdWebUiLoader {
    client: reqwest::Client,
    base_url: Url,
    model: String,
}

impl SdWebUiLoader {
    /// Builds a loader with its own HTTP client.
    pub fn new(base_url: Url, model: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, model))
    }

    /// Builds a loader around an existing client.
    pub fn with_client(client: reqwest::Client, base_url: Url, model: &str) -> Self {
        Self {
            client,
            base_url,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl DiffusionLoader for SdWebUiLoader {
    async fn load(&self) -> Result<Box<dyn DiffusionPipeline>, GenerationError> {
        info!("Loading diffusion model {}", self.model);
        let resp = self
            .client
            .post(endpoint(&self.base_url, OPTIONS_PATH))
            .json(&OptionsRequest {
                sd_model_checkpoint: &self.model,
            })
            .send()
            .await
            .map_err(|err| GenerationError::Load(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Load(format!("{status}: {body}")));
        }

        Ok(Box::new(SdWebUiPipeline {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
        }))
    }
}

/// A WebUI server with the checkpoint loaded.
#[derive(Clone, Debug)]
pub struct SdWebUiPipeline {
    client: reqwest::Client,
    base_url: Url,
}

#[async_trait]
impl DiffusionPipeline for SdWebUiPipeline {
    async fn run(&self, params: &SamplingParams) -> Result<DynamicImage, GenerationError> {
        let req_body = Txt2ImgRequest {
            prompt: &params.prompt,
            cfg_scale: params.guidance_scale,
            steps: params.inference_steps,
            batch_size: params.num_images,
            n_iter: 1,
            send_images: true,
            save_images: false,
        };

        let resp = self
            .client
            .post(endpoint(&self.base_url, TXT2IMG_PATH))
            .json(&req_body)
            .send()
            .await
            .map_err(|err| GenerationError::Request(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Response(format!("{status}: {body}")));
        }

        let parsed: Txt2ImgResponse = resp
            .json()
            .await
            .map_err(|err| GenerationError::Response(err.to_string()))?;
        let first = parsed
            .images
            .into_iter()
            .next()
            .ok_or(GenerationError::Empty)?;
        decode_image(&first)
    }
}

/// Decodes a base64 image, with or without a `data:` URI prefix.
fn decode_image(encoded: &str) -> Result<DynamicImage, GenerationError> {
    let payload = match encoded.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|err| GenerationError::Decode(err.to_string()))?;
    debug!("Decoding {} bytes of generated image", bytes.len());
    image::load_from_memory(&bytes).map_err(|err| GenerationError::Decode(err.to_string()))
}
