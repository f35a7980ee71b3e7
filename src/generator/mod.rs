//! Text-to-image generation.
//!
//! [`ImageGenerator`] glues the poem text and style together, loads a
//! diffusion pipeline through a [`DiffusionLoader`] and samples a single
//! image with fixed parameters.

pub mod http;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::constants::{GUIDANCE_SCALE, INFERENCE_STEPS, NUM_IMAGES};

/// What the user asked for when pressing "generate".
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Poem text, may be empty.
    pub prompt_text: String,
    /// Style preset or `custom:` style.
    pub style_tag: String,
}

impl GenerationRequest {
    /// Builds a request from the prompt and style.
    pub fn new(prompt_text: impl Into<String>, style_tag: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            style_tag: style_tag.into(),
        }
    }
}

/// Appends the style to the prompt as a comma separated suffix.
///
/// Presets and `custom:` styles take the same path.
pub fn build_prompt(prompt_text: &str, style_tag: &str) -> String {
    format!("{prompt_text},{style_tag}")
}

/// Parameters handed to the diffusion model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SamplingParams {
    /// Full prompt, including the style suffix.
    pub prompt: String,
    /// Classifier-free guidance scale.
    pub guidance_scale: f32,
    /// Number of denoising steps.
    pub inference_steps: u32,
    /// Images per call.
    pub num_images: u32,
}

impl SamplingParams {
    /// Fixed sampling parameters for `prompt`.
    pub fn for_prompt(prompt: String) -> Self {
        Self {
            prompt,
            guidance_scale: GUIDANCE_SCALE,
            inference_steps: INFERENCE_STEPS,
            num_images: NUM_IMAGES,
        }
    }
}

/// Anything that went wrong between loading the model and decoding its output.
#[derive(Debug)]
pub enum GenerationError {
    /// The model could not be loaded.
    Load(String),
    /// The backend could not be reached.
    Request(String),
    /// The backend answered with something unusable.
    Response(String),
    /// The returned image could not be decoded.
    Decode(String),
    /// The backend returned no images.
    Empty,
}

impl GenerationError {
    /// Message shown on the page.
    pub fn user_message(&self) -> String {
        format!("发生错误: {self}")
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(err) => write!(f, "Failed to load diffusion model: {err}"),
            Self::Request(err) => write!(f, "Diffusion request failed: {err}"),
            Self::Response(err) => write!(f, "Unexpected diffusion response: {err}"),
            Self::Decode(err) => write!(f, "Failed to decode generated image: {err}"),
            Self::Empty => write!(f, "No image data returned"),
        }
    }
}

impl std::error::Error for GenerationError {}

/// A loaded model that can turn a prompt into an image.
#[async_trait]
pub trait DiffusionPipeline: Send + Sync {
    /// Samples one image.
    async fn run(&self, params: &SamplingParams) -> Result<DynamicImage, GenerationError>;
}

/// Loads a [`DiffusionPipeline`].
#[async_trait]
pub trait DiffusionLoader: Send + Sync {
    /// Loads the model, ready to sample.
    async fn load(&self) -> Result<Box<dyn DiffusionPipeline>, GenerationError>;
}

/// Turns poem text plus a style into an illustration.
#[derive(Clone)]
pub struct ImageGenerator {
    loader: Arc<dyn DiffusionLoader>,
    spinner_delay: Duration,
}

impl fmt::Debug for ImageGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageGenerator")
            .field("spinner_delay", &self.spinner_delay)
            .finish_non_exhaustive()
    }
}

impl ImageGenerator {
    /// `spinner_delay` is waited after loading, before sampling.
    pub fn new(loader: Arc<dyn DiffusionLoader>, spinner_delay: Duration) -> Self {
        Self {
            loader,
            spinner_delay,
        }
    }

    /// Generates one image for `prompt_text` in `style_tag`.
    pub async fn generate(
        &self,
        prompt_text: &str,
        style_tag: &str,
    ) -> Result<DynamicImage, GenerationError> {
        let params = SamplingParams::for_prompt(build_prompt(prompt_text, style_tag));
        debug!("Generating image for prompt {:?}", params.prompt);

        // The pipeline is loaded fresh for every request, nothing is cached.
        warn!("Reloading diffusion model for this request");
        let pipeline = self
            .loader
            .load()
            .await
            .inspect_err(|err| error!("Model load failed: {}", err))?;

        if !self.spinner_delay.is_zero() {
            tokio::time::sleep(self.spinner_delay).await;
        }

        let image = pipeline
            .run(&params)
            .await
            .inspect_err(|err| error!("Image generation failed: {}", err))?;
        info!(
            "Generated {}x{} image for style {:?}",
            image.width(),
            image.height(),
            style_tag
        );
        Ok(image)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Mock diffusion backend shared by the generator and web tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use image::{DynamicImage, Rgb, RgbImage};

    use super::{DiffusionLoader, DiffusionPipeline, GenerationError, SamplingParams};

    /// How the mock should behave.
    #[derive(Clone, Copy, Debug)]
    pub(crate) enum MockMode {
        Succeed,
        FailLoad,
        FailRun,
    }

    #[derive(Debug)]
    pub(crate) struct MockLoader {
        mode: MockMode,
        pub(crate) loads: AtomicUsize,
        pub(crate) calls: Arc<Mutex<Vec<SamplingParams>>>,
    }

    impl MockLoader {
        pub(crate) fn new(mode: MockMode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                loads: AtomicUsize::new(0),
                calls: Arc::new(Mutex::new(Vec::new())),
            })
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.calls
                .lock()
                .map(|calls| calls.iter().map(|params| params.prompt.clone()).collect())
                .unwrap_or_default()
        }

        pub(crate) fn load_count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    struct MockPipeline {
        mode: MockMode,
        calls: Arc<Mutex<Vec<SamplingParams>>>,
    }

    #[async_trait]
    impl DiffusionPipeline for MockPipeline {
        async fn run(&self, params: &SamplingParams) -> Result<DynamicImage, GenerationError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(params.clone());
            }
            match self.mode {
                MockMode::FailRun => Err(GenerationError::Request("CUDA out of memory".to_string())),
                _ => Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                    512,
                    512,
                    Rgb([100, 80, 60]),
                ))),
            }
        }
    }

    #[async_trait]
    impl DiffusionLoader for MockLoader {
        async fn load(&self) -> Result<Box<dyn DiffusionPipeline>, GenerationError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let MockMode::FailLoad = self.mode {
                return Err(GenerationError::Load("weights not found".to_string()));
            }
            Ok(Box::new(MockPipeline {
                mode: self.mode,
                calls: self.calls.clone(),
            }))
        }
    }
}
