//! Shared constants/setters for things
//!

use std::time::Duration;

/// Diffusion model loaded for every generation.
pub const DEFAULT_MODEL: &str = "IDEA-CCNL/Taiyi-Stable-Diffusion-1B-Chinese-v0.1";

/// Default base URL of the Stable Diffusion WebUI API.
pub const DEFAULT_DIFFUSION_URL: &str = "http://127.0.0.1:7860";

/// Classifier-free guidance scale passed to the model.
pub const GUIDANCE_SCALE: f32 = 7.5;

/// Number of denoising steps passed to the model.
pub const INFERENCE_STEPS: u32 = 20;

/// Images requested per generation.
pub const NUM_IMAGES: u32 = 1;

/// Pause before sampling so the loading indicator stays visible.
pub const DEFAULT_SPINNER_DELAY: Duration = Duration::from_secs(3);

/// Style presets offered in the style dropdown, the last one is the custom marker.
pub const STYLE_OPTIONS: [&str; 6] = ["古风", "插画", "油画", "自然", "现代", "custom:自定义风格"];

/// Prefix for free-form styles.
pub const CUSTOM_STYLE_PREFIX: &str = "custom:";

/// Lower bound of the filter strength slider.
pub const FILTER_STRENGTH_MIN: f32 = 0.1;

/// Upper bound of the filter strength slider.
pub const FILTER_STRENGTH_MAX: f32 = 2.0;

/// Initial filter strength, leaves the image unchanged.
pub const FILTER_STRENGTH_DEFAULT: f32 = 1.0;

/// Cache-Control value for generated image responses.
pub const IMAGE_CACHE_CONTROL: &str = "no-store";

/// Session key for the page state.
pub const PAGE_SESSION_KEY: &str = "page";

/// Idle session lifetime in seconds.
pub const SESSION_INACTIVITY_SECONDS: i64 = 60 * 60;

/// Sessions kept in memory before the ones closest to expiry are dropped.
pub const SESSION_MAX_COUNT: usize = 256;

/// How often expired sessions are swept out of memory.
pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
