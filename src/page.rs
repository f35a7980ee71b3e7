//! Per-session page state and the transitions driven by the form buttons.
//!
//! The page is either [`Phase::Idle`] (showing nothing or the previous result)
//! or [`Phase::Generating`] (waiting on the generator). Widget values are
//! applied on every submit, then at most one button event is dispatched.

use std::fmt;
use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog;
use crate::constants::STYLE_OPTIONS;
use crate::filters::{self, FilterSpec};
use crate::generator::{GenerationError, GenerationRequest};

/// Whether a generation is in flight.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Phase {
    /// Waiting for input.
    #[default]
    Idle,
    /// Generate was pressed and the generator has not returned yet.
    Generating,
}

/// The button that submitted the form.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PageEvent {
    /// Widget values only.
    Apply,
    /// "生成图片"
    Generate,
    /// "插入古诗"
    InsertPoem,
    /// "展开/收起古诗内容"
    TogglePoem,
}

/// Values read from the widgets on every submit.
#[derive(Clone, Debug, PartialEq)]
pub struct WidgetValues {
    /// Poem input.
    pub prompt_text: String,
    /// Style dropdown.
    pub style: String,
    /// Sidebar filter dropdown and slider.
    pub filter: FilterSpec,
    /// Sidebar poem dropdown.
    pub selected_poem: Option<String>,
}

/// Failure to turn the stored result back into pixels.
#[derive(Debug)]
pub enum StoredImageError {
    /// The stored payload is not valid base64.
    Encoding(base64::DecodeError),
    /// The stored bytes are not a decodable image.
    Image(image::ImageError),
}

impl fmt::Display for StoredImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(err) => write!(f, "Stored image is not valid base64: {err}"),
            Self::Image(err) => write!(f, "Stored image could not be decoded: {err}"),
        }
    }
}

impl std::error::Error for StoredImageError {}

/// Serialises an image to PNG bytes.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// The unfiltered output of the last successful generation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GeneratedResult {
    png_base64: String,
    style_tag: String,
}

impl GeneratedResult {
    fn new(image: &DynamicImage, style_tag: &str) -> Result<Self, image::ImageError> {
        Ok(Self {
            png_base64: general_purpose::STANDARD.encode(encode_png(image)?),
            style_tag: style_tag.to_string(),
        })
    }

    /// Style the image was generated with.
    pub fn style_tag(&self) -> &str {
        &self.style_tag
    }

    /// `generated_image_<styletag>.png`
    pub fn download_name(&self) -> String {
        format!("generated_image_{}.png", self.style_tag())
    }

    /// Decodes the stored image.
    pub fn image(&self) -> Result<DynamicImage, StoredImageError> {
        let bytes = general_purpose::STANDARD
            .decode(&self.png_base64)
            .map_err(StoredImageError::Encoding)?;
        image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .map_err(StoredImageError::Image)
    }
}

/// Everything the page remembers between requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    /// Poem input.
    pub prompt_text: String,
    /// Selected style.
    pub style: String,
    /// Selected filter and strength.
    pub filter: FilterSpec,
    /// Selected catalog poem, if any.
    pub selected_poem: Option<String>,
    /// Whether the poem side panel is open.
    pub poem_expanded: bool,
    #[serde(skip)]
    phase: Phase,
    result: Option<GeneratedResult>,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            prompt_text: String::new(),
            style: STYLE_OPTIONS[0].to_string(),
            filter: FilterSpec::default(),
            selected_poem: catalog::titles().next().map(str::to_string),
            poem_expanded: false,
            phase: Phase::Idle,
            result: None,
        }
    }
}

impl PageState {
    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Last successful result, if any.
    pub fn result(&self) -> Option<&GeneratedResult> {
        self.result.as_ref()
    }

    /// Copies the widget values into the state.
    pub fn apply_widgets(&mut self, widgets: WidgetValues) {
        self.prompt_text = widgets.prompt_text;
        self.style = widgets.style;
        self.filter = FilterSpec::new(widgets.filter.filter_type, widgets.filter.strength);
        self.selected_poem = widgets.selected_poem.filter(|title| !title.is_empty());
    }

    /// Copies the selected poem into the prompt.
    ///
    /// Does nothing while generating, or when no known poem is selected.
    pub fn insert_poem(&mut self) {
        if self.phase != Phase::Idle {
            return;
        }
        let Some(body) = self.selected_poem.as_deref().and_then(catalog::lookup) else {
            debug!("Insert poem ignored, selection {:?}", self.selected_poem);
            return;
        };
        self.prompt_text = body.to_string();
    }

    /// Opens or closes the poem side panel.
    pub fn toggle_poem(&mut self) {
        self.poem_expanded = !self.poem_expanded;
    }

    /// Title and body to show in the side panel.
    pub fn expanded_poem(&self) -> Option<(&str, &'static str)> {
        if !self.poem_expanded {
            return None;
        }
        let title = self.selected_poem.as_deref()?;
        catalog::lookup(title).map(|body| (title, body))
    }

    /// Idle → Generating. Returns `None` if a generation is already running.
    pub fn begin_generation(&mut self) -> Option<GenerationRequest> {
        if self.phase == Phase::Generating {
            return None;
        }
        self.phase = Phase::Generating;
        Some(GenerationRequest::new(
            self.prompt_text.clone(),
            self.style.to_lowercase(),
        ))
    }

    /// Generating → Idle, storing the outcome.
    ///
    /// The previous result is dropped either way. Returns the message to show
    /// when generation failed.
    pub fn finish_generation(
        &mut self,
        request: &GenerationRequest,
        outcome: Result<DynamicImage, GenerationError>,
    ) -> Option<String> {
        self.phase = Phase::Idle;
        self.result = None;
        let image = match outcome {
            Ok(image) => image,
            Err(err) => return Some(err.user_message()),
        };
        match GeneratedResult::new(&image, &request.style_tag) {
            Ok(result) => {
                self.result = Some(result);
                None
            }
            Err(err) => Some(format!("发生错误: {err}")),
        }
    }

    /// The last result with the current filter applied.
    pub fn rendered_image(&self) -> Result<Option<DynamicImage>, StoredImageError> {
        let Some(result) = self.result.as_ref() else {
            return Ok(None);
        };
        let image = result.image()?;
        Ok(Some(filters::apply(&image, self.filter)))
    }
}
