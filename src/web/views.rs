use axum::response::Redirect;

use super::csrf::{csrf_token, validate_csrf};
use super::flash::{self, FlashMessage};
use super::prelude::*;
use crate::catalog;
use crate::constants::{
    CUSTOM_STYLE_PREFIX, FILTER_STRENGTH_DEFAULT, FILTER_STRENGTH_MAX, FILTER_STRENGTH_MIN,
    STYLE_OPTIONS,
};
use crate::filters::{FilterSpec, FilterType};
use crate::page::{PageEvent, WidgetValues};

#[derive(Clone, Debug)]
pub(crate) struct SelectOption {
    pub(crate) value: String,
    pub(crate) label: String,
    pub(crate) selected: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "page.html")]
pub(crate) struct PageTemplate {
    prompt_text: String,
    style_options: Vec<SelectOption>,
    custom_style: String,
    filter_options: Vec<SelectOption>,
    filter_strength: String,
    strength_min: String,
    strength_max: String,
    poem_options: Vec<SelectOption>,
    has_expanded_poem: bool,
    expanded_title: String,
    expanded_body: String,
    has_image: bool,
    image_style: String,
    download_name: String,
    csrf_token: String,
    has_flash: bool,
    flash_message: String,
    flash_class: String,
}

/// The form posted by every button on the page.
#[derive(Deserialize, Debug)]
pub(crate) struct PageForm {
    #[serde(default)]
    csrf_token: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    prompt_text: String,
    #[serde(default)]
    style: String,
    #[serde(default)]
    custom_style: String,
    #[serde(default)]
    filter_type: String,
    #[serde(default)]
    filter_strength: String,
    #[serde(default)]
    selected_poem: Option<String>,
}

impl PageForm {
    fn event(&self) -> PageEvent {
        match self.action.as_str() {
            "generate" => PageEvent::Generate,
            "insert_poem" => PageEvent::InsertPoem,
            "toggle_poem" => PageEvent::TogglePoem,
            _ => PageEvent::Apply,
        }
    }

    fn widgets(&self) -> WidgetValues {
        let filter_type = self
            .filter_type
            .parse::<FilterType>()
            .unwrap_or_default();
        let strength = self
            .filter_strength
            .trim()
            .parse::<f32>()
            .unwrap_or(FILTER_STRENGTH_DEFAULT);
        WidgetValues {
            prompt_text: self.prompt_text.clone(),
            style: resolve_style(&self.style, &self.custom_style),
            filter: FilterSpec::new(filter_type, strength),
            selected_poem: self.selected_poem.clone(),
        }
    }
}

/// Picks the style tag from the dropdown, swapping in the free-text style
/// when the custom marker is selected and text was entered.
pub(crate) fn resolve_style(selected: &str, custom_text: &str) -> String {
    let custom_text = custom_text.trim();
    if !selected.starts_with(CUSTOM_STYLE_PREFIX) || custom_text.is_empty() {
        if selected.is_empty() {
            return STYLE_OPTIONS[0].to_string();
        }
        return selected.to_string();
    }
    if custom_text.starts_with(CUSTOM_STYLE_PREFIX) {
        custom_text.to_string()
    } else {
        format!("{CUSTOM_STYLE_PREFIX}{custom_text}")
    }
}

pub(crate) async fn load_page(session: &Session) -> Result<PageState, PoemgenError> {
    Ok(session
        .get::<PageState>(PAGE_SESSION_KEY)
        .await?
        .unwrap_or_default())
}

pub(crate) async fn save_page(session: &Session, page: &PageState) -> Result<(), PoemgenError> {
    session.insert(PAGE_SESSION_KEY, page).await?;
    Ok(())
}

fn style_options(current: &str) -> Vec<SelectOption> {
    let is_preset = STYLE_OPTIONS.contains(&current);
    STYLE_OPTIONS
        .iter()
        .map(|style| SelectOption {
            value: style.to_string(),
            label: style.to_string(),
            selected: if is_preset {
                *style == current
            } else {
                style.starts_with(CUSTOM_STYLE_PREFIX)
            },
        })
        .collect()
}

fn filter_options(current: FilterType) -> Vec<SelectOption> {
    FilterType::ALL
        .iter()
        .map(|filter| SelectOption {
            value: filter.label().to_string(),
            label: filter.label().to_string(),
            selected: *filter == current,
        })
        .collect()
}

fn poem_options(current: Option<&str>) -> Vec<SelectOption> {
    catalog::titles()
        .map(|title| SelectOption {
            value: title.to_string(),
            label: title.to_string(),
            selected: Some(title) == current,
        })
        .collect()
}

impl PageTemplate {
    fn new(page: &PageState, csrf_token: String, flash: Option<FlashMessage>) -> Self {
        let custom_style = match page.style.strip_prefix(CUSTOM_STYLE_PREFIX) {
            Some(text) if !STYLE_OPTIONS.contains(&page.style.as_str()) => text.to_string(),
            _ => String::new(),
        };
        let (has_expanded_poem, expanded_title, expanded_body) = match page.expanded_poem() {
            Some((title, body)) => (true, title.to_string(), body.to_string()),
            None => (false, String::new(), String::new()),
        };
        let (has_flash, flash_message, flash_class) = match flash {
            Some(message) => (true, message.text, message.class),
            None => (false, String::new(), String::new()),
        };
        Self {
            prompt_text: page.prompt_text.clone(),
            style_options: style_options(&page.style),
            custom_style,
            filter_options: filter_options(page.filter.filter_type),
            filter_strength: format!("{:.1}", page.filter.strength),
            strength_min: format!("{FILTER_STRENGTH_MIN:.1}"),
            strength_max: format!("{FILTER_STRENGTH_MAX:.1}"),
            poem_options: poem_options(page.selected_poem.as_deref()),
            has_expanded_poem,
            expanded_title,
            expanded_body,
            has_image: page.result().is_some(),
            image_style: page
                .result()
                .map(|result| result.style_tag().to_string())
                .unwrap_or_default(),
            download_name: page
                .result()
                .map(|result| result.download_name())
                .unwrap_or_default(),
            csrf_token,
            has_flash,
            flash_message,
            flash_class,
        }
    }
}

/// handles the / GET
pub(crate) async fn page_handler(session: Session) -> Result<PageTemplate, PoemgenError> {
    let page = load_page(&session).await?;
    let csrf_token = csrf_token(&session).await?;
    let flash = flash::take_flash_message(&session).await?;
    Ok(PageTemplate::new(&page, csrf_token, flash))
}

/// handles the / POST, every button on the page submits here
pub(crate) async fn submit_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<PageForm>,
) -> Result<Redirect, PoemgenError> {
    validate_csrf(&session, &form.csrf_token).await?;

    let mut page = load_page(&session).await?;
    page.apply_widgets(form.widgets());

    match form.event() {
        PageEvent::Apply => {}
        PageEvent::InsertPoem => page.insert_poem(),
        PageEvent::TogglePoem => page.toggle_poem(),
        PageEvent::Generate => {
            if let Some(request) = page.begin_generation() {
                info!("Generating image in style {:?}", request.style_tag);
                let outcome = state
                    .generator
                    .generate(&request.prompt_text, &request.style_tag)
                    .await;
                if let Some(message) = page.finish_generation(&request, outcome) {
                    flash::set_flash(&session, FlashMessage::error(message)).await?;
                }
            } else {
                debug!("Generate pressed while already generating");
            }
        }
    }

    save_page(&session, &page).await?;
    Ok(Redirect::to("/"))
}
