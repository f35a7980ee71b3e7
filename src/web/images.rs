use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION};
use axum::response::Response;

use super::prelude::*;
use super::views::load_page;
use crate::constants::IMAGE_CACHE_CONTROL;
use crate::page::encode_png;

/// Filtered PNG bytes of the current result plus its download name.
async fn rendered_png(session: &Session) -> Result<(Vec<u8>, String), PoemgenError> {
    let page = load_page(session).await?;
    let (Some(result), Some(image)) = (page.result(), page.rendered_image()?) else {
        return Err(PoemgenError::NotFound("no generated image yet".to_string()));
    };
    let bytes = encode_png(&image)?;
    debug!("Encoded {} bytes of PNG for {}", bytes.len(), result.download_name());
    Ok((bytes, result.download_name()))
}

fn png_response() -> axum::http::response::Builder {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, HeaderValue::from_static("image/png"))
        .header(CACHE_CONTROL, IMAGE_CACHE_CONTROL)
}

/// handles GET /image.png, the result with the current filter applied
pub(crate) async fn image_handler(session: Session) -> Result<Response, PoemgenError> {
    let (bytes, _) = rendered_png(&session).await?;
    png_response()
        .body(Body::from(bytes))
        .map_err(PoemgenError::from)
}

/// handles GET /download, same bytes as an attachment
pub(crate) async fn download_handler(session: Session) -> Result<Response, PoemgenError> {
    let (bytes, file_name) = rendered_png(&session).await?;
    info!("Serving download {} ({} bytes)", file_name, bytes.len());
    png_response()
        .header(CONTENT_DISPOSITION, content_disposition(&file_name))
        .body(Body::from(bytes))
        .map_err(PoemgenError::from)
}

/// `attachment` with an ASCII fallback name and the UTF-8 name per RFC 5987.
pub(crate) fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let mut encoded = String::with_capacity(file_name.len() * 3);
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_disposition_encodes_utf8_names() {
        assert_eq!(
            content_disposition("generated_image_古风.png"),
            "attachment; filename=\"generated_image___.png\"; filename*=UTF-8''generated_image_%E5%8F%A4%E9%A3%8E.png"
        );
        assert_eq!(
            content_disposition("generated_image_custom:ink.png"),
            "attachment; filename=\"generated_image_custom_ink.png\"; filename*=UTF-8''generated_image_custom%3Aink.png"
        );
    }
}
