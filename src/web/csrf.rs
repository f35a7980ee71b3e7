use rand::Rng;
use rand::distr::Alphanumeric;
use tower_sessions::Session;

use crate::error::PoemgenError;

const CSRF_TOKEN_KEY: &str = "csrf_token";
const CSRF_TOKEN_LENGTH: usize = 32;

fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CSRF_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Returns the form token for this session, minting one on first use.
pub(crate) async fn csrf_token(session: &Session) -> Result<String, PoemgenError> {
    if let Some(token) = session.get::<String>(CSRF_TOKEN_KEY).await? {
        return Ok(token);
    }
    let token = generate_token();
    session.insert(CSRF_TOKEN_KEY, &token).await?;
    Ok(token)
}

/// Checks a submitted form token against the session.
pub(crate) async fn validate_csrf(session: &Session, token: &str) -> Result<(), PoemgenError> {
    match session.get::<String>(CSRF_TOKEN_KEY).await? {
        Some(expected) if !token.is_empty() && expected == token => Ok(()),
        _ => Err(PoemgenError::Unauthorized),
    }
}
