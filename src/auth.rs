use regex::Regex;
use reqwest::Client;
use reqwest::header::REFERER;

use crate::constants::{AUTH_PATH, HOME_PATH, LOGIN_PAGE_PATH};
use crate::error::AuthError;

/// Portal credentials, validated (non-empty) before any network call.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub fn credentials_from_env() -> Result<Credentials, AuthError> {
    let username = std::env::var("LIMS_USERNAME").unwrap_or_default();
    let password = std::env::var("LIMS_PASSWORD").unwrap_or_default();
    if username.trim().is_empty() || password.trim().is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(Credentials { username, password })
}

/// Establish an authenticated portal session on `client` (which must carry a
/// cookie store). Success is judged solely by where the login POST finally
/// redirects: anything but the home page is a failed login, even with a 200.
pub async fn login(
    client: &Client,
    base_url: &str,
    credentials: &Credentials,
) -> Result<(), AuthError> {
    tracing::info!("Attempting LIMS login...");

    let login_page_url = format!("{base_url}{LOGIN_PAGE_PATH}");
    let response = client.get(&login_page_url).send().await?;
    tracing::debug!("GET {} status {}", login_page_url, response.status());
    let body = response.text().await?;

    let rdm_token = extract_rdm_token(&body).ok_or(AuthError::TokenNotFound)?;
    tracing::debug!("Found rdm token");

    let response = client
        .post(format!("{base_url}{AUTH_PATH}"))
        .header(REFERER, &login_page_url)
        .form(&[
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("action", "auth"),
            ("rdm", rdm_token.as_str()),
        ])
        .send()
        .await?;

    let landing = response.url().clone();
    if landing.path().ends_with(HOME_PATH) {
        tracing::info!("LIMS login successful");
        Ok(())
    } else {
        Err(AuthError::UnexpectedLanding(landing.to_string()))
    }
}

/// One-time anti-forgery token embedded as a hidden form field on the login
/// page. Tolerates either quote style and any attribute casing.
fn extract_rdm_token(body: &str) -> Option<String> {
    let pattern = Regex::new(
        r#"(?i)<input\s+name=["']rdm["']\s+type=["']hidden["']\s+value=["']([^"']+)["']\s*/?>"#,
    )
    .ok()?;
    pattern
        .captures(body)
        .map(|captures| captures[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_with_double_quotes() {
        let body = r#"<form><input name="rdm" type="hidden" value="a1b2c3"/></form>"#;
        assert_eq!(extract_rdm_token(body).as_deref(), Some("a1b2c3"));
    }

    #[test]
    fn extracts_token_with_single_quotes_and_mixed_case() {
        let body = "<INPUT name='rdm' type='hidden' value='Zz9'>";
        assert_eq!(extract_rdm_token(body).as_deref(), Some("Zz9"));
    }

    #[test]
    fn missing_token_yields_none() {
        let body = r#"<input name="other" type="hidden" value="x">"#;
        assert!(extract_rdm_token(body).is_none());
    }
}
