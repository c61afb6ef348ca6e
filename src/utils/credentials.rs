use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static USER_AND_PASSWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(https?://)([^/\s:@]+):([^/\s@]+)@").expect("credential pattern is valid")
});
static USER_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(https?://)([^/\s:@]+)@").expect("credential pattern is valid"));

/// Embeds `username:password` into an http(s) clone URL.
///
/// URLs that are not http(s), cannot be parsed, or already carry userinfo
/// are returned unchanged.
pub fn inject_credentials(repo_url: &str, username: &str, password: &str) -> String {
    let Ok(mut url) = Url::parse(repo_url) else {
        return repo_url.to_string();
    };

    if !matches!(url.scheme(), "http" | "https") {
        return repo_url.to_string();
    }
    if !url.username().is_empty() || url.password().is_some() {
        return repo_url.to_string();
    }

    if url.set_username(username).is_err() || url.set_password(Some(password)).is_err() {
        return repo_url.to_string();
    }
    url.to_string()
}

/// Masks credentials embedded in URLs anywhere in `text`.
pub fn redact_secret(text: &str) -> String {
    let masked = USER_AND_PASSWORD.replace_all(text, "${1}***:***@");
    USER_ONLY.replace_all(&masked, "${1}***@").into_owned()
}
