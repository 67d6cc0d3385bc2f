use std::sync::OnceLock;

use regex::Regex;

fn invalid_grant_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)invalid.?grant|refresh.?token.?(not.?found|revoked|expired|already.?used)|invalid.?refresh")
            .expect("invalid grant regex must compile")
    })
}

/// Statuses that trigger the refresh-once, retry-once path.
pub fn is_auth_failure(status: u16) -> bool {
    matches!(status, 401 | 403)
}

/// True when a refresh endpoint response means the refresh token itself is dead.
pub fn is_invalid_refresh_token(status: u16, error_text: &str) -> bool {
    status == 401 || (status == 400 && invalid_grant_regex().is_match(error_text))
}
