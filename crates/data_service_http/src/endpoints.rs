use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("invalid base URL {url}: {reason}")]
    InvalidBase { url: String, reason: String },
    #[error("cannot join {path} onto {base}: {reason}")]
    Join {
        base: String,
        path: String,
        reason: String,
    },
}

/// Base URLs of the REST data API and the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEndpoints {
    rest: Url,
    auth: Url,
}

impl HttpEndpoints {
    pub fn new(rest_url: &str, auth_url: &str) -> Result<Self, EndpointError> {
        Ok(Self {
            rest: parse_base(rest_url)?,
            auth: parse_base(auth_url)?,
        })
    }

    pub fn rest(&self, path: &str, query: &[(&str, &str)]) -> Result<String, EndpointError> {
        join(&self.rest, path, query)
    }

    pub fn auth(&self, path: &str, query: &[(&str, &str)]) -> Result<String, EndpointError> {
        join(&self.auth, path, query)
    }

    /// Refresh-token grant endpoint handed to the auth client.
    pub fn token_url(&self) -> Result<String, EndpointError> {
        self.auth("token", &[("grant_type", "refresh_token")])
    }
}

/// Parses `input` as a base URL, forcing a trailing slash so relative joins append.
fn parse_base(input: &str) -> Result<Url, EndpointError> {
    let trimmed = input.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };

    let url = Url::parse(&with_slash).map_err(|error| EndpointError::InvalidBase {
        url: input.to_string(),
        reason: error.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(EndpointError::InvalidBase {
            url: input.to_string(),
            reason: "URL cannot be a base".to_string(),
        });
    }
    Ok(url)
}

fn join(base: &Url, path: &str, query: &[(&str, &str)]) -> Result<String, EndpointError> {
    let mut url = base
        .join(path.trim_start_matches('/'))
        .map_err(|error| EndpointError::Join {
            base: base.to_string(),
            path: path.to_string(),
            reason: error.to_string(),
        })?;

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_under_the_base_path() {
        let endpoints =
            HttpEndpoints::new("https://api.example.com/rest/v1", "https://api.example.com/auth/v1/")
                .expect("endpoints parse");

        assert_eq!(
            endpoints.rest("/spaces", &[("select", "*")]).expect("joins"),
            "https://api.example.com/rest/v1/spaces?select=*"
        );
        assert_eq!(
            endpoints.token_url().expect("joins"),
            "https://api.example.com/auth/v1/token?grant_type=refresh_token"
        );
    }

    #[test]
    fn query_values_are_encoded() {
        let endpoints = HttpEndpoints::new("http://localhost:54321/rest/v1", "http://localhost:54321/auth/v1")
            .expect("endpoints parse");

        assert_eq!(
            endpoints
                .rest("messages", &[("conversation_id", "in.(a,b c)")])
                .expect("joins"),
            "http://localhost:54321/rest/v1/messages?conversation_id=in.%28a%2Cb+c%29"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(matches!(
            HttpEndpoints::new("not a url", "http://localhost/auth"),
            Err(EndpointError::InvalidBase { .. })
        ));
        assert!(matches!(
            HttpEndpoints::new("mailto:ops@example.com", "http://localhost/auth"),
            Err(EndpointError::InvalidBase { .. })
        ));
    }
}
