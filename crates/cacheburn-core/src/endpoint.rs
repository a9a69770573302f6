use crate::{CacheBurnError, Result};
use url::Url;

const API_BASE_PATH: &str = "/v1/";

/// Reduce any spelling of an OpenAI-compatible endpoint to `http://host[:port]/v1/`.
///
/// Accepts bare `host:port`, a trailing slash, and any path suffix such as
/// `/v1/completions` or `/v1/chat/completions/`.
pub fn normalize_endpoint(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CacheBurnError::Config("endpoint is empty".to_string()));
    }

    let with_scheme = match trimmed.strip_prefix("https://") {
        Some(rest) => format!("http://{}", rest),
        None if trimmed.starts_with("http://") => trimmed.to_string(),
        None => format!("http://{}", trimmed),
    };

    let mut url = Url::parse(&with_scheme)?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(CacheBurnError::Config(format!("endpoint has no host: {}", raw)));
    }

    url.set_path(API_BASE_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_spellings_reduce_to_same_base() {
        let inputs = [
            "localhost:8000",
            "http://localhost:8000",
            "http://localhost:8000/",
            "http://localhost:8000/v1",
            "http://localhost:8000/v1/",
            "http://localhost:8000/v1/completions",
            "http://localhost:8000/v1/completions/",
            "http://localhost:8000/v1/chat/completions",
            "http://localhost:8000/v1/chat/completions/",
            "https://localhost:8000/v1/chat/completions/",
        ];
        for input in inputs {
            assert_eq!(
                normalize_endpoint(input).unwrap(),
                "http://localhost:8000/v1/",
                "input: {}",
                input
            );
        }
    }

    #[test]
    fn test_query_and_whitespace_dropped() {
        assert_eq!(
            normalize_endpoint("  10.0.0.5:30080/v1/models?x=1#top ").unwrap(),
            "http://10.0.0.5:30080/v1/"
        );
    }

    #[test]
    fn test_host_without_port() {
        assert_eq!(
            normalize_endpoint("inference.internal").unwrap(),
            "http://inference.internal/v1/"
        );
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        assert!(matches!(
            normalize_endpoint("   "),
            Err(CacheBurnError::Config(_))
        ));
        assert!(normalize_endpoint("http://").is_err());
    }
}
