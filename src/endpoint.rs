//! Endpoint resolution.
//!
//! When no override is configured, the endpoint is computed from the scheme,
//! service name, and region. An override may omit the scheme, in which case
//! the configured scheme is prepended.

use crate::{Error, Result};
use url::Url;

/// The URI scheme for computed endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    /// Plain HTTP; only sensible for local test endpoints.
    Http,
    /// HTTPS, the default.
    #[default]
    Https,
}

impl Scheme {
    fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Computes the regional endpoint for a service:
/// `{scheme}://{service}.{region}.amazonaws.com`.
pub fn for_region(scheme: Scheme, service: &str, region: &str) -> Result<Url> {
    if service.is_empty() || region.is_empty() {
        return Err(Error::Configuration(
            "service and region are required to compute an endpoint".to_string(),
        ));
    }
    let raw = format!("{}://{}.{}.amazonaws.com", scheme.as_str(), service, region);
    Ok(Url::parse(&raw)?)
}

/// Normalizes an endpoint override, prepending the configured scheme when the
/// override does not carry one.
pub fn normalize_override(scheme: Scheme, endpoint: &str) -> Result<Url> {
    let raw = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("{}://{}", scheme.as_str(), endpoint)
    };
    Ok(Url::parse(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_computed_regional_endpoint() {
        let url = for_region(Scheme::Https, "mediaconnect", "us-west-2").unwrap();
        assert_eq!(url.as_str(), "https://mediaconnect.us-west-2.amazonaws.com/");
    }

    #[test]
    fn test_missing_region_is_configuration_error() {
        let err = for_region(Scheme::Https, "states", "").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_override_keeps_explicit_scheme() {
        let url = normalize_override(Scheme::Https, "http://localhost:4566").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.port(), Some(4566));
    }

    #[test]
    fn test_override_inherits_configured_scheme() {
        let url = normalize_override(Scheme::Http, "localhost:4566").unwrap();
        assert_eq!(url.scheme(), "http");
    }
}
