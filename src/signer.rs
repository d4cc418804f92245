//! SigV4-style request signing.
//!
//! Signing is a pure function over the request, the credentials, the
//! service/region identifiers, and an injected timestamp — the same inputs
//! always produce the same signature, which is what makes fixed-clock testing
//! possible. The flow is the standard one: canonical request, string-to-sign,
//! derived signing key, `Authorization` header.

use crate::credentials::Credentials;
use crate::transport::SignedRequest;
use crate::{Error, Result};
use hmac::{digest::FixedOutput, Hmac, Mac};
use http::header::{HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Everything the signer needs besides the request itself.
///
/// `time` is injected rather than read from the wall clock so that signing is
/// deterministic under test; the executor passes a fresh timestamp for every
/// attempt because signatures are time-sensitive.
#[derive(Debug)]
pub struct SigningParams<'a> {
    /// The credentials to sign with.
    pub credentials: &'a Credentials,
    /// The service name in the credential scope (e.g. `states`).
    pub service: &'a str,
    /// The region in the credential scope (e.g. `us-east-1`).
    pub region: &'a str,
    /// The signing timestamp.
    pub time: SystemTime,
}

/// Signs the request in place: adds `host`, `x-amz-date`, the session token
/// header when present, and the `Authorization` header.
///
/// Fails with [`Error::Auth`] if the credentials are blank or the request URL
/// has no host.
pub fn sign(request: &mut SignedRequest, params: &SigningParams<'_>) -> Result<()> {
    params.credentials.validate()?;

    let host = host_header(request)?;
    let (date, date_time) = format_timestamp(params.time)?;

    insert_header(request, "host", &host)?;
    insert_header(request, "x-amz-date", &date_time)?;
    if let Some(token) = params.credentials.session_token() {
        insert_header(request, "x-amz-security-token", token)?;
    }

    let (canonical_request, signed_headers) = canonical_request(request);
    let scope = format!(
        "{}/{}/{}/aws4_request",
        date, params.region, params.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{date_time}\n{scope}\n{}",
        sha256_hex_string(canonical_request.as_bytes())
    );

    let signing_key = generate_signing_key(
        params.credentials.secret_access_key(),
        &date,
        params.region,
        params.service,
    );
    let signature = calculate_signature(signing_key, string_to_sign.as_bytes());

    let authorization = format!(
        "{ALGORITHM} Credential={}/{}, SignedHeaders={}, Signature={}",
        params.credentials.access_key_id(),
        scope,
        signed_headers,
        signature
    );
    insert_header(request, "authorization", &authorization)?;
    Ok(())
}

/// `HashedPayload = Lowercase(HexEncode(Hash(requestPayload)))`
pub(crate) fn sha256_hex_string(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize_fixed())
}

/// Calculates the final signature over the string-to-sign.
fn calculate_signature(signing_key: impl AsRef<[u8]>, string_to_sign: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(signing_key.as_ref())
        .expect("HMAC can take key of any size");
    mac.update(string_to_sign);
    hex::encode(mac.finalize_fixed())
}

/// Derives the signing key: date, then region, then service, then the
/// terminal `aws4_request` literal.
fn generate_signing_key(secret: &str, date: &str, region: &str, service: &str) -> impl AsRef<[u8]> {
    let secret = format!("AWS4{}", secret);
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_ref()).expect("HMAC can take key of any size");
    mac.update(date.as_bytes());
    let tag = mac.finalize_fixed();

    let mut mac = Hmac::<Sha256>::new_from_slice(&tag).expect("HMAC can take key of any size");
    mac.update(region.as_bytes());
    let tag = mac.finalize_fixed();

    let mut mac = Hmac::<Sha256>::new_from_slice(&tag).expect("HMAC can take key of any size");
    mac.update(service.as_bytes());
    let tag = mac.finalize_fixed();

    let mut mac = Hmac::<Sha256>::new_from_slice(&tag).expect("HMAC can take key of any size");
    mac.update("aws4_request".as_bytes());
    mac.finalize_fixed()
}

/// Builds the canonical request and the signed-headers list.
fn canonical_request(request: &SignedRequest) -> (String, String) {
    // Lowercased, sorted headers with trimmed, space-collapsed values.
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &request.headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        headers
            .entry(name.as_str().to_ascii_lowercase())
            .or_default()
            .push(normalize_header_value(&value));
    }

    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(name, values)| format!("{}:{}\n", name, values.join(",")))
        .collect();

    let mut query: Vec<(String, String)> = request
        .url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    query.sort();
    let canonical_query = query
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method.as_str(),
        request.url.path(),
        canonical_query,
        canonical_headers,
        signed_headers,
        sha256_hex_string(&request.body)
    );
    (canonical, signed_headers)
}

/// Trims and collapses runs of spaces, per the canonicalization rules.
fn normalize_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_was_space = false;
    for c in value.trim().chars() {
        if c == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

/// RFC 3986 percent-encoding with the unreserved set only.
fn uri_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn host_header(request: &SignedRequest) -> Result<String> {
    let host = request
        .url
        .host_str()
        .ok_or_else(|| Error::Auth("request URL has no host to sign".to_string()))?;
    Ok(match request.url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn insert_header(request: &mut SignedRequest, name: &str, value: &str) -> Result<()> {
    let name = HeaderName::try_from(name)
        .map_err(|e| Error::Auth(format!("invalid signing header name: {}", e)))?;
    let value = HeaderValue::try_from(value)
        .map_err(|e| Error::Auth(format!("invalid signing header value: {}", e)))?;
    request.headers.insert(name, value);
    Ok(())
}

/// Formats the timestamp as (`YYYYMMDD`, `YYYYMMDDTHHMMSSZ`), both UTC.
fn format_timestamp(time: SystemTime) -> Result<(String, String)> {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map_err(|_| Error::Auth("signing timestamp predates the epoch".to_string()))?
        .as_secs();
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (hour, minute, second) = (rem / 3600, (rem % 3600) / 60, rem % 60);

    // Civil-from-days conversion (proleptic Gregorian).
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };

    let date = format!("{:04}{:02}{:02}", year, month, day);
    let date_time = format!("{}T{:02}{:02}{:02}Z", date, hour, minute, second);
    Ok((date, date_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method};
    use std::time::Duration;
    use url::Url;

    fn example_request() -> SignedRequest {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );
        SignedRequest {
            method: Method::GET,
            url: Url::parse("https://iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08")
                .unwrap(),
            headers,
            body: Vec::new(),
        }
    }

    fn example_params(credentials: &Credentials) -> SigningParams<'_> {
        SigningParams {
            credentials,
            service: "iam",
            region: "us-east-1",
            // 2015-08-30T12:36:00Z
            time: UNIX_EPOCH + Duration::from_secs(1_440_938_160),
        }
    }

    #[test]
    fn test_timestamp_formatting() {
        let time = UNIX_EPOCH + Duration::from_secs(1_440_938_160);
        let (date, date_time) = format_timestamp(time).unwrap();
        assert_eq!(date, "20150830");
        assert_eq!(date_time, "20150830T123600Z");
    }

    #[test]
    fn test_known_answer_vector() {
        // The published SigV4 reference example: GET iam.amazonaws.com
        // ListUsers with the documented example credentials.
        let credentials = Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        );
        let mut request = example_request();
        sign(&mut request, &example_params(&credentials)).unwrap();

        let authorization = request.headers["authorization"].to_str().unwrap();
        assert_eq!(
            authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
        assert_eq!(
            request.headers["x-amz-date"].to_str().unwrap(),
            "20150830T123600Z"
        );
        assert_eq!(request.headers["host"].to_str().unwrap(), "iam.amazonaws.com");
    }

    #[test]
    fn test_canonical_request_shape() {
        let credentials = Credentials::new("AKIDEXAMPLE", "secret");
        let mut request = example_request();
        sign(&mut request, &example_params(&credentials)).unwrap();

        let (canonical, signed_headers) = canonical_request(&request);
        assert_eq!(
            signed_headers,
            "authorization;content-type;host;x-amz-date"
        );
        let mut lines = canonical.lines();
        assert_eq!(lines.next(), Some("GET"));
        assert_eq!(lines.next(), Some("/"));
        assert_eq!(lines.next(), Some("Action=ListUsers&Version=2010-05-08"));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let credentials = Credentials::new("AKID", "secret");
        let mut a = example_request();
        let mut b = example_request();
        sign(&mut a, &example_params(&credentials)).unwrap();
        sign(&mut b, &example_params(&credentials)).unwrap();
        assert_eq!(a.headers["authorization"], b.headers["authorization"]);
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let mut a = example_request();
        let mut b = example_request();
        let first = Credentials::new("AKID", "secret-one");
        let second = Credentials::new("AKID", "secret-two");
        sign(&mut a, &example_params(&first)).unwrap();
        sign(&mut b, &example_params(&second)).unwrap();
        assert_ne!(a.headers["authorization"], b.headers["authorization"]);
    }

    #[test]
    fn test_session_token_header_added() {
        let credentials = Credentials::new("AKID", "secret").with_session_token("the-token");
        let mut request = example_request();
        sign(&mut request, &example_params(&credentials)).unwrap();
        assert_eq!(
            request.headers["x-amz-security-token"].to_str().unwrap(),
            "the-token"
        );
    }

    #[test]
    fn test_blank_credentials_fail_signing() {
        let credentials = Credentials::new("", "");
        let mut request = example_request();
        let err = sign(&mut request, &example_params(&credentials)).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_nonstandard_port_in_host_header() {
        let credentials = Credentials::new("AKID", "secret");
        let mut request = example_request();
        request.url = Url::parse("http://localhost:8080/path").unwrap();
        sign(&mut request, &example_params(&credentials)).unwrap();
        assert_eq!(
            request.headers["host"].to_str().unwrap(),
            "localhost:8080"
        );
    }

    #[test]
    fn test_uri_encode_strict_set() {
        assert_eq!(uri_encode("a b/c~d"), "a%20b%2Fc~d");
        assert_eq!(uri_encode("2010-05-08"), "2010-05-08");
    }
}
