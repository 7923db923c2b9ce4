//! Access token acquisition (Alibaba Cloud POP `CreateToken`)

use crate::error::{RelayError, RelayResult};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use sha1::Sha1;
use std::collections::BTreeMap;
use tracing::{debug, info};

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay as-is
const POP_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const API_VERSION: &str = "2019-02-28";

/// Short-lived token for the NLS gateway
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub id: String,
    pub expire_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateTokenResponse {
    token: Option<TokenBody>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TokenBody {
    id: String,
    expire_time: i64,
}

/// Request a token with an access key pair
pub async fn create_token(
    http: &reqwest::Client,
    token_url: &str,
    region_id: &str,
    access_key_id: &str,
    access_key_secret: &str,
) -> RelayResult<AccessToken> {
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let nonce = uuid::Uuid::new_v4().to_string();
    let params = token_params(access_key_id, region_id, &timestamp, &nonce);

    let query = canonical_query(&params);
    let signature = sign(access_key_secret, &query)?;

    let mut url = url::Url::parse(token_url)
        .map_err(|e| unavailable(format!("invalid token URL {}: {}", token_url, e)))?;
    url.set_query(Some(&format!("{}&Signature={}", query, percent_encode(&signature))));

    debug!("Requesting NLS token from {}", token_url);

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| unavailable(format!("token request failed: {}", e)))?;

    let status = response.status();
    let body: CreateTokenResponse = response
        .json()
        .await
        .map_err(|e| unavailable(format!("invalid token response ({}): {}", status, e)))?;

    let token = match body.token {
        Some(token) if !token.id.is_empty() => token,
        _ => {
            return Err(unavailable(format!(
                "CreateToken rejected ({}): {} {}",
                status,
                body.code.unwrap_or_default(),
                body.message.unwrap_or_default()
            )))
        }
    };

    let expire_time = Utc
        .timestamp_opt(token.expire_time, 0)
        .single()
        .ok_or_else(|| unavailable(format!("invalid token expiry {}", token.expire_time)))?;

    info!("NLS token acquired, expires at {}", expire_time);

    Ok(AccessToken {
        id: token.id,
        expire_time,
    })
}

/// Signed parameters of a CreateToken request, minus the signature
fn token_params<'a>(
    access_key_id: &'a str,
    region_id: &'a str,
    timestamp: &'a str,
    nonce: &'a str,
) -> BTreeMap<&'static str, &'a str> {
    BTreeMap::from([
        ("AccessKeyId", access_key_id),
        ("Action", "CreateToken"),
        ("Format", "JSON"),
        ("RegionId", region_id),
        ("SignatureMethod", "HMAC-SHA1"),
        ("SignatureNonce", nonce),
        ("SignatureVersion", "1.0"),
        ("Timestamp", timestamp),
        ("Version", API_VERSION),
    ])
}

/// Key-sorted, percent-encoded `k=v&...`
fn canonical_query(params: &BTreeMap<&str, &str>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn string_to_sign(canonical_query: &str) -> String {
    format!("GET&{}&{}", percent_encode("/"), percent_encode(canonical_query))
}

fn sign(access_key_secret: &str, canonical_query: &str) -> RelayResult<String> {
    let mut mac = HmacSha1::new_from_slice(format!("{}&", access_key_secret).as_bytes())
        .map_err(|e| unavailable(format!("invalid access key secret: {}", e)))?;
    mac.update(string_to_sign(canonical_query).as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, POP_ENCODE_SET).to_string()
}

fn unavailable(message: String) -> RelayError {
    RelayError::BackendUnavailable(message)
}
