//! AWS Signature Version 4 request signing.
//!
//! Built directly on `sha2`/`hmac`: canonical request, string to sign,
//! the date/region/service/`aws4_request` key chain, and the final
//! `authorization` header.
//!
//! The request URL keeps path characters such as `:` literal, while the
//! canonical path percent-encodes them. Both forms are derived from the
//! same [`reqwest::Url`] so they never drift apart.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};
use toolrelay_core::error::SigningError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const TERMINATOR: &str = "aws4_request";

/// Static AWS credentials.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Signs requests for one region and service.
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    credentials: Credentials,
    region: String,
    service: String,
}

impl SigV4Signer {
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Result<Self, SigningError> {
        if credentials.access_key_id.is_empty() {
            return Err(SigningError::MissingCredential("access_key_id"));
        }
        if credentials.secret_access_key.is_empty() {
            return Err(SigningError::MissingCredential("secret_access_key"));
        }
        Ok(Self {
            credentials,
            region: region.into(),
            service: service.into(),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Sign a request and return the full header set to send, including
    /// `host`, `x-amz-date` and `authorization`.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &[(&str, &str)],
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, SigningError> {
        let timestamp = amz_timestamp(now);
        let date = &timestamp[..8];

        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(SigningError::InvalidUrl(url.to_string())),
        };

        let mut canonical_headers: BTreeMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), canonical_header_value(v)))
            .collect();
        canonical_headers.insert("host".into(), host);
        canonical_headers.insert("x-amz-date".into(), timestamp.clone());
        if let Some(token) = &self.credentials.session_token {
            canonical_headers.insert("x-amz-security-token".into(), token.clone());
        }

        let canonical = canonical_request(
            method,
            &canonical_uri(url.path()),
            &canonical_query(url),
            &canonical_headers,
            &sha256_hex(body),
        );
        let scope = format!("{date}/{}/{}/{TERMINATOR}", self.region, self.service);
        let to_sign = string_to_sign(&timestamp, &scope, &canonical);
        let key = signing_key(
            &self.credentials.secret_access_key,
            date,
            &self.region,
            &self.service,
        )?;
        let signature = hex::encode(hmac_sha256(&key, to_sign.as_bytes())?);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
            self.credentials.access_key_id,
            signed_header_names(&canonical_headers),
        );

        let mut out: Vec<(String, String)> = canonical_headers.into_iter().collect();
        out.push(("authorization".into(), authorization));
        Ok(out)
    }
}

/// `YYYYMMDD'T'HHMMSS'Z'`, the basic ISO-8601 form used by `x-amz-date`.
pub fn amz_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SigningError::InvalidKey)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Fold the secret through the date, region, service and terminator.
pub fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SigningError> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, TERMINATOR.as_bytes())
}

pub fn string_to_sign(timestamp: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "{ALGORITHM}\n{timestamp}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    )
}

/// Headers must already be lower-cased and value-normalised.
pub fn canonical_request(
    method: &str,
    canonical_uri: &str,
    canonical_query: &str,
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
) -> String {
    let header_lines: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();
    format!(
        "{}\n{canonical_uri}\n{canonical_query}\n{header_lines}\n{}\n{payload_hash}",
        method.to_ascii_uppercase(),
        signed_header_names(headers),
    )
}

fn signed_header_names(headers: &BTreeMap<String, String>) -> String {
    headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
}

fn canonical_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Percent-encode a URL path for the canonical request. Unreserved
/// characters and `/` pass through; everything else, `:` included, is
/// encoded.
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".into();
    }
    uri_encode(path, false)
}

/// Sorted, encoded query string.
pub fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
