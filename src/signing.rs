//! Request signing for the queue endpoint
//!
//! The reader only issues `GET` requests whose parameters live in the query
//! string, so signing reduces to computing a couple of headers for a URL.
//!
//! - [`SigV4Signer`]: AWS Signature Version 4 (`Authorization` + `x-amz-date`)
//! - [`Unsigned`]: no headers, for local queue emulators

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "host;x-amz-date";
const X_AMZ_DATE: &str = "x-amz-date";

/// Computes authentication headers for a queue request
pub trait RequestSigner: Send + Sync {
    /// Headers to attach to a `GET` of `url` issued at `now`
    fn sign(&self, url: &Url, now: DateTime<Utc>) -> Result<HeaderMap>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Signer that adds nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsigned;

impl RequestSigner for Unsigned {
    fn sign(&self, _url: &Url, _now: DateTime<Utc>) -> Result<HeaderMap> {
        Ok(HeaderMap::new())
    }

    fn name(&self) -> &'static str {
        "unsigned"
    }
}

/// AWS Signature Version 4 header signer for `GET` requests
#[derive(Clone)]
pub struct SigV4Signer {
    access_key: String,
    access_secret: String,
    region: String,
    service: String,
}

impl std::fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigV4Signer")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl SigV4Signer {
    /// Signer for the `sqs` service in `region`
    pub fn new(
        access_key: impl Into<String>,
        access_secret: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            access_secret: access_secret.into(),
            region: region.into(),
            service: "sqs".to_string(),
        }
    }

    /// Override the service name in the credential scope
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    fn canonical_request(url: &Url, host: &str, amz_date: &str) -> String {
        let path = match url.path() {
            "" => "/",
            p => p,
        };
        let headers = format!("host:{host}\n{X_AMZ_DATE}:{amz_date}\n");
        let payload_hash = hex::encode(Sha256::digest(b""));
        [
            "GET",
            path,
            &canonical_query(url),
            &headers,
            SIGNED_HEADERS,
            &payload_hash,
        ]
        .join("\n")
    }

    fn signing_key(&self, date_stamp: &str) -> Result<Vec<u8>> {
        let secret = format!("AWS4{}", self.access_secret);
        let k_date = hmac_sha256(secret.as_bytes(), date_stamp.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        hmac_sha256(&k_service, b"aws4_request")
    }
}

impl RequestSigner for SigV4Signer {
    fn sign(&self, url: &Url, now: DateTime<Utc>) -> Result<HeaderMap> {
        let host = host_header(url)?;
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{date_stamp}/{}/{}/aws4_request", self.region, self.service);

        let canonical = Self::canonical_request(url, &host, &amz_date);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );
        let signature = hex::encode(hmac_sha256(
            &self.signing_key(&date_stamp)?,
            string_to_sign.as_bytes(),
        )?);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            self.access_key
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(X_AMZ_DATE),
            header_value(&amz_date)?,
        );
        headers.insert(AUTHORIZATION, header_value(&authorization)?);
        Ok(headers)
    }

    fn name(&self) -> &'static str {
        "sigv4"
    }
}

/// Pick a signer for the configured credentials
///
/// Empty credentials mean unsigned requests. Signing without a resolvable
/// region is a configuration error.
pub fn signer_for(config: &Config) -> Result<Arc<dyn RequestSigner>> {
    if config.credentials.is_empty() {
        return Ok(Arc::new(Unsigned));
    }
    let region = config.queue.signing_region().ok_or_else(|| {
        Error::config(
            "region",
            "cannot infer signing region from endpoint; set queue.region",
        )
    })?;
    Ok(Arc::new(SigV4Signer::new(
        config.credentials.access_key.clone(),
        config.credentials.access_secret.clone(),
        region,
    )))
}

/// Query string in SigV4 canonical form: RFC 3986 encoded, sorted by key then value
fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                urlencoding::encode(&k).into_owned(),
                urlencoding::encode(&v).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::Signing(format!("URL has no host: {url}")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Signing(format!("invalid header value: {e}")))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::Signing(format!("invalid signing key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
