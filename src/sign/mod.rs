//! Presigned WebSocket URL Signer
//!
//! Computes a SigV4-presigned `wss://` URL for brokers that authenticate by
//! request signature instead of a shared secret on the wire. The pipeline is
//! fixed: ordered query parameters, canonical request, string-to-sign, a
//! four-stage HMAC key derivation, and a hex signature. Identical inputs,
//! including the timestamp, always produce an identical signature.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNING_ALGORITHM: &str = "AWS4-HMAC-SHA256";

const REQUEST_PATH: &str = "/mqtt";
const SIGNED_HEADERS: &str = "host";
const SECRET_KEY_PREFIX: &str = "AWS4";
const REQUEST_TYPE: &str = "aws4_request";
const LONG_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

// SHA-256 of the empty request body
const EMPTY_BODY_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Signing credentials, supplied externally and used only transiently
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Read credentials from the standard AWS environment variables.
    pub fn from_env() -> Result<Self, SignError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| SignError::MissingCredentials("AWS_ACCESS_KEY_ID"))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| SignError::MissingCredentials("AWS_SECRET_ACCESS_KEY"))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Errors around signing. The signing math itself cannot fail; only
/// credential retrieval and URL assembly can.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("no credentials available: {0} is not set")]
    MissingCredentials(&'static str),

    #[error("assembled presigned url is invalid: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// The computed pieces of a presigned URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrlComponents {
    pub algorithm: String,
    /// `<access-key-id>/<date>/<region>/<service>/aws4_request`
    pub credential: String,
    /// Long-form UTC timestamp, `YYYYMMDDThhmmssZ`
    pub date: String,
    pub signed_headers: String,
    /// 64 lowercase hex characters
    pub signature: String,
    pub security_token: Option<String>,
}

/// A presigned broker URL and the components it was assembled from
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    pub components: SignedUrlComponents,
    pub url: Url,
}

/// Compute the presigned `wss://<host>/mqtt` URL for `host`.
///
/// The query parameter order is load-bearing: `Algorithm`, `Credential`,
/// `Date`, `SignedHeaders`, exactly as they appear in the canonical request.
pub fn presign_websocket_url(
    credentials: &Credentials,
    region: &str,
    service: &str,
    host: &str,
    now: DateTime<Utc>,
) -> Result<PresignedUrl, SignError> {
    let date_long = now.format(LONG_DATE_FORMAT).to_string();
    let date_short = &date_long[..8];
    let scope = format!("{date_short}/{region}/{service}/{REQUEST_TYPE}");
    let credential = format!("{}/{}", credentials.access_key_id, scope);

    let params = [
        ("X-Amz-Algorithm", SIGNING_ALGORITHM.to_string()),
        ("X-Amz-Credential", credential.clone()),
        ("X-Amz-Date", date_long.clone()),
        ("X-Amz-SignedHeaders", SIGNED_HEADERS.to_string()),
    ];
    let query = encode_query_params(&params);

    let signing_key = derive_signing_key(
        &credentials.secret_access_key,
        date_short,
        region,
        service,
    );
    let to_sign = string_to_sign(&query, host, &date_long, &scope);
    let signature = hex::encode(hmac_sha256(&signing_key, to_sign.as_bytes()));

    let mut url_str = format!("wss://{host}{REQUEST_PATH}?{query}&X-Amz-Signature={signature}");
    if let Some(token) = credentials.session_token.as_deref().filter(|t| !t.is_empty()) {
        url_str.push_str("&X-Amz-Security-Token=");
        url_str.push_str(&query_escape(token));
    }
    let url = Url::parse(&url_str)?;

    Ok(PresignedUrl {
        components: SignedUrlComponents {
            algorithm: SIGNING_ALGORITHM.to_string(),
            credential,
            date: date_long,
            signed_headers: SIGNED_HEADERS.to_string(),
            signature,
            security_token: credentials.session_token.clone(),
        },
        url,
    })
}

/// Join query parameters with `&`, preserving list order.
fn encode_query_params(params: &[(&str, String)]) -> String {
    let mut query = String::new();
    for (i, (name, value)) in params.iter().enumerate() {
        if i != 0 {
            query.push('&');
        }
        query.push_str(name);
        query.push('=');
        query.push_str(&query_escape(value));
    }
    query
}

/// Escape a query value the way Go's `url.QueryEscape` does (space as `+`).
fn query_escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// The canonical request followed by the string-to-sign.
fn string_to_sign(query: &str, host: &str, date_long: &str, scope: &str) -> String {
    let host_header = format!("host:{host}");
    let canonical_request = [
        "GET",
        REQUEST_PATH,
        query,
        host_header.as_str(),
        "", // header block terminator
        SIGNED_HEADERS,
        EMPTY_BODY_SHA256,
    ]
    .join("\n");

    [
        SIGNING_ALGORITHM,
        date_long,
        scope,
        &sha256_hex(canonical_request.as_bytes()),
    ]
    .join("\n")
}

/// Four chained HMAC stages turn the secret key into the signing key.
fn derive_signing_key(secret_key: &str, date_short: &str, region: &str, service: &str) -> Vec<u8> {
    let seed = format!("{SECRET_KEY_PREFIX}{secret_key}");
    let key = hmac_sha256(seed.as_bytes(), date_short.as_bytes());
    let key = hmac_sha256(&key, region.as_bytes());
    let key = hmac_sha256(&key, service.as_bytes());
    hmac_sha256(&key, REQUEST_TYPE.as_bytes())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
