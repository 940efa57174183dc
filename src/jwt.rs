//! JSON Web Token helpers: sign, verify and decode.
//!
//! Thin layer over `jsonwebtoken` that merges registered claims (`iat`,
//! `exp`, `nbf`, `iss`, `sub`, `aud`) from options into caller claims and
//! maps library failures onto [`JwtError`].

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from signing, verifying or decoding a token.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token has expired")]
    Expired,

    #[error("token is not valid yet")]
    NotYetValid,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token issuer does not match")]
    InvalidIssuer,

    #[error("token audience does not match")]
    InvalidAudience,

    #[error("token subject does not match")]
    InvalidSubject,

    #[error("token algorithm is not allowed")]
    InvalidAlgorithm,

    #[error("token is missing required claim: {0}")]
    MissingClaim(String),

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("claims must serialize to a JSON object")]
    ClaimsNotObject,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            JwtErrorKind::ExpiredSignature => JwtError::Expired,
            JwtErrorKind::ImmatureSignature => JwtError::NotYetValid,
            JwtErrorKind::InvalidSignature => JwtError::InvalidSignature,
            JwtErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
            JwtErrorKind::InvalidAudience => JwtError::InvalidAudience,
            JwtErrorKind::InvalidSubject => JwtError::InvalidSubject,
            JwtErrorKind::InvalidAlgorithm => JwtError::InvalidAlgorithm,
            JwtErrorKind::MissingRequiredClaim(c) => JwtError::MissingClaim(c.clone()),
            JwtErrorKind::InvalidEcdsaKey
            | JwtErrorKind::InvalidRsaKey(_)
            | JwtErrorKind::InvalidKeyFormat => JwtError::InvalidKey(err.to_string()),
            _ => JwtError::Malformed(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for JwtError {
    fn from(err: serde_json::Error) -> Self {
        JwtError::Encoding(err.to_string())
    }
}

/// Key material. HMAC algorithms take a shared secret; RSA and ECDSA
/// algorithms take PEM-encoded keys (private for signing, public for
/// verification).
#[derive(Debug, Clone)]
pub enum JwtKey {
    Secret(Vec<u8>),
    RsaPem(Vec<u8>),
    EcPem(Vec<u8>),
}

impl JwtKey {
    pub fn secret(secret: impl AsRef<[u8]>) -> Self {
        JwtKey::Secret(secret.as_ref().to_vec())
    }

    fn encoding_key(&self) -> Result<EncodingKey, JwtError> {
        Ok(match self {
            JwtKey::Secret(s) => EncodingKey::from_secret(s),
            JwtKey::RsaPem(pem) => EncodingKey::from_rsa_pem(pem)?,
            JwtKey::EcPem(pem) => EncodingKey::from_ec_pem(pem)?,
        })
    }

    fn decoding_key(&self) -> Result<DecodingKey, JwtError> {
        Ok(match self {
            JwtKey::Secret(s) => DecodingKey::from_secret(s),
            JwtKey::RsaPem(pem) => DecodingKey::from_rsa_pem(pem)?,
            JwtKey::EcPem(pem) => DecodingKey::from_ec_pem(pem)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SignOptions {
    pub algorithm: Algorithm,
    /// Sets `exp` relative to `iat`.
    pub expires_in: Option<Duration>,
    /// Sets `nbf` relative to `iat`.
    pub not_before: Option<Duration>,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub audience: Option<String>,
    pub key_id: Option<String>,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            expires_in: None,
            not_before: None,
            issuer: None,
            subject: None,
            audience: None,
            key_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Accepted algorithms; the token header must name one of them.
    pub algorithms: Vec<Algorithm>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub subject: Option<String>,
    /// Clock skew tolerance for `exp` and `nbf`.
    pub leeway: Duration,
    pub ignore_expiration: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::HS256],
            issuer: None,
            audience: None,
            subject: None,
            leeway: Duration::ZERO,
            ignore_expiration: false,
        }
    }
}

/// Header and claims of a token read without checking its signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedToken<T> {
    pub header: Header,
    pub claims: T,
}

/// Sign `claims` (which must serialize to a JSON object) into a compact JWT.
pub fn sign<T: Serialize>(
    claims: &T,
    key: &JwtKey,
    opts: &SignOptions,
) -> Result<String, JwtError> {
    let mut object = match serde_json::to_value(claims)? {
        Value::Object(map) => map,
        _ => return Err(JwtError::ClaimsNotObject),
    };
    apply_registered_claims(&mut object, opts)?;

    let mut header = Header::new(opts.algorithm);
    header.kid = opts.key_id.clone();

    let token = jsonwebtoken::encode(&header, &object, &key.encoding_key()?)?;
    debug!(alg = ?opts.algorithm, kid = ?opts.key_id, "signed token");
    Ok(token)
}

fn apply_registered_claims(
    object: &mut Map<String, Value>,
    opts: &SignOptions,
) -> Result<(), JwtError> {
    let iat = jsonwebtoken::get_current_timestamp();
    let offset = |claim: &str, d: Duration| {
        iat.checked_add(d.as_secs())
            .ok_or_else(|| JwtError::Encoding(format!("{claim} out of range")))
    };
    object.insert("iat".into(), Value::from(iat));
    if let Some(exp) = opts.expires_in {
        object.insert("exp".into(), Value::from(offset("exp", exp)?));
    }
    if let Some(nbf) = opts.not_before {
        object.insert("nbf".into(), Value::from(offset("nbf", nbf)?));
    }
    if let Some(iss) = &opts.issuer {
        object.insert("iss".into(), Value::from(iss.as_str()));
    }
    if let Some(sub) = &opts.subject {
        object.insert("sub".into(), Value::from(sub.as_str()));
    }
    if let Some(aud) = &opts.audience {
        object.insert("aud".into(), Value::from(aud.as_str()));
    }
    Ok(())
}

/// Check the signature and registered claims of `token`, returning its claims.
pub fn verify<T: DeserializeOwned>(
    token: &str,
    key: &JwtKey,
    opts: &VerifyOptions,
) -> Result<T, JwtError> {
    let mut validation = match opts.algorithms.first() {
        Some(alg) => Validation::new(*alg),
        None => return Err(JwtError::InvalidAlgorithm),
    };
    validation.algorithms = opts.algorithms.clone();
    validation.leeway = opts.leeway.as_secs();
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = !opts.ignore_expiration;
    validation.validate_nbf = true;
    match &opts.audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }
    if let Some(iss) = &opts.issuer {
        validation.set_issuer(&[iss]);
    }
    validation.sub = opts.subject.clone();

    let data = jsonwebtoken::decode::<T>(token, &key.decoding_key()?, &validation)?;
    Ok(data.claims)
}

/// Read header and claims without verifying the signature or any claim.
pub fn decode<T: DeserializeOwned>(token: &str) -> Result<DecodedToken<T>, JwtError> {
    let header = jsonwebtoken::decode_header(token)?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    let data = jsonwebtoken::decode::<T>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(DecodedToken {
        header: data.header,
        claims: data.claims,
    })
}
