//! Request authorization for the lookup endpoint.
//!
//! Two modes are supported: the legacy header-presence check, where any
//! non-empty `Authorization` value is accepted, and bearer token validation
//! against a configured issuer.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::{AuthConfig, BearerConfig, TokenKey};
use crate::{Error, Result};

/// JWT claims we read from a validated bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Expiration
    pub exp: i64,
    /// Issued at
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Caller identity established by an [`Authenticator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Header-presence mode carries no identity.
    Anonymous,
    /// Subject of a validated bearer token.
    Subject(String),
}

/// Validates bearer tokens against one issuer and key.
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    /// Build a validator from bearer settings.
    pub fn new(config: &BearerConfig) -> Result<Self> {
        let (key, algorithm) = match &config.key {
            TokenKey::Secret(secret) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
            TokenKey::RsaPem(pem) => (
                DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| Error::Config(format!("Invalid AUTH_TOKEN_PUBLIC_KEY: {}", e)))?,
                Algorithm::RS256,
            ),
        };

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[config.issuer.as_str()]);
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        Ok(Self { key, validation })
    }

    /// Validate a token (with or without the `Bearer` scheme) and return its claims.
    pub fn validate(&self, token: &str) -> Result<TokenClaims> {
        let token = bearer_token(token).unwrap_or(token).trim();

        decode::<TokenClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| Error::Auth(format!("Invalid token: {}", e)))
    }
}

/// Token part of a `Bearer <token>` credential; the scheme is case-insensitive.
fn bearer_token(credential: &str) -> Option<&str> {
    let (scheme, token) = credential.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Decides whether a request's `Authorization` header is acceptable.
#[derive(Clone)]
pub enum Authenticator {
    /// Accept any non-empty header value.
    HeaderPresence,
    /// Require a valid `Bearer` token.
    BearerToken(TokenValidator),
}

impl Authenticator {
    /// Build the authenticator selected by configuration.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        match config {
            AuthConfig::HeaderPresence => Ok(Self::HeaderPresence),
            AuthConfig::Bearer(bearer) => Ok(Self::BearerToken(TokenValidator::new(bearer)?)),
        }
    }

    /// Short name for logs.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::HeaderPresence => "header",
            Self::BearerToken(_) => "bearer",
        }
    }

    /// Authorize a request given its raw `Authorization` header value.
    pub fn authorize(&self, header: Option<&str>) -> Result<Principal> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Auth("Missing Authorization header".to_string()))?;

        match self {
            Self::HeaderPresence => Ok(Principal::Anonymous),
            Self::BearerToken(validator) => {
                let token = bearer_token(header)
                    .ok_or_else(|| Error::Auth("Expected a Bearer token".to_string()))?;
                let claims = validator.validate(token)?;
                Ok(Principal::Subject(claims.sub))
            }
        }
    }
}
