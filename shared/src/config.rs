//! Configuration management for the container lookup Lambda.

use std::env;
use std::fmt;

use crate::{Error, Result};

/// Default Azure ACS host used for the app-only token exchange.
pub const DEFAULT_ACS_ENDPOINT: &str = "https://accounts.accesscontrol.windows.net";

/// How incoming requests are authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfig {
    /// Any non-empty `Authorization` header is accepted.
    HeaderPresence,
    /// `Authorization: Bearer <jwt>` validated against the settings below.
    Bearer(BearerConfig),
}

/// Settings for bearer token validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerConfig {
    /// Expected `iss` claim
    pub issuer: String,
    /// Expected `aud` claim, if any
    pub audience: Option<String>,
    /// Key used to verify token signatures
    pub key: TokenKey,
}

/// Verification key for bearer tokens.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenKey {
    /// HS256 shared secret
    Secret(String),
    /// RS256 public key in PEM format
    RsaPem(String),
}

impl fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKey::Secret(_) => f.write_str("Secret(<redacted>)"),
            TokenKey::RsaPem(_) => f.write_str("RsaPem(..)"),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// SharePoint site URL, without trailing slash
    pub site_url: String,
    /// App principal client id
    pub client_id: String,
    /// App principal client secret
    pub client_secret: String,
    /// ACS token endpoint host
    pub acs_endpoint: String,
    /// Request authorization mode
    pub auth: AuthConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("site_url", &self.site_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("acs_endpoint", &self.acs_endpoint)
            .field("auth", &self.auth)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| Error::Config(format!("{} not set", key)));

        let site_url = require("SP_SITE_URL")?.trim_end_matches('/').to_string();
        let client_id = require("SP_CLIENT_ID")?;
        let client_secret = require("SP_CLIENT_SECRET")?;
        let acs_endpoint = get("SP_ACS_ENDPOINT")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_ACS_ENDPOINT.to_string());

        let auth = match get("AUTH_MODE").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("header") => AuthConfig::HeaderPresence,
            Some("bearer") => {
                let key = match (get("AUTH_TOKEN_SECRET"), get("AUTH_TOKEN_PUBLIC_KEY")) {
                    (Some(secret), None) => TokenKey::Secret(secret),
                    (None, Some(pem)) => TokenKey::RsaPem(pem),
                    (Some(_), Some(_)) => {
                        return Err(Error::Config(
                            "AUTH_TOKEN_SECRET and AUTH_TOKEN_PUBLIC_KEY are mutually exclusive"
                                .to_string(),
                        ))
                    }
                    (None, None) => {
                        return Err(Error::Config(
                            "AUTH_TOKEN_SECRET or AUTH_TOKEN_PUBLIC_KEY required for bearer auth"
                                .to_string(),
                        ))
                    }
                };
                AuthConfig::Bearer(BearerConfig {
                    issuer: require("AUTH_TOKEN_ISSUER")?,
                    audience: get("AUTH_TOKEN_AUDIENCE"),
                    key,
                })
            }
            Some(other) => {
                return Err(Error::Config(format!("Unknown AUTH_MODE: {}", other)));
            }
        };

        Ok(Self {
            site_url,
            client_id,
            client_secret,
            acs_endpoint,
            auth,
        })
    }
}
