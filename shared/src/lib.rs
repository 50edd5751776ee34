//! Shared library for the container lookup Lambda.
//!
//! This crate provides configuration, request authorization, CAML filter
//! construction and the SharePoint REST client used by the handler.

pub mod auth;
pub mod caml;
pub mod config;
pub mod error;
pub mod http;
pub mod sharepoint;

pub use auth::{Authenticator, Principal, TokenClaims, TokenValidator};
pub use caml::Filter;
pub use config::{AuthConfig, BearerConfig, Config, TokenKey};
pub use error::{Error, Result};
pub use sharepoint::{ListHandle, Record, Session, SharePointClient};
