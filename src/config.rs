//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{ErrorCategory, ErrorKind, RecretError, Result};

pub const DEFAULT_DATABASE: &str = "recret.db";
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Validated settings for `recret serve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database: PathBuf,
    pub bind: SocketAddr,
    /// Public origin used to build share links, without a trailing slash.
    /// When absent, links are built from the request's `Host` header.
    pub base_url: Option<String>,
}

impl Config {
    pub fn new(database: PathBuf, bind: SocketAddr, base_url: Option<String>) -> Result<Self> {
        let base_url = base_url
            .filter(|url| !url.trim().is_empty())
            .map(|url| validate_base_url(&url))
            .transpose()?;

        Ok(Self {
            database,
            bind,
            base_url,
        })
    }
}

fn validate_base_url(url: &str) -> Result<String> {
    let url = url.trim().trim_end_matches('/');
    let host = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            RecretError::with_kind(
                ErrorCategory::User,
                ErrorKind::Config,
                format!("base URL must start with http:// or https://, got {:?}", url),
            )
        })?;

    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(RecretError::with_kind(
            ErrorCategory::User,
            ErrorKind::Config,
            format!("base URL has no valid host: {:?}", url),
        ));
    }

    Ok(url.to_string())
}
