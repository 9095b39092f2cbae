// src/models/credential.rs

//! Authenticated session credentials.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Cookie set plus optional bearer token obtained from an interactive login.
///
/// A bundle is stale once its age exceeds the configured TTL, independent of
/// whether the portal would still accept it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
    /// Cookie name to value
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    /// Bearer-style token, if the portal issued one
    #[serde(default)]
    pub token: Option<String>,

    /// When the bundle was obtained
    pub acquired_at: DateTime<Utc>,
}

impl CredentialBundle {
    pub fn new(
        cookies: BTreeMap<String, String>,
        token: Option<String>,
        acquired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cookies,
            token,
            acquired_at,
        }
    }

    /// Age of the bundle relative to `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.acquired_at
    }

    /// Returns `true` when the bundle is strictly older than `ttl`.
    pub fn is_stale_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age_at(now) > ttl
    }

    /// `Cookie` header value: `name=value` pairs joined by `"; "`.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
