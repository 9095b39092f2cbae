// src/services/session.rs

//! Session manager.
//!
//! Owns the credential bundle lifecycle: load from the cache, probe the
//! portal, drive the interactive login and persist the result. All
//! re-authentication happens under one async lock so concurrent fetch
//! failures never trigger duplicate logins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{CredentialBundle, PortalConfig, SessionConfig};
use crate::services::login::LoginProvider;
use crate::storage::CredentialCache;
use crate::utils::Transport;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Uninitialized,
    CachedValid,
    CachedStaleOrInvalid,
    Authenticated,
}

#[derive(Default)]
struct Inner {
    bundle: Option<CredentialBundle>,
    state: SessionState,
}

/// Maintains one authenticated credential bundle per process.
pub struct SessionManager {
    config: SessionConfig,
    portal: PortalConfig,
    login: Arc<dyn LoginProvider>,
    transport: Arc<dyn Transport>,
    cache: CredentialCache,
    inner: Mutex<Inner>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        portal: PortalConfig,
        login: Arc<dyn LoginProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let cache = CredentialCache::new(config.cache_path.clone());
        Self {
            config,
            portal,
            login,
            transport,
            cache,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Bundle currently held in memory, if any.
    pub async fn current(&self) -> Option<CredentialBundle> {
        self.inner.lock().await.bundle.clone()
    }

    /// Read the persisted bundle. Missing or corrupt caches yield `None`.
    pub async fn load_cached(&self) -> Option<CredentialBundle> {
        self.cache.load().await
    }

    /// Probe a protected endpoint with `bundle`.
    ///
    /// Only HTTP 200 with a JSON body counts as live.
    pub async fn verify(&self, bundle: &CredentialBundle) -> bool {
        let headers = match self.headers(bundle) {
            Ok(headers) => headers,
            Err(e) => {
                log::warn!("Cannot build probe headers: {}", e);
                return false;
            }
        };

        match self.transport.get(&self.portal.probe_url, &headers).await {
            Ok(reply) if reply.status == 200 => {
                let live = serde_json::from_str::<serde_json::Value>(&reply.body).is_ok();
                if !live {
                    log::debug!("Session probe returned a non-JSON body");
                }
                live
            }
            Ok(reply) => {
                log::debug!("Session probe rejected with HTTP {}", reply.status);
                false
            }
            Err(e) => {
                log::warn!("Session probe failed: {}", e);
                false
            }
        }
    }

    /// Run the interactive login, verify and persist the new bundle.
    pub async fn authenticate(&self) -> Result<CredentialBundle> {
        let mut inner = self.inner.lock().await;
        self.authenticate_locked(&mut inner).await
    }

    /// Return a live bundle, re-authenticating when needed.
    pub async fn ensure_valid(&self) -> Result<CredentialBundle> {
        self.ensure_valid_at(Utc::now()).await
    }

    /// [`ensure_valid`](Self::ensure_valid) against an explicit clock.
    ///
    /// A stale bundle goes straight to login without being probed.
    pub async fn ensure_valid_at(&self, now: DateTime<Utc>) -> Result<CredentialBundle> {
        let mut inner = self.inner.lock().await;

        let candidate = match inner.bundle.clone() {
            Some(bundle) => Some(bundle),
            None => self.load_cached().await,
        };

        match candidate {
            Some(bundle) if bundle.is_stale_at(self.config.ttl(), now) => {
                log::info!(
                    "Cached session is {}h old, re-authenticating",
                    bundle.age_at(now).num_hours()
                );
                inner.state = SessionState::CachedStaleOrInvalid;
            }
            Some(bundle) => {
                if self.verify(&bundle).await {
                    log::info!("Cached session is valid");
                    inner.bundle = Some(bundle.clone());
                    inner.state = SessionState::CachedValid;
                    return Ok(bundle);
                }
                log::info!("Cached session failed verification, re-authenticating");
                inner.state = SessionState::CachedStaleOrInvalid;
            }
            None => {
                log::info!("No cached session, authenticating");
                inner.state = SessionState::CachedStaleOrInvalid;
            }
        }

        self.authenticate_locked(&mut inner).await
    }

    /// Replace a bundle the portal just rejected.
    ///
    /// When another caller already swapped `failed` out, the newer bundle is
    /// returned without logging in again.
    pub async fn refresh(&self, failed: &CredentialBundle) -> Result<CredentialBundle> {
        let mut inner = self.inner.lock().await;
        if let Some(current) = inner.bundle.as_ref() {
            if current != failed {
                log::debug!("Session already refreshed by another caller");
                return Ok(current.clone());
            }
        }
        inner.state = SessionState::CachedStaleOrInvalid;
        self.authenticate_locked(&mut inner).await
    }

    /// Outgoing headers for `bundle`. Pure; no I/O.
    pub fn headers(&self, bundle: &CredentialBundle) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if !bundle.cookies.is_empty() {
            let mut value = HeaderValue::from_str(&bundle.cookie_header())
                .map_err(|e| AppError::authentication(format!("invalid cookie value: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        if let Some(token) = &bundle.token {
            let name = HeaderName::from_bytes(self.config.token_header.as_bytes()).map_err(|e| {
                AppError::config(format!(
                    "invalid token header {:?}: {}",
                    self.config.token_header, e
                ))
            })?;
            let mut value = HeaderValue::from_str(&format!("{}{}", self.config.token_prefix, token))
                .map_err(|e| AppError::authentication(format!("invalid token value: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        Ok(headers)
    }

    async fn authenticate_locked(&self, inner: &mut Inner) -> Result<CredentialBundle> {
        let (username, password) = self.portal.credentials().map_err(AppError::authentication)?;
        let attempts = self.config.login_attempts.max(1);
        let timeout = self.config.login_timeout();
        let mut last_error = None;

        for attempt in 1..=attempts {
            log::info!("Interactive login attempt {}/{}", attempt, attempts);

            let result = match tokio::time::timeout(timeout, self.login.login(&username, &password))
                .await
            {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    log::warn!("Login attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                    continue;
                }
                Err(_) => {
                    log::warn!(
                        "Login attempt {} timed out after {}s",
                        attempt,
                        timeout.as_secs()
                    );
                    last_error = Some(AppError::authentication(format!(
                        "login timed out after {}s",
                        timeout.as_secs()
                    )));
                    continue;
                }
            };

            let bundle = CredentialBundle::new(result.cookies, result.token, Utc::now());
            if !self.verify(&bundle).await {
                log::warn!("Login attempt {} produced a session the portal rejected", attempt);
                last_error = Some(AppError::authentication(
                    "new session failed verification",
                ));
                continue;
            }

            if let Err(e) = self.cache.store(&bundle).await {
                log::warn!(
                    "Failed to persist session to {}: {}",
                    self.cache.path().display(),
                    e
                );
            }

            log::info!(
                "Authenticated ({} cookies, token: {})",
                bundle.cookies.len(),
                if bundle.token.is_some() { "yes" } else { "no" }
            );
            inner.bundle = Some(bundle.clone());
            inner.state = SessionState::Authenticated;
            return Ok(bundle);
        }

        inner.state = SessionState::CachedStaleOrInvalid;
        Err(match last_error {
            Some(AppError::Authentication(message)) => AppError::Authentication(message),
            Some(other) => AppError::authentication(other),
            None => AppError::authentication("no login attempts were made"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingLogin, ScriptedTransport, bundle_aged};
    use std::time::Duration;
    use tempfile::TempDir;

    const PROBE: &str = "/api/user/profile";

    fn portal() -> PortalConfig {
        PortalConfig {
            username: "captain".to_string(),
            password: "secret".to_string(),
            ..PortalConfig::default()
        }
    }

    fn session_config(tmp: &TempDir) -> SessionConfig {
        SessionConfig {
            cache_path: tmp.path().join("session.json"),
            ..SessionConfig::default()
        }
    }

    fn manager(
        tmp: &TempDir,
        login: Arc<CountingLogin>,
        transport: Arc<ScriptedTransport>,
    ) -> SessionManager {
        SessionManager::new(session_config(tmp), portal(), login, transport)
    }

    #[tokio::test]
    async fn test_stale_bundle_skips_verify() {
        let tmp = TempDir::new().unwrap();
        let now = Utc::now();
        CredentialCache::new(tmp.path().join("session.json"))
            .store(&bundle_aged(now, 25))
            .await
            .unwrap();

        let login = Arc::new(CountingLogin::new());
        let transport = Arc::new(ScriptedTransport::new().always(PROBE, 200, "{}"));
        let session = manager(&tmp, login.clone(), transport.clone());

        let bundle = session.ensure_valid_at(now).await.unwrap();
        assert_eq!(login.calls(), 1);
        assert_eq!(bundle.token.as_deref(), Some("token-1"));
        assert_eq!(session.state().await, SessionState::Authenticated);

        // The only probe is the post-login check; the stale bundle was never sent.
        let probes = transport.requests();
        assert_eq!(probes.len(), 1);
        let cookie = probes[0].headers.get(COOKIE).unwrap().to_str().unwrap();
        assert_eq!(cookie, "SESSION=s1");
    }

    #[tokio::test]
    async fn test_fresh_valid_bundle_is_reused() {
        let tmp = TempDir::new().unwrap();
        let now = Utc::now();
        let cached = bundle_aged(now, 2);
        CredentialCache::new(tmp.path().join("session.json"))
            .store(&cached)
            .await
            .unwrap();

        let login = Arc::new(CountingLogin::new());
        let transport = Arc::new(ScriptedTransport::new().always(PROBE, 200, r#"{"user":"x"}"#));
        let session = manager(&tmp, login.clone(), transport);

        assert_eq!(session.ensure_valid_at(now).await.unwrap(), cached);
        assert_eq!(login.calls(), 0);
        assert_eq!(session.state().await, SessionState::CachedValid);
    }

    #[tokio::test]
    async fn test_cached_bundle_works_without_login_command() {
        let tmp = TempDir::new().unwrap();
        let now = Utc::now();
        let cached = bundle_aged(now, 2);
        CredentialCache::new(tmp.path().join("session.json"))
            .store(&cached)
            .await
            .unwrap();

        let config = session_config(&tmp);
        let login = Arc::new(crate::services::CommandLogin::from_config(&config));
        let transport = Arc::new(ScriptedTransport::new().always(PROBE, 200, "{}"));
        let session = SessionManager::new(config, portal(), login, transport);

        assert_eq!(session.ensure_valid_at(now).await.unwrap(), cached);
    }

    #[tokio::test]
    async fn test_rejected_bundle_triggers_login_and_persists() {
        let tmp = TempDir::new().unwrap();
        let now = Utc::now();
        CredentialCache::new(tmp.path().join("session.json"))
            .store(&bundle_aged(now, 1))
            .await
            .unwrap();

        let login = Arc::new(CountingLogin::new());
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(PROBE, 401, "")
                .always(PROBE, 200, "{}"),
        );
        let session = manager(&tmp, login.clone(), transport);

        let bundle = session.ensure_valid_at(now).await.unwrap();
        assert_eq!(login.calls(), 1);
        assert_eq!(session.load_cached().await, Some(bundle));
    }

    #[tokio::test]
    async fn test_corrupt_cache_authenticates() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("session.json"), "garbage").unwrap();

        let login = Arc::new(CountingLogin::new());
        let transport = Arc::new(ScriptedTransport::new().always(PROBE, 200, "{}"));
        let session = manager(&tmp, login.clone(), transport);

        assert!(session.load_cached().await.is_none());
        session.ensure_valid().await.unwrap();
        assert_eq!(login.calls(), 1);
    }

    #[tokio::test]
    async fn test_verify_requires_json_body() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(PROBE, 200, "<html>login</html>")
                .reply(PROBE, 200, "{}"),
        );
        let session = manager(&tmp, Arc::new(CountingLogin::new()), transport);
        let bundle = bundle_aged(Utc::now(), 0);

        assert!(!session.verify(&bundle).await);
        assert!(session.verify(&bundle).await);
    }

    #[tokio::test]
    async fn test_failed_post_login_verify_is_authentication_error() {
        let tmp = TempDir::new().unwrap();
        let login = Arc::new(CountingLogin::new());
        let transport = Arc::new(ScriptedTransport::new().always(PROBE, 403, ""));
        let session = manager(&tmp, login.clone(), transport);

        let err = session.authenticate().await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(ref m) if m.contains("verification")));
        assert_eq!(login.calls(), SessionConfig::default().login_attempts as usize);
        assert!(session.load_cached().await.is_none());
    }

    #[tokio::test]
    async fn test_login_failure_is_retried() {
        let tmp = TempDir::new().unwrap();
        let login = Arc::new(CountingLogin::failing_first(1));
        let transport = Arc::new(ScriptedTransport::new().always(PROBE, 200, "{}"));
        let session = manager(&tmp, login.clone(), transport);

        let bundle = session.authenticate().await.unwrap();
        assert_eq!(login.calls(), 2);
        assert_eq!(bundle.token.as_deref(), Some("token-2"));
    }

    #[tokio::test]
    async fn test_login_timeout_is_authentication_error() {
        let tmp = TempDir::new().unwrap();
        let config = SessionConfig {
            login_timeout_secs: 1,
            login_attempts: 1,
            ..session_config(&tmp)
        };
        let login = Arc::new(CountingLogin::slow(Duration::from_secs(5)));
        let transport = Arc::new(ScriptedTransport::new().always(PROBE, 200, "{}"));
        let session = SessionManager::new(config, portal(), login, transport);

        let err = session.authenticate().await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn test_refresh_skips_login_when_bundle_already_replaced() {
        let tmp = TempDir::new().unwrap();
        let login = Arc::new(CountingLogin::new());
        let transport = Arc::new(ScriptedTransport::new().always(PROBE, 200, "{}"));
        let session = manager(&tmp, login.clone(), transport);

        let first = session.authenticate().await.unwrap();
        let second = session.refresh(&first).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(login.calls(), 2);

        // A late caller still holding `first` gets `second` back.
        let again = session.refresh(&first).await.unwrap();
        assert_eq!(again, second);
        assert_eq!(login.calls(), 2);
    }

    #[tokio::test]
    async fn test_headers_are_pure() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let session = manager(&tmp, Arc::new(CountingLogin::new()), transport.clone());

        let bundle = bundle_aged(Utc::now(), 0);
        let headers = session.headers(&bundle).unwrap();
        assert_eq!(headers.get(COOKIE).unwrap(), "SESSION=cached");
        assert_eq!(headers.get("x-auth-token").unwrap(), "Bearer cached-token");
        assert!(headers.get(COOKIE).unwrap().is_sensitive());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_authentication() {
        let tmp = TempDir::new().unwrap();
        // Only meaningful when the fallback variable is not set in the test env.
        if std::env::var(crate::models::USERNAME_ENV).is_ok() {
            return;
        }
        let portal = PortalConfig {
            username: String::new(),
            ..portal()
        };
        let login = Arc::new(CountingLogin::new());
        let session = SessionManager::new(
            session_config(&tmp),
            portal,
            login.clone(),
            Arc::new(ScriptedTransport::new()),
        );

        assert!(matches!(
            session.authenticate().await,
            Err(AppError::Authentication(_))
        ));
        assert_eq!(login.calls(), 0);
    }
}
