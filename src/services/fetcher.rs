// src/services/fetcher.rs

//! Bulletin fetcher.
//!
//! Transient failures are retried with exponential backoff. An auth
//! rejection gets exactly one session refresh and one more try.

use std::sync::Arc;

use reqwest::header::HeaderMap;

use crate::error::{AppError, Result};
use crate::models::{CredentialBundle, FetchConfig, PortInfo, PortalConfig};
use crate::services::parser::extract_issued_label;
use crate::services::session::SessionManager;
use crate::storage::content_digest;
use crate::utils::{HttpReply, Transport};

/// Statuses worth another attempt with the same credentials.
const RETRYABLE_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];

/// Statuses meaning the portal rejected the session.
const AUTH_STATUS_CODES: &[u16] = &[401, 403];

/// Raw bulletin text and the label used for dedup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBulletin {
    pub content: String,
    pub issued_label: String,
}

impl FetchedBulletin {
    /// Label from the `ISSUED` line, or a content digest when there is none.
    pub fn from_content(content: String) -> Self {
        let issued_label = extract_issued_label(&content)
            .unwrap_or_else(|| format!("sha256:{}", content_digest(&content)));
        Self {
            content,
            issued_label,
        }
    }
}

/// Retrieves per-port bulletins over the authenticated transport.
pub struct BulletinFetcher {
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
    portal: PortalConfig,
    config: FetchConfig,
}

impl BulletinFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<SessionManager>,
        portal: PortalConfig,
        config: FetchConfig,
    ) -> Self {
        Self {
            transport,
            session,
            portal,
            config,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Fetch the current bulletin for `port` using `bundle`.
    pub async fn fetch(&self, port: &PortInfo, bundle: &CredentialBundle) -> Result<FetchedBulletin> {
        let url = self.portal.bulletin_url_for(&port.station_id);
        let mut bundle = bundle.clone();
        let mut refreshed = false;

        loop {
            let headers = self.session.headers(&bundle)?;
            let reply = self.get_with_retry(&url, &headers).await?;

            if reply.is_success() {
                log::debug!("Fetched {} ({} bytes)", port.code, reply.body.len());
                return Ok(FetchedBulletin::from_content(reply.body));
            }

            if AUTH_STATUS_CODES.contains(&reply.status) {
                if refreshed {
                    log::warn!(
                        "{} rejected the refreshed session (HTTP {})",
                        port.code,
                        reply.status
                    );
                    return Err(AppError::SessionExpired {
                        port: port.code.clone(),
                        status: reply.status,
                    });
                }
                log::info!(
                    "{} returned HTTP {}, refreshing session",
                    port.code,
                    reply.status
                );
                bundle = self.session.refresh(&bundle).await?;
                refreshed = true;
                continue;
            }

            return Err(AppError::UnexpectedStatus {
                url,
                status: reply.status,
            });
        }
    }

    /// GET with retries for transport errors and retryable statuses.
    ///
    /// Any other status, success or not, is returned to the caller.
    async fn get_with_retry(&self, url: &str, headers: &HeaderMap) -> Result<HttpReply> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let failure = match self.transport.get(url, headers).await {
                Ok(reply) if !RETRYABLE_STATUS_CODES.contains(&reply.status) => return Ok(reply),
                Ok(reply) => format!("HTTP {}", reply.status),
                Err(e) => e.to_string(),
            };

            if attempt >= max_attempts {
                return Err(AppError::network(url, attempt, failure));
            }

            let backoff = self.config.backoff(attempt);
            log::warn!(
                "Transient failure for {} ({}), retry {}/{} in {}ms",
                url,
                failure,
                attempt,
                max_attempts - 1,
                backoff.as_millis()
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionConfig;
    use crate::test_support::{CountingLogin, SAMPLE_BULLETIN, ScriptedTransport, bundle_aged};
    use chrono::Utc;
    use tempfile::TempDir;

    const PROBE: &str = "/api/user/profile";
    const BULLETIN: &str = "/api/bulletin/46744";

    fn port() -> PortInfo {
        PortInfo {
            code: "TWKHH".to_string(),
            station_id: "46744".to_string(),
            name: "Kaohsiung".to_string(),
            country: "TW".to_string(),
            latitude: None,
            longitude: None,
        }
    }

    fn fetcher(
        tmp: &TempDir,
        login: Arc<CountingLogin>,
        transport: Arc<ScriptedTransport>,
    ) -> BulletinFetcher {
        let portal = PortalConfig {
            username: "captain".to_string(),
            password: "secret".to_string(),
            ..PortalConfig::default()
        };
        let session = SessionConfig {
            cache_path: tmp.path().join("session.json"),
            ..SessionConfig::default()
        };
        let manager = Arc::new(SessionManager::new(
            session,
            portal.clone(),
            login,
            transport.clone(),
        ));
        let config = FetchConfig {
            backoff_base_ms: 1,
            ..FetchConfig::default()
        };
        BulletinFetcher::new(transport, manager, portal, config)
    }

    #[tokio::test]
    async fn test_fetch_extracts_issued_label() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new().reply(BULLETIN, 200, SAMPLE_BULLETIN));
        let fetcher = fetcher(&tmp, Arc::new(CountingLogin::new()), transport);

        let fetched = fetcher.fetch(&port(), &bundle_aged(Utc::now(), 0)).await.unwrap();
        assert_eq!(fetched.issued_label, "2024/12/31 06:00 UTC");
        assert_eq!(fetched.content, SAMPLE_BULLETIN);
    }

    #[tokio::test]
    async fn test_missing_issued_line_uses_digest() {
        let fetched = FetchedBulletin::from_content("no header here".to_string());
        assert_eq!(
            fetched.issued_label,
            format!("sha256:{}", content_digest("no header here"))
        );
    }

    #[tokio::test]
    async fn test_two_auth_failures_login_once_then_expire() {
        let tmp = TempDir::new().unwrap();
        let login = Arc::new(CountingLogin::new());
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(BULLETIN, 401, "")
                .reply(BULLETIN, 401, "")
                .always(PROBE, 200, "{}"),
        );
        let fetcher = fetcher(&tmp, login.clone(), transport.clone());

        let err = fetcher
            .fetch(&port(), &bundle_aged(Utc::now(), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionExpired { status: 401, .. }));
        assert_eq!(login.calls(), 1);
        assert_eq!(transport.count(BULLETIN), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_recovers_with_refreshed_bundle() {
        let tmp = TempDir::new().unwrap();
        let login = Arc::new(CountingLogin::new());
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(BULLETIN, 403, "")
                .reply(BULLETIN, 200, SAMPLE_BULLETIN)
                .always(PROBE, 200, "{}"),
        );
        let fetcher = fetcher(&tmp, login.clone(), transport.clone());

        fetcher.fetch(&port(), &bundle_aged(Utc::now(), 0)).await.unwrap();
        assert_eq!(login.calls(), 1);

        let retried = transport
            .requests()
            .into_iter()
            .filter(|r| r.url.contains(BULLETIN))
            .last()
            .unwrap();
        assert_eq!(retried.headers.get("cookie").unwrap(), "SESSION=s1");
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(BULLETIN, 503, "")
                .fail(BULLETIN, "connection reset")
                .reply(BULLETIN, 200, SAMPLE_BULLETIN),
        );
        let fetcher = fetcher(&tmp, Arc::new(CountingLogin::new()), transport.clone());

        assert!(fetcher.fetch(&port(), &bundle_aged(Utc::now(), 0)).await.is_ok());
        assert_eq!(transport.count(BULLETIN), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_network_error() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new().always(BULLETIN, 502, ""));
        let fetcher = fetcher(&tmp, Arc::new(CountingLogin::new()), transport.clone());

        let err = fetcher
            .fetch(&port(), &bundle_aged(Utc::now(), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Network { attempts: 3, .. }));
        assert_eq!(transport.count(BULLETIN), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new().always(BULLETIN, 404, ""));
        let fetcher = fetcher(&tmp, Arc::new(CountingLogin::new()), transport.clone());

        let err = fetcher
            .fetch(&port(), &bundle_aged(Utc::now(), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnexpectedStatus { status: 404, .. }));
        assert_eq!(transport.count(BULLETIN), 1);
    }
}
