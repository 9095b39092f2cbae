//! Scripted collaborators shared by the unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error::{AppError, Result};
use crate::models::CredentialBundle;
use crate::services::{LoginProvider, LoginResult};
use crate::utils::{HttpReply, Transport};

pub const SAMPLE_BULLETIN: &str = include_str!("../data/sample_bulletin.txt");

enum Step {
    Reply(HttpReply),
    Fail(String),
}

struct Route {
    needle: String,
    queue: VecDeque<Step>,
    fallback: Option<HttpReply>,
}

/// A request seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub url: String,
    pub headers: HeaderMap,
}

/// Transport that answers from per-URL queues of canned replies.
///
/// A route matches when the request URL contains its needle. Queued steps
/// are consumed first, then the route's fallback; unscripted requests get 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, needle: &str, step: Option<Step>, fallback: Option<HttpReply>) -> Self {
        {
            let mut routes = self.routes.lock().unwrap();
            let index = match routes.iter().position(|r| r.needle == needle) {
                Some(i) => i,
                None => {
                    routes.push(Route {
                        needle: needle.to_string(),
                        queue: VecDeque::new(),
                        fallback: None,
                    });
                    routes.len() - 1
                }
            };
            let route = &mut routes[index];
            if let Some(step) = step {
                route.queue.push_back(step);
            }
            if fallback.is_some() {
                route.fallback = fallback;
            }
        }
        self
    }

    /// Queue one reply for URLs containing `needle`.
    pub fn reply(self, needle: &str, status: u16, body: &str) -> Self {
        self.push(needle, Some(Step::Reply(HttpReply::new(status, body))), None)
    }

    /// Queue one transport failure (no response) for URLs containing `needle`.
    pub fn fail(self, needle: &str, message: &str) -> Self {
        self.push(needle, Some(Step::Fail(message.to_string())), None)
    }

    /// Reply used once the queue for `needle` is drained.
    pub fn always(self, needle: &str, status: u16, body: &str) -> Self {
        self.push(needle, None, Some(HttpReply::new(status, body)))
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Number of requests whose URL contains `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(needle))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpReply> {
        self.seen.lock().unwrap().push(SeenRequest {
            url: url.to_string(),
            headers: headers.clone(),
        });

        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes.iter_mut().find(|r| url.contains(&r.needle)) else {
            return Ok(HttpReply::new(404, "unscripted"));
        };
        match route.queue.pop_front() {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Fail(message)) => Err(AppError::network(url, 1, message)),
            None => Ok(route
                .fallback
                .clone()
                .unwrap_or_else(|| HttpReply::new(404, "unscripted"))),
        }
    }
}

/// Login provider that counts calls and mints a distinct bundle per call.
#[derive(Default)]
pub struct CountingLogin {
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingLogin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` calls with an authentication error.
    pub fn failing_first(n: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    /// Sleep before answering, to exercise the login timeout.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoginProvider for CountingLogin {
    async fn login(&self, _username: &str, _password: &str) -> Result<LoginResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::authentication("scripted login failure"));
        }

        let mut cookies = BTreeMap::new();
        cookies.insert("SESSION".to_string(), format!("s{}", n));
        Ok(LoginResult {
            cookies,
            token: Some(format!("token-{}", n)),
        })
    }
}

/// A bundle acquired `hours_ago` hours before `now`.
pub fn bundle_aged(now: chrono::DateTime<chrono::Utc>, hours_ago: i64) -> CredentialBundle {
    let mut cookies = BTreeMap::new();
    cookies.insert("SESSION".to_string(), "cached".to_string());
    CredentialBundle::new(
        cookies,
        Some("cached-token".to_string()),
        now - chrono::Duration::hours(hours_ago),
    )
}
