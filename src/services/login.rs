// src/services/login.rs

//! Interactive login collaborator.
//!
//! The portal's login is browser-driven, so this crate only defines the
//! contract and ships an adapter that delegates to an external helper
//! program. The helper receives credentials through the environment and
//! prints `{"cookies": {...}, "token": "..."}` on stdout.

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{PASSWORD_ENV, SessionConfig, USERNAME_ENV};

/// Cookies and token produced by a successful login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResult {
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl LoginResult {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.token.is_none()
    }
}

/// Black-box interactive login. Must be safe to call again after a failure.
#[async_trait]
pub trait LoginProvider: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult>;
}

/// Runs an external login helper and parses its JSON output.
#[derive(Debug, Clone)]
pub struct CommandLogin {
    program: String,
    args: Vec<String>,
}

impl CommandLogin {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from `session.login_command`.
    ///
    /// An empty command is accepted here so a valid cached session can still
    /// be used; it only fails once a login is actually attempted.
    pub fn from_config(session: &SessionConfig) -> Self {
        match session.login_command.split_first() {
            Some((program, args)) => Self::new(program.clone(), args.to_vec()),
            None => Self::new("", Vec::new()),
        }
    }
}

#[async_trait]
impl LoginProvider for CommandLogin {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult> {
        if self.program.is_empty() {
            return Err(AppError::authentication(
                "session.login_command is empty, cannot log in",
            ));
        }
        log::info!("Running login helper {}", self.program);

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .env(USERNAME_ENV, username)
            .env(PASSWORD_ENV, password)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AppError::authentication(format!("failed to start {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::authentication(format!(
                "login helper exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let result: LoginResult = serde_json::from_slice(&output.stdout).map_err(|e| {
            AppError::authentication(format!("login helper printed invalid JSON: {}", e))
        })?;

        if result.is_empty() {
            return Err(AppError::authentication(
                "login helper returned neither cookies nor token",
            ));
        }
        Ok(result)
    }
}
