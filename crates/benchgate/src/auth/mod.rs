//! HTTP login gate in front of the workbench.
//!
//! # Architecture
//!
//! - **rate_limit**: token buckets shared across login attempts
//! - **password**: hashing + constant-time credential verification
//! - **cookie**: session cookie construction and parsing
//! - **routes**: the axum login endpoints

pub mod cookie;
pub mod password;
pub mod rate_limit;
pub mod routes;

use axum::http::HeaderMap;

use crate::config::{AuthConfig, PasswordSource, human_path};
use password::{hash_password, safe_compare, verify_password};
use rate_limit::RateLimiter;

/// User-facing login failures. All of them render back into the login
/// page with a 200; none of them reveal which check failed beyond the
/// message itself.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Login rate limited!")]
    RateLimited,
    #[error("Missing password")]
    MissingPassword,
    #[error("Incorrect password")]
    IncorrectPassword,
}

/// Login page renderer, implemented by the templating layer.
pub trait LoginPage: Send + Sync + 'static {
    fn render(&self, password_message: &str, error: Option<&str>) -> String;
}

/// Fallback page for embeddings that bring no template of their own.
pub struct BasicLoginPage;

impl LoginPage for BasicLoginPage {
    fn render(&self, password_message: &str, error: Option<&str>) -> String {
        let error = error
            .map(|e| format!("<div class=\"error\">{e}</div>\n"))
            .unwrap_or_default();
        format!(
            "<!DOCTYPE html>\n\
             <html>\n\
             <head><meta charset=\"utf-8\"><title>Sign in</title></head>\n\
             <body>\n\
             <form method=\"post\">\n\
             <p>{password_message}</p>\n\
             {error}\
             <input type=\"password\" name=\"password\" autofocus>\n\
             <input type=\"submit\" value=\"Sign In\">\n\
             </form>\n\
             </body>\n\
             </html>\n"
        )
    }
}

/// Login flow state: configuration, the shared rate limiter, and the
/// page renderer.
pub struct AuthGate {
    config: AuthConfig,
    limiter: RateLimiter,
    page: Box<dyn LoginPage>,
}

impl AuthGate {
    pub fn new(config: AuthConfig) -> Self {
        Self::with_page(config, Box::new(BasicLoginPage))
    }

    pub fn with_page(config: AuthConfig, page: Box<dyn LoginPage>) -> Self {
        Self {
            config,
            limiter: RateLimiter::new(),
            page,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Whether the request already carries a valid session cookie.
    pub fn authenticated(&self, headers: &HeaderMap) -> bool {
        let Some(value) = cookie::cookie_value(headers, cookie::COOKIE_NAME) else {
            return false;
        };
        if let Some(hashed) = &self.config.hashed_password {
            return safe_compare(&value, hashed);
        }
        match &self.config.password {
            Some(password) => safe_compare(&value, &hash_password(password)),
            None => false,
        }
    }

    /// Run one login attempt. The rate limiter is consulted first and
    /// charged for every attempt, including ones that would fail on a
    /// missing password. Returns the session cookie value on success.
    pub fn attempt_login(&self, password: Option<&str>) -> Result<String, LoginError> {
        if !self.limiter.try_consume() {
            return Err(LoginError::RateLimited);
        }

        let password = password
            .filter(|p| !p.is_empty())
            .ok_or(LoginError::MissingPassword)?;

        if verify_password(&self.config, password) {
            Ok(hash_password(password))
        } else {
            Err(LoginError::IncorrectPassword)
        }
    }

    fn password_message(&self) -> String {
        match self.config.source {
            PasswordSource::EnvPassword => "Password was set from $PASSWORD.".to_string(),
            PasswordSource::EnvHashedPassword => {
                "Password was set from $HASHED_PASSWORD.".to_string()
            }
            PasswordSource::ConfigFile => format!(
                "Check the config file at {} for the password.",
                human_path(&self.config.config_path)
            ),
        }
    }

    pub fn render_page(&self, error: Option<&LoginError>) -> String {
        let error = error.map(|e| e.to_string());
        self.page.render(&self.password_message(), error.as_deref())
    }
}
