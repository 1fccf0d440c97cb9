//! Endpoint credentials for the job analytics store.
//!
//! The query client never reads the environment directly. It is handed a
//! [`CredentialSource`] and asks it again whenever the control loop
//! requests a refresh, so rotated secrets are picked up without restarting
//! the process.

use std::fmt;

use runnerscale_core::config::QueueConfig;

use crate::error::{QueueError, QueueResult};

/// Where to send queries and how to authenticate.
#[derive(Clone, PartialEq, Eq)]
pub struct QueueCredentials {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for QueueCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueCredentials")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Produces the current credentials; called at startup and on refresh.
pub trait CredentialSource: Send + Sync {
    fn load(&self) -> QueueResult<QueueCredentials>;
}

/// Fixed credentials, mostly for tests and local endpoints.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub QueueCredentials);

impl CredentialSource for StaticCredentials {
    fn load(&self) -> QueueResult<QueueCredentials> {
        Ok(self.0.clone())
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Credentials resolved from environment variables named in the config.
///
/// A literal `url` in the config wins over `url_env`.
pub struct EnvCredentials {
    url: Option<String>,
    url_env: Option<String>,
    user: Option<String>,
    password_env: Option<String>,
    lookup: Lookup,
}

impl EnvCredentials {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            url: config.url.clone(),
            url_env: config.url_env.clone(),
            user: config.user.clone(),
            password_env: config.password_env.clone(),
            lookup: Box::new(|key: &str| std::env::var(key).ok()),
        }
    }

    /// Replace the variable lookup (the process environment by default).
    pub fn with_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.lookup = Box::new(lookup);
        self
    }
}

impl CredentialSource for EnvCredentials {
    fn load(&self) -> QueueResult<QueueCredentials> {
        let url = match (&self.url, &self.url_env) {
            (Some(url), _) => url.clone(),
            (None, Some(var)) => (self.lookup)(var.as_str())
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| QueueError::Credentials(format!("{var} is not set")))?,
            (None, None) => {
                return Err(QueueError::Credentials(
                    "no query endpoint configured".to_string(),
                ));
            }
        };

        let password = match &self.password_env {
            Some(var) => Some(
                (self.lookup)(var.as_str())
                    .ok_or_else(|| QueueError::Credentials(format!("{var} is not set")))?,
            ),
            None => None,
        };

        Ok(QueueCredentials {
            url: url.trim().to_string(),
            user: self.user.clone(),
            password,
        })
    }
}
