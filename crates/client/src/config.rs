//! Client configuration.
//!
//! Loaded from `CAREHUB_*` environment variables, or deserialized from JSON
//! (every field has a default).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use carehub_auth::{PrivilegedRoles, Role};
use carehub_auth::policy::DEFAULT_PRIVILEGED_ROLE;

use crate::gateway::DEFAULT_LOGIN_PATH;
use crate::source::{Endpoints, ROLE_PLACEHOLDER};

pub const API_URL_VAR: &str = "CAREHUB_API_URL";
pub const LOGIN_PATH_VAR: &str = "CAREHUB_LOGIN_PATH";
pub const PRIVILEGED_ROLES_VAR: &str = "CAREHUB_PRIVILEGED_ROLES";
pub const ME_PATH_VAR: &str = "CAREHUB_ME_PATH";
pub const ROLE_PERMISSIONS_PATH_VAR: &str = "CAREHUB_ROLE_PERMISSIONS_PATH";
pub const REQUEST_TIMEOUT_VAR: &str = "CAREHUB_REQUEST_TIMEOUT_SECS";
pub const DATA_DIR_VAR: &str = "CAREHUB_DATA_DIR";
pub const AUTH_TOKEN_VAR: &str = "CAREHUB_AUTH_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL every relative request path is joined onto.
    pub api_url: String,
    /// Hard-navigation target on session expiry.
    pub login_path: String,
    /// Roles that bypass the permission matrix.
    pub privileged_roles: Vec<String>,
    pub endpoints: Endpoints,
    pub request_timeout_secs: u64,
    /// Overrides the OS data directory for the session database.
    pub data_dir: Option<PathBuf>,
    /// Token seeded into the session store at startup.
    pub auth_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            privileged_roles: vec![DEFAULT_PRIVILEGED_ROLE.to_string()],
            endpoints: Endpoints::default(),
            request_timeout_secs: 30,
            data_dir: None,
            auth_token: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(api_url) = lookup(API_URL_VAR) {
            config.api_url = api_url.trim().to_string();
        }
        if let Some(login_path) = lookup(LOGIN_PATH_VAR) {
            config.login_path = login_path.trim().to_string();
        }
        if let Some(roles) = lookup(PRIVILEGED_ROLES_VAR) {
            config.privileged_roles = roles
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(me) = lookup(ME_PATH_VAR) {
            config.endpoints.me = me.trim().to_string();
        }
        if let Some(path) = lookup(ROLE_PERMISSIONS_PATH_VAR) {
            config.endpoints.role_permissions = path.trim().to_string();
        }
        if let Some(secs) = lookup(REQUEST_TIMEOUT_VAR) {
            config.request_timeout_secs = secs
                .trim()
                .parse()
                .map_err(|e| invalid(REQUEST_TIMEOUT_VAR, format!("{secs:?} is not a number of seconds ({e})")))?;
        }
        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|dir| !dir.trim().is_empty()) {
            config.data_dir = Some(PathBuf::from(dir.trim()));
        }
        config.auth_token = lookup(AUTH_TOKEN_VAR).filter(|token| !token.is_empty());

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.api_url).map_err(|e| invalid(API_URL_VAR, e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(API_URL_VAR, format!("unsupported scheme {:?}", url.scheme())));
        }
        if !self.login_path.starts_with('/') {
            return Err(invalid(LOGIN_PATH_VAR, "must start with '/'"));
        }
        if self.endpoints.me.trim().is_empty() {
            return Err(invalid(ME_PATH_VAR, "must not be empty"));
        }
        if !self.endpoints.role_permissions.contains(ROLE_PLACEHOLDER) {
            return Err(invalid(
                ROLE_PERMISSIONS_PATH_VAR,
                format!("must contain the {ROLE_PLACEHOLDER} placeholder"),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid(REQUEST_TIMEOUT_VAR, "must be at least 1 second"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn privileged(&self) -> PrivilegedRoles {
        self.privileged_roles.iter().cloned().map(Role::new).collect()
    }
}
