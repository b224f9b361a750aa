//! The authenticated user as reported by the backend's "me" query.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::Role;

/// Backend identifier of a user.
///
/// Kept opaque: the backend may hand out numeric or document ids, both are
/// normalised to their string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "user id must be a string or number, got {other}"
            ))),
        }
    }
}

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// Current authenticated user; the source of truth for the role.
///
/// Only `id` and `role` are strict. Every other field falls back to its
/// default when the backend sends `null` or an unexpected shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(alias = "_id")]
    pub id: UserId,
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub username: String,
    #[serde(default)]
    pub role: Role,
    /// Organizational section (ward, department).
    #[serde(default, deserialize_with = "lenient")]
    pub section: Option<String>,
    #[serde(default, alias = "license_number", deserialize_with = "lenient")]
    pub license_number: Option<String>,
    /// Id of the backend permission set assigned to the user. The backend
    /// sends either the id or the populated document.
    #[serde(default, deserialize_with = "reference_id")]
    pub permission: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: UserStatus,
    #[serde(default, alias = "created_at", deserialize_with = "lenient")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updated_at", deserialize_with = "lenient")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn reference_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let id = match &value {
        Value::Object(document) => document.get("_id").or_else(|| document.get("id")),
        other => Some(other),
    };
    Ok(id.and_then(|id| match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

impl Identity {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}
