//! [`PermissionSource`] backed by the gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use carehub_auth::{Identity, PermissionEntry, PermissionSource, Role, SourceError};

use crate::gateway::{ApiResponse, Gateway};
use crate::request::ApiRequest;

/// Placeholder substituted with the role name in [`Endpoints::role_permissions`].
pub const ROLE_PLACEHOLDER: &str = "{role}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// The "me" query.
    pub me: String,
    /// Permissions-by-role query; `{role}` is replaced by the role name.
    pub role_permissions: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            me: "/auth/me".to_string(),
            role_permissions: "/permissions/role/{role}".to_string(),
        }
    }
}

impl Endpoints {
    pub fn role_permissions_path(&self, role: &Role) -> String {
        self.role_permissions.replace(ROLE_PLACEHOLDER, role.as_str().trim())
    }
}

/// Identity and permission matrix fetched through the gateway, so both reads
/// carry the session token and take part in 401 handling.
#[derive(Clone)]
pub struct GatewaySource {
    gateway: Gateway,
    endpoints: Endpoints,
}

impl GatewaySource {
    pub fn new(gateway: Gateway, endpoints: Endpoints) -> Self {
        Self { gateway, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn fetch(&self, path: &str) -> Result<ApiResponse, SourceError> {
        let response = self
            .gateway
            .execute(ApiRequest::get(path))
            .await
            .map_err(|err| SourceError::Request(err.error_payload().message()))?;

        if response.is_failure() {
            return Err(SourceError::Rejected(response.error_payload().message()));
        }
        Ok(response)
    }
}

#[async_trait]
impl PermissionSource for GatewaySource {
    async fn fetch_identity(&self) -> Result<Identity, SourceError> {
        let response = self.fetch(&self.endpoints.me).await?;
        let data = response.data();
        let user = data.get("user").filter(|user| user.is_object()).unwrap_or(data);

        serde_json::from_value(user.clone()).map_err(|e| SourceError::Decode(format!("identity: {e}")))
    }

    async fn fetch_role_permissions(&self, role: &Role) -> Result<Vec<PermissionEntry>, SourceError> {
        let response = self.fetch(&self.endpoints.role_permissions_path(role)).await?;
        let data = response.data();
        let rows = match data {
            Value::Array(_) => data,
            _ => data
                .get("permissions")
                .ok_or_else(|| SourceError::Decode("permission matrix: no rows in payload".to_string()))?,
        };

        serde_json::from_value(rows.clone()).map_err(|e| SourceError::Decode(format!("permission matrix: {e}")))
    }
}
