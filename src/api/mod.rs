/// Remote management API
///
/// HTTP client and wire types for the user directory and team endpoints.

pub mod client;

pub use client::{ApiClientConfig, ManagementClient};

use crate::error::SyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Operations the apply pipeline needs from the remote side
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Connectivity probe
    async fn ping(&self) -> SyncResult<()>;

    /// Create or replace a team
    async fn apply_team(&self, payload: &TeamPayload) -> SyncResult<ApplyResponse>;
}

/// Member role on a team
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Maintainer,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Member => "member",
            Role::Maintainer => "maintainer",
            Role::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// User record returned by the directory lookup
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Resolved team member sent to the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub user_id: String,
    pub role: Role,
}

/// Desired state of one team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub members: Vec<TeamMember>,
}

/// Response to a team apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub id: String,
    #[serde(default)]
    pub created: bool,
}

/// Error body shape the API uses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}
