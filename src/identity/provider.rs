/// Identity providers - the remote side of a resolution
use crate::{api::ManagementClient, error::SyncResult};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Resolves one identity to the remote system's identifier.
///
/// A missing identity should be reported as `SyncError::NotFound` (or an API
/// 404, or an opaque error whose text says "not found") so it gets cached as a
/// negative result.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn lookup(&self, cancel: &CancellationToken, identity: &str) -> SyncResult<String>;
}

/// Looks identities up in the management API's user directory
#[derive(Clone)]
pub struct HttpIdentityProvider {
    client: ManagementClient,
}

impl HttpIdentityProvider {
    pub fn new(client: ManagementClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn lookup(&self, _cancel: &CancellationToken, identity: &str) -> SyncResult<String> {
        let user = self.client.lookup_user(identity).await?;
        Ok(user.id)
    }
}
