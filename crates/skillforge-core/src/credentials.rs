//! The credential client seam (C3): a trait boundary only. Resolving a
//! credential reference into a usable secret is someone else's job — a
//! vault, a secrets manager, a database table — this crate just defines the
//! contract an executor calls through.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential '{0}' was not found")]
    NotFound(String),
    #[error("credential client backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
pub struct Credential {
    pub id: String,
    /// Opaque key/value secret material; interpretation (bearer token,
    /// username+password, connection string) is up to the caller, scoped by
    /// the connector or rest_config that asked for it.
    pub values: BTreeMap<String, String>,
}

#[async_trait]
pub trait CredentialClient: Send + Sync {
    async fn resolve(&self, credential_id: &str, workspace_id: Option<&str>) -> Result<Credential, CredentialError>;
}

/// A fixed-map credential client for tests and local runs: no external
/// collaborator required.
pub struct StaticCredentialClient {
    credentials: BTreeMap<String, Credential>,
}

impl StaticCredentialClient {
    pub fn new() -> Self {
        Self {
            credentials: BTreeMap::new(),
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credentials.insert(credential.id.clone(), credential);
        self
    }
}

impl Default for StaticCredentialClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialClient for StaticCredentialClient {
    async fn resolve(&self, credential_id: &str, _workspace_id: Option<&str>) -> Result<Credential, CredentialError> {
        self.credentials
            .get(credential_id)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(credential_id.to_string()))
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            values: self.values.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_a_registered_credential() {
        let client = StaticCredentialClient::new().with_credential(Credential {
            id: "db-main".to_string(),
            values: BTreeMap::from([("url".to_string(), "sqlite://./data.db".to_string())]),
        });

        let cred = client.resolve("db-main", None).await.unwrap();
        assert_eq!(cred.values.get("url").unwrap(), "sqlite://./data.db");
    }

    #[tokio::test]
    async fn missing_credential_is_an_error() {
        let client = StaticCredentialClient::new();
        let err = client.resolve("missing", None).await.unwrap_err();
        assert_eq!(err, CredentialError::NotFound("missing".to_string()));
    }
}
