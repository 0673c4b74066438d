//! The identity graph capability.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Identity, OwnIdentity};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The identity graph service could not be reached.
    #[error("identity graph unavailable: {0}")]
    Unavailable(String),
    /// The identity graph rejected the request.
    #[error("identity graph rejected request: {0}")]
    Rejected(String),
}

/// Mutations of the external trust/identity graph.
#[async_trait]
pub trait IdentityGraph: Send + Sync {
    async fn add_context(&self, owner: &OwnIdentity, context: &str) -> Result<(), GraphError>;

    async fn remove_context(&self, owner: &OwnIdentity, context: &str) -> Result<(), GraphError>;

    async fn set_property(
        &self,
        owner: &OwnIdentity,
        name: &str,
        value: &str,
    ) -> Result<(), GraphError>;

    async fn remove_property(&self, owner: &OwnIdentity, name: &str) -> Result<(), GraphError>;

    async fn set_trust(
        &self,
        truster: &OwnIdentity,
        trustee: &Identity,
        score: i32,
        comment: &str,
    ) -> Result<(), GraphError>;

    async fn remove_trust(&self, truster: &OwnIdentity, trustee: &Identity)
    -> Result<(), GraphError>;
}

#[async_trait]
impl<T: IdentityGraph + ?Sized> IdentityGraph for Arc<T> {
    async fn add_context(&self, owner: &OwnIdentity, context: &str) -> Result<(), GraphError> {
        (**self).add_context(owner, context).await
    }

    async fn remove_context(&self, owner: &OwnIdentity, context: &str) -> Result<(), GraphError> {
        (**self).remove_context(owner, context).await
    }

    async fn set_property(
        &self,
        owner: &OwnIdentity,
        name: &str,
        value: &str,
    ) -> Result<(), GraphError> {
        (**self).set_property(owner, name, value).await
    }

    async fn remove_property(&self, owner: &OwnIdentity, name: &str) -> Result<(), GraphError> {
        (**self).remove_property(owner, name).await
    }

    async fn set_trust(
        &self,
        truster: &OwnIdentity,
        trustee: &Identity,
        score: i32,
        comment: &str,
    ) -> Result<(), GraphError> {
        (**self).set_trust(truster, trustee, score, comment).await
    }

    async fn remove_trust(
        &self,
        truster: &OwnIdentity,
        trustee: &Identity,
    ) -> Result<(), GraphError> {
        (**self).remove_trust(truster, trustee).await
    }
}
