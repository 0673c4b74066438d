//! The identity graph mutations.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sone_core::{GraphError, Identity, IdentityGraph, OwnIdentity, Trust};

use crate::{Coalesce, Completion, JobKey, UpdateJob};

/// Adds a context to an own identity.
pub struct AddContextJob {
    graph: Arc<dyn IdentityGraph>,
    owner: Arc<OwnIdentity>,
    context: String,
    completion: Completion,
}

impl AddContextJob {
    pub fn new(
        graph: Arc<dyn IdentityGraph>,
        owner: Arc<OwnIdentity>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            owner,
            context: context.into(),
            completion: Completion::new(),
        }
    }

    pub fn owner(&self) -> &OwnIdentity {
        &self.owner
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

#[async_trait]
impl UpdateJob for AddContextJob {
    fn key(&self) -> JobKey {
        JobKey::AddContext {
            owner: self.owner.id().to_owned(),
            context: self.context.clone(),
        }
    }

    fn completion(&self) -> &Completion {
        &self.completion
    }

    async fn perform(&self) -> Result<(), GraphError> {
        self.graph.add_context(&self.owner, &self.context).await?;
        self.owner.add_context(self.context.as_str());
        Ok(())
    }
}

impl fmt::Display for AddContextJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddContext[{}, {}]", self.owner, self.context)
    }
}

/// Removes a context from an own identity.
pub struct RemoveContextJob {
    graph: Arc<dyn IdentityGraph>,
    owner: Arc<OwnIdentity>,
    context: String,
    completion: Completion,
}

impl RemoveContextJob {
    pub fn new(
        graph: Arc<dyn IdentityGraph>,
        owner: Arc<OwnIdentity>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            owner,
            context: context.into(),
            completion: Completion::new(),
        }
    }

    pub fn owner(&self) -> &OwnIdentity {
        &self.owner
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

#[async_trait]
impl UpdateJob for RemoveContextJob {
    fn key(&self) -> JobKey {
        JobKey::RemoveContext {
            owner: self.owner.id().to_owned(),
            context: self.context.clone(),
        }
    }

    fn completion(&self) -> &Completion {
        &self.completion
    }

    async fn perform(&self) -> Result<(), GraphError> {
        self.graph.remove_context(&self.owner, &self.context).await?;
        self.owner.remove_context(&self.context);
        Ok(())
    }
}

impl fmt::Display for RemoveContextJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoveContext[{}, {}]", self.owner, self.context)
    }
}

/// Sets a property of an own identity, or removes it if the value is
/// `None`.
pub struct SetPropertyJob {
    graph: Arc<dyn IdentityGraph>,
    owner: Arc<OwnIdentity>,
    name: String,
    value: Option<String>,
    completion: Completion,
}

impl SetPropertyJob {
    pub fn new(
        graph: Arc<dyn IdentityGraph>,
        owner: Arc<OwnIdentity>,
        name: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        Self {
            graph,
            owner,
            name: name.into(),
            value,
            completion: Completion::new(),
        }
    }

    pub fn owner(&self) -> &OwnIdentity {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

#[async_trait]
impl UpdateJob for SetPropertyJob {
    fn key(&self) -> JobKey {
        JobKey::SetProperty {
            owner: self.owner.id().to_owned(),
            name: self.name.clone(),
            value: self.value.clone(),
        }
    }

    fn completion(&self) -> &Completion {
        &self.completion
    }

    async fn perform(&self) -> Result<(), GraphError> {
        match &self.value {
            Some(value) => {
                self.graph.set_property(&self.owner, &self.name, value).await?;
                self.owner.set_property(self.name.as_str(), value.as_str());
            }
            None => {
                self.graph.remove_property(&self.owner, &self.name).await?;
                self.owner.remove_property(&self.name);
            }
        }
        Ok(())
    }
}

impl fmt::Display for SetPropertyJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "SetProperty[{}, {}={value}]", self.owner, self.name),
            None => write!(f, "RemoveProperty[{}, {}]", self.owner, self.name),
        }
    }
}

/// Sets the trust of an own identity in another identity, or removes it if
/// the score is `None`.
///
/// On success the trustee's local trust record from the truster becomes an
/// explicit score at distance 0. A newer job for the same pair supersedes a
/// pending one.
pub struct SetTrustJob {
    graph: Arc<dyn IdentityGraph>,
    truster: Arc<OwnIdentity>,
    trustee: Arc<Identity>,
    score: Option<i32>,
    comment: String,
    completion: Completion,
}

impl SetTrustJob {
    pub fn new(
        graph: Arc<dyn IdentityGraph>,
        truster: Arc<OwnIdentity>,
        trustee: Arc<Identity>,
        score: Option<i32>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            truster,
            trustee,
            score,
            comment: comment.into(),
            completion: Completion::new(),
        }
    }

    pub fn truster(&self) -> &OwnIdentity {
        &self.truster
    }

    pub fn trustee(&self) -> &Identity {
        &self.trustee
    }

    pub fn score(&self) -> Option<i32> {
        self.score
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }
}

#[async_trait]
impl UpdateJob for SetTrustJob {
    fn key(&self) -> JobKey {
        JobKey::SetTrust {
            truster: self.truster.id().to_owned(),
            trustee: self.trustee.id().to_owned(),
        }
    }

    fn completion(&self) -> &Completion {
        &self.completion
    }

    fn coalesce(&self) -> Coalesce {
        Coalesce::Supersede
    }

    async fn perform(&self) -> Result<(), GraphError> {
        match self.score {
            Some(score) => {
                self.graph
                    .set_trust(&self.truster, &self.trustee, score, &self.comment)
                    .await?;
                self.trustee
                    .set_trust(&self.truster, Trust::new(Some(score), None, Some(0)));
            }
            None => {
                self.graph.remove_trust(&self.truster, &self.trustee).await?;
                self.trustee.remove_trust(&self.truster);
            }
        }
        Ok(())
    }
}

impl fmt::Display for SetTrustJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.score {
            Some(score) => write!(
                f,
                "SetTrust[{} -> {}, {score}, {:?}]",
                self.truster, self.trustee, self.comment
            ),
            None => write!(f, "RemoveTrust[{} -> {}]", self.truster, self.trustee),
        }
    }
}
