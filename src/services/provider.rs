//! Lifecycle interface the reconciliation engine drives polymorphically.

use crate::errors::PublishResult;
use async_trait::async_trait;

/// Result of a successful `create`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Created<O> {
    /// Resource identity, stable for the lifetime of the resource.
    pub id: String,
    pub outputs: O,
}

/// Why `diff` decided what it decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffReason {
    /// Stored and current digests are identical.
    Unchanged,
    ContentChanged,
    /// The stored digest is absent or could not be parsed.
    DigestUnavailable,
    /// The resource now targets a different bucket or key.
    TargetChanged,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffResult {
    pub changed: bool,
    pub reason: DiffReason,
}

impl DiffResult {
    pub fn unchanged() -> Self {
        Self {
            changed: false,
            reason: DiffReason::Unchanged,
        }
    }

    pub fn changed(reason: DiffReason) -> Self {
        Self {
            changed: true,
            reason,
        }
    }
}

/// A resource provider: create, diff, update and delete one kind of resource.
///
/// `Inputs` is the desired state, `Outputs` the observed state remembered
/// between runs.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    type Inputs: Send + Sync;
    type Outputs: Send + Sync;

    async fn create(&self, inputs: &Self::Inputs) -> PublishResult<Created<Self::Outputs>>;

    /// Decide whether `update` is needed. Must not touch remote state.
    async fn diff(
        &self,
        id: &str,
        observed: &Self::Outputs,
        desired: &Self::Inputs,
    ) -> PublishResult<DiffResult>;

    async fn update(
        &self,
        id: &str,
        observed: &Self::Outputs,
        desired: &Self::Inputs,
    ) -> PublishResult<Self::Outputs>;

    async fn delete(&self, id: &str, observed: &Self::Outputs) -> PublishResult<()>;
}
