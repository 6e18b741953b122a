//! Reconciliation engine.
//!
//! `plan` compares the container's declared assets with the persisted state
//! and decides, per key, whether to create, diff or delete. `apply` walks the
//! dependency graph level by level: the bucket node first, then every asset
//! node concurrently. A failed node marks all of its dependents as skipped;
//! a failed asset never stops its siblings.

use crate::errors::PublishError;
use crate::models::asset::RemoteAssetRecord;
use crate::services::{
    asset_resource::{AssetInputs, AssetProvider},
    bucket_resource::{BucketContainer, ContainerOutputs},
    graph::{ResourceGraph, ResourceId},
    object_store::ObjectStoreClient,
    provider::ResourceProvider,
    state::DeploymentState,
};
use futures::{StreamExt, stream};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};
use tracing::{error, info};

pub const DEFAULT_CONCURRENCY: usize = 16;

#[derive(Clone, Copy, Debug)]
pub struct ReconcileOptions {
    /// Maximum asset operations in flight at once.
    pub concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Planned operation for one asset key.
#[derive(Clone, Debug)]
pub enum AssetStep {
    Create(AssetInputs),
    Diff {
        observed: RemoteAssetRecord,
        desired: AssetInputs,
    },
    Delete(RemoteAssetRecord),
}

/// Resolved action, as reported after planning or execution.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetAction {
    Create,
    /// Diff could not be resolved (e.g. the source vanished).
    Diff,
    Update,
    Unchanged,
    Delete,
}

impl fmt::Display for AssetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetAction::Create => "create",
            AssetAction::Diff => "diff",
            AssetAction::Update => "update",
            AssetAction::Unchanged => "unchanged",
            AssetAction::Delete => "delete",
        };
        f.pad(name)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Failed(String),
    Skipped(String),
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AssetReport {
    pub key: String,
    pub action: AssetAction,
    pub outcome: Outcome,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct ReconcileReport {
    pub container: String,
    pub bucket_error: Option<String>,
    pub outputs: Option<ContainerOutputs>,
    pub assets: Vec<AssetReport>,
}

impl ReconcileReport {
    pub fn failures(&self) -> Vec<&AssetReport> {
        self.assets
            .iter()
            .filter(|report| !matches!(report.outcome, Outcome::Succeeded))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.bucket_error.is_none() && self.failures().is_empty()
    }

    pub fn count(&self, action: AssetAction) -> usize {
        self.assets
            .iter()
            .filter(|report| report.action == action && report.outcome == Outcome::Succeeded)
            .count()
    }
}

/// Steps for one container, with the graph that orders them.
#[derive(Debug)]
pub struct Plan {
    pub graph: ResourceGraph,
    pub steps: BTreeMap<ResourceId, (String, AssetStep)>,
}

enum StateChange {
    Upsert(RemoteAssetRecord),
    Remove(String),
    Keep,
}

pub struct Reconciler {
    store: Arc<dyn ObjectStoreClient>,
    provider: AssetProvider,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStoreClient>,
        provider: AssetProvider,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            store,
            provider,
            options,
        }
    }

    /// Decide per key what has to happen, without touching the store.
    pub fn plan(&self, container: &BucketContainer, state: &DeploymentState) -> Plan {
        let mut graph = container.graph();
        let mut steps = BTreeMap::new();

        for asset in &container.assets {
            let step = match state.assets.get(&asset.key) {
                Some(observed) => AssetStep::Diff {
                    observed: observed.clone(),
                    desired: asset.inputs.clone(),
                },
                None => AssetStep::Create(asset.inputs.clone()),
            };
            steps.insert(asset.id.clone(), (asset.key.clone(), step));
        }

        let declared: BTreeSet<&str> = container.assets.iter().map(|a| a.key.as_str()).collect();
        for (key, record) in &state.assets {
            if declared.contains(key.as_str()) {
                continue;
            }
            let id = ResourceId::asset(key);
            graph.add_node(id.clone(), [container.bucket_id.clone()]);
            steps.insert(id, (key.clone(), AssetStep::Delete(record.clone())));
        }

        Plan { graph, steps }
    }

    /// Resolve what `apply` would do. Diffs run; nothing is written.
    pub async fn preview(&self, plan: &Plan) -> Vec<AssetReport> {
        let reports = stream::iter(plan.steps.values())
            .map(|(key, step)| async move {
                let resolved = match step {
                    AssetStep::Create(_) => Ok(AssetAction::Create),
                    AssetStep::Delete(_) => Ok(AssetAction::Delete),
                    AssetStep::Diff { observed, desired } => self
                        .provider
                        .diff(key, observed, desired)
                        .await
                        .map(|diff| {
                            if diff.changed {
                                AssetAction::Update
                            } else {
                                AssetAction::Unchanged
                            }
                        }),
                };
                match resolved {
                    Ok(action) => AssetReport {
                        key: key.clone(),
                        action,
                        outcome: Outcome::Succeeded,
                    },
                    Err(err) => AssetReport {
                        key: key.clone(),
                        action: AssetAction::Diff,
                        outcome: Outcome::Failed(err.to_string()),
                    },
                }
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;
        sorted(reports)
    }

    /// Execute `plan`, updating `state` for every node that succeeded.
    pub async fn apply(
        &self,
        container: &BucketContainer,
        plan: Plan,
        state: &mut DeploymentState,
    ) -> Result<ReconcileReport, PublishError> {
        let levels = plan.graph.levels()?;
        let mut report = ReconcileReport {
            container: container.name.clone(),
            ..ReconcileReport::default()
        };
        let mut blocked: BTreeMap<ResourceId, String> = BTreeMap::new();

        for level in levels {
            let mut runnable = Vec::new();
            for node in level {
                if let Some(reason) = blocked.get(&node).cloned() {
                    if let Some((key, step)) = plan.steps.get(&node) {
                        report.assets.push(AssetReport {
                            key: key.clone(),
                            action: planned_action(step),
                            outcome: Outcome::Skipped(reason),
                        });
                    }
                    continue;
                }

                if node == container.bucket_id {
                    match container.ensure_bucket(&*self.store, state.bucket.as_ref()).await {
                        Ok(record) => {
                            report.outputs = Some(container.outputs(&record));
                            state.bucket = Some(record);
                        }
                        Err(err) => {
                            error!("container {}: {}", container.name, err);
                            let reason = format!("bucket setup failed: {}", err);
                            for dependent in plan.graph.dependents(&node) {
                                blocked.insert(dependent, reason.clone());
                            }
                            report.bucket_error = Some(err.to_string());
                        }
                    }
                } else if let Some(entry) = plan.steps.get(&node) {
                    runnable.push((node, entry));
                }
            }

            let results = stream::iter(runnable)
                .map(|(node, (key, step))| async move {
                    let (report, change) = self.execute(key, step).await;
                    (node, report, change)
                })
                .buffer_unordered(self.options.concurrency.max(1))
                .collect::<Vec<_>>()
                .await;

            for (node, asset_report, change) in results {
                if let Outcome::Failed(reason) = &asset_report.outcome {
                    for dependent in plan.graph.dependents(&node) {
                        blocked.insert(dependent, format!("{} failed: {}", node, reason));
                    }
                }
                match change {
                    StateChange::Upsert(record) => {
                        state.assets.insert(record.key.clone(), record);
                    }
                    StateChange::Remove(key) => {
                        state.assets.remove(&key);
                    }
                    StateChange::Keep => {}
                }
                report.assets.push(asset_report);
            }
        }

        state.updated_at = Some(chrono::Utc::now());
        report.assets = sorted(report.assets);
        info!(
            "container {}: {} created, {} updated, {} unchanged, {} removed, {} failed",
            container.name,
            report.count(AssetAction::Create),
            report.count(AssetAction::Update),
            report.count(AssetAction::Unchanged),
            report.count(AssetAction::Delete),
            report.failures().len()
        );
        Ok(report)
    }

    async fn execute(&self, key: &str, step: &AssetStep) -> (AssetReport, StateChange) {
        let result = match step {
            AssetStep::Create(inputs) => self
                .provider
                .create(inputs)
                .await
                .map(|created| (AssetAction::Create, StateChange::Upsert(created.outputs)))
                .map_err(|err| (AssetAction::Create, err)),
            AssetStep::Diff { observed, desired } => {
                match self.provider.diff(key, observed, desired).await {
                    Ok(diff) if diff.changed => {
                        info!("asset {} changed ({:?})", key, diff.reason);
                        self.provider
                            .update(key, observed, desired)
                            .await
                            .map(|record| (AssetAction::Update, StateChange::Upsert(record)))
                            .map_err(|err| (AssetAction::Update, err))
                    }
                    Ok(_) => Ok((AssetAction::Unchanged, StateChange::Keep)),
                    Err(err) => Err((AssetAction::Diff, err)),
                }
            }
            AssetStep::Delete(observed) => self
                .provider
                .delete(key, observed)
                .await
                .map(|_| (AssetAction::Delete, StateChange::Remove(key.to_string())))
                .map_err(|err| (AssetAction::Delete, err)),
        };

        match result {
            Ok((action, change)) => (
                AssetReport {
                    key: key.to_string(),
                    action,
                    outcome: Outcome::Succeeded,
                },
                change,
            ),
            Err((action, err)) => {
                error!("{} failed: {}", action, err);
                (
                    AssetReport {
                        key: key.to_string(),
                        action,
                        outcome: Outcome::Failed(err.to_string()),
                    },
                    StateChange::Keep,
                )
            }
        }
    }
}

fn planned_action(step: &AssetStep) -> AssetAction {
    match step {
        AssetStep::Create(_) => AssetAction::Create,
        AssetStep::Diff { .. } => AssetAction::Diff,
        AssetStep::Delete(_) => AssetAction::Delete,
    }
}

fn sorted(mut reports: Vec<AssetReport>) -> Vec<AssetReport> {
    reports.sort_by(|a, b| a.key.cmp(&b.key));
    reports
}
