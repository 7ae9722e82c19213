//! Policy Checkpointing
//!
//! Checkpoints are stored as versioned records under `rl/checkpoints/<id>`
//! with an index (oldest first) used for retention and resume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Genome, Provenance, Strategy, StrategyId};
use crate::error::{AateError, Result};
use crate::logging::{EngineEvent, EventSink};
use crate::store::record::{decode, get_record, put_record};
use crate::store::{keys, Persisted, StateStore};

/// Trained policy parameters plus training progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCheckpoint {
    pub id: Uuid,
    /// Strategy the policy was trained from
    pub parent: Option<StrategyId>,
    pub version: u32,
    /// Total training steps, including those of earlier checkpoints
    pub step: u64,
    pub cumulative_reward: f64,
    pub exploration_std: f64,
    pub baseline: f64,
    pub genome: Genome,
    pub created_at: DateTime<Utc>,
    /// sha256 over every other field
    pub checksum: String,
}

#[derive(Serialize)]
struct ChecksumPayload<'a> {
    id: &'a Uuid,
    parent: &'a Option<StrategyId>,
    version: u32,
    step: u64,
    cumulative_reward: f64,
    exploration_std: f64,
    baseline: f64,
    genome: &'a Genome,
    created_at: &'a DateTime<Utc>,
}

impl PolicyCheckpoint {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parent: Option<StrategyId>,
        version: u32,
        step: u64,
        cumulative_reward: f64,
        exploration_std: f64,
        baseline: f64,
        genome: Genome,
    ) -> Result<Self> {
        let mut checkpoint = Self {
            id: Uuid::new_v4(),
            parent,
            version,
            step,
            cumulative_reward,
            exploration_std,
            baseline,
            genome,
            created_at: Utc::now(),
            checksum: String::new(),
        };
        checkpoint.checksum = checkpoint.compute_checksum()?;
        Ok(checkpoint)
    }

    pub fn compute_checksum(&self) -> Result<String> {
        let payload = ChecksumPayload {
            id: &self.id,
            parent: &self.parent,
            version: self.version,
            step: self.step,
            cumulative_reward: self.cumulative_reward,
            exploration_std: self.exploration_std,
            baseline: self.baseline,
            genome: &self.genome,
            created_at: &self.created_at,
        };
        let bytes = serde_json::to_vec(&payload)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Checksum and genome checks applied before a checkpoint is trusted
    pub fn verify(&self) -> std::result::Result<(), String> {
        let expected = self.compute_checksum().map_err(|e| e.to_string())?;
        if expected != self.checksum {
            return Err(format!("checksum mismatch (stored {}, computed {})", self.checksum, expected));
        }
        self.genome
            .validate()
            .map_err(|reason| format!("invalid genome: {reason}"))?;
        if !(self.exploration_std.is_finite() && self.exploration_std > 0.0) {
            return Err(format!("invalid exploration std {}", self.exploration_std));
        }
        Ok(())
    }

    /// The strategy identifier this checkpoint exports as
    pub fn strategy_id(&self) -> StrategyId {
        StrategyId(self.id)
    }

    /// Export as an `rl-derived` strategy, evaluable like any GA strategy
    pub fn to_strategy(&self) -> Strategy {
        Strategy::with_id(
            self.strategy_id(),
            self.genome.clone(),
            Provenance::RlDerived,
            self.version,
            self.parent.into_iter().collect(),
        )
    }
}

impl Persisted for PolicyCheckpoint {
    const KIND: &'static str = "policy_checkpoint";
}

/// Checkpoint ids, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointIndex {
    pub ids: Vec<Uuid>,
}

impl Persisted for CheckpointIndex {
    const KIND: &'static str = "checkpoint_index";
}

/// Store-backed checkpointer with retention and corrupt-checkpoint fallback
pub struct CheckpointStore {
    store: Arc<dyn StateStore>,
    retention: usize,
    sink: Arc<dyn EventSink>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn StateStore>, retention: usize, sink: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            retention: retention.max(1),
            sink,
        }
    }

    /// Save a checkpoint, then drop the oldest beyond the retention count
    pub async fn save(&self, checkpoint: &PolicyCheckpoint) -> Result<()> {
        put_record(self.store.as_ref(), &keys::checkpoint(&checkpoint.id), checkpoint).await?;

        let mut index = self.index().await?;
        index.ids.retain(|id| *id != checkpoint.id);
        index.ids.push(checkpoint.id);
        let excess = index.ids.len().saturating_sub(self.retention);
        let removed: Vec<Uuid> = index.ids.drain(..excess).collect();
        put_record(self.store.as_ref(), keys::CHECKPOINT_INDEX, &index).await?;

        for id in removed {
            match self.store.delete(&keys::checkpoint(&id)).await {
                Ok(_) => debug!(checkpoint_id = %id, "Removed old checkpoint"),
                Err(e) => warn!(checkpoint_id = %id, error = %e, "Failed to remove old checkpoint"),
            }
        }

        info!(
            checkpoint_id = %checkpoint.id,
            step = checkpoint.step,
            cumulative_reward = checkpoint.cumulative_reward,
            "Saved checkpoint"
        );
        self.sink.emit(EngineEvent::CheckpointSaved {
            checkpoint_id: checkpoint.id,
            step: checkpoint.step,
            cumulative_reward: checkpoint.cumulative_reward,
        });
        Ok(())
    }

    /// Retained checkpoint ids, oldest first
    pub async fn list(&self) -> Result<Vec<Uuid>> {
        Ok(self.index().await?.ids)
    }

    /// Load and verify one checkpoint
    pub async fn load(&self, id: &Uuid) -> Result<PolicyCheckpoint> {
        let corrupt = |reason: String| AateError::CheckpointCorrupt {
            id: id.to_string(),
            reason,
        };
        let value = self
            .store
            .get(&keys::checkpoint(id))
            .await?
            .ok_or_else(|| corrupt("record missing".to_string()))?;
        let checkpoint: PolicyCheckpoint = decode(value).map_err(|e| corrupt(e.to_string()))?;
        if checkpoint.id != *id {
            return Err(corrupt(format!("record holds checkpoint {}", checkpoint.id)));
        }
        checkpoint.verify().map_err(corrupt)?;
        Ok(checkpoint)
    }

    /// Most recent checkpoint that passes verification.
    ///
    /// Corrupt ones are reported and skipped; `None` means cold start.
    pub async fn latest_valid(&self) -> Result<Option<PolicyCheckpoint>> {
        let index = self.index().await?;
        for id in index.ids.iter().rev() {
            match self.load(id).await {
                Ok(checkpoint) => return Ok(Some(checkpoint)),
                Err(AateError::CheckpointCorrupt { id, reason }) => {
                    warn!(checkpoint_id = %id, %reason, "Skipping corrupt checkpoint");
                    self.sink.emit(EngineEvent::CheckpointCorrupt {
                        checkpoint_id: id,
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn index(&self) -> Result<CheckpointIndex> {
        match get_record::<CheckpointIndex>(self.store.as_ref(), keys::CHECKPOINT_INDEX).await {
            Ok(index) => Ok(index.unwrap_or_default()),
            Err(e) if e.is_systemic() => Err(e),
            Err(e) => {
                warn!(error = %e, "Checkpoint index unreadable, starting a new one");
                Ok(CheckpointIndex::default())
            }
        }
    }
}
