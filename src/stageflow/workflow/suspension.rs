// SPDX-License-Identifier: MIT

//! Suspension and checkpointing
//!
//! A suspended instance is nothing more than a [`Checkpoint`] record in a
//! [`CheckpointStore`]: the state snapshot, the stage to re-enter, and the
//! prompt shown to whoever has to decide. There is one live checkpoint per
//! instance id; saving again overwrites it.
//!
//! Work on one instance is serialized through [`SuspensionManager::claim`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::adk::error::{Result, StageflowError};
use crate::stageflow::workflow::graph::InterruptRequest;
use crate::stageflow::workflow::state::WorkflowState;

/// Persisted snapshot of a suspended instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub instance_id: String,
    /// Name of the graph that produced this checkpoint
    pub workflow: String,
    /// Stage to re-enter on resume
    pub stage: String,
    pub state: WorkflowState,
    pub interrupt: InterruptRequest,
    pub created_at: DateTime<Utc>,
}

/// Checkpoint persistence port
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Save, replacing any checkpoint already held for `instance_id`
    async fn save(&self, instance_id: &str, checkpoint: &Checkpoint) -> Result<()>;

    async fn load(&self, instance_id: &str) -> Result<Option<Checkpoint>>;

    /// Remove the checkpoint; a no-op when there is none
    async fn clear(&self, instance_id: &str) -> Result<()>;
}

/// In-process checkpoint store
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<String, Checkpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, instance_id: &str, checkpoint: &Checkpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(instance_id.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, instance_id: &str) -> Result<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(instance_id).cloned())
    }

    async fn clear(&self, instance_id: &str) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.remove(instance_id);
        Ok(())
    }
}

/// One JSON file per instance under a directory
///
/// Lets a CLI suspend in one process and resume in another.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, instance_id: &str) -> PathBuf {
        let safe: String = instance_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, instance_id: &str, checkpoint: &Checkpoint) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(instance_id);
        let body = serde_json::to_vec_pretty(checkpoint)?;

        // Readers only ever see a complete file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, instance_id: &str) -> Result<Option<Checkpoint>> {
        match tokio::fs::read(self.path_for(instance_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self, instance_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(instance_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

type InstanceLocks = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Exclusive hold on one instance id; released on drop
pub struct InstanceClaim {
    instance_id: String,
    locks: InstanceLocks,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for InstanceClaim {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map and this guard still reference the lock: nobody is waiting
        let idle = locks
            .get(&self.instance_id)
            .map(|lock| Arc::strong_count(lock) <= 2)
            .unwrap_or(false);
        if idle {
            locks.remove(&self.instance_id);
        }
    }
}

/// Writes and reads checkpoints on behalf of the engine and driver
///
/// Clones share the store and the per-instance claims.
#[derive(Clone)]
pub struct SuspensionManager {
    store: Arc<dyn CheckpointStore>,
    locks: InstanceLocks,
}

impl SuspensionManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            locks: Arc::default(),
        }
    }

    /// Wait until no other caller holds `instance_id`, then hold it
    pub async fn claim(&self, instance_id: &str) -> InstanceClaim {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(instance_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        InstanceClaim {
            instance_id: instance_id.to_string(),
            locks: self.locks.clone(),
            _guard: guard,
        }
    }

    /// Persist a checkpoint for an interrupt raised at `stage`
    pub async fn request_interrupt(
        &self,
        instance_id: &str,
        workflow: &str,
        stage: &str,
        state: &WorkflowState,
        interrupt: InterruptRequest,
    ) -> Result<Checkpoint> {
        let checkpoint = Checkpoint {
            instance_id: instance_id.to_string(),
            workflow: workflow.to_string(),
            stage: stage.to_string(),
            state: state.clone(),
            interrupt,
            created_at: Utc::now(),
        };
        self.store.save(instance_id, &checkpoint).await?;
        log::info!(
            "Instance {} suspended at stage {}: {}",
            instance_id,
            stage,
            checkpoint.interrupt.prompt
        );
        Ok(checkpoint)
    }

    /// The live checkpoint, if any
    pub async fn pending(&self, instance_id: &str) -> Result<Option<Checkpoint>> {
        self.store.load(instance_id).await
    }

    /// The live checkpoint, or `CheckpointNotFound`
    pub async fn load_for_resume(&self, instance_id: &str) -> Result<Checkpoint> {
        self.store
            .load(instance_id)
            .await?
            .ok_or_else(|| StageflowError::CheckpointNotFound {
                instance_id: instance_id.to_string(),
            })
    }

    /// Drop the checkpoint once a resumed run has finished with it
    pub async fn consume(&self, instance_id: &str) -> Result<()> {
        self.store.clear(instance_id).await
    }

    /// Abandon a suspended instance; `CheckpointNotFound` when nothing is pending
    pub async fn discard(&self, instance_id: &str) -> Result<Checkpoint> {
        let _claim = self.claim(instance_id).await;
        let checkpoint = self.load_for_resume(instance_id).await?;
        self.store.clear(instance_id).await?;
        log::info!(
            "Discarded checkpoint for instance {} at stage {}",
            instance_id,
            checkpoint.stage
        );
        Ok(checkpoint)
    }
}
