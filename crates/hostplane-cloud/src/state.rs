//! Managed database instance store
//!
//! Manages `<state_dir>/databases.json`, which tracks every managed database
//! instance the panel has provisioned.

use crate::database::{InstanceStatus, ManagedDatabaseInstance};
use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use hostplane_detect::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "databases.json";
const STATE_BACKUP: &str = "databases.json.backup";
const LOCK_FILE: &str = "lock.json";
const LOCK_WAIT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(25);

/// Contents of `databases.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Instances indexed by id
    pub instances: BTreeMap<String, ManagedDatabaseInstance>,
}

impl Default for InstanceState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            instances: BTreeMap::new(),
        }
    }
}

impl InstanceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ManagedDatabaseInstance> {
        self.instances.get(id)
    }

    /// Add or update an instance
    pub fn upsert(&mut self, instance: ManagedDatabaseInstance) {
        self.instances.insert(instance.id.clone(), instance);
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, id: &str) -> Option<ManagedDatabaseInstance> {
        let result = self.instances.remove(id);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn by_provider(&self, provider: ProviderKind) -> Vec<&ManagedDatabaseInstance> {
        self.instances
            .values()
            .filter(|i| i.provider == provider)
            .collect()
    }

    /// Instances with a provision call still outstanding
    pub fn in_flight(&self) -> Vec<&ManagedDatabaseInstance> {
        self.instances
            .values()
            .filter(|i| i.status.is_in_flight())
            .collect()
    }
}

/// Reads and writes the instance state file
#[derive(Debug, Clone)]
pub struct InstanceStore {
    state_dir: PathBuf,
    lock_wait: Duration,
}

impl InstanceStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            lock_wait: LOCK_WAIT,
        }
    }

    /// How long a writer waits for another holder of the state lock
    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory: {}", self.state_dir.display());
        }
        Ok(())
    }

    /// Load the current state; a missing file is an empty state
    pub async fn load(&self) -> Result<InstanceState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("Instance state not found, returning empty state");
            return Ok(InstanceState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: InstanceState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} instances", state.instances.len());
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &InstanceState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} instances", state.instances.len());
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<ManagedDatabaseInstance>> {
        Ok(self.load().await?.get(id).cloned())
    }

    pub async fn list(&self) -> Result<Vec<ManagedDatabaseInstance>> {
        Ok(self.load().await?.instances.into_values().collect())
    }

    /// Load, upsert one record and save under the state lock
    pub async fn put(&self, instance: ManagedDatabaseInstance) -> Result<()> {
        let lock = self.acquire_lock().await?;
        let mut state = self.load().await?;
        state.upsert(instance);
        self.save(&state).await?;
        lock.release().await
    }

    /// Records `instance` unless a record with the same id is in flight
    ///
    /// The check and the write happen under one lock, so of two concurrent
    /// claims for the same id exactly one succeeds.
    pub async fn claim(&self, instance: ManagedDatabaseInstance) -> Result<()> {
        let lock = self.acquire_lock().await?;
        let mut state = self.load().await?;
        if let Some(existing) = state.get(&instance.id) {
            if existing.status.is_in_flight() {
                return Err(CloudError::InvalidConfig(format!(
                    "database '{}' is already {}",
                    existing.id, existing.status
                )));
            }
        }
        state.upsert(instance);
        self.save(&state).await?;
        lock.release().await
    }

    /// Updates the status of an existing record
    pub async fn set_status(&self, id: &str, status: InstanceStatus) -> Result<()> {
        let lock = self.acquire_lock().await?;
        let mut state = self.load().await?;
        let instance = state
            .instances
            .get_mut(id)
            .ok_or_else(|| CloudError::StateError(format!("No database instance '{}'", id)))?;
        instance.set_status(status);
        state.updated_at = Utc::now();
        self.save(&state).await?;
        lock.release().await
    }

    /// Acquire a lock for exclusive access
    ///
    /// Waits up to the store's lock wait for another holder to finish. Locks
    /// older than an hour are stale and replaced.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let started = Instant::now();

        loop {
            if let Some(lock) = try_create_lock(&lock_path).await? {
                tracing::debug!("Acquired state lock");
                return Ok(lock);
            }

            // Unreadable while the holder is still writing it
            let holder = read_lock_info(&lock_path).await;
            if let Some(info) = &holder {
                let age = Utc::now().signed_duration_since(info.acquired_at);
                if age.num_hours() >= 1 {
                    tracing::warn!("Removing stale lock from {}", info.holder);
                    match fs::remove_file(&lock_path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                    continue;
                }
            }

            if started.elapsed() >= self.lock_wait {
                return Err(CloudError::LockError(match holder {
                    Some(info) => format!(
                        "State is locked by {} since {}",
                        info.holder, info.acquired_at
                    ),
                    None => "State is locked".to_string(),
                }));
            }
            tokio::time::sleep(LOCK_RETRY).await;
        }
    }
}

/// Creates the lock file; `None` when it already exists
async fn try_create_lock(lock_path: &Path) -> Result<Option<StateLock>> {
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    // Removes the file again if writing the holder fails
    let lock = StateLock {
        lock_path: lock_path.to_path_buf(),
        released: false,
    };

    let lock_info = LockInfo {
        holder: std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| "unknown".to_string()),
        acquired_at: Utc::now(),
    };
    let content = serde_json::to_string_pretty(&lock_info)?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;

    Ok(Some(lock))
}

async fn read_lock_info(lock_path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(lock_path).await.ok()?;
    serde_json::from_str(&content).ok()
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
