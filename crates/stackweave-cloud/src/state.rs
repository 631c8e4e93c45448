//! Engine-recorded state and its persistence
//!
//! An apply engine records which resources it created, the outputs they
//! published and the responses of key listing queries. [`ResolvedState`]
//! is the only place deferred values get evaluated. It is persisted as
//! `.stackweave/state.json` next to the stack file.

use crate::deferred::{Resolution, Resolver};
use crate::error::{CloudError, Result};
use crate::graph::ResourceGraph;
use crate::resource::{ResourceKey, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".stackweave";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Everything an engine has recorded for one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by `kind:name`
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for ResolvedState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl ResolvedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ResourceState> {
        self.resources.get(&key.to_string())
    }

    /// Record a finished create; `name` is always published
    pub fn record_created(
        &mut self,
        key: &ResourceKey,
        outputs: impl IntoIterator<Item = (String, Value)>,
    ) {
        let state = self.entry(key);
        state.status = ResourceStatus::Created;
        state
            .outputs
            .insert("name".to_string(), Value::String(key.name.clone()));
        state.outputs.extend(outputs);
        state.updated_at = Utc::now();
        self.updated_at = Utc::now();
    }

    /// Record the response of a key listing query
    pub fn record_query(&mut self, key: &ResourceKey, query: impl Into<String>, response: Value) {
        let state = self.entry(key);
        state.query_responses.insert(query.into(), response);
        state.updated_at = Utc::now();
        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, key: &ResourceKey, status: ResourceStatus) {
        let state = self.entry(key);
        state.status = status;
        state.updated_at = Utc::now();
        self.updated_at = Utc::now();
    }

    fn entry(&mut self, key: &ResourceKey) -> &mut ResourceState {
        self.resources
            .entry(key.to_string())
            .or_insert_with(|| ResourceState::new(key.kind, &key.name))
    }

    /// Evaluate every exported output of `graph`
    pub fn resolve_outputs(
        &self,
        graph: &ResourceGraph,
    ) -> Result<Vec<(String, Resolution<String>)>> {
        graph
            .outputs()
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.evaluate(value)?)))
            .collect()
    }

    pub fn created_count(&self) -> usize {
        self.resources
            .values()
            .filter(|r| r.status == ResourceStatus::Created)
            .count()
    }
}

impl Resolver for ResolvedState {
    fn is_created(&self, resource: &ResourceKey) -> bool {
        self.get(resource)
            .is_some_and(|state| state.status == ResourceStatus::Created)
    }

    fn output(&self, resource: &ResourceKey, field: &str) -> Option<&Value> {
        self.get(resource)?.outputs.get(field)
    }

    fn query_response(&self, resource: &ResourceKey, query: &str) -> Option<&Value> {
        self.get(resource)?.query_responses.get(query)
    }
}

/// State of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub kind: ResourceKind,

    pub name: String,

    /// Current status
    pub status: ResourceStatus,

    /// Published outputs (id, host name, ...)
    pub outputs: BTreeMap<String, Value>,

    /// Key listing responses by query name
    #[serde(default)]
    pub query_responses: BTreeMap<String, Value>,

    /// When the resource was first recorded
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            kind,
            name: name.into(),
            status: ResourceStatus::Unknown,
            outputs: BTreeMap::new(),
            query_responses: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Resource is being created
    Creating,
    /// Resource exists and its outputs are final
    Created,
    /// Apply failed
    Error,
    /// Status is unknown
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Creating => write!(f, "creating"),
            ResourceStatus::Created => write!(f, "created"),
            ResourceStatus::Error => write!(f, "error"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Reads and writes state files under `<root>/.stackweave/`
pub struct StateManager {
    root: PathBuf,
}

impl StateManager {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the recorded state; a missing file is an empty state
    pub async fn load(&self) -> Result<ResolvedState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(ResolvedState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: ResolvedState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &ResolvedState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are considered abandoned
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::format;
    use tempfile::tempdir;

    fn app() -> ResourceKey {
        ResourceKey::new(ResourceKind::WebApp, "becksblazor")
    }

    #[test]
    fn test_outputs_pending_until_created() {
        let mut state = ResolvedState::new();
        state.set_status(&app(), ResourceStatus::Creating);
        assert!(!state.is_created(&app()));
        assert!(state.output(&app(), "name").is_none());

        state.record_created(
            &app(),
            [(
                "default_host_name".to_string(),
                serde_json::json!("becksblazor.azurewebsites.net"),
            )],
        );
        assert!(state.is_created(&app()));
        assert_eq!(state.output(&app(), "name").unwrap(), "becksblazor");
        assert_eq!(state.created_count(), 1);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ResourceStatus::Creating).unwrap(),
            "\"creating\""
        );
        assert_eq!(ResourceStatus::Error.to_string(), "error");
        assert!(serde_json::from_str::<ResourceStatus>("\"deleting\"").is_err());
    }

    #[test]
    fn test_resolve_outputs_for_graph() {
        use crate::args::ResourceGroupArgs;
        use crate::resource::ResourceOptions;

        let mut graph = ResourceGraph::new("outputs");
        let group = graph
            .add("rg", ResourceGroupArgs::new("rg"), ResourceOptions::new())
            .unwrap();
        graph
            .export("GroupUrl", format("https://{0}", [group.name_output()]).unwrap())
            .unwrap();

        let mut state = ResolvedState::new();
        let pending = state.resolve_outputs(&graph).unwrap();
        assert_eq!(pending[0].1, Resolution::Pending);

        state.record_created(group.key(), std::iter::empty());
        let resolved = state.resolve_outputs(&graph).unwrap();
        assert_eq!(resolved[0].1, Resolution::Resolved("https://rg".to_string()));
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = ResolvedState::new();
        state.record_created(&app(), [("id".to_string(), serde_json::json!("/sites/1"))]);
        state.record_query(&app(), "listKeys", serde_json::json!({ "key1": "x" }));

        manager.save(&state).await.unwrap();
        manager.save(&state).await.unwrap();
        assert!(temp_dir.path().join(".stackweave/state.json.backup").exists());

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        assert!(loaded.is_created(&app()));
        assert_eq!(loaded.query_response(&app(), "listKeys").unwrap()["key1"], "x");
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.resources.is_empty());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));
        lock.release().await.unwrap();
        manager.acquire_lock().await.unwrap();
    }
}
