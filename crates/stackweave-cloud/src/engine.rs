//! Apply engine boundary
//!
//! The graph never talks to a cloud API. It hands a [`Manifest`] to an
//! [`ApplyEngine`], which owns authentication, diffing, ordering, retries and
//! the resolution of deferred values. Engine failures are passed through to
//! the caller unchanged.

use crate::error::{CloudError, Result};
use crate::graph::ResourceGraph;
use crate::manifest::{Manifest, ManifestEntry};
use crate::resource::{ResourceKey, ResourceKind};
use crate::state::{ResolvedState, ResourceStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// External engine that applies a manifest against a cloud provider
#[async_trait]
pub trait ApplyEngine: Send + Sync {
    /// Engine name (e.g. "preview")
    fn name(&self) -> &str;

    /// Display name for UI
    fn display_name(&self) -> &str;

    /// Check that the engine can reach and authenticate to its control plane
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Apply the manifest on top of previously recorded state
    async fn apply(&self, manifest: &Manifest, previous: &ResolvedState) -> Result<ApplyReport>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of one engine apply
#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// State after the apply, including partially applied resources
    pub state: ResolvedState,

    pub succeeded: Vec<ActionResult>,

    pub failed: Vec<ActionResult>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyReport {
    pub fn new(state: ResolvedState) -> Self {
        Self {
            state,
            succeeded: Vec::new(),
            failed: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(&mut self, resource: String, message: String) {
        self.succeeded.push(ActionResult {
            resource,
            success: true,
            message,
            error: None,
        });
    }

    pub fn add_failure(&mut self, resource: String, error: String) {
        self.failed.push(ActionResult {
            resource,
            success: false,
            message: String::new(),
            error: Some(error),
        });
    }
}

/// Result of applying a single declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// `kind:name` of the declaration
    pub resource: String,

    pub success: bool,

    pub message: String,

    pub error: Option<String>,
}

/// Build the manifest for `graph` and hand it to `engine`
///
/// Construction errors abort before the engine sees anything. Engine errors
/// come back as [`CloudError::Engine`] with the engine's own message.
pub async fn submit(
    graph: &ResourceGraph,
    engine: &dyn ApplyEngine,
    previous: &ResolvedState,
) -> Result<ApplyReport> {
    let manifest = Manifest::from_graph(graph)?;

    let auth = engine.check_auth().await.map_err(|e| passthrough(engine, e))?;
    if !auth.authenticated {
        return Err(CloudError::Engine {
            engine: engine.name().to_string(),
            message: auth
                .error
                .unwrap_or_else(|| "authentication failed".to_string()),
        });
    }

    tracing::info!(
        engine = engine.name(),
        resources = manifest.resources.len(),
        "Submitting manifest"
    );
    let report = engine
        .apply(&manifest, previous)
        .await
        .map_err(|e| passthrough(engine, e))?;

    tracing::info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        duration_ms = report.duration_ms,
        "Engine finished"
    );
    Ok(report)
}

fn passthrough(engine: &dyn ApplyEngine, error: CloudError) -> CloudError {
    match error {
        CloudError::Engine { .. } => error,
        other => CloudError::Engine {
            engine: engine.name().to_string(),
            message: other.to_string(),
        },
    }
}

/// Dry-run engine that fabricates outputs instead of calling a cloud API
///
/// Resources are "created" in manifest order once all their dependencies
/// are; host names and keys are synthesized so the outputs table can be
/// inspected offline.
#[derive(Debug, Clone)]
pub struct PreviewEngine {
    host_suffix: String,
}

impl Default for PreviewEngine {
    fn default() -> Self {
        Self {
            host_suffix: "azurewebsites.net".to_string(),
        }
    }
}

impl PreviewEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.host_suffix = suffix.into();
        self
    }

    fn synthesize(&self, entry: &ManifestEntry, state: &mut ResolvedState, key: &ResourceKey) {
        let name = physical_name(entry);
        let mut outputs = vec![
            ("name".to_string(), serde_json::json!(name)),
            (
                "id".to_string(),
                serde_json::json!(format!("/stackweave/preview/{}/{}", entry.type_token, name)),
            ),
        ];
        match entry.kind {
            ResourceKind::WebApp => outputs.push((
                "default_host_name".to_string(),
                serde_json::json!(format!("{name}.{}", self.host_suffix)),
            )),
            ResourceKind::StorageAccount => outputs.push((
                "primary_endpoints".to_string(),
                serde_json::json!({ "blob": format!("https://{name}.blob.core.windows.net/") }),
            )),
            ResourceKind::CognitiveAccount => outputs.push((
                "endpoint".to_string(),
                serde_json::json!(format!("https://{name}.cognitiveservices.azure.com/")),
            )),
            _ => {}
        }
        state.record_created(key, outputs);

        if let Some(query) = entry.kind.schema().secret_query {
            let response = match entry.kind {
                ResourceKind::StorageAccount => serde_json::json!({
                    "keys": [
                        { "keyName": "key1", "value": format!("preview-{name}-key1") },
                        { "keyName": "key2", "value": format!("preview-{name}-key2") },
                    ]
                }),
                _ => serde_json::json!({
                    "key1": format!("preview-{name}-key1"),
                    "key2": format!("preview-{name}-key2"),
                }),
            };
            state.record_query(key, query, response);
        }
    }
}

/// Cloud-side name: the first literal naming property, else the declaration name
/// Milliseconds in `elapsed`, saturating instead of truncating
fn whole_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn physical_name(entry: &ManifestEntry) -> &str {
    const NAME_FIELDS: [&str; 5] = [
        "account_name",
        "container_name",
        "blob_name",
        "resource_group_name",
        "name",
    ];
    NAME_FIELDS
        .iter()
        .find_map(|field| entry.properties.get(*field)?.as_str())
        .unwrap_or(&entry.name)
}

#[async_trait]
impl ApplyEngine for PreviewEngine {
    fn name(&self) -> &str {
        "preview"
    }

    fn display_name(&self) -> &str {
        "Preview (dry run)"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("offline"))
    }

    async fn apply(&self, manifest: &Manifest, previous: &ResolvedState) -> Result<ApplyReport> {
        let started = Instant::now();
        let mut report = ApplyReport::new(previous.clone());

        for entry in &manifest.resources {
            let key = ResourceKey::new(entry.kind, entry.name.clone());
            let blocked = entry.depends_on.iter().find(|dep| {
                report
                    .state
                    .resources
                    .get(*dep)
                    .is_none_or(|s| s.status != ResourceStatus::Created)
            });
            if let Some(dep) = blocked {
                report.state.set_status(&key, ResourceStatus::Error);
                report.add_failure(entry.key.clone(), format!("dependency {dep} was not created"));
                continue;
            }

            self.synthesize(entry, &mut report.state, &key);
            tracing::debug!(resource = %entry.key, "Preview created resource");
            report.add_success(entry.key.clone(), "created (preview)".to_string());
        }

        report.duration_ms = whole_millis(started.elapsed());
        Ok(report)
    }
}
