//! Resource kinds, the schema table and declaration options

use crate::deferred::{Deferred, SecretSelector};
use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of cloud resource that can be declared in a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ResourceGroup,
    ComputePlan,
    StorageAccount,
    BlobContainer,
    Blob,
    CognitiveAccount,
    WebApp,
    StorageMounts,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::ResourceGroup,
        ResourceKind::ComputePlan,
        ResourceKind::StorageAccount,
        ResourceKind::BlobContainer,
        ResourceKind::Blob,
        ResourceKind::CognitiveAccount,
        ResourceKind::WebApp,
        ResourceKind::StorageMounts,
    ];

    /// Schema entry for this kind
    pub fn schema(self) -> &'static KindSchema {
        match self {
            ResourceKind::ResourceGroup => &RESOURCE_GROUP,
            ResourceKind::ComputePlan => &COMPUTE_PLAN,
            ResourceKind::StorageAccount => &STORAGE_ACCOUNT,
            ResourceKind::BlobContainer => &BLOB_CONTAINER,
            ResourceKind::Blob => &BLOB,
            ResourceKind::CognitiveAccount => &COGNITIVE_ACCOUNT,
            ResourceKind::WebApp => &WEB_APP,
            ResourceKind::StorageMounts => &STORAGE_MOUNTS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "resource_group",
            ResourceKind::ComputePlan => "compute_plan",
            ResourceKind::StorageAccount => "storage_account",
            ResourceKind::BlobContainer => "blob_container",
            ResourceKind::Blob => "blob",
            ResourceKind::CognitiveAccount => "cognitive_account",
            ResourceKind::WebApp => "web_app",
            ResourceKind::StorageMounts => "storage_mounts",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one resource kind
///
/// `declare` validates property maps against `required` and `optional`;
/// handles only hand out deferred outputs listed in `outputs`.
#[derive(Debug)]
pub struct KindSchema {
    /// Provider type token forwarded to the apply engine
    pub type_token: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    pub outputs: &'static [&'static str],
    /// Read-only key listing query, if the kind exposes secrets
    pub secret_query: Option<&'static str>,
}

impl KindSchema {
    pub fn accepts(&self, field: &str) -> bool {
        self.required.contains(&field) || self.optional.contains(&field)
    }

    pub fn publishes(&self, output: &str) -> bool {
        self.outputs.contains(&output)
    }
}

static RESOURCE_GROUP: KindSchema = KindSchema {
    type_token: "azure-native:resources:ResourceGroup",
    required: &["resource_group_name"],
    optional: &["location", "tags"],
    outputs: &["id", "name", "location"],
    secret_query: None,
};

static COMPUTE_PLAN: KindSchema = KindSchema {
    type_token: "azure-native:web:AppServicePlan",
    required: &["resource_group_name", "name", "kind", "sku"],
    optional: &["reserved", "location"],
    outputs: &["id", "name"],
    secret_query: None,
};

static STORAGE_ACCOUNT: KindSchema = KindSchema {
    type_token: "azure-native:storage:StorageAccount",
    required: &["account_name", "resource_group_name", "sku", "kind"],
    optional: &["location"],
    outputs: &["id", "name", "primary_endpoints"],
    secret_query: Some("listStorageAccountKeys"),
};

static BLOB_CONTAINER: KindSchema = KindSchema {
    type_token: "azure-native:storage:BlobContainer",
    required: &[
        "account_name",
        "resource_group_name",
        "container_name",
        "public_access",
    ],
    optional: &[],
    outputs: &["id", "name"],
    secret_query: None,
};

static BLOB: KindSchema = KindSchema {
    type_token: "azure-native:storage:Blob",
    required: &[
        "account_name",
        "container_name",
        "resource_group_name",
        "blob_name",
        "source",
    ],
    optional: &["content_type"],
    outputs: &["id", "name", "url"],
    secret_query: None,
};

static COGNITIVE_ACCOUNT: KindSchema = KindSchema {
    type_token: "azure-native:cognitiveservices:Account",
    required: &["account_name", "resource_group_name", "kind", "sku", "location"],
    optional: &[],
    outputs: &["id", "name", "endpoint"],
    secret_query: Some("listAccountKeys"),
};

static WEB_APP: KindSchema = KindSchema {
    type_token: "azure-native:web:WebApp",
    required: &["name", "resource_group_name", "server_farm_id"],
    optional: &["site_config", "https_only", "location"],
    outputs: &["id", "name", "default_host_name"],
    secret_query: None,
};

static STORAGE_MOUNTS: KindSchema = KindSchema {
    type_token: "azure-native:web:WebAppAzureStorageAccounts",
    required: &["name", "resource_group_name", "properties"],
    optional: &[],
    outputs: &["id", "name"],
    secret_query: None,
};

/// Identity of a declaration inside a graph: `(kind, name)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Identity of one [`ResourceGraph`](crate::graph::ResourceGraph) instance
///
/// Handles and deferred outputs carry the id of the graph that issued them,
/// so two graphs declaring the same `(kind, name)` stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

impl GraphId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        GraphId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// How the engine orders a replacement of this resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplacePolicy {
    /// Create the replacement first, then delete the old resource
    #[default]
    ReplaceBeforeDelete,
    /// Delete the old resource before creating its replacement
    DeleteBeforeReplace,
}

impl std::fmt::Display for ReplacePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplacePolicy::ReplaceBeforeDelete => write!(f, "replace-before-delete"),
            ReplacePolicy::DeleteBeforeReplace => write!(f, "delete-before-replace"),
        }
    }
}

/// Per-declaration options forwarded to the engine
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    pub depends_on: Vec<Handle>,
    pub replace_policy: ReplacePolicy,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for the policy most of the beckshome resources use
    pub fn delete_before_replace() -> Self {
        Self::new().with_replace_policy(ReplacePolicy::DeleteBeforeReplace)
    }

    /// Order this declaration after `handle` even without a shared field
    pub fn depends_on(mut self, handle: &Handle) -> Self {
        self.depends_on.push(handle.clone());
        self
    }

    pub fn with_replace_policy(mut self, policy: ReplacePolicy) -> Self {
        self.replace_policy = policy;
        self
    }
}

/// Reference to a declared resource
///
/// The name is known at declaration time; everything else is a deferred
/// output that the engine fills in after apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    graph: GraphId,
    key: ResourceKey,
}

impl Handle {
    pub(crate) fn new(graph: GraphId, key: ResourceKey) -> Self {
        Self { graph, key }
    }

    /// Graph this resource was declared in
    pub fn graph(&self) -> GraphId {
        self.graph
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn kind(&self) -> ResourceKind {
        self.key.kind
    }

    /// Name chosen at declaration time
    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Deferred output published by this resource's kind
    pub fn output<T>(&self, field: &str) -> Result<Deferred<T>> {
        if !self.kind().schema().publishes(field) {
            return Err(CloudError::UnknownOutput {
                kind: self.kind(),
                field: field.to_string(),
            });
        }
        Ok(Deferred::output(self.graph, self.key.clone(), field))
    }

    /// Provider-assigned resource id
    pub fn id(&self) -> Deferred<String> {
        Deferred::output(self.graph, self.key.clone(), "id")
    }

    /// Name as reported by the engine; consuming it orders this resource first
    pub fn name_output(&self) -> Deferred<String> {
        Deferred::output(self.graph, self.key.clone(), "name")
    }

    /// Generated host name of a web application
    pub fn default_host_name(&self) -> Result<Deferred<String>> {
        self.output("default_host_name")
    }

    /// Deferred secret selected from this resource's key listing
    pub fn secret(&self, selector: SecretSelector) -> Result<Deferred<String>> {
        fetch_secret(self, selector)
    }
}

/// Query the resource's key listing at apply time and select one field
///
/// Nothing is read here; the returned value resolves only after the engine
/// has created the resource and recorded the query response.
pub fn fetch_secret(handle: &Handle, selector: SecretSelector) -> Result<Deferred<String>> {
    let query = handle
        .kind()
        .schema()
        .secret_query
        .ok_or(CloudError::NoSecretQuery(handle.kind()))?;
    Ok(Deferred::secret(handle.graph, handle.key.clone(), query, selector))
}
