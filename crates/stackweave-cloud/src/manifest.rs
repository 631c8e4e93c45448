//! Manifest handed to the apply engine

use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::resource::{ReplacePolicy, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MANIFEST_VERSION: u32 = 1;

/// One declaration as the engine sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// `kind:name`
    pub key: String,

    pub kind: ResourceKind,

    /// Provider type token (e.g. "azure-native:web:WebApp")
    pub type_token: String,

    pub name: String,

    /// Properties with deferred values in tagged form
    pub properties: serde_json::Value,

    /// Keys of declarations that must be applied first
    pub depends_on: Vec<String>,

    pub replace_policy: ReplacePolicy,
}

/// Full description of a graph, ordered so that dependencies come first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,

    /// Stack name
    pub stack: String,

    pub resources: Vec<ManifestEntry>,

    /// Output name → tagged deferred value
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl Manifest {
    pub fn from_graph(graph: &ResourceGraph) -> Result<Self> {
        let resources = graph
            .topological_order()?
            .into_iter()
            .map(|decl| ManifestEntry {
                key: decl.key.to_string(),
                kind: decl.key.kind,
                type_token: decl.key.kind.schema().type_token.to_string(),
                name: decl.key.name.clone(),
                properties: serde_json::Value::Object(
                    decl.properties
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_manifest_json()))
                        .collect(),
                ),
                depends_on: decl.depends_on.iter().map(ToString::to_string).collect(),
                replace_policy: decl.replace_policy,
            })
            .collect::<Vec<_>>();

        let outputs = graph
            .outputs()
            .iter()
            .map(|(name, value)| (name.clone(), value.expr().to_manifest_json()))
            .collect();

        tracing::info!(
            stack = graph.name(),
            resources = resources.len(),
            "Built manifest"
        );

        Ok(Self {
            version: MANIFEST_VERSION,
            stack: graph.name().to_string(),
            resources,
            outputs,
        })
    }

    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.resources.iter().find(|entry| entry.key == key)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn summary(&self) -> ManifestSummary {
        let mut by_kind = BTreeMap::new();
        for entry in &self.resources {
            *by_kind.entry(entry.kind).or_insert(0) += 1;
        }
        ManifestSummary {
            resources: self.resources.len(),
            edges: self.resources.iter().map(|e| e.depends_on.len()).sum(),
            outputs: self.outputs.len(),
            by_kind,
        }
    }
}

/// Counts shown by the CLI
#[derive(Debug, Clone)]
pub struct ManifestSummary {
    pub resources: usize,
    pub edges: usize,
    pub outputs: usize,
    pub by_kind: BTreeMap<ResourceKind, usize>,
}

impl std::fmt::Display for ManifestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} resources, {} dependency edges, {} outputs",
            self.resources, self.edges, self.outputs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{ResourceGroupArgs, Sku, StorageAccountArgs};
    use crate::deferred::{SecretSelector, format};
    use crate::resource::ResourceOptions;

    fn sample_graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new("sample");
        let group = graph
            .add(
                "rg",
                ResourceGroupArgs::new("rg"),
                ResourceOptions::delete_before_replace(),
            )
            .unwrap();
        let account = graph
            .add(
                "sa",
                StorageAccountArgs {
                    account_name: "sa".to_string(),
                    resource_group: group,
                    sku: Sku::new("Standard_LRS"),
                    kind: "StorageV2".to_string(),
                },
                ResourceOptions::new(),
            )
            .unwrap();
        let key = account.secret(SecretSelector::Index(0)).unwrap();
        graph
            .export("Conn", format("AccountKey={0}", [key]).unwrap())
            .unwrap();
        graph
    }

    #[test]
    fn test_manifest_orders_and_tags() {
        let manifest = Manifest::from_graph(&sample_graph()).unwrap();
        assert_eq!(manifest.resources.len(), 2);
        assert_eq!(manifest.resources[0].key, "resource_group:rg");
        assert_eq!(
            manifest.resources[0].replace_policy,
            ReplacePolicy::DeleteBeforeReplace
        );

        let account = manifest.get("storage_account:sa").unwrap();
        assert_eq!(account.type_token, "azure-native:storage:StorageAccount");
        assert_eq!(account.depends_on, vec!["resource_group:rg".to_string()]);
        assert_eq!(
            account.properties["resource_group_name"]["$output"]["field"],
            "name"
        );

        let conn = &manifest.outputs["Conn"]["$format"];
        assert_eq!(conn["template"], "AccountKey={0}");
        assert_eq!(conn["args"][0]["$secret"]["query"], "listStorageAccountKeys");
    }

    #[test]
    fn test_manifest_json_roundtrips_through_serde() {
        let manifest = Manifest::from_graph(&sample_graph()).unwrap();
        let json = manifest.to_json_pretty().unwrap();
        let parsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.stack, "sample");
        assert_eq!(parsed.summary().to_string(), "2 resources, 1 dependency edges, 1 outputs");
    }
}
