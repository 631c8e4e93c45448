//! Resource graph accumulator
//!
//! Declarations are recorded in program order. Every declaration's
//! dependency set is the union of the resources its deferred inputs read
//! from and any explicit `depends_on` entries. A declaration may only refer
//! to resources that were declared before it in the same graph, so a graph
//! built through [`ResourceGraph::declare`] is acyclic by construction.

use crate::args::ResourceArgs;
use crate::deferred::{Deferred, Properties};
use crate::error::{CloudError, Result};
use crate::resource::{
    GraphId, Handle, ReplacePolicy, ResourceKey, ResourceKind, ResourceOptions,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// One recorded intent to manage a resource
#[derive(Debug, Clone)]
pub struct Declaration {
    pub key: ResourceKey,
    pub properties: Properties,
    /// Inferred and explicit dependencies
    pub depends_on: BTreeSet<ResourceKey>,
    /// Dependencies given through [`ResourceOptions::depends_on`]
    pub explicit_depends_on: Vec<ResourceKey>,
    pub replace_policy: ReplacePolicy,
}

/// Write-once graph of declarations and named outputs
#[derive(Debug)]
pub struct ResourceGraph {
    id: GraphId,
    name: String,
    declarations: Vec<Declaration>,
    index: HashMap<ResourceKey, usize>,
    outputs: Vec<(String, Deferred<String>)>,
}

impl ResourceGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GraphId::next(),
            name: name.into(),
            declarations: Vec::new(),
            index: HashMap::new(),
            outputs: Vec::new(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a declaration and return its handle
    ///
    /// Fails without touching the graph if `(kind, name)` is taken, if the
    /// properties do not match the kind's schema, or if any referenced
    /// resource has not been declared yet in this graph.
    pub fn declare(
        &mut self,
        kind: ResourceKind,
        name: impl Into<String>,
        properties: Properties,
        options: ResourceOptions,
    ) -> Result<Handle> {
        let key = ResourceKey::new(kind, name);
        if self.index.contains_key(&key) {
            return Err(CloudError::DuplicateName(key));
        }
        validate_properties(kind, &properties)?;

        let foreign = properties
            .values()
            .find_map(|input| input.foreign_source(self.id))
            .or_else(|| {
                options
                    .depends_on
                    .iter()
                    .find(|handle| handle.graph() != self.id)
                    .map(|handle| handle.key().clone())
            });
        if let Some(resource) = foreign {
            return Err(CloudError::InvalidReference {
                resource,
                referenced_by: key.to_string(),
            });
        }

        let explicit_depends_on: Vec<ResourceKey> = options
            .depends_on
            .iter()
            .map(|handle| handle.key().clone())
            .collect();
        let mut depends_on = BTreeSet::new();
        for input in properties.values() {
            input.collect_sources(&mut depends_on);
        }
        depends_on.extend(explicit_depends_on.iter().cloned());

        if let Some(missing) = depends_on.iter().find(|dep| !self.index.contains_key(*dep)) {
            return Err(CloudError::InvalidReference {
                resource: missing.clone(),
                referenced_by: key.to_string(),
            });
        }

        debug!(
            resource = %key,
            dependencies = depends_on.len(),
            replace_policy = %options.replace_policy,
            "Declared resource"
        );

        self.index.insert(key.clone(), self.declarations.len());
        self.declarations.push(Declaration {
            key: key.clone(),
            properties,
            depends_on,
            explicit_depends_on,
            replace_policy: options.replace_policy,
        });
        Ok(Handle::new(self.id, key))
    }

    /// Declare from a typed argument struct
    pub fn add<A: ResourceArgs>(
        &mut self,
        name: impl Into<String>,
        args: A,
        options: ResourceOptions,
    ) -> Result<Handle> {
        let properties = args.into_properties()?;
        self.declare(A::KIND, name, properties, options)
    }

    /// Publish a named output
    pub fn export(&mut self, name: impl Into<String>, value: Deferred<String>) -> Result<()> {
        let name = name.into();
        if self.outputs.iter().any(|(existing, _)| *existing == name) {
            return Err(CloudError::DuplicateOutput(name));
        }
        let missing = value.expr().foreign_source(self.id).or_else(|| {
            value
                .sources()
                .into_iter()
                .find(|s| !self.index.contains_key(s))
        });
        if let Some(missing) = missing {
            return Err(CloudError::InvalidReference {
                resource: missing,
                referenced_by: format!("output {name}"),
            });
        }
        debug!(output = %name, "Exported output");
        self.outputs.push((name, value));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Declaration> {
        self.index.get(key).map(|&i| &self.declarations[i])
    }

    /// Declarations in program order
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn outputs(&self) -> &[(String, Deferred<String>)] {
        &self.outputs
    }

    pub fn output(&self, name: &str) -> Option<&Deferred<String>> {
        self.outputs
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// Every `(from, to)` edge: `from` must exist before `to`
    pub fn edges(&self) -> Vec<(ResourceKey, ResourceKey)> {
        self.declarations
            .iter()
            .flat_map(|decl| {
                decl.depends_on
                    .iter()
                    .map(move |dep| (dep.clone(), decl.key.clone()))
            })
            .collect()
    }

    pub fn dependencies_of(&self, key: &ResourceKey) -> Option<&BTreeSet<ResourceKey>> {
        self.get(key).map(|decl| &decl.depends_on)
    }

    /// Declarations that depend directly on `key`
    pub fn dependents_of(&self, key: &ResourceKey) -> Vec<&ResourceKey> {
        self.declarations
            .iter()
            .filter(|decl| decl.depends_on.contains(key))
            .map(|decl| &decl.key)
            .collect()
    }

    pub fn count_by_kind(&self) -> BTreeMap<ResourceKind, usize> {
        let mut counts = BTreeMap::new();
        for decl in &self.declarations {
            *counts.entry(decl.key.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Dependency order; ties keep declaration order
    pub fn topological_order(&self) -> Result<Vec<&Declaration>> {
        let mut pending: Vec<usize> = self
            .declarations
            .iter()
            .map(|decl| decl.depends_on.len())
            .collect();
        let mut ready: BTreeSet<usize> = pending
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.declarations.len());
        while let Some(i) = ready.pop_first() {
            let decl = &self.declarations[i];
            order.push(decl);
            for (j, other) in self.declarations.iter().enumerate() {
                if other.depends_on.contains(&decl.key) {
                    pending[j] -= 1;
                    if pending[j] == 0 {
                        ready.insert(j);
                    }
                }
            }
        }

        if order.len() != self.declarations.len() {
            let stuck: Vec<String> = pending
                .iter()
                .enumerate()
                .filter(|(_, count)| **count > 0)
                .map(|(i, _)| self.declarations[i].key.to_string())
                .collect();
            return Err(CloudError::CircularDependency(stuck.join(", ")));
        }
        Ok(order)
    }
}

fn validate_properties(kind: ResourceKind, properties: &Properties) -> Result<()> {
    let schema = kind.schema();
    if let Some(field) = properties.keys().find(|field| !schema.accepts(field)) {
        return Err(CloudError::UnknownField {
            kind,
            field: field.clone(),
        });
    }
    if let Some(field) = schema
        .required
        .iter()
        .find(|field| !properties.contains_key(**field))
    {
        return Err(CloudError::MissingField {
            kind,
            field: field.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::{Input, SecretSelector, format};
    use crate::resource::fetch_secret;

    fn group_props(name: &str) -> Properties {
        Properties::from([("resource_group_name".to_string(), Input::from(name))])
    }

    fn account_props(group: &Handle, name: &str) -> Properties {
        Properties::from([
            ("account_name".to_string(), Input::from(name)),
            ("resource_group_name".to_string(), Input::from(group.name_output())),
            ("sku".to_string(), Input::map([("name", "Standard_LRS")])),
            ("kind".to_string(), Input::from("StorageV2")),
        ])
    }

    fn names(order: &[&Declaration]) -> Vec<String> {
        order.iter().map(|d| d.key.name.clone()).collect()
    }

    #[test]
    fn test_reference_to_undeclared_resource_fails() {
        let mut scratch = ResourceGraph::new("scratch");
        let group = scratch
            .declare(
                ResourceKind::ResourceGroup,
                "rg1",
                group_props("rg1"),
                ResourceOptions::new(),
            )
            .unwrap();

        let mut graph = ResourceGraph::new("main");
        let err = graph
            .declare(
                ResourceKind::StorageAccount,
                "sa1",
                account_props(&group, "sa1"),
                ResourceOptions::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CloudError::InvalidReference { ref resource, .. } if resource.name == "rg1"
        ));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_reference_fails_for_every_declaration_order() {
        // Declare a prefix of [rg, sa] and reference the one left out.
        let mut scratch = ResourceGraph::new("scratch");
        let group = scratch.add_test_group("rg1").unwrap();
        let account = scratch
            .declare(
                ResourceKind::StorageAccount,
                "sa1",
                account_props(&group, "sa1"),
                ResourceOptions::new(),
            )
            .unwrap();

        for declared_first in [false, true] {
            let mut graph = ResourceGraph::new("main");
            if declared_first {
                graph.add_test_group("rg1").unwrap();
            }
            let key = fetch_secret(&account, SecretSelector::Index(0)).unwrap();
            let err = graph
                .declare(
                    ResourceKind::BlobContainer,
                    "c1",
                    Properties::from([
                        ("account_name".to_string(), Input::from(&key)),
                        ("resource_group_name".to_string(), Input::from("rg1")),
                        ("container_name".to_string(), Input::from("c1")),
                        ("public_access".to_string(), Input::from("None")),
                    ]),
                    ResourceOptions::new(),
                )
                .unwrap_err();
            assert!(matches!(err, CloudError::InvalidReference { .. }));
        }
    }

    #[test]
    fn test_handle_from_graph_with_same_key_fails() {
        let mut other = ResourceGraph::new("other");
        let foreign = other.add_test_group("rg").unwrap();

        let mut graph = ResourceGraph::new("main");
        let local = graph.add_test_group("rg").unwrap();
        assert_eq!(local.key(), foreign.key());

        let err = graph
            .declare(
                ResourceKind::StorageAccount,
                "sa",
                account_props(&foreign, "sa"),
                ResourceOptions::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CloudError::InvalidReference { ref resource, .. } if resource == foreign.key()
        ));

        let err = graph
            .declare(
                ResourceKind::ResourceGroup,
                "after",
                group_props("after"),
                ResourceOptions::new().depends_on(&foreign),
            )
            .unwrap_err();
        assert!(matches!(err, CloudError::InvalidReference { .. }));

        assert!(matches!(
            graph.export("GroupId", foreign.id()),
            Err(CloudError::InvalidReference { .. })
        ));
        assert_eq!(graph.len(), 1);
        assert!(graph.outputs().is_empty());

        graph
            .declare(
                ResourceKind::StorageAccount,
                "sa",
                account_props(&local, "sa"),
                ResourceOptions::new(),
            )
            .unwrap();
    }

    #[test]
    fn test_duplicate_name_fails_for_every_kind() {
        for kind in ResourceKind::ALL {
            let mut graph = ResourceGraph::new("dup");
            let props: Properties = kind
                .schema()
                .required
                .iter()
                .map(|field| (field.to_string(), Input::from("x")))
                .collect();
            graph
                .declare(kind, "same", props.clone(), ResourceOptions::new())
                .unwrap();
            let err = graph
                .declare(kind, "same", props, ResourceOptions::new())
                .unwrap_err();
            assert!(matches!(err, CloudError::DuplicateName(ref key) if key.kind == kind));
            assert_eq!(graph.len(), 1);
        }
    }

    #[test]
    fn test_same_name_different_kind_is_allowed() {
        let mut graph = ResourceGraph::new("names");
        graph.add_test_group("shared").unwrap();
        graph
            .declare(
                ResourceKind::ComputePlan,
                "shared",
                Properties::from([
                    ("resource_group_name".to_string(), Input::from("shared")),
                    ("name".to_string(), Input::from("shared")),
                    ("kind".to_string(), Input::from("Linux")),
                    ("sku".to_string(), Input::map([("name", "B1")])),
                ]),
                ResourceOptions::new(),
            )
            .unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_schema_validation() {
        let mut graph = ResourceGraph::new("schema");
        let err = graph
            .declare(
                ResourceKind::ResourceGroup,
                "rg",
                Properties::new(),
                ResourceOptions::new(),
            )
            .unwrap_err();
        assert!(matches!(err, CloudError::MissingField { .. }));

        let mut props = group_props("rg");
        props.insert("color".to_string(), Input::from("blue"));
        let err = graph
            .declare(ResourceKind::ResourceGroup, "rg", props, ResourceOptions::new())
            .unwrap_err();
        assert!(matches!(err, CloudError::UnknownField { ref field, .. } if field == "color"));
    }

    #[test]
    fn test_deferred_reference_creates_edge() {
        let mut graph = ResourceGraph::new("edges");
        let group = graph.add_test_group("rg1").unwrap();
        let account = graph
            .declare(
                ResourceKind::StorageAccount,
                "sa1",
                account_props(&group, "sa1"),
                ResourceOptions::new(),
            )
            .unwrap();

        let edges = graph.edges();
        assert!(edges.contains(&(group.key().clone(), account.key().clone())));
        assert_eq!(graph.dependents_of(group.key()), vec![account.key()]);
    }

    #[test]
    fn test_explicit_depends_on_creates_edge() {
        let mut graph = ResourceGraph::new("explicit");
        let first = graph.add_test_group("first").unwrap();
        let second = graph
            .declare(
                ResourceKind::ResourceGroup,
                "second",
                group_props("second"),
                ResourceOptions::new().depends_on(&first),
            )
            .unwrap();

        let decl = graph.get(second.key()).unwrap();
        assert_eq!(decl.explicit_depends_on, vec![first.key().clone()]);
        assert!(graph.edges().contains(&(first.key().clone(), second.key().clone())));
    }

    #[test]
    fn test_storage_chain_order() {
        let mut graph = ResourceGraph::new("chain");
        let group = graph.add_test_group("rg1").unwrap();
        let account = graph
            .declare(
                ResourceKind::StorageAccount,
                "sa1",
                account_props(&group, "sa1"),
                ResourceOptions::new(),
            )
            .unwrap();
        let container = graph
            .declare(
                ResourceKind::BlobContainer,
                "c1",
                Properties::from([
                    ("account_name".to_string(), Input::from(account.name_output())),
                    ("resource_group_name".to_string(), Input::from(group.name_output())),
                    ("container_name".to_string(), Input::from("c1")),
                    ("public_access".to_string(), Input::from("None")),
                ]),
                ResourceOptions::new(),
            )
            .unwrap();
        graph
            .declare(
                ResourceKind::Blob,
                "b1",
                Properties::from([
                    ("account_name".to_string(), Input::from(account.name_output())),
                    ("container_name".to_string(), Input::from(container.name_output())),
                    ("resource_group_name".to_string(), Input::from(group.name_output())),
                    ("blob_name".to_string(), Input::from("x.json")),
                    ("source".to_string(), Input::from("x.json")),
                ]),
                ResourceOptions::new(),
            )
            .unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(names(&order), vec!["rg1", "sa1", "c1", "b1"]);
    }

    #[test]
    fn test_topological_order_keeps_declaration_order_for_ties() {
        let mut graph = ResourceGraph::new("ties");
        graph.add_test_group("b").unwrap();
        graph.add_test_group("a").unwrap();
        graph.add_test_group("c").unwrap();
        assert_eq!(names(&graph.topological_order().unwrap()), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_topological_order_reports_cycle() {
        // Unreachable through declare; built directly to cover the guard.
        let mut graph = ResourceGraph::new("cycle");
        let a = ResourceKey::new(ResourceKind::ResourceGroup, "a");
        let b = ResourceKey::new(ResourceKind::ResourceGroup, "b");
        for (key, dep) in [(a.clone(), b.clone()), (b.clone(), a.clone())] {
            graph.index.insert(key.clone(), graph.declarations.len());
            graph.declarations.push(Declaration {
                key,
                properties: group_props("x"),
                depends_on: BTreeSet::from([dep]),
                explicit_depends_on: Vec::new(),
                replace_policy: ReplacePolicy::default(),
            });
        }
        graph.add_test_group("free").unwrap();

        match graph.topological_order() {
            Err(CloudError::CircularDependency(stuck)) => {
                assert_eq!(stuck, "resource_group:a, resource_group:b")
            }
            other => panic!("Expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_export_checks_names_and_references() {
        let mut graph = ResourceGraph::new("outputs");
        let group = graph.add_test_group("rg").unwrap();
        let id = format("{0}", [group.id()]).unwrap();
        graph.export("GroupId", id.clone()).unwrap();
        assert!(matches!(
            graph.export("GroupId", id),
            Err(CloudError::DuplicateOutput(_))
        ));

        let mut other = ResourceGraph::new("other");
        assert!(matches!(
            other.export("GroupId", group.id()),
            Err(CloudError::InvalidReference { .. })
        ));
        assert!(graph.output("GroupId").is_some());
    }

    impl ResourceGraph {
        fn add_test_group(&mut self, name: &str) -> Result<Handle> {
            self.declare(
                ResourceKind::ResourceGroup,
                name,
                group_props(name),
                ResourceOptions::new(),
            )
        }
    }
}
