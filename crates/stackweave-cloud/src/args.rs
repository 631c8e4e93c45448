//! Typed argument structs for each resource kind
//!
//! Each struct lowers into the generic [`Properties`] map checked by the
//! schema table, so every kind goes through the same `declare` path.
//! Parent resources are passed as [`Handle`]s and become deferred `name` or
//! `id` references, which is what creates the dependency edges.

use crate::asset::{Deployment, FileAsset};
use crate::deferred::{Input, Properties};
use crate::error::Result;
use crate::resource::{Handle, ResourceKind};
use serde::{Deserialize, Serialize};

/// Conversion from a typed argument struct into a property map
pub trait ResourceArgs {
    const KIND: ResourceKind;

    fn into_properties(self) -> Result<Properties>;
}

fn props<const N: usize>(entries: [(&str, Input); N]) -> Properties {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// SKU descriptor shared by plans, storage and managed services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sku {
    pub name: String,
    pub tier: Option<String>,
}

impl Sku {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier: None,
        }
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }
}

impl From<Sku> for Input {
    fn from(sku: Sku) -> Self {
        let mut entries = vec![("name", Input::from(sku.name))];
        if let Some(tier) = sku.tier {
            entries.push(("tier", Input::from(tier)));
        }
        Input::map(entries)
    }
}

#[derive(Debug, Clone)]
pub struct ResourceGroupArgs {
    pub resource_group_name: String,
    pub location: Option<String>,
}

impl ResourceGroupArgs {
    pub fn new(resource_group_name: impl Into<String>) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            location: None,
        }
    }
}

impl ResourceArgs for ResourceGroupArgs {
    const KIND: ResourceKind = ResourceKind::ResourceGroup;

    fn into_properties(self) -> Result<Properties> {
        let mut properties = props([("resource_group_name", self.resource_group_name.into())]);
        if let Some(location) = self.location {
            properties.insert("location".to_string(), location.into());
        }
        Ok(properties)
    }
}

/// OS family of a compute plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanKind {
    Linux,
    /// Windows app plan
    App,
}

impl std::fmt::Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanKind::Linux => write!(f, "Linux"),
            PlanKind::App => write!(f, "App"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComputePlanArgs {
    pub resource_group: Handle,
    pub name: String,
    pub kind: PlanKind,
    pub sku: Sku,
}

impl ResourceArgs for ComputePlanArgs {
    const KIND: ResourceKind = ResourceKind::ComputePlan;

    fn into_properties(self) -> Result<Properties> {
        let mut properties = props([
            ("resource_group_name", self.resource_group.name_output().into()),
            ("name", self.name.into()),
            ("kind", self.kind.to_string().into()),
            ("sku", self.sku.into()),
        ]);
        // Linux plans are only accepted with the reserved flag set
        if self.kind == PlanKind::Linux {
            properties.insert("reserved".to_string(), true.into());
        }
        Ok(properties)
    }
}

#[derive(Debug, Clone)]
pub struct StorageAccountArgs {
    pub account_name: String,
    pub resource_group: Handle,
    /// Replication SKU, e.g. `Standard_LRS`
    pub sku: Sku,
    /// Account kind, e.g. `StorageV2`
    pub kind: String,
}

impl ResourceArgs for StorageAccountArgs {
    const KIND: ResourceKind = ResourceKind::StorageAccount;

    fn into_properties(self) -> Result<Properties> {
        Ok(props([
            ("account_name", self.account_name.into()),
            ("resource_group_name", self.resource_group.name_output().into()),
            ("sku", self.sku.into()),
            ("kind", self.kind.into()),
        ]))
    }
}

/// Anonymous read access for a container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicAccess {
    #[default]
    None,
    /// Anonymous read for blobs, no listing
    Blob,
    Container,
}

impl std::fmt::Display for PublicAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublicAccess::None => write!(f, "None"),
            PublicAccess::Blob => write!(f, "Blob"),
            PublicAccess::Container => write!(f, "Container"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlobContainerArgs {
    pub account: Handle,
    pub resource_group: Handle,
    pub container_name: String,
    pub public_access: PublicAccess,
}

impl ResourceArgs for BlobContainerArgs {
    const KIND: ResourceKind = ResourceKind::BlobContainer;

    fn into_properties(self) -> Result<Properties> {
        Ok(props([
            ("account_name", self.account.name_output().into()),
            ("resource_group_name", self.resource_group.name_output().into()),
            ("container_name", self.container_name.into()),
            ("public_access", self.public_access.to_string().into()),
        ]))
    }
}

#[derive(Debug, Clone)]
pub struct BlobArgs {
    pub account: Handle,
    pub container: Handle,
    pub resource_group: Handle,
    pub blob_name: String,
    pub source: FileAsset,
}

impl ResourceArgs for BlobArgs {
    const KIND: ResourceKind = ResourceKind::Blob;

    fn into_properties(self) -> Result<Properties> {
        Ok(props([
            ("account_name", self.account.name_output().into()),
            ("container_name", self.container.name_output().into()),
            ("resource_group_name", self.resource_group.name_output().into()),
            ("blob_name", self.blob_name.into()),
            ("source", self.source.to_source_json()?.into()),
        ]))
    }
}

#[derive(Debug, Clone)]
pub struct CognitiveAccountArgs {
    pub account_name: String,
    pub resource_group: Handle,
    /// Service kind, e.g. `TextTranslation`
    pub kind: String,
    pub sku: Sku,
    pub location: String,
}

impl ResourceArgs for CognitiveAccountArgs {
    const KIND: ResourceKind = ResourceKind::CognitiveAccount;

    fn into_properties(self) -> Result<Properties> {
        Ok(props([
            ("account_name", self.account_name.into()),
            ("resource_group_name", self.resource_group.name_output().into()),
            ("kind", self.kind.into()),
            ("sku", self.sku.into()),
            ("location", self.location.into()),
        ]))
    }
}

/// Runtime configuration of a web application
#[derive(Debug, Clone, Default)]
pub struct SiteConfig {
    /// Environment variables in declaration order
    pub app_settings: Vec<(String, Input)>,
    pub always_on: bool,
    pub deployment: Option<Deployment>,
}

impl SiteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn setting(mut self, name: impl Into<String>, value: impl Into<Input>) -> Self {
        self.app_settings.push((name.into(), value.into()));
        self
    }

    pub fn always_on(mut self, always_on: bool) -> Self {
        self.always_on = always_on;
        self
    }

    pub fn deployment(mut self, deployment: Deployment) -> Self {
        self.deployment = Some(deployment);
        self
    }

    fn into_input(self) -> Result<Input> {
        let settings = self
            .app_settings
            .into_iter()
            .map(|(name, value)| Input::map([("name", Input::from(name)), ("value", value)]))
            .collect::<Vec<_>>();
        let mut entries = vec![
            ("app_settings", Input::List(settings)),
            ("always_on", Input::from(self.always_on)),
        ];
        if let Some(deployment) = self.deployment {
            entries.push(("linux_fx_version", Input::from(deployment.descriptor()?)));
        }
        Ok(Input::map(entries))
    }
}

#[derive(Debug, Clone)]
pub struct WebAppArgs {
    pub name: String,
    pub resource_group: Handle,
    pub plan: Handle,
    pub site_config: Option<SiteConfig>,
    pub https_only: bool,
}

impl ResourceArgs for WebAppArgs {
    const KIND: ResourceKind = ResourceKind::WebApp;

    fn into_properties(self) -> Result<Properties> {
        let mut properties = props([
            ("name", self.name.into()),
            ("resource_group_name", self.resource_group.name_output().into()),
            ("server_farm_id", self.plan.id().into()),
        ]);
        if let Some(site_config) = self.site_config {
            properties.insert("site_config".to_string(), site_config.into_input()?);
        }
        if self.https_only {
            properties.insert("https_only".to_string(), true.into());
        }
        Ok(properties)
    }
}

/// Backing service of a mounted share
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    #[default]
    AzureBlob,
    AzureFiles,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::AzureBlob => write!(f, "AzureBlob"),
            StorageType::AzureFiles => write!(f, "AzureFiles"),
        }
    }
}

/// Storage share mounted into an application
#[derive(Debug, Clone)]
pub struct StorageMount {
    pub account_name: String,
    pub share_name: String,
    pub mount_path: String,
    pub access_key: Input,
    pub storage_type: StorageType,
}

impl From<StorageMount> for Input {
    fn from(mount: StorageMount) -> Self {
        Input::map([
            ("access_key", mount.access_key),
            ("account_name", Input::from(mount.account_name)),
            ("mount_path", Input::from(mount.mount_path)),
            ("share_name", Input::from(mount.share_name)),
            ("type", Input::from(mount.storage_type.to_string())),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct StorageMountsArgs {
    pub app: Handle,
    pub resource_group: Handle,
    /// Mount name → mount
    pub mounts: Vec<(String, StorageMount)>,
}

impl ResourceArgs for StorageMountsArgs {
    const KIND: ResourceKind = ResourceKind::StorageMounts;

    fn into_properties(self) -> Result<Properties> {
        Ok(props([
            ("name", self.app.name_output().into()),
            ("resource_group_name", self.resource_group.name_output().into()),
            ("properties", Input::map(self.mounts)),
        ]))
    }
}
