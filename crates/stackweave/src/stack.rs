//! The beckshome stack
//!
//! One resource group holding a Linux and a Windows plan, a storage account
//! with four containers of configuration blobs, a translation service and
//! five web apps. Keys and URLs that only exist after apply are wired into
//! app settings and storage mounts as deferred values.

use stackweave_cloud::{
    BlobArgs, BlobContainerArgs, CognitiveAccountArgs, ComputePlanArgs, Deferred, Deployment,
    FileAsset, Handle, Input, PlanKind, PublicAccess, ResourceGraph, ResourceGroupArgs,
    ResourceOptions, Result, SecretSelector, SiteConfig, Sku, StorageAccountArgs, StorageMount,
    StorageMountsArgs, StorageType, WebAppArgs, deferred_format, fetch_secret,
};
use stackweave_config::StackConfig;

const RESOURCE_GROUP: &str = "beckshome-pulumi-rg";
const LINUX_PLAN: &str = "beckshome-pulumi-plan";
const WINDOWS_PLAN: &str = "beckshome-pulumi-windows-plan";
const STORAGE_ACCOUNT: &str = "beckshomestorage";
const COGNITIVE_ACCOUNT: &str = "beckshome-translation-2";
const MOUNT_PATH: &str = "/app/config";

/// Container, its public access, and its blobs as (resource suffix, blob name, source)
type ContainerSpec = (
    &'static str,
    PublicAccess,
    &'static [(&'static str, &'static str, &'static str)],
);

const CONTAINERS: [ContainerSpec; 4] = [
    (
        "blazor-chat",
        PublicAccess::None,
        &[(
            "appsettings",
            "appsettings.json",
            "blobs/blazor-chat/appsettings.json",
        )],
    ),
    (
        "container",
        PublicAccess::None,
        &[
            (
                "appsettings",
                "appsettings.json",
                "blobs/container/appsettings.json",
            ),
            (
                "secrets",
                "client_secrets.json",
                "blobs/container/client_secrets.json",
            ),
        ],
    ),
    (
        "private",
        PublicAccess::None,
        &[(
            "appsettings",
            "appsettings.json",
            "blobs/private/appsettings.json",
        )],
    ),
    (
        "public",
        PublicAccess::Blob,
        &[(
            "rosslyn-classes",
            "rosslyn-classes.txt",
            "blobs/public/rosslyn-classes.txt",
        )],
    ),
];

struct Ctx<'a> {
    config: &'a StackConfig,
    group: Handle,
    linux_plan: Handle,
}

impl Ctx<'_> {
    fn asset(&self, relative: &str) -> FileAsset {
        FileAsset::in_dir(&self.config.asset_dir, relative)
    }

    /// Linux web app deployed from a compose file
    fn compose_app(
        &self,
        graph: &mut ResourceGraph,
        name: &str,
        compose_file: &str,
        settings: Vec<(&str, Input)>,
    ) -> Result<Handle> {
        let mut site = SiteConfig::new().setting("WEBSITES_ENABLE_APP_SERVICE_STORAGE", "false");
        for (key, value) in settings {
            site = site.setting(key, value);
        }
        let site = site
            .always_on(true)
            .deployment(Deployment::compose(self.asset(compose_file)));

        graph.add(
            name,
            WebAppArgs {
                name: name.to_string(),
                resource_group: self.group.clone(),
                plan: self.linux_plan.clone(),
                site_config: Some(site),
                https_only: true,
            },
            ResourceOptions::delete_before_replace(),
        )
    }

    /// Mount a storage share at /app/config
    fn mount(
        &self,
        graph: &mut ResourceGraph,
        app: &Handle,
        share: &str,
        access_key: &Input,
    ) -> Result<Handle> {
        graph.add(
            format!("{}-storage", app.name()),
            StorageMountsArgs {
                app: app.clone(),
                resource_group: self.group.clone(),
                mounts: vec![(
                    "azure-mount".to_string(),
                    StorageMount {
                        account_name: STORAGE_ACCOUNT.to_string(),
                        share_name: share.to_string(),
                        mount_path: MOUNT_PATH.to_string(),
                        access_key: access_key.clone(),
                        storage_type: StorageType::AzureBlob,
                    },
                )],
            },
            ResourceOptions::new(),
        )
    }
}

/// Declare the whole stack; any construction error aborts before a graph exists
pub fn define(config: &StackConfig) -> Result<ResourceGraph> {
    let mut graph = ResourceGraph::new(&config.name);

    let group = graph.add(
        RESOURCE_GROUP,
        ResourceGroupArgs::new(RESOURCE_GROUP),
        ResourceOptions::delete_before_replace(),
    )?;

    let linux_plan = graph.add(
        LINUX_PLAN,
        ComputePlanArgs {
            resource_group: group.clone(),
            name: LINUX_PLAN.to_string(),
            kind: PlanKind::Linux,
            sku: Sku::new("B2").with_tier("Basic"),
        },
        ResourceOptions::delete_before_replace(),
    )?;

    let windows_plan = graph.add(
        WINDOWS_PLAN,
        ComputePlanArgs {
            resource_group: group.clone(),
            name: WINDOWS_PLAN.to_string(),
            kind: PlanKind::App,
            sku: Sku::new("B1").with_tier("Basic"),
        },
        ResourceOptions::delete_before_replace(),
    )?;

    let ctx = Ctx {
        config,
        group,
        linux_plan,
    };

    // Storage tree
    let storage = graph.add(
        "beckhome-storage",
        StorageAccountArgs {
            account_name: STORAGE_ACCOUNT.to_string(),
            resource_group: ctx.group.clone(),
            sku: Sku::new("Standard_LRS"),
            kind: "StorageV2".to_string(),
        },
        ResourceOptions::new(),
    )?;

    for (container_name, public_access, blobs) in CONTAINERS {
        let container = graph.add(
            format!("beckshome-storage-{container_name}"),
            BlobContainerArgs {
                account: storage.clone(),
                resource_group: ctx.group.clone(),
                container_name: container_name.to_string(),
                public_access,
            },
            ResourceOptions::new(),
        )?;
        for &(suffix, blob_name, source) in blobs {
            graph.add(
                format!("beckshome-storage-{container_name}-{suffix}"),
                BlobArgs {
                    account: storage.clone(),
                    container: container.clone(),
                    resource_group: ctx.group.clone(),
                    blob_name: blob_name.to_string(),
                    source: ctx.asset(source),
                },
                ResourceOptions::new(),
            )?;
        }
    }

    let storage_key = fetch_secret(&storage, SecretSelector::Index(0))?;
    let connection_string = deferred_format!(
        "DefaultEndpointsProtocol=https;AccountName={0};AccountKey={1};EndpointSuffix=core.windows.net",
        storage.name_output(),
        &storage_key
    )?;
    let class_url = deferred_format!(
        "https://{0}.blob.core.windows.net/public/rosslyn-classes.txt",
        storage.name_output()
    )?;

    let cognitive = graph.add(
        COGNITIVE_ACCOUNT,
        CognitiveAccountArgs {
            account_name: COGNITIVE_ACCOUNT.to_string(),
            resource_group: ctx.group.clone(),
            kind: "TextTranslation".to_string(),
            sku: Sku::new("S1"),
            location: config.location.clone(),
        },
        ResourceOptions::delete_before_replace(),
    )?;
    let cognitive_key = fetch_secret(&cognitive, SecretSelector::Field("key1".to_string()))?;

    let key_input = Input::from(&storage_key);

    let blazor_crud = ctx.compose_app(
        &mut graph,
        "becksblazor",
        "docker/docker-compose-blazorcrud.yml",
        vec![],
    )?;

    let rosetta_stone = ctx.compose_app(
        &mut graph,
        "dotnet-signalr-rosetta-stone",
        "docker/docker-compose-rosetta-stone.yml",
        vec![
            (
                "HubConfiguration__Url",
                Input::from("https://dotnet-signalr-rosetta-stone.azurewebsites.net"),
            ),
            ("AzureSpeech__SubscriptionKey", Input::from(&cognitive_key)),
            ("AzureSpeech__Location", Input::from(config.location.as_str())),
        ],
    )?;
    ctx.mount(&mut graph, &rosetta_stone, "blazor-chat", &key_input)?;

    // The static appsettings.json in the private container still carries its
    // own connection string; these settings take precedence at runtime.
    let roslyn_api = ctx.compose_app(
        &mut graph,
        "dotnet-roslyn-dynamic-api",
        "docker/docker-compose-roslyn-api.yml",
        vec![
            ("AzureBlob__ConnectionString", Input::from(&connection_string)),
            ("AzureBlob__Url", Input::from(&class_url)),
        ],
    )?;
    ctx.mount(&mut graph, &roslyn_api, "private", &key_input)?;

    let sheets_notification = ctx.compose_app(
        &mut graph,
        "dotnet-sheets-notification",
        "docker/docker-compose-sheets-notification.yml",
        vec![],
    )?;
    ctx.mount(&mut graph, &sheets_notification, "container", &key_input)?;

    let blog = graph.add(
        "dotnet-statiq-beckshome-blog",
        WebAppArgs {
            name: "dotnet-statiq-beckshome-blog".to_string(),
            resource_group: ctx.group.clone(),
            plan: windows_plan,
            site_config: None,
            https_only: false,
        },
        ResourceOptions::delete_before_replace(),
    )?;

    let endpoint = |app: &Handle| -> Result<Deferred<String>> {
        deferred_format!("https://{0}", app.default_host_name()?)
    };
    graph.export("BlazorCrudEndpoint", endpoint(&blazor_crud)?)?;
    graph.export("RosettaStoneEndpoint", endpoint(&rosetta_stone)?)?;
    graph.export("RoslynApiEndpoint", endpoint(&roslyn_api)?)?;
    graph.export("RoslynClassUrl", class_url)?;
    graph.export("SheetsNotificationEndpoint", endpoint(&sheets_notification)?)?;
    graph.export("BeckshomeBlogEndpoint", endpoint(&blog)?)?;
    graph.export("PrimaryStorageKey", storage_key)?;
    graph.export("PrimaryConnectionString", connection_string)?;
    graph.export("PrimaryCognitiveKey", cognitive_key)?;

    tracing::info!(
        stack = %config.name,
        resources = graph.len(),
        outputs = graph.outputs().len(),
        "Defined stack"
    );
    Ok(graph)
}
