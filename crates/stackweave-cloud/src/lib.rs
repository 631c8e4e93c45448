//! Stackweave resource graph
//!
//! This crate records declarations of cloud resources and the values wired
//! between them, and hands the result to an external apply engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              stack definition (code)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │ declare / export
//! ┌─────────────────▼───────────────────────────────┐
//! │               stackweave-cloud                   │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │ schema table │  │  Deferred<T> │             │
//! │  └──────────────┘  └──────────────┘             │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │ ResourceGraph → Manifest                  │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────────────▲───────────────┘
//!         │ Manifest                │ ResolvedState
//! ┌───────▼─────────────────────────┴───────────────┐
//! │          trait ApplyEngine (external)            │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod args;
pub mod asset;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod resource;
pub mod state;

// Re-exports
pub use args::{
    BlobArgs, BlobContainerArgs, CognitiveAccountArgs, ComputePlanArgs, PlanKind, PublicAccess,
    ResourceArgs, ResourceGroupArgs, SiteConfig, Sku, StorageAccountArgs, StorageMount,
    StorageMountsArgs, StorageType, WebAppArgs,
};
pub use asset::{Deployment, FileAsset};
pub use deferred::{
    Deferred, Expr, FormatArg, Input, Properties, Resolution, Resolver, SecretSelector, format,
};
pub use engine::{ActionResult, ApplyEngine, ApplyReport, AuthStatus, PreviewEngine, submit};
pub use error::{CloudError, Result};
pub use graph::{Declaration, ResourceGraph};
pub use manifest::{Manifest, ManifestEntry, ManifestSummary};
pub use resource::{
    GraphId, Handle, KindSchema, ReplacePolicy, ResourceKey, ResourceKind, ResourceOptions,
    fetch_secret,
};
pub use state::{ResolvedState, ResourceState, ResourceStatus, StateLock, StateManager};
