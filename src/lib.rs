//! # jsonapi-engine
//!
//! Assembles JSON:API documents from arbitrary data sources.
//!
//! ## Features
//!
//! - **Descriptor-Based**: Describe resources and relationships once, with plain closures
//! - **Inclusion Gating**: Relationships outside the include set never trigger a fetch
//! - **Batched Resolvers**: Resolve a relationship for a whole page in one call
//! - **Pluggable Concurrency**: Run resolution tasks on a tokio runtime or inline
//! - **Two-Phase Access Control**: Inbound gates before fetching, outbound anonymization after
//! - **Configuration-Based**: Declare access policies and relationships in YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jsonapi_engine::prelude::*;
//!
//! let users = Arc::new(
//!     ResourceDescriptor::<Request, User>::builder("users")
//!         .id(|u| u.id.clone())
//!         .attributes(|u| UserAttributes::from(u))
//!         .build()?,
//! );
//!
//! let country = ToOneRelationship::new("country", "countries", |c: &Country| c.code.clone());
//! let tags = ToManyRelationship::new("tags", "tags", |t: &Tag| t.id.clone());
//!
//! let pipeline = SingleResourcePipeline::builder(users)
//!     .supplier(|req: Arc<Request>| async move { repo.find_user(req.resource_id()).await })
//!     .relationship(country.link_only())
//!     .relationship(tags.batch_resolved_by(|_req, users| async move { repo.tags_of(&users).await }))
//!     .default_relationships(["tags"])
//!     .build()?;
//!
//! let request = Request::builder().resource_id("1").include("tags").build();
//! let doc = pipeline.to_document(request).await?;
//! ```

pub mod config;
pub mod core;
pub mod domain;
pub mod engine;
pub mod operations;
pub mod processing;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{
            AccessControlRequirements, Anonymizable, AnonymizationResult, Authentication,
            OutboundRequirements, Ownership, ResourceField, ResourceOutbound, anonymize_if_needed,
            evaluate_inbound, evaluate_outbound,
        },
        document::{
            Cardinality, Linkage, Links, MultipleResourcesDoc, RelationshipDoc, Resource,
            ResourceIdentifier, SingleResourceDoc,
        },
        error::{ConfigError, EngineError, EngineResult},
        page::CursorPage,
        request::{AccessTier, AuthContext, JsonApiRequest, Request, RequestContext},
    };

    // === Domain ===
    pub use crate::domain::{
        DomainRegistry, RelationshipBinding, ResourceDescriptor, ToManyRelationship,
        ToOneRelationship,
    };

    // === Operations ===
    pub use crate::operations::{
        Operation, OperationKind, OperationRegistry, ReadManySource, read_by_id, read_many,
    };

    // === Processing ===
    pub use crate::processing::{
        MultipleResourcesPipeline, RelationshipDocumentPipeline, SingleResourcePipeline,
        TaskExecutor, TokioExecutor,
    };

    // === Config ===
    pub use crate::config::{EngineConfig, ResourceConfig, ResourcePolicy};

    pub use crate::engine::DocumentEngine;

    // === External dependencies ===
    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
}
