//! Core module containing the document model, request contract and access control

pub mod auth;
pub mod document;
pub mod error;
pub mod page;
pub mod request;

pub use auth::{
    AccessControlRequirements, Anonymizable, AnonymizationResult, Authentication,
    OutboundRequirements, Ownership, ResourceField, ResourceOutbound,
};
pub use document::{
    Cardinality, Linkage, Links, MultipleResourcesDoc, RelationshipDoc, Relationships, Resource,
    ResourceIdentifier, SingleResourceDoc,
};
pub use error::{ConfigError, EngineError, EngineResult};
pub use page::CursorPage;
pub use request::{AccessTier, AuthContext, JsonApiRequest, Request, RequestBuilder, RequestContext};
