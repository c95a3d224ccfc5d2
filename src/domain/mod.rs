//! Static description of resources and their relationships
//!
//! Descriptors are built once at startup, never change afterwards and are
//! shared freely across concurrent requests. They only hold resolution
//! functions; they never fetch anything.

pub mod registry;
pub mod relationship;
pub mod resource;

pub use registry::DomainRegistry;
pub use relationship::{RelationshipBinding, ToManyRelationship, ToOneRelationship};
pub use resource::{ResourceDescriptor, ResourceDescriptorBuilder};

use crate::core::document::Links;
use serde_json::Value;
use std::sync::Arc;

/// Bounds every backing data-source item must satisfy
///
/// Items are cloned into resolution tasks, which may run on other workers.
pub trait DataItem: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> DataItem for T {}

/// Links resolver for something belonging to one item
pub type ItemLinksFn<R, D> = Arc<dyn Fn(&R, &D) -> Option<Links> + Send + Sync>;

/// Meta resolver for something belonging to one item
pub type ItemMetaFn<R, D> = Arc<dyn Fn(&R, &D) -> Option<Value> + Send + Sync>;

/// A fetched item together with its resolved identity
///
/// Relationship resolution receives parents in this form so that default
/// links and batch result keys never recompute the id.
#[derive(Debug, Clone)]
pub struct Parent<D> {
    pub resource_type: String,
    pub id: String,
    pub root_path: Arc<str>,
    pub item: D,
}

impl<D> Parent<D> {
    pub fn href(&self) -> String {
        resource_href(&self.root_path, &self.resource_type, &self.id)
    }
}

/// `{root}/{type}`
pub fn collection_href(root_path: &str, resource_type: &str) -> String {
    format!("{}/{}", root_path.trim_end_matches('/'), resource_type)
}

/// `{root}/{type}/{id}`
pub fn resource_href(root_path: &str, resource_type: &str, id: &str) -> String {
    format!("{}/{}", collection_href(root_path, resource_type), id)
}

/// `{root}/{type}?page[cursor]={cursor}`, with the cursor percent-encoded
pub fn page_href(root_path: &str, resource_type: &str, cursor: &str) -> String {
    format!(
        "{}?page[cursor]={}",
        collection_href(root_path, resource_type),
        urlencoding::encode(cursor)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hrefs_with_and_without_root() {
        assert_eq!(collection_href("", "users"), "/users");
        assert_eq!(collection_href("/api/", "users"), "/api/users");
        assert_eq!(resource_href("/api", "users", "7"), "/api/users/7");
        assert_eq!(page_href("", "users", "p3"), "/users?page[cursor]=p3");
    }

    #[test]
    fn test_page_href_encodes_cursor() {
        assert_eq!(
            page_href("/api", "users", "a+b/c=&x=1"),
            "/api/users?page[cursor]=a%2Bb%2Fc%3D%26x%3D1"
        );
    }
}
