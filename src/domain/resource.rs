//! Resource descriptors

use super::{DataItem, ItemLinksFn, ItemMetaFn, collection_href, page_href, resource_href};
use crate::core::auth::ResourceOutbound;
use crate::core::document::Links;
use crate::core::error::{ConfigError, EngineError, EngineResult};
use crate::core::request::JsonApiRequest;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

type IdFn<D> = Arc<dyn Fn(&D) -> String + Send + Sync>;
type AttributesFn<D> = Arc<dyn Fn(&D) -> EngineResult<Option<Map<String, Value>>> + Send + Sync>;
type OwnerIdFn<D> = Arc<dyn Fn(&D) -> Option<String> + Send + Sync>;
type DocumentLinksFn<R, D> = Arc<dyn Fn(&R, Option<&D>) -> Option<Links> + Send + Sync>;
type DocumentMetaFn<R, D> = Arc<dyn Fn(&R, Option<&D>) -> Option<Value> + Send + Sync>;
type CollectionLinksFn<R, D> = Arc<dyn Fn(&R, &[D], Option<&str>) -> Option<Links> + Send + Sync>;
type CollectionMetaFn<R, D> = Arc<dyn Fn(&R, &[D], Option<&str>) -> Option<Value> + Send + Sync>;

/// Static description of one resource type
///
/// `R` is the request type, `D` the backing data-source item.
pub struct ResourceDescriptor<R, D> {
    resource_type: String,
    id: IdFn<D>,
    attributes: Option<AttributesFn<D>>,
    owner_id: Option<OwnerIdFn<D>>,
    resource_links: Option<ItemLinksFn<R, D>>,
    resource_meta: Option<ItemMetaFn<R, D>>,
    document_links: Option<DocumentLinksFn<R, D>>,
    document_meta: Option<DocumentMetaFn<R, D>>,
    collection_links: Option<CollectionLinksFn<R, D>>,
    collection_meta: Option<CollectionMetaFn<R, D>>,
    outbound: ResourceOutbound,
}

impl<R: JsonApiRequest, D: DataItem> ResourceDescriptor<R, D> {
    /// Create a new ResourceDescriptorBuilder
    pub fn builder(resource_type: impl Into<String>) -> ResourceDescriptorBuilder<R, D> {
        ResourceDescriptorBuilder {
            resource_type: resource_type.into(),
            id: None,
            attributes: None,
            owner_id: None,
            resource_links: None,
            resource_meta: None,
            document_links: None,
            document_meta: None,
            collection_links: None,
            collection_meta: None,
            outbound: ResourceOutbound::default(),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Resolve the id of an item
    ///
    /// An empty id is a broken resolver contract and is reported as a failure.
    pub fn id_of(&self, item: &D) -> EngineResult<String> {
        let id = (self.id)(item);
        if id.is_empty() {
            return Err(EngineError::Resolver(anyhow::anyhow!(
                "id resolver of '{}' returned an empty id",
                self.resource_type
            )));
        }
        Ok(id)
    }

    pub fn attributes_of(&self, item: &D) -> EngineResult<Option<Map<String, Value>>> {
        match &self.attributes {
            Some(resolve) => resolve(item),
            None => Ok(None),
        }
    }

    pub fn owner_id_of(&self, item: &D) -> Option<String> {
        self.owner_id.as_ref().and_then(|resolve| resolve(item))
    }

    /// Resource-level links; defaults to a `self` link
    pub fn resource_links(&self, request: &R, item: &D, root_path: &str, id: &str) -> Option<Links> {
        match &self.resource_links {
            Some(resolve) => resolve(request, item),
            None => Some(Links::new().self_link(resource_href(root_path, &self.resource_type, id))),
        }
    }

    pub fn resource_meta(&self, request: &R, item: &D) -> Option<Value> {
        self.resource_meta
            .as_ref()
            .and_then(|resolve| resolve(request, item))
    }

    /// Top-level links of a single-resource document
    pub fn document_links(&self, request: &R, item: Option<&D>, root_path: &str) -> Option<Links> {
        if let Some(resolve) = &self.document_links {
            return resolve(request, item);
        }
        let id = match item {
            Some(item) => Some((self.id)(item)),
            None => request.resource_id().map(str::to_string),
        };
        let href = match id {
            Some(id) => resource_href(root_path, &self.resource_type, &id),
            None => collection_href(root_path, &self.resource_type),
        };
        Some(Links::new().self_link(href))
    }

    pub fn document_meta(&self, request: &R, item: Option<&D>) -> Option<Value> {
        self.document_meta
            .as_ref()
            .and_then(|resolve| resolve(request, item))
    }

    /// Top-level links of a collection document, built from the next cursor
    pub fn collection_links(
        &self,
        request: &R,
        items: &[D],
        next_cursor: Option<&str>,
        root_path: &str,
    ) -> Option<Links> {
        if let Some(resolve) = &self.collection_links {
            return resolve(request, items, next_cursor);
        }
        let self_href = match request.cursor() {
            Some(cursor) => page_href(root_path, &self.resource_type, cursor),
            None => collection_href(root_path, &self.resource_type),
        };
        let links = Links::new().self_link(self_href);
        Some(match next_cursor {
            Some(next) => links.next(page_href(root_path, &self.resource_type, next)),
            None => links,
        })
    }

    pub fn collection_meta(
        &self,
        request: &R,
        items: &[D],
        next_cursor: Option<&str>,
    ) -> Option<Value> {
        self.collection_meta
            .as_ref()
            .and_then(|resolve| resolve(request, items, next_cursor))
    }

    /// Code-level outbound requirements
    pub fn outbound(&self) -> &ResourceOutbound {
        &self.outbound
    }
}

/// Builder for [`ResourceDescriptor`]; `build` checks that an id resolver exists
pub struct ResourceDescriptorBuilder<R, D> {
    resource_type: String,
    id: Option<IdFn<D>>,
    attributes: Option<AttributesFn<D>>,
    owner_id: Option<OwnerIdFn<D>>,
    resource_links: Option<ItemLinksFn<R, D>>,
    resource_meta: Option<ItemMetaFn<R, D>>,
    document_links: Option<DocumentLinksFn<R, D>>,
    document_meta: Option<DocumentMetaFn<R, D>>,
    collection_links: Option<CollectionLinksFn<R, D>>,
    collection_meta: Option<CollectionMetaFn<R, D>>,
    outbound: ResourceOutbound,
}

impl<R: JsonApiRequest, D: DataItem> ResourceDescriptorBuilder<R, D> {
    /// Set the id resolver (required)
    pub fn id(mut self, resolve: impl Fn(&D) -> String + Send + Sync + 'static) -> Self {
        self.id = Some(Arc::new(resolve));
        self
    }

    /// Attributes resolver; the value must serialize to a JSON object
    pub fn attributes<A, F>(mut self, resolve: F) -> Self
    where
        A: Serialize,
        F: Fn(&D) -> A + Send + Sync + 'static,
    {
        let resource_type = self.resource_type.clone();
        self.attributes = Some(Arc::new(move |item: &D| {
            let value = serde_json::to_value(resolve(item))
                .map_err(|e| EngineError::Resolver(e.into()))?;
            match value {
                Value::Object(map) => Ok(Some(map)),
                Value::Null => Ok(None),
                other => Err(EngineError::Resolver(anyhow::anyhow!(
                    "attributes of '{}' must serialize to an object, got {}",
                    resource_type,
                    other
                ))),
            }
        }));
        self
    }

    /// Set the owner id resolver used by ownership checks
    pub fn owner_id(mut self, resolve: impl Fn(&D) -> Option<String> + Send + Sync + 'static) -> Self {
        self.owner_id = Some(Arc::new(resolve));
        self
    }

    /// Set the links resolver of each resource object
    pub fn resource_links(
        mut self,
        resolve: impl Fn(&R, &D) -> Option<Links> + Send + Sync + 'static,
    ) -> Self {
        self.resource_links = Some(Arc::new(resolve));
        self
    }

    /// Set the meta resolver of each resource object
    pub fn resource_meta(
        mut self,
        resolve: impl Fn(&R, &D) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.resource_meta = Some(Arc::new(resolve));
        self
    }

    /// Set the top-level links resolver of single documents
    pub fn document_links(
        mut self,
        resolve: impl Fn(&R, Option<&D>) -> Option<Links> + Send + Sync + 'static,
    ) -> Self {
        self.document_links = Some(Arc::new(resolve));
        self
    }

    /// Set the top-level meta resolver of single documents
    pub fn document_meta(
        mut self,
        resolve: impl Fn(&R, Option<&D>) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.document_meta = Some(Arc::new(resolve));
        self
    }

    /// Set the top-level links resolver of collection documents
    pub fn collection_links(
        mut self,
        resolve: impl Fn(&R, &[D], Option<&str>) -> Option<Links> + Send + Sync + 'static,
    ) -> Self {
        self.collection_links = Some(Arc::new(resolve));
        self
    }

    /// Set the top-level meta resolver of collection documents
    pub fn collection_meta(
        mut self,
        resolve: impl Fn(&R, &[D], Option<&str>) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.collection_meta = Some(Arc::new(resolve));
        self
    }

    /// Set the outbound requirements declared by the descriptor
    pub fn outbound(mut self, outbound: ResourceOutbound) -> Self {
        self.outbound = outbound;
        self
    }

    /// Build the descriptor, failing if no id resolver was set
    pub fn build(self) -> Result<ResourceDescriptor<R, D>, ConfigError> {
        let id = self
            .id
            .ok_or_else(|| ConfigError::missing_argument("id resolver", &self.resource_type))?;

        Ok(ResourceDescriptor {
            resource_type: self.resource_type,
            id,
            attributes: self.attributes,
            owner_id: self.owner_id,
            resource_links: self.resource_links,
            resource_meta: self.resource_meta,
            document_links: self.document_links,
            document_meta: self.document_meta,
            collection_links: self.collection_links,
            collection_meta: self.collection_meta,
            outbound: self.outbound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::request::Request;
    use serde_json::json;

    #[derive(Clone)]
    struct User {
        id: String,
        name: String,
    }

    #[derive(Serialize)]
    struct UserAttributes {
        name: String,
    }

    fn descriptor() -> ResourceDescriptor<Request, User> {
        ResourceDescriptor::builder("users")
            .id(|u: &User| u.id.clone())
            .attributes(|u: &User| UserAttributes {
                name: u.name.clone(),
            })
            .build()
            .unwrap()
    }

    fn ada() -> User {
        User {
            id: "1".into(),
            name: "Ada".into(),
        }
    }

    #[test]
    fn test_build_without_id_fails() {
        let result = ResourceDescriptor::<Request, User>::builder("users").build();
        assert!(matches!(result, Err(ConfigError::MissingArgument { .. })));
    }

    #[test]
    fn test_attributes_are_serialized() {
        let attributes = descriptor().attributes_of(&ada()).unwrap().unwrap();
        assert_eq!(Value::Object(attributes), json!({"name": "Ada"}));
    }

    #[test]
    fn test_non_object_attributes_fail() {
        let descriptor = ResourceDescriptor::<Request, User>::builder("users")
            .id(|u: &User| u.id.clone())
            .attributes(|u: &User| u.name.clone())
            .build()
            .unwrap();
        assert!(descriptor.attributes_of(&ada()).is_err());
    }

    #[test]
    fn test_empty_id_fails_loudly() {
        let descriptor = ResourceDescriptor::<Request, User>::builder("users")
            .id(|_: &User| String::new())
            .build()
            .unwrap();
        assert!(matches!(
            descriptor.id_of(&ada()),
            Err(EngineError::Resolver(_))
        ));
    }

    #[test]
    fn test_default_document_links_use_request_id_for_null_item() {
        let request = Request::builder().resource_id("42").build();
        let links = descriptor().document_links(&request, None, "").unwrap();
        assert_eq!(links.get("self").unwrap().href(), "/users/42");
    }

    #[test]
    fn test_declared_resolver_returning_none_wins_over_default() {
        let descriptor = ResourceDescriptor::<Request, User>::builder("users")
            .id(|u: &User| u.id.clone())
            .resource_links(|_, _| None)
            .build()
            .unwrap();
        let request = Request::default();
        assert!(
            descriptor
                .resource_links(&request, &ada(), "", "1")
                .is_none()
        );
    }

    #[test]
    fn test_default_collection_links_use_cursors() {
        let request = Request::builder().cursor("p2").build();
        let links = descriptor()
            .collection_links(&request, &[], Some("p3"), "/api")
            .unwrap();
        assert_eq!(
            links.get("self").unwrap().href(),
            "/api/users?page[cursor]=p2"
        );
        assert_eq!(
            links.get("next").unwrap().href(),
            "/api/users?page[cursor]=p3"
        );

        let last = descriptor()
            .collection_links(&Request::default(), &[], None, "")
            .unwrap();
        assert!(last.get("next").is_none());
    }
}
