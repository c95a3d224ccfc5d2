//! Document value tree and assembly
//!
//! Documents are built once and never mutated in place afterwards. The only
//! post-hoc change allowed is the narrow field redaction done by outbound
//! anonymization, which goes through [`Resource::null_attribute`] and
//! [`Resource::drop_relationship`] on a copy.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Media type of every document produced by the engine
pub const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// A single link: a plain href or a link object carrying meta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkValue {
    Href(String),
    Object {
        href: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
}

impl LinkValue {
    pub fn href(&self) -> &str {
        match self {
            LinkValue::Href(href) => href,
            LinkValue::Object { href, .. } => href,
        }
    }
}

/// A `links` object, keeping insertion order on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Links(IndexMap<String, LinkValue>);

impl Links {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, href: impl Into<String>) -> Self {
        self.0.insert(name.into(), LinkValue::Href(href.into()));
        self
    }

    pub fn with_object(
        mut self,
        name: impl Into<String>,
        href: impl Into<String>,
        meta: Option<Value>,
    ) -> Self {
        self.0.insert(
            name.into(),
            LinkValue::Object {
                href: href.into(),
                meta,
            },
        );
        self
    }

    pub fn self_link(self, href: impl Into<String>) -> Self {
        self.with("self", href)
    }

    pub fn related(self, href: impl Into<String>) -> Self {
        self.with("related", href)
    }

    pub fn next(self, href: impl Into<String>) -> Self {
        self.with("next", href)
    }

    pub fn get(&self, name: &str) -> Option<&LinkValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Minimal `{id, type}` reference used in relationship linkage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl ResourceIdentifier {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            meta: None,
        }
    }
}

/// Relationship cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// Linkage carried by a relationship document
///
/// `Absent` means the relationship was not resolved (link-only); a resolved
/// to-one is an identifier or explicit null, a resolved to-many is an array.
#[derive(Debug, Clone, PartialEq)]
pub enum Linkage {
    Absent,
    ToOne(Option<ResourceIdentifier>),
    ToMany(Vec<ResourceIdentifier>),
}

impl Linkage {
    pub fn is_absent(&self) -> bool {
        matches!(self, Linkage::Absent)
    }

    /// Empty resolved linkage for a cardinality (`null` or `[]`)
    pub fn empty(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::ToOne => Linkage::ToOne(None),
            Cardinality::ToMany => Linkage::ToMany(Vec::new()),
        }
    }
}

impl Serialize for Linkage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Linkage::Absent | Linkage::ToOne(None) => serializer.serialize_none(),
            Linkage::ToOne(Some(identifier)) => identifier.serialize(serializer),
            Linkage::ToMany(identifiers) => identifiers.serialize(serializer),
        }
    }
}

/// Resolved representation of one named relationship
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipDoc {
    #[serde(skip)]
    cardinality: Cardinality,
    #[serde(skip_serializing_if = "Linkage::is_absent")]
    data: Linkage,
    #[serde(skip_serializing_if = "Option::is_none")]
    links: Option<Links>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Value>,
}

impl RelationshipDoc {
    /// Link-only document: `data` is absent
    pub fn link_only(cardinality: Cardinality) -> Self {
        Self {
            cardinality,
            data: Linkage::Absent,
            links: None,
            meta: None,
        }
    }

    /// Resolved document with no related items
    pub fn empty(cardinality: Cardinality) -> Self {
        Self {
            cardinality,
            data: Linkage::empty(cardinality),
            links: None,
            meta: None,
        }
    }

    pub fn to_one(identifier: Option<ResourceIdentifier>) -> Self {
        Self {
            cardinality: Cardinality::ToOne,
            data: Linkage::ToOne(identifier),
            links: None,
            meta: None,
        }
    }

    /// Resolved to-many document; identifiers keep the given order
    pub fn to_many(identifiers: Vec<ResourceIdentifier>) -> Self {
        Self {
            cardinality: Cardinality::ToMany,
            data: Linkage::ToMany(identifiers),
            links: None,
            meta: None,
        }
    }

    pub fn with_links(mut self, links: Option<Links>) -> Self {
        self.links = links;
        self
    }

    pub fn with_meta(mut self, meta: Option<Value>) -> Self {
        self.meta = meta;
        self
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn data(&self) -> &Linkage {
        &self.data
    }

    pub fn links(&self) -> Option<&Links> {
        self.links.as_ref()
    }

    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }
}

/// Relationships object of a resource, in declaration order
pub type Relationships = IndexMap<String, RelationshipDoc>;

/// A primary resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    relationships: Option<Relationships>,
    #[serde(skip_serializing_if = "Option::is_none")]
    links: Option<Links>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Value>,
}

impl Resource {
    pub fn attributes(&self) -> Option<&Map<String, Value>> {
        self.attributes.as_ref()
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.as_ref().and_then(|a| a.get(name))
    }

    pub fn relationships(&self) -> Option<&Relationships> {
        self.relationships.as_ref()
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDoc> {
        self.relationships.as_ref().and_then(|r| r.get(name))
    }

    pub fn links(&self) -> Option<&Links> {
        self.links.as_ref()
    }

    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier::new(self.id.clone(), self.resource_type.clone())
    }

    /// Attach the resolved relationships object
    ///
    /// An empty object is dropped so that `relationships` stays absent for
    /// resources that declare none.
    pub fn with_relationships(mut self, relationships: Relationships) -> Self {
        self.relationships = (!relationships.is_empty()).then_some(relationships);
        self
    }

    /// Replace one attribute value with `null`
    ///
    /// Returns false when the attribute does not exist.
    pub fn null_attribute(&mut self, name: &str) -> bool {
        match self.attributes.as_mut().and_then(|a| a.get_mut(name)) {
            Some(value) => {
                *value = Value::Null;
                true
            }
            None => false,
        }
    }

    /// Remove one relationship from the relationships object
    pub fn drop_relationship(&mut self, name: &str) -> bool {
        let Some(relationships) = self.relationships.as_mut() else {
            return false;
        };
        let removed = relationships.shift_remove(name).is_some();
        if relationships.is_empty() {
            self.relationships = None;
        }
        removed
    }
}

/// Build a resource from its resolved pieces
pub fn assemble_resource(
    id: String,
    resource_type: String,
    attributes: Option<Map<String, Value>>,
    links: Option<Links>,
    meta: Option<Value>,
) -> Resource {
    Resource {
        id,
        resource_type,
        attributes,
        relationships: None,
        links,
        meta,
    }
}

/// Document carrying one primary resource (or `null`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleResourceDoc {
    pub data: Option<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Document carrying an ordered collection of primary resources
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultipleResourcesDoc {
    pub data: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

pub fn assemble_single(
    data: Option<Resource>,
    links: Option<Links>,
    meta: Option<Value>,
) -> SingleResourceDoc {
    SingleResourceDoc { data, links, meta }
}

pub fn assemble_multiple(
    data: Vec<Resource>,
    links: Option<Links>,
    meta: Option<Value>,
) -> MultipleResourcesDoc {
    MultipleResourcesDoc { data, links, meta }
}

fn json_api_response<T: Serialize>(body: T) -> Response {
    let mut response = (StatusCode::OK, Json(body)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_API_MEDIA_TYPE),
    );
    response
}

impl IntoResponse for SingleResourceDoc {
    fn into_response(self) -> Response {
        json_api_response(self)
    }
}

impl IntoResponse for MultipleResourcesDoc {
    fn into_response(self) -> Response {
        json_api_response(self)
    }
}
