//! Relationship descriptors and resolver bindings
//!
//! A descriptor knows how to turn related items into resource identifiers
//! and which links/meta to attach. Binding a descriptor to a resolver yields
//! a [`RelationshipBinding`], the type-erased form the pipelines schedule.
//!
//! ```rust,ignore
//! let tags = ToManyRelationship::<Request, User, Tag>::new("tags", "tags", |t| t.id.clone());
//!
//! // one call per parent item
//! let simple = tags.resolved_by(|req, user| async move { repo.tags_of(&user.id).await });
//!
//! // one call for the whole page, keyed by parent id
//! let batched = tags.batch_resolved_by(|req, users| async move { repo.tags_of_all(&users).await });
//! ```

use super::{DataItem, ItemLinksFn, ItemMetaFn, Parent};
use crate::core::document::{Cardinality, Linkage, Links, RelationshipDoc, ResourceIdentifier};
use crate::core::error::EngineResult;
use crate::core::request::JsonApiRequest;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Resolves one relationship document for one parent
pub type SimpleResolveFn<R, D> =
    Arc<dyn Fn(Arc<R>, Parent<D>) -> BoxFuture<'static, EngineResult<RelationshipDoc>> + Send + Sync>;

/// Resolves relationship documents for many parents, keyed by parent id
pub type BatchResolveFn<R, D> = Arc<
    dyn Fn(Arc<R>, Vec<Parent<D>>) -> BoxFuture<'static, EngineResult<HashMap<String, RelationshipDoc>>>
        + Send
        + Sync,
>;

/// Builds a relationship document around a linkage
pub type RelationshipDocFn<R, D> =
    Arc<dyn Fn(&R, &Parent<D>, Linkage) -> RelationshipDoc + Send + Sync>;

/// How a bound relationship obtains its data
pub enum ResolverKind<R, D> {
    /// Never resolved; always link-only
    LinkOnly,
    /// One task per parent item
    Simple(SimpleResolveFn<R, D>),
    /// One task for all parent items
    Batch(BatchResolveFn<R, D>),
}

impl<R, D> ResolverKind<R, D> {
    pub fn label(&self) -> &'static str {
        match self {
            ResolverKind::LinkOnly => "link-only",
            ResolverKind::Simple(_) => "simple",
            ResolverKind::Batch(_) => "batch",
        }
    }
}

impl<R, D> Clone for ResolverKind<R, D> {
    fn clone(&self) -> Self {
        match self {
            ResolverKind::LinkOnly => ResolverKind::LinkOnly,
            ResolverKind::Simple(f) => ResolverKind::Simple(f.clone()),
            ResolverKind::Batch(f) => ResolverKind::Batch(f.clone()),
        }
    }
}

/// A relationship of a resource type together with its resolution strategy
pub struct RelationshipBinding<R, D> {
    pub(crate) name: String,
    pub(crate) cardinality: Cardinality,
    pub(crate) doc: RelationshipDocFn<R, D>,
    pub(crate) kind: ResolverKind<R, D>,
}

impl<R, D> Clone for RelationshipBinding<R, D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            cardinality: self.cardinality,
            doc: self.doc.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl<R, D> RelationshipBinding<R, D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn kind(&self) -> &ResolverKind<R, D> {
        &self.kind
    }

    pub fn is_resolvable(&self) -> bool {
        !matches!(self.kind, ResolverKind::LinkOnly)
    }

    /// Link-only document, used when the relationship was not requested
    pub fn link_only_doc(&self, request: &R, parent: &Parent<D>) -> RelationshipDoc {
        (self.doc)(request, parent, Linkage::Absent)
    }

    /// Resolved-but-empty document (`null` or `[]`), used for not-found
    pub fn empty_doc(&self, request: &R, parent: &Parent<D>) -> RelationshipDoc {
        (self.doc)(request, parent, Linkage::empty(self.cardinality))
    }
}

type RelatedIdFn<RD> = Arc<dyn Fn(&RD) -> String + Send + Sync>;
type IdentifierMetaFn<RD> = Arc<dyn Fn(&RD) -> Option<Value> + Send + Sync>;

/// Shared part of to-one and to-many descriptors
struct RelationshipCore<R, D, RD> {
    name: String,
    related_id: RelatedIdFn<RD>,
    related_type: RelatedIdFn<RD>,
    identifier_meta: Option<IdentifierMetaFn<RD>>,
    links: Option<ItemLinksFn<R, D>>,
    meta: Option<ItemMetaFn<R, D>>,
}

impl<R, D, RD> Clone for RelationshipCore<R, D, RD> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            related_id: self.related_id.clone(),
            related_type: self.related_type.clone(),
            identifier_meta: self.identifier_meta.clone(),
            links: self.links.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<R: JsonApiRequest, D: DataItem, RD: Send + 'static> RelationshipCore<R, D, RD> {
    fn new(
        name: String,
        related_type: String,
        related_id: impl Fn(&RD) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            related_id: Arc::new(related_id),
            related_type: Arc::new(move |_| related_type.clone()),
            identifier_meta: None,
            links: None,
            meta: None,
        }
    }

    fn identifier(&self, related: &RD) -> ResourceIdentifier {
        ResourceIdentifier {
            id: (self.related_id)(related),
            resource_type: (self.related_type)(related),
            meta: self.identifier_meta.as_ref().and_then(|m| m(related)),
        }
    }

    fn doc(&self, request: &R, parent: &Parent<D>, data: Linkage, cardinality: Cardinality) -> RelationshipDoc {
        let links = match &self.links {
            Some(resolve) => resolve(request, &parent.item),
            None => {
                let base = parent.href();
                Some(
                    Links::new()
                        .self_link(format!("{}/relationships/{}", base, self.name))
                        .related(format!("{}/{}", base, self.name)),
                )
            }
        };
        let meta = self.meta.as_ref().and_then(|m| m(request, &parent.item));

        let doc = match data {
            Linkage::Absent => RelationshipDoc::link_only(cardinality),
            Linkage::ToOne(identifier) => RelationshipDoc::to_one(identifier),
            Linkage::ToMany(identifiers) => RelationshipDoc::to_many(identifiers),
        };
        doc.with_links(links).with_meta(meta)
    }

    fn binding(&self, cardinality: Cardinality, kind: ResolverKind<R, D>) -> RelationshipBinding<R, D> {
        let core = self.clone();
        RelationshipBinding {
            name: self.name.clone(),
            cardinality,
            doc: Arc::new(move |request: &R, parent: &Parent<D>, data: Linkage| {
                core.doc(request, parent, data, cardinality)
            }),
            kind,
        }
    }
}

macro_rules! relationship_descriptor_methods {
    () => {
        pub fn name(&self) -> &str {
            &self.core.name
        }

        /// Resolve the related type per item (polymorphic relationships)
        pub fn related_type_resolver(
            mut self,
            resolve: impl Fn(&RD) -> String + Send + Sync + 'static,
        ) -> Self {
            self.core.related_type = Arc::new(resolve);
            self
        }

        /// Meta attached to each resource identifier
        pub fn identifier_meta(
            mut self,
            resolve: impl Fn(&RD) -> Option<Value> + Send + Sync + 'static,
        ) -> Self {
            self.core.identifier_meta = Some(Arc::new(resolve));
            self
        }

        /// Relationship links; replaces the default `self`/`related` links
        pub fn links(mut self, resolve: impl Fn(&R, &D) -> Option<Links> + Send + Sync + 'static) -> Self {
            self.core.links = Some(Arc::new(resolve));
            self
        }

        pub fn meta(mut self, resolve: impl Fn(&R, &D) -> Option<Value> + Send + Sync + 'static) -> Self {
            self.core.meta = Some(Arc::new(resolve));
            self
        }

        /// Declared but never resolved: always link-only
        pub fn link_only(&self) -> RelationshipBinding<R, D> {
            self.core.binding(Self::CARDINALITY, ResolverKind::LinkOnly)
        }

        pub fn identifier(&self, related: &RD) -> ResourceIdentifier {
            self.core.identifier(related)
        }
    };
}

/// Descriptor of a to-one relationship whose related items are `RD`
pub struct ToOneRelationship<R, D, RD> {
    core: RelationshipCore<R, D, RD>,
}

impl<R, D, RD> Clone for ToOneRelationship<R, D, RD> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<R: JsonApiRequest, D: DataItem, RD: Send + 'static> ToOneRelationship<R, D, RD> {
    const CARDINALITY: Cardinality = Cardinality::ToOne;

    /// Declare a to-one relationship to `related_type`
    pub fn new(
        name: impl Into<String>,
        related_type: impl Into<String>,
        related_id: impl Fn(&RD) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            core: RelationshipCore::new(name.into(), related_type.into(), related_id),
        }
    }

    relationship_descriptor_methods!();

    /// Bind a resolver called once per parent item
    pub fn resolved_by<F, Fut>(&self, resolver: F) -> RelationshipBinding<R, D>
    where
        F: Fn(Arc<R>, D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<Option<RD>>> + Send + 'static,
    {
        let core = self.core.clone();
        let simple: SimpleResolveFn<R, D> = Arc::new(move |request: Arc<R>, parent: Parent<D>| {
            let core = core.clone();
            let pending = resolver(request.clone(), parent.item.clone());
            async move {
                let related = pending.await?;
                let linkage = Linkage::ToOne(related.as_ref().map(|rd| core.identifier(rd)));
                Ok(core.doc(&request, &parent, linkage, Cardinality::ToOne))
            }
            .boxed()
        });
        self.core.binding(Self::CARDINALITY, ResolverKind::Simple(simple))
    }

    /// Bind a resolver called once for all parent items
    ///
    /// The result is keyed by parent id; a parent without an entry gets a
    /// `null` linkage.
    pub fn batch_resolved_by<F, Fut>(&self, resolver: F) -> RelationshipBinding<R, D>
    where
        F: Fn(Arc<R>, Vec<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<HashMap<String, RD>>> + Send + 'static,
    {
        let core = self.core.clone();
        let batch: BatchResolveFn<R, D> = Arc::new(move |request: Arc<R>, parents: Vec<Parent<D>>| {
            let core = core.clone();
            let items = parents.iter().map(|p| p.item.clone()).collect();
            let pending = resolver(request.clone(), items);
            async move {
                let mut related = pending.await?;
                Ok(parents
                    .iter()
                    .filter_map(|parent| {
                        let rd = related.remove(&parent.id)?;
                        let linkage = Linkage::ToOne(Some(core.identifier(&rd)));
                        Some((
                            parent.id.clone(),
                            core.doc(&request, parent, linkage, Cardinality::ToOne),
                        ))
                    })
                    .collect())
            }
            .boxed()
        });
        self.core.binding(Self::CARDINALITY, ResolverKind::Batch(batch))
    }
}

/// Descriptor of a to-many relationship whose related items are `RD`
pub struct ToManyRelationship<R, D, RD> {
    core: RelationshipCore<R, D, RD>,
}

impl<R, D, RD> Clone for ToManyRelationship<R, D, RD> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<R: JsonApiRequest, D: DataItem, RD: Send + 'static> ToManyRelationship<R, D, RD> {
    const CARDINALITY: Cardinality = Cardinality::ToMany;

    /// Declare a to-many relationship to `related_type`
    pub fn new(
        name: impl Into<String>,
        related_type: impl Into<String>,
        related_id: impl Fn(&RD) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            core: RelationshipCore::new(name.into(), related_type.into(), related_id),
        }
    }

    relationship_descriptor_methods!();

    /// Bind a resolver called once per parent item
    ///
    /// Identifiers keep the order the resolver returned the items in.
    pub fn resolved_by<F, Fut>(&self, resolver: F) -> RelationshipBinding<R, D>
    where
        F: Fn(Arc<R>, D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<Vec<RD>>> + Send + 'static,
    {
        let core = self.core.clone();
        let simple: SimpleResolveFn<R, D> = Arc::new(move |request: Arc<R>, parent: Parent<D>| {
            let core = core.clone();
            let pending = resolver(request.clone(), parent.item.clone());
            async move {
                let related = pending.await?;
                let linkage = Linkage::ToMany(related.iter().map(|rd| core.identifier(rd)).collect());
                Ok(core.doc(&request, &parent, linkage, Cardinality::ToMany))
            }
            .boxed()
        });
        self.core.binding(Self::CARDINALITY, ResolverKind::Simple(simple))
    }

    /// Bind a resolver called once for all parent items, keyed by parent id
    pub fn batch_resolved_by<F, Fut>(&self, resolver: F) -> RelationshipBinding<R, D>
    where
        F: Fn(Arc<R>, Vec<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<HashMap<String, Vec<RD>>>> + Send + 'static,
    {
        let core = self.core.clone();
        let batch: BatchResolveFn<R, D> = Arc::new(move |request: Arc<R>, parents: Vec<Parent<D>>| {
            let core = core.clone();
            let items = parents.iter().map(|p| p.item.clone()).collect();
            let pending = resolver(request.clone(), items);
            async move {
                let mut related = pending.await?;
                Ok(parents
                    .iter()
                    .filter_map(|parent| {
                        let rds = related.remove(&parent.id)?;
                        let linkage =
                            Linkage::ToMany(rds.iter().map(|rd| core.identifier(rd)).collect());
                        Some((
                            parent.id.clone(),
                            core.doc(&request, parent, linkage, Cardinality::ToMany),
                        ))
                    })
                    .collect())
            }
            .boxed()
        });
        self.core.binding(Self::CARDINALITY, ResolverKind::Batch(batch))
    }
}
