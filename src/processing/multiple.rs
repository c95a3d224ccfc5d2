//! Multi-resource pipeline over cursor-paginated suppliers

use super::executor::TaskExecutor;
use super::relationships::RelationshipSet;
use super::{AccessSettings, Described, describe};
use crate::config::{EngineConfig, ResourcePolicy};
use crate::core::auth::{
    AccessControlRequirements, ResourceOutbound, anonymize_if_needed, evaluate_inbound,
};
use crate::core::document::{MultipleResourcesDoc, Resource, assemble_multiple};
use crate::core::error::{ConfigError, EngineError, EngineResult};
use crate::core::page::CursorPage;
use crate::core::request::JsonApiRequest;
use crate::domain::{DataItem, RelationshipBinding, ResourceDescriptor};
use crate::operations::{OperationKind, ReadByIdFn, ReadManyFn, ReadManySource, read_by_id, read_many};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

/// Validated configuration producing collection documents
pub struct MultipleResourcesPipeline<R, D> {
    descriptor: Arc<ResourceDescriptor<R, D>>,
    source: ReadManySource<R, D>,
    relationships: RelationshipSet<R, D>,
    inbound: Option<AccessControlRequirements>,
    outbound: ResourceOutbound,
    root_path: Arc<str>,
    executor: Option<Arc<dyn TaskExecutor>>,
}

impl<R: JsonApiRequest, D: DataItem> MultipleResourcesPipeline<R, D> {
    /// Create a new MultipleResourcesPipelineBuilder
    pub fn builder(
        descriptor: Arc<ResourceDescriptor<R, D>>,
    ) -> MultipleResourcesPipelineBuilder<R, D> {
        MultipleResourcesPipelineBuilder {
            descriptor,
            source: None,
            bindings: Vec::new(),
            default_relationships: Vec::new(),
            access: AccessSettings::default(),
            executor: None,
        }
    }

    pub fn resource_type(&self) -> &str {
        self.descriptor.resource_type()
    }

    pub fn inbound(&self) -> Option<&AccessControlRequirements> {
        self.inbound.as_ref()
    }

    pub fn outbound(&self) -> &ResourceOutbound {
        &self.outbound
    }

    /// Whether items come from the single-item supplier
    pub fn is_derived(&self) -> bool {
        matches!(self.source, ReadManySource::DerivedFromReadById(_))
    }

    /// Run the pipeline for one request
    ///
    /// Primary data keeps supplier order. Items hidden by the outbound object
    /// gate are dropped before relationship resolution, and top-level links
    /// and meta only see the remaining items.
    ///
    /// With a source derived from `read_by_id`, a request without an id
    /// filter, or with any other filter, fails with
    /// [`EngineError::UnsupportedRequest`] before any supplier call.
    pub async fn to_document(
        &self,
        request: impl Into<Arc<R>>,
    ) -> EngineResult<MultipleResourcesDoc> {
        let request = request.into();
        let span = tracing::debug_span!(
            "multiple_resources",
            resource_type = %self.descriptor.resource_type(),
            trace_id = %request.context().trace_id,
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: Arc<R>) -> EngineResult<MultipleResourcesDoc> {
        if !evaluate_inbound(request.as_ref(), self.inbound.as_ref()) {
            tracing::debug!("inbound access denied, skipping fetch");
            return Ok(self.assemble(&request, Vec::new(), &[], None));
        }

        let page = self.fetch(&request).await?;
        let next_cursor = page.next_cursor;
        let auth = &request.context().auth;
        let object_gate = self.outbound.object_only();

        let mut visible: Vec<Described<D>> = Vec::with_capacity(page.items.len());
        for item in page.items {
            let mut described = describe(&self.descriptor, request.as_ref(), item, &self.root_path)?;
            let gated = anonymize_if_needed(
                Some(&described.resource),
                auth,
                described.owner_id.as_deref(),
                &object_gate,
            );
            match gated.into_target() {
                Some(resource) => {
                    described.resource = resource;
                    visible.push(described);
                }
                None => {
                    tracing::debug!(id = %described.parent.id, "outbound access denied for item")
                }
            }
        }

        let parents: Vec<_> = visible.iter().map(|d| d.parent.clone()).collect();
        let relationships = self
            .relationships
            .resolve(&request, &parents, self.executor.as_deref())
            .await?;

        let field_gates = self.outbound.fields_only();
        let mut items = Vec::with_capacity(visible.len());
        let mut resources = Vec::with_capacity(visible.len());
        for (described, relationships) in visible.into_iter().zip(relationships) {
            let resource = described.resource.with_relationships(relationships);
            let redacted = anonymize_if_needed(
                Some(&resource),
                auth,
                described.owner_id.as_deref(),
                &field_gates,
            );
            resources.push(redacted.into_target().unwrap_or(resource));
            items.push(described.parent.item);
        }

        Ok(self.assemble(&request, resources, &items, next_cursor.as_deref()))
    }

    async fn fetch(&self, request: &Arc<R>) -> EngineResult<CursorPage<D>> {
        match &self.source {
            ReadManySource::Paged(supplier) => match supplier(request.clone()).await {
                Err(e) if e.is_not_found() => {
                    tracing::debug!(error = %e, "page not found");
                    Ok(CursorPage::empty())
                }
                other => other,
            },
            ReadManySource::DerivedFromReadById(supplier) => {
                self.fetch_by_ids(request, supplier).await
            }
        }
    }

    /// One sequential single-item call per filtered id, in request order
    ///
    /// Ids the supplier cannot find are skipped. Requests with any other
    /// filter, or without an id filter, are rejected before any call.
    async fn fetch_by_ids(
        &self,
        request: &Arc<R>,
        supplier: &ReadByIdFn<R, D>,
    ) -> EngineResult<CursorPage<D>> {
        let resource_type = self.descriptor.resource_type();
        let ids = match request.id_filter() {
            Some(_) if request.has_non_id_filters() => {
                return Err(EngineError::unsupported(
                    resource_type,
                    "only the id filter is supported without a read_many supplier",
                ));
            }
            Some(ids) => ids,
            None => {
                return Err(EngineError::unsupported(
                    resource_type,
                    "an id filter is required without a read_many supplier",
                ));
            }
        };

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            match supplier(Arc::new(request.with_resource_id(id))).await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => tracing::debug!(id = %id, "skipping missing id"),
                Err(e) if e.is_not_found() => tracing::debug!(id = %id, "skipping missing id"),
                Err(e) => return Err(e),
            }
        }
        Ok(CursorPage::last(items))
    }

    fn assemble(
        &self,
        request: &R,
        resources: Vec<Resource>,
        items: &[D],
        next_cursor: Option<&str>,
    ) -> MultipleResourcesDoc {
        assemble_multiple(
            resources,
            self.descriptor
                .collection_links(request, items, next_cursor, &self.root_path),
            self.descriptor.collection_meta(request, items, next_cursor),
        )
    }
}

/// Collects multi-resource configuration; everything is checked in `build`
pub struct MultipleResourcesPipelineBuilder<R, D> {
    descriptor: Arc<ResourceDescriptor<R, D>>,
    source: Option<ReadManySource<R, D>>,
    bindings: Vec<RelationshipBinding<R, D>>,
    default_relationships: Vec<String>,
    access: AccessSettings,
    executor: Option<Arc<dyn TaskExecutor>>,
}

impl<R: JsonApiRequest, D: DataItem> MultipleResourcesPipelineBuilder<R, D> {
    /// Cursor-aware data supplier
    pub fn supplier<F, Fut>(self, supplier: F) -> Self
    where
        F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<CursorPage<D>>> + Send + 'static,
    {
        self.supplier_fn(read_many(supplier))
    }

    /// Set an already erased page supplier
    pub fn supplier_fn(mut self, supplier: ReadManyFn<R, D>) -> Self {
        self.source = Some(ReadManySource::Paged(supplier));
        self
    }

    /// Serve id-filtered requests through a single-item supplier
    pub fn read_by_id<F, Fut>(self, supplier: F) -> Self
    where
        F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<Option<D>>> + Send + 'static,
    {
        self.source(ReadManySource::DerivedFromReadById(read_by_id(supplier)))
    }

    /// Set the data source directly
    pub fn source(mut self, source: ReadManySource<R, D>) -> Self {
        self.source = Some(source);
        self
    }

    /// Add a relationship binding
    pub fn relationship(mut self, binding: RelationshipBinding<R, D>) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Add several relationship bindings
    pub fn relationships(
        mut self,
        bindings: impl IntoIterator<Item = RelationshipBinding<R, D>>,
    ) -> Self {
        self.bindings.extend(bindings);
        self
    }

    /// Relationships that must have a simple or batch resolver bound
    pub fn default_relationships<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_relationships
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Operation-level inbound requirements
    pub fn inbound(mut self, requirements: AccessControlRequirements) -> Self {
        self.access.inbound = Some(requirements);
        self
    }

    /// Operation-level outbound requirements, merged over the descriptor's
    pub fn outbound(mut self, requirements: ResourceOutbound) -> Self {
        self.access.outbound = Some(requirements);
        self
    }

    /// Config-level policy, the broadest declaration
    pub fn policy(mut self, policy: ResourcePolicy) -> Self {
        self.access.policy = Some(policy);
        self
    }

    /// Take the config-level policy of this resource type
    pub fn config(self, config: &EngineConfig) -> Self {
        let policy = config.policy_for(self.descriptor.resource_type());
        self.policy(policy)
    }

    /// Override the prefix of generated links
    pub fn root_path(mut self, root_path: impl Into<String>) -> Self {
        self.access.root_path = Some(root_path.into());
        self
    }

    /// Run relationship tasks on an executor instead of inline
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Build the pipeline, validating every binding
    pub fn build(self) -> Result<MultipleResourcesPipeline<R, D>, ConfigError> {
        let resource_type = self.descriptor.resource_type().to_string();
        let source = self
            .source
            .ok_or_else(|| ConfigError::missing_argument("data supplier", &resource_type))?;

        let relationships = RelationshipSet::new(resource_type, self.bindings)?;
        relationships.require_resolvers(self.default_relationships.iter().map(String::as_str))?;

        Ok(MultipleResourcesPipeline {
            inbound: self.access.effective_inbound(OperationKind::ReadMany),
            outbound: self.access.effective_outbound(self.descriptor.outbound()),
            root_path: self.access.effective_root_path(),
            descriptor: self.descriptor,
            source,
            relationships,
            executor: self.executor,
        })
    }
}
