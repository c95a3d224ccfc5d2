//! Single-resource pipeline
//!
//! ```rust,ignore
//! let pipeline = SingleResourcePipeline::builder(users.clone())
//!     .supplier(|req: Arc<Request>| async move { repo.find(req.resource_id()).await })
//!     .relationship(country.link_only())
//!     .relationship(tags.resolved_by(|req, user| async move { repo.tags_of(&user).await }))
//!     .default_relationships(["tags"])
//!     .executor(Arc::new(TokioExecutor::current()))
//!     .build()?;
//!
//! let doc = pipeline.to_document(request).await?;
//! ```

use super::executor::TaskExecutor;
use super::relationships::RelationshipSet;
use super::{AccessSettings, describe};
use crate::config::{EngineConfig, ResourcePolicy};
use crate::core::auth::{
    AccessControlRequirements, ResourceOutbound, anonymize_if_needed, evaluate_inbound,
};
use crate::core::document::{SingleResourceDoc, assemble_single};
use crate::core::error::{ConfigError, EngineResult};
use crate::core::request::JsonApiRequest;
use crate::domain::{DataItem, RelationshipBinding, ResourceDescriptor};
use crate::operations::{OperationKind, ReadByIdFn, read_by_id};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

/// Validated configuration producing one-resource documents
pub struct SingleResourcePipeline<R, D> {
    descriptor: Arc<ResourceDescriptor<R, D>>,
    supplier: ReadByIdFn<R, D>,
    relationships: RelationshipSet<R, D>,
    inbound: Option<AccessControlRequirements>,
    outbound: ResourceOutbound,
    root_path: Arc<str>,
    executor: Option<Arc<dyn TaskExecutor>>,
}

impl<R: JsonApiRequest, D: DataItem> SingleResourcePipeline<R, D> {
    /// Create a new SingleResourcePipelineBuilder
    pub fn builder(descriptor: Arc<ResourceDescriptor<R, D>>) -> SingleResourcePipelineBuilder<R, D> {
        SingleResourcePipelineBuilder {
            descriptor,
            supplier: None,
            bindings: Vec::new(),
            default_relationships: Vec::new(),
            access: AccessSettings::default(),
            executor: None,
        }
    }

    pub fn resource_type(&self) -> &str {
        self.descriptor.resource_type()
    }

    /// Effective inbound requirements after merging every level
    pub fn inbound(&self) -> Option<&AccessControlRequirements> {
        self.inbound.as_ref()
    }

    /// Effective outbound requirements after merging every level
    pub fn outbound(&self) -> &ResourceOutbound {
        &self.outbound
    }

    /// Run the pipeline for one request
    ///
    /// Denied access and a missing item both yield a document with `data:
    /// null`; only supplier and resolver failures are returned as errors.
    pub async fn to_document(&self, request: impl Into<Arc<R>>) -> EngineResult<SingleResourceDoc> {
        let request = request.into();
        let span = tracing::debug_span!(
            "single_resource",
            resource_type = %self.descriptor.resource_type(),
            trace_id = %request.context().trace_id,
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: Arc<R>) -> EngineResult<SingleResourceDoc> {
        if !evaluate_inbound(request.as_ref(), self.inbound.as_ref()) {
            tracing::debug!("inbound access denied, skipping fetch");
            return Ok(self.empty_document(&request));
        }

        let item = match (self.supplier)(request.clone()).await {
            Ok(Some(item)) => item,
            Ok(None) => return Ok(self.empty_document(&request)),
            Err(e) if e.is_not_found() => {
                tracing::debug!(error = %e, "item not found");
                return Ok(self.empty_document(&request));
            }
            Err(e) => return Err(e),
        };

        let described = describe(&self.descriptor, request.as_ref(), item, &self.root_path)?;
        let auth = &request.context().auth;
        let owner_id = described.owner_id.as_deref();

        let gated = anonymize_if_needed(
            Some(&described.resource),
            auth,
            owner_id,
            &self.outbound.object_only(),
        );
        let Some(resource) = gated.into_target() else {
            tracing::debug!(id = %described.parent.id, "outbound access denied for resource");
            return Ok(self.empty_document(&request));
        };

        let mut relationships = self
            .relationships
            .resolve(
                &request,
                std::slice::from_ref(&described.parent),
                self.executor.as_deref(),
            )
            .await?;
        let resource = resource.with_relationships(relationships.pop().unwrap_or_default());

        let redacted = anonymize_if_needed(Some(&resource), auth, owner_id, &self.outbound.fields_only());
        if redacted.is_partially_anonymized() {
            tracing::debug!(
                id = %described.parent.id,
                fields = ?redacted.anonymized_fields,
                "anonymized resource fields"
            );
        }
        let resource = redacted.into_target().unwrap_or(resource);

        let item = Some(&described.parent.item);
        Ok(assemble_single(
            Some(resource),
            self.descriptor.document_links(&request, item, &self.root_path),
            self.descriptor.document_meta(&request, item),
        ))
    }

    fn empty_document(&self, request: &R) -> SingleResourceDoc {
        assemble_single(
            None,
            self.descriptor.document_links(request, None, &self.root_path),
            self.descriptor.document_meta(request, None),
        )
    }
}

/// Collects single-resource configuration; everything is checked in `build`
pub struct SingleResourcePipelineBuilder<R, D> {
    descriptor: Arc<ResourceDescriptor<R, D>>,
    supplier: Option<ReadByIdFn<R, D>>,
    bindings: Vec<RelationshipBinding<R, D>>,
    default_relationships: Vec<String>,
    access: AccessSettings,
    executor: Option<Arc<dyn TaskExecutor>>,
}

impl<R: JsonApiRequest, D: DataItem> SingleResourcePipelineBuilder<R, D> {
    /// Data supplier; `Ok(None)` or a not-found error means no item
    pub fn supplier<F, Fut>(self, supplier: F) -> Self
    where
        F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<Option<D>>> + Send + 'static,
    {
        self.supplier_fn(read_by_id(supplier))
    }

    /// Set an already erased supplier
    pub fn supplier_fn(mut self, supplier: ReadByIdFn<R, D>) -> Self {
        self.supplier = Some(supplier);
        self
    }

    /// Add a relationship binding
    pub fn relationship(mut self, binding: RelationshipBinding<R, D>) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Add several relationship bindings
    pub fn relationships(mut self, bindings: impl IntoIterator<Item = RelationshipBinding<R, D>>) -> Self {
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
    pub fn build(self) -> Result<SingleResourcePipeline<R, D>, ConfigError> {
        let resource_type = self.descriptor.resource_type().to_string();
        let supplier = self
            .supplier
            .ok_or_else(|| ConfigError::missing_argument("data supplier", &resource_type))?;

        let relationships = RelationshipSet::new(resource_type, self.bindings)?;
        relationships.require_resolvers(self.default_relationships.iter().map(String::as_str))?;

        Ok(SingleResourcePipeline {
            inbound: self.access.effective_inbound(OperationKind::ReadById),
            outbound: self.access.effective_outbound(self.descriptor.outbound()),
            root_path: self.access.effective_root_path(),
            descriptor: self.descriptor,
            supplier,
            relationships,
            executor: self.executor,
        })
    }
}
