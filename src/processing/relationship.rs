//! Relationship-document pipeline (`/{type}/{id}/relationships/{name}`)
//!
//! Fetches the parent item and resolves one relationship with data, whether
//! or not the request includes it.

use super::{AccessSettings, describe};
use crate::config::{EngineConfig, ResourcePolicy};
use crate::core::auth::{
    AccessControlRequirements, ResourceField, ResourceOutbound, evaluate_inbound,
    evaluate_outbound,
};
use crate::core::document::{Cardinality, RelationshipDoc};
use crate::core::error::{ConfigError, EngineResult};
use crate::core::request::JsonApiRequest;
use crate::domain::relationship::ResolverKind;
use crate::domain::{DataItem, RelationshipBinding, ResourceDescriptor};
use crate::operations::{OperationKind, ReadByIdFn, read_by_id};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

pub struct RelationshipDocumentPipeline<R, D> {
    descriptor: Arc<ResourceDescriptor<R, D>>,
    parent_supplier: ReadByIdFn<R, D>,
    binding: RelationshipBinding<R, D>,
    inbound: Option<AccessControlRequirements>,
    outbound: ResourceOutbound,
    root_path: Arc<str>,
}

impl<R: JsonApiRequest, D: DataItem> RelationshipDocumentPipeline<R, D> {
    /// Create a new RelationshipDocumentPipelineBuilder
    pub fn builder(
        descriptor: Arc<ResourceDescriptor<R, D>>,
        binding: RelationshipBinding<R, D>,
    ) -> RelationshipDocumentPipelineBuilder<R, D> {
        RelationshipDocumentPipelineBuilder {
            descriptor,
            binding,
            parent_supplier: None,
            access: AccessSettings::default(),
        }
    }

    pub fn relationship(&self) -> &str {
        self.binding.name()
    }

    /// Resolve the relationship document of the requested parent
    ///
    /// A denied or missing parent, a hidden relationship and a not-found
    /// from the resolver all yield an empty linkage.
    pub async fn to_document(&self, request: impl Into<Arc<R>>) -> EngineResult<RelationshipDoc> {
        let request = request.into();
        let span = tracing::debug_span!(
            "relationship_document",
            resource_type = %self.descriptor.resource_type(),
            relationship = %self.binding.name(),
            trace_id = %request.context().trace_id,
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: Arc<R>) -> EngineResult<RelationshipDoc> {
        let empty = RelationshipDoc::empty(self.binding.cardinality());
        if !evaluate_inbound(request.as_ref(), self.inbound.as_ref()) {
            tracing::debug!("inbound access denied, skipping fetch");
            return Ok(empty);
        }

        let item = match (self.parent_supplier)(request.clone()).await {
            Ok(Some(item)) => item,
            Ok(None) => return Ok(empty),
            Err(e) if e.is_not_found() => return Ok(empty),
            Err(e) => return Err(e),
        };
        let described = describe(&self.descriptor, request.as_ref(), item, &self.root_path)?;
        let auth = &request.context().auth;
        let owner_id = described.owner_id.as_deref();

        let field = ResourceField::Relationship(self.binding.name().to_string());
        let relationship_gate = self
            .outbound
            .fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, requirements)| requirements);
        if !evaluate_outbound(auth, owner_id, self.outbound.object.as_ref())
            || !evaluate_outbound(auth, owner_id, relationship_gate)
        {
            tracing::debug!(id = %described.parent.id, "outbound access denied for relationship");
            return Ok(empty);
        }

        let parent = described.parent;
        let resolved = match self.binding.kind() {
            ResolverKind::LinkOnly => return Ok(self.binding.link_only_doc(&request, &parent)),
            ResolverKind::Simple(resolve) => resolve(request.clone(), parent.clone()).await,
            ResolverKind::Batch(resolve) => resolve(request.clone(), vec![parent.clone()])
                .await
                .map(|mut docs| {
                    docs.remove(&parent.id).unwrap_or_else(|| {
                        tracing::warn!(
                            parent = %parent.id,
                            "batch result has no entry for parent, using empty linkage"
                        );
                        self.binding.empty_doc(&request, &parent)
                    })
                }),
        };
        match resolved {
            Err(e) if e.is_not_found() => Ok(self.binding.empty_doc(&request, &parent)),
            other => other,
        }
    }
}

pub struct RelationshipDocumentPipelineBuilder<R, D> {
    descriptor: Arc<ResourceDescriptor<R, D>>,
    binding: RelationshipBinding<R, D>,
    parent_supplier: Option<ReadByIdFn<R, D>>,
    access: AccessSettings,
}

impl<R: JsonApiRequest, D: DataItem> RelationshipDocumentPipelineBuilder<R, D> {
    /// Supplier of the parent item
    pub fn supplier<F, Fut>(self, supplier: F) -> Self
    where
        F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<Option<D>>> + Send + 'static,
    {
        self.supplier_fn(read_by_id(supplier))
    }

    /// Set an already erased parent supplier
    pub fn supplier_fn(mut self, supplier: ReadByIdFn<R, D>) -> Self {
        self.parent_supplier = Some(supplier);
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

    /// Take the config-level policy of the parent type
    pub fn config(self, config: &EngineConfig) -> Self {
        let policy = config.policy_for(self.descriptor.resource_type());
        self.policy(policy)
    }

    /// Override the prefix of generated links
    pub fn root_path(mut self, root_path: impl Into<String>) -> Self {
        self.access.root_path = Some(root_path.into());
        self
    }

    /// Build the pipeline (supplier required)
    pub fn build(self) -> Result<RelationshipDocumentPipeline<R, D>, ConfigError> {
        let parent_supplier = self.parent_supplier.ok_or_else(|| {
            ConfigError::missing_argument("parent supplier", self.descriptor.resource_type())
        })?;
        let kind = match self.binding.cardinality() {
            Cardinality::ToOne => OperationKind::ReadToOne,
            Cardinality::ToMany => OperationKind::ReadToMany,
        };

        Ok(RelationshipDocumentPipeline {
            inbound: self.access.effective_inbound(kind),
            outbound: self.access.effective_outbound(self.descriptor.outbound()),
            root_path: self.access.effective_root_path(),
            descriptor: self.descriptor,
            parent_supplier,
            binding: self.binding,
        })
    }
}
