//! Entry point wiring registries, configuration and executor together

use crate::config::EngineConfig;
use crate::core::error::ConfigError;
use crate::core::request::JsonApiRequest;
use crate::domain::{DataItem, DomainRegistry};
use crate::operations::{Operation, OperationKind, OperationRegistry};
use crate::processing::{
    MultipleResourcesPipelineBuilder, MultipleResourcesPipeline, RelationshipDocumentPipeline,
    RelationshipDocumentPipelineBuilder, SingleResourcePipeline, SingleResourcePipelineBuilder,
    TaskExecutor,
};
use std::sync::Arc;

/// Hands out pre-configured pipeline builders per resource type
///
/// # Example
///
/// ```ignore
/// let engine = DocumentEngine::new(domain, operations)
///     .with_config(EngineConfig::from_yaml_file("engine.yaml")?)?
///     .with_executor(Arc::new(TokioExecutor::current()));
///
/// let users = engine.single::<User>("users")?.default_relationships(["tags"]).build()?;
/// let doc = users.to_document(request).await?;
/// ```
pub struct DocumentEngine<R> {
    domain: DomainRegistry,
    operations: OperationRegistry<R>,
    config: EngineConfig,
    executor: Option<Arc<dyn TaskExecutor>>,
}

impl<R: JsonApiRequest> DocumentEngine<R> {
    /// Create a new DocumentEngine over a domain and its operations
    pub fn new(domain: DomainRegistry, operations: OperationRegistry<R>) -> Self {
        Self {
            domain,
            operations,
            config: EngineConfig::default(),
            executor: None,
        }
    }

    /// Attach configuration; it is validated against the domain right away
    pub fn with_config(mut self, config: EngineConfig) -> Result<Self, ConfigError> {
        self.domain.validate_config(&config)?;
        self.config = config;
        Ok(self)
    }

    /// Run relationship tasks on an executor
    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn domain(&self) -> &DomainRegistry {
        &self.domain
    }

    pub fn operations(&self) -> &OperationRegistry<R> {
        &self.operations
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Single-resource builder backed by the `read_by_id` operation
    pub fn single<D: DataItem>(
        &self,
        resource_type: &str,
    ) -> Result<SingleResourcePipelineBuilder<R, D>, ConfigError> {
        let Some(Operation::ReadById { supplier, inbound }) =
            self.operations
                .get::<D>(resource_type, None, OperationKind::ReadById)?
        else {
            return Err(ConfigError::missing_argument("read_by_id operation", resource_type));
        };

        let mut builder = SingleResourcePipeline::builder(self.domain.resource::<R, D>(resource_type)?)
            .supplier_fn(supplier.clone())
            .relationships(self.domain.bindings::<R, D>(resource_type)?)
            .config(&self.config);
        if let Some(inbound) = inbound {
            builder = builder.inbound(inbound.clone());
        }
        if let Some(executor) = &self.executor {
            builder = builder.executor(executor.clone());
        }
        Ok(builder)
    }

    /// Multi-resource builder backed by `read_many`, or `read_by_id` as fallback
    pub fn multiple<D: DataItem>(
        &self,
        resource_type: &str,
    ) -> Result<MultipleResourcesPipelineBuilder<R, D>, ConfigError> {
        let (source, inbound) = self.operations.read_many_or_derived::<D>(resource_type)?;

        let mut builder =
            MultipleResourcesPipeline::builder(self.domain.resource::<R, D>(resource_type)?)
                .source(source)
                .relationships(self.domain.bindings::<R, D>(resource_type)?)
                .config(&self.config);
        if let Some(inbound) = inbound {
            builder = builder.inbound(inbound);
        }
        if let Some(executor) = &self.executor {
            builder = builder.executor(executor.clone());
        }
        Ok(builder)
    }

    /// Relationship-document builder for one registered relationship
    ///
    /// Uses the `read_to_one`/`read_to_many` operation of that relationship
    /// when registered, else the relationship's registered binding.
    pub fn relationship<D: DataItem>(
        &self,
        resource_type: &str,
        relationship: &str,
    ) -> Result<RelationshipDocumentPipelineBuilder<R, D>, ConfigError> {
        let Some(Operation::ReadById { supplier, .. }) =
            self.operations
                .get::<D>(resource_type, None, OperationKind::ReadById)?
        else {
            return Err(ConfigError::missing_argument("read_by_id operation", resource_type));
        };

        let operation = [OperationKind::ReadToOne, OperationKind::ReadToMany]
            .into_iter()
            .map(|kind| self.operations.get::<D>(resource_type, Some(relationship), kind))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .next();

        let (binding, inbound) = match operation {
            Some(Operation::ReadToOne { binding, inbound })
            | Some(Operation::ReadToMany { binding, inbound }) => (binding.clone(), inbound.clone()),
            _ => {
                let binding = self
                    .domain
                    .bindings::<R, D>(resource_type)?
                    .into_iter()
                    .find(|b| b.name() == relationship)
                    .ok_or_else(|| ConfigError::UndeclaredRelationship {
                        resource_type: resource_type.to_string(),
                        relationship: relationship.to_string(),
                    })?;
                (binding, None)
            }
        };

        let mut builder = RelationshipDocumentPipeline::builder(
            self.domain.resource::<R, D>(resource_type)?,
            binding,
        )
        .supplier_fn(supplier.clone())
        .config(&self.config);
        if let Some(inbound) = inbound {
            builder = builder.inbound(inbound);
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EngineResult;
    use crate::core::request::Request;
    use crate::domain::{ResourceDescriptor, ToManyRelationship};
    use crate::operations::read_by_id;

    #[derive(Clone)]
    struct User {
        id: String,
    }

    fn engine() -> DocumentEngine<Request> {
        let mut domain = DomainRegistry::new();
        domain
            .register_resource(
                ResourceDescriptor::<Request, User>::builder("users")
                    .id(|u: &User| u.id.clone())
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let tags = ToManyRelationship::<Request, User, String>::new("tags", "tags", |t| t.clone());
        domain
            .register_relationship(
                "users",
                tags.resolved_by(|_, _| async { EngineResult::Ok(vec!["a".to_string()]) }),
            )
            .unwrap();

        let mut operations = OperationRegistry::new();
        operations
            .register(
                "users",
                Operation::ReadById {
                    supplier: read_by_id(|req: Arc<Request>| async move {
                        EngineResult::Ok(req.resource_id().map(|id| User { id: id.to_string() }))
                    }),
                    inbound: None,
                },
            )
            .unwrap();
        DocumentEngine::new(domain, operations)
    }

    #[test]
    fn test_config_with_unknown_type_is_rejected() {
        let config = EngineConfig::from_yaml_str("resources:\n  - type: orders\n").unwrap();
        assert!(matches!(
            engine().with_config(config),
            Err(ConfigError::UnknownResourceType { .. })
        ));
    }

    #[test]
    fn test_config_relationship_without_binding_is_rejected() {
        let config = EngineConfig::from_yaml_str(
            "resources:\n  - type: users\n    relationships:\n      - { name: country, cardinality: to_one }\n",
        )
        .unwrap();
        assert!(matches!(
            engine().with_config(config),
            Err(ConfigError::MissingResolver { .. })
        ));
    }

    #[tokio::test]
    async fn test_single_builder_is_prewired() {
        let pipeline = engine()
            .single::<User>("users")
            .unwrap()
            .default_relationships(["tags"])
            .build()
            .unwrap();
        let doc = pipeline
            .to_document(Request::builder().resource_id("1").include("tags").build())
            .await
            .unwrap();
        let data = doc.data.unwrap();
        assert_eq!(data.id, "1");
        assert!(data.relationship("tags").is_some());
    }

    #[tokio::test]
    async fn test_multiple_builder_falls_back_to_read_by_id() {
        let pipeline = engine().multiple::<User>("users").unwrap().build().unwrap();
        assert!(pipeline.is_derived());
        let doc = pipeline
            .to_document(Request::builder().filter("id", ["2", "1"]).build())
            .await
            .unwrap();
        let ids: Vec<_> = doc.data.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[tokio::test]
    async fn test_relationship_builder_uses_registered_binding() {
        let engine = engine();
        let pipeline = engine.relationship::<User>("users", "tags").unwrap().build().unwrap();
        assert_eq!(pipeline.relationship(), "tags");

        assert!(matches!(
            engine.relationship::<User>("users", "country"),
            Err(ConfigError::UndeclaredRelationship { .. })
        ));
    }
}
