//! Registry of resource descriptors and relationship bindings
//!
//! Descriptors are generic over the request and item types, so the registry
//! stores them type-erased and hands typed clones back on lookup. Lookups with
//! the wrong types fail with [`ConfigError::TypeMismatch`] instead of
//! panicking.

use super::{DataItem, RelationshipBinding, ResourceDescriptor};
use crate::config::EngineConfig;
use crate::core::document::Cardinality;
use crate::core::error::ConfigError;
use crate::core::request::JsonApiRequest;
use indexmap::IndexMap;
use std::any::Any;
use std::sync::Arc;

/// Read-only view of a registered relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipInfo {
    pub name: String,
    pub cardinality: Cardinality,
    /// Label of the bound resolver (`link-only`, `simple`, `batch`)
    pub strategy: &'static str,
}

struct RegisteredRelationship {
    info: RelationshipInfo,
    binding: Arc<dyn Any + Send + Sync>,
}

struct ResourceEntry {
    descriptor: Arc<dyn Any + Send + Sync>,
    relationships: Vec<RegisteredRelationship>,
}

/// Registry for every resource type known to an application
///
/// Built once at startup; lookups never mutate it.
#[derive(Default)]
pub struct DomainRegistry {
    resources: IndexMap<String, ResourceEntry>,
}

impl DomainRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource descriptor under its resource type
    pub fn register_resource<R: JsonApiRequest, D: DataItem>(
        &mut self,
        descriptor: ResourceDescriptor<R, D>,
    ) -> Result<(), ConfigError> {
        let resource_type = descriptor.resource_type().to_string();
        if self.resources.contains_key(&resource_type) {
            return Err(ConfigError::duplicate("resource", resource_type));
        }
        tracing::debug!(resource_type = %resource_type, "registered resource");
        self.resources.insert(
            resource_type,
            ResourceEntry {
                descriptor: Arc::new(descriptor),
                relationships: Vec::new(),
            },
        );
        Ok(())
    }

    /// Attach a relationship binding to a registered resource type
    pub fn register_relationship<R: JsonApiRequest, D: DataItem>(
        &mut self,
        resource_type: &str,
        binding: RelationshipBinding<R, D>,
    ) -> Result<(), ConfigError> {
        let entry = self.entry_mut(resource_type)?;
        if !entry.descriptor.is::<ResourceDescriptor<R, D>>() {
            return Err(ConfigError::TypeMismatch {
                key: resource_type.to_string(),
            });
        }
        if entry.relationships.iter().any(|r| r.info.name == binding.name()) {
            return Err(ConfigError::duplicate(
                "relationship",
                format!("{}.{}", resource_type, binding.name()),
            ));
        }

        let info = RelationshipInfo {
            name: binding.name().to_string(),
            cardinality: binding.cardinality(),
            strategy: binding.kind().label(),
        };
        tracing::debug!(
            resource_type = %resource_type,
            relationship = %info.name,
            strategy = info.strategy,
            "registered relationship"
        );
        entry.relationships.push(RegisteredRelationship {
            info,
            binding: Arc::new(binding),
        });
        Ok(())
    }

    /// Typed descriptor of a resource type
    pub fn resource<R: JsonApiRequest, D: DataItem>(
        &self,
        resource_type: &str,
    ) -> Result<Arc<ResourceDescriptor<R, D>>, ConfigError> {
        self.entry(resource_type)?
            .descriptor
            .clone()
            .downcast::<ResourceDescriptor<R, D>>()
            .map_err(|_| ConfigError::TypeMismatch {
                key: resource_type.to_string(),
            })
    }

    /// Typed bindings of a resource type, in registration order
    pub fn bindings<R: JsonApiRequest, D: DataItem>(
        &self,
        resource_type: &str,
    ) -> Result<Vec<RelationshipBinding<R, D>>, ConfigError> {
        self.entry(resource_type)?
            .relationships
            .iter()
            .map(|r| {
                r.binding
                    .downcast_ref::<RelationshipBinding<R, D>>()
                    .cloned()
                    .ok_or_else(|| ConfigError::TypeMismatch {
                        key: format!("{}.{}", resource_type, r.info.name),
                    })
            })
            .collect()
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.resources.contains_key(resource_type)
    }

    /// Registered resource types, in registration order
    pub fn resource_types(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    pub fn relationships(&self, resource_type: &str) -> Result<Vec<&RelationshipInfo>, ConfigError> {
        Ok(self
            .entry(resource_type)?
            .relationships
            .iter()
            .map(|r| &r.info)
            .collect())
    }

    /// Check a loaded configuration against the registered domain
    ///
    /// Every configured resource must be registered, and every configured
    /// relationship must have a binding of the same cardinality.
    pub fn validate_config(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        for resource in &config.resources {
            let entry = self.entry(&resource.resource_type)?;
            for declared in &resource.relationships {
                let Some(registered) = entry
                    .relationships
                    .iter()
                    .find(|r| r.info.name == declared.name)
                else {
                    return Err(ConfigError::MissingResolver {
                        resource_type: resource.resource_type.clone(),
                        relationship: declared.name.clone(),
                    });
                };
                if registered.info.cardinality != declared.cardinality {
                    return Err(ConfigError::TypeMismatch {
                        key: format!("{}.{}", resource.resource_type, declared.name),
                    });
                }
            }
        }
        Ok(())
    }

    fn entry(&self, resource_type: &str) -> Result<&ResourceEntry, ConfigError> {
        self.resources
            .get(resource_type)
            .ok_or_else(|| ConfigError::UnknownResourceType {
                resource_type: resource_type.to_string(),
            })
    }

    fn entry_mut(&mut self, resource_type: &str) -> Result<&mut ResourceEntry, ConfigError> {
        self.resources
            .get_mut(resource_type)
            .ok_or_else(|| ConfigError::UnknownResourceType {
                resource_type: resource_type.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::request::Request;
    use crate::domain::{ToManyRelationship, ToOneRelationship};

    #[derive(Clone)]
    struct User {
        id: String,
    }

    #[derive(Clone)]
    struct Country;

    fn users() -> ResourceDescriptor<Request, User> {
        ResourceDescriptor::builder("users")
            .id(|u: &User| u.id.clone())
            .build()
            .unwrap()
    }

    fn registry() -> DomainRegistry {
        let mut registry = DomainRegistry::new();
        registry.register_resource(users()).unwrap();
        let tags = ToManyRelationship::<Request, User, String>::new("tags", "tags", |t| t.clone());
        registry
            .register_relationship("users", tags.link_only())
            .unwrap();
        registry
    }

    #[test]
    fn test_new_registry_is_empty() {
        assert!(DomainRegistry::new().resource_types().is_empty());
    }

    #[test]
    fn test_duplicate_resource_is_rejected() {
        let mut registry = registry();
        let err = registry.register_resource(users()).unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate { .. }));
    }

    #[test]
    fn test_duplicate_relationship_is_rejected() {
        let mut registry = registry();
        let tags = ToManyRelationship::<Request, User, String>::new("tags", "tags", |t| t.clone());
        let err = registry
            .register_relationship("users", tags.link_only())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Duplicate {
                kind: "relationship".into(),
                key: "users.tags".into()
            }
        );
    }

    #[test]
    fn test_typed_lookup() {
        let registry = registry();
        let descriptor = registry.resource::<Request, User>("users").unwrap();
        assert_eq!(descriptor.resource_type(), "users");

        let bindings = registry.bindings::<Request, User>("users").unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].name(), "tags");
    }

    #[test]
    fn test_lookup_with_wrong_item_type_fails() {
        let registry = registry();
        assert!(matches!(
            registry.resource::<Request, Country>("users"),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_relationship_on_unknown_type_fails() {
        let mut registry = DomainRegistry::new();
        let country = ToOneRelationship::<Request, User, Country>::new("country", "countries", |_| "DE".into());
        assert!(matches!(
            registry.register_relationship("users", country.link_only()),
            Err(ConfigError::UnknownResourceType { .. })
        ));
    }

    #[test]
    fn test_relationship_infos() {
        let registry = registry();
        let infos = registry.relationships("users").unwrap();
        assert_eq!(infos[0].cardinality, Cardinality::ToMany);
        assert_eq!(infos[0].strategy, "link-only");
    }
}
