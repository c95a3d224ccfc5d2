//! Configuration loading and management
//!
//! ```yaml
//! root_path: /api
//! resources:
//!   - type: users
//!     inbound:
//!       all: { authentication: authenticated }
//!       read_many: { tier: admin }
//!     outbound:
//!       resource: { ownership: owner_or_admin }
//!       attributes:
//!         email: { ownership: owner }
//!     relationships:
//!       - name: country
//!         cardinality: to_one
//!         related_type: countries
//! ```

use crate::core::auth::{
    AccessControlRequirements, ResourceField, ResourceOutbound, merge_requirements,
};
use crate::core::document::Cardinality;
use crate::core::error::ConfigError;
use crate::operations::OperationKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Inbound requirements of one resource type, per operation kind
///
/// `all` applies to every operation and is overridden field by field by the
/// operation-specific entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InboundConfig {
    pub all: Option<AccessControlRequirements>,
    pub read_by_id: Option<AccessControlRequirements>,
    pub read_many: Option<AccessControlRequirements>,
    pub create: Option<AccessControlRequirements>,
    pub update: Option<AccessControlRequirements>,
    pub delete: Option<AccessControlRequirements>,
    pub read_to_one: Option<AccessControlRequirements>,
    pub read_to_many: Option<AccessControlRequirements>,
    pub update_to_one: Option<AccessControlRequirements>,
    pub update_to_many: Option<AccessControlRequirements>,
}

impl InboundConfig {
    fn specific(&self, kind: OperationKind) -> Option<&AccessControlRequirements> {
        match kind {
            OperationKind::ReadById => self.read_by_id.as_ref(),
            OperationKind::ReadMany => self.read_many.as_ref(),
            OperationKind::Create => self.create.as_ref(),
            OperationKind::Update => self.update.as_ref(),
            OperationKind::Delete => self.delete.as_ref(),
            OperationKind::ReadToOne => self.read_to_one.as_ref(),
            OperationKind::ReadToMany => self.read_to_many.as_ref(),
            OperationKind::UpdateToOne => self.update_to_one.as_ref(),
            OperationKind::UpdateToMany => self.update_to_many.as_ref(),
        }
    }

    /// Requirements for one operation kind, merged with `all`
    pub fn for_kind(&self, kind: OperationKind) -> Option<AccessControlRequirements> {
        merge_requirements(self.specific(kind), self.all.as_ref())
    }

    /// Overlay `other`; its values win field by field
    fn merge(&self, other: &Self) -> Self {
        let pick = |mine: &Option<AccessControlRequirements>,
                    theirs: &Option<AccessControlRequirements>| {
            merge_requirements(theirs.as_ref(), mine.as_ref())
        };
        Self {
            all: pick(&self.all, &other.all),
            read_by_id: pick(&self.read_by_id, &other.read_by_id),
            read_many: pick(&self.read_many, &other.read_many),
            create: pick(&self.create, &other.create),
            update: pick(&self.update, &other.update),
            delete: pick(&self.delete, &other.delete),
            read_to_one: pick(&self.read_to_one, &other.read_to_one),
            read_to_many: pick(&self.read_to_many, &other.read_to_many),
            update_to_one: pick(&self.update_to_one, &other.update_to_one),
            update_to_many: pick(&self.update_to_many, &other.update_to_many),
        }
    }
}

/// Outbound requirements of one resource type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutboundConfig {
    /// Gate for the whole resource
    pub resource: Option<AccessControlRequirements>,
    /// Per-attribute gates; a failing gate nulls the attribute
    pub attributes: IndexMap<String, AccessControlRequirements>,
    /// Per-relationship gates; a failing gate removes the relationship
    pub relationships: IndexMap<String, AccessControlRequirements>,
}

impl OutboundConfig {
    /// Convert to the outbound requirements used by the pipelines
    pub fn to_requirements(&self) -> ResourceOutbound {
        let mut outbound = ResourceOutbound::new();
        outbound.object = self.resource.clone();
        for (name, requirements) in &self.attributes {
            outbound = outbound.field(ResourceField::Attribute(name.clone()), requirements.clone());
        }
        for (name, requirements) in &self.relationships {
            outbound = outbound.field(
                ResourceField::Relationship(name.clone()),
                requirements.clone(),
            );
        }
        outbound
    }

    /// Overlay `other`; its values win field by field, entry by entry
    fn merge(&self, other: &Self) -> Self {
        Self {
            resource: merge_requirements(other.resource.as_ref(), self.resource.as_ref()),
            attributes: merge_entries(&self.attributes, &other.attributes),
            relationships: merge_entries(&self.relationships, &other.relationships),
        }
    }
}

fn merge_entries(
    base: &IndexMap<String, AccessControlRequirements>,
    overlay: &IndexMap<String, AccessControlRequirements>,
) -> IndexMap<String, AccessControlRequirements> {
    let mut merged = base.clone();
    for (name, requirements) in overlay {
        let entry = match base.get(name) {
            Some(existing) => requirements.merge(existing),
            None => requirements.clone(),
        };
        merged.insert(name.clone(), entry);
    }
    merged
}

/// Declared relationship of a resource type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub name: String,
    pub cardinality: Cardinality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_type: Option<String>,
}

/// Configuration for a resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default)]
    pub inbound: InboundConfig,

    #[serde(default)]
    pub outbound: OutboundConfig,

    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
}

impl ResourceConfig {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            inbound: InboundConfig::default(),
            outbound: OutboundConfig::default(),
            relationships: Vec::new(),
        }
    }
}

/// Complete configuration of the document engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix of every generated link
    #[serde(default)]
    pub root_path: String,

    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let parse_error = |message: String| ConfigError::ParseError {
            file: Some(path.display().to_string()),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| parse_error(e.to_string()))?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
        config.check_duplicates()?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            file: None,
            message: e.to_string(),
        })?;
        config.check_duplicates()?;
        Ok(config)
    }

    /// Overlay another configuration on this one
    ///
    /// Resources are matched by type. The other side wins for every value
    /// it sets; relationships are matched by name.
    pub fn merge(&mut self, other: EngineConfig) {
        if !other.root_path.is_empty() {
            self.root_path = other.root_path;
        }
        for incoming in other.resources {
            match self
                .resources
                .iter_mut()
                .find(|r| r.resource_type == incoming.resource_type)
            {
                Some(existing) => {
                    existing.inbound = existing.inbound.merge(&incoming.inbound);
                    existing.outbound = existing.outbound.merge(&incoming.outbound);
                    for relationship in incoming.relationships {
                        match existing
                            .relationships
                            .iter_mut()
                            .find(|r| r.name == relationship.name)
                        {
                            Some(slot) => *slot = relationship,
                            None => existing.relationships.push(relationship),
                        }
                    }
                }
                None => self.resources.push(incoming),
            }
        }
    }

    pub fn resource(&self, resource_type: &str) -> Option<&ResourceConfig> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type)
    }

    /// Effective config-level policy of a resource type
    ///
    /// Unconfigured types get an empty policy that still carries the root path.
    pub fn policy_for(&self, resource_type: &str) -> ResourcePolicy {
        match self.resource(resource_type) {
            Some(resource) => ResourcePolicy {
                root_path: self.root_path.clone(),
                inbound: resource.inbound.clone(),
                outbound: resource.outbound.to_requirements(),
            },
            None => ResourcePolicy {
                root_path: self.root_path.clone(),
                ..ResourcePolicy::default()
            },
        }
    }

    fn check_duplicates(&self) -> Result<(), ConfigError> {
        for (index, resource) in self.resources.iter().enumerate() {
            if self.resources[..index]
                .iter()
                .any(|r| r.resource_type == resource.resource_type)
            {
                return Err(ConfigError::duplicate("resource", resource.resource_type.clone()));
            }
            for (i, relationship) in resource.relationships.iter().enumerate() {
                if resource.relationships[..i]
                    .iter()
                    .any(|r| r.name == relationship.name)
                {
                    return Err(ConfigError::duplicate(
                        "relationship",
                        format!("{}.{}", resource.resource_type, relationship.name),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Config-level access policy of one resource type, ready for the pipelines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcePolicy {
    pub root_path: String,
    pub inbound: InboundConfig,
    pub outbound: ResourceOutbound,
}

impl ResourcePolicy {
    pub fn inbound(&self, kind: OperationKind) -> Option<AccessControlRequirements> {
        self.inbound.for_kind(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::{Authentication, Ownership};
    use crate::core::request::AccessTier;

    const YAML: &str = r#"
root_path: /api
resources:
  - type: users
    inbound:
      all: { authentication: authenticated }
      read_many: { tier: admin }
    outbound:
      resource: { ownership: owner_or_admin }
      attributes:
        email: { ownership: owner }
      relationships:
        tags: { scopes: [tags.read] }
    relationships:
      - name: country
        cardinality: to_one
        related_type: countries
"#;

    #[test]
    fn test_yaml_parsing() {
        let config = EngineConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.root_path, "/api");
        let users = config.resource("users").unwrap();
        assert_eq!(users.relationships[0].cardinality, Cardinality::ToOne);
        assert_eq!(users.outbound.attributes.len(), 1);
    }

    #[test]
    fn test_inbound_merges_with_all() {
        let policy = EngineConfig::from_yaml_str(YAML).unwrap().policy_for("users");
        let read_many = policy.inbound(OperationKind::ReadMany).unwrap();
        assert_eq!(read_many.authentication, Some(Authentication::Authenticated));
        assert_eq!(read_many.tier, Some(AccessTier::Admin));

        let read_by_id = policy.inbound(OperationKind::ReadById).unwrap();
        assert_eq!(read_by_id.tier, None);
    }

    #[test]
    fn test_outbound_config_becomes_field_requirements() {
        let policy = EngineConfig::from_yaml_str(YAML).unwrap().policy_for("users");
        assert_eq!(
            policy.outbound.object.as_ref().unwrap().ownership,
            Some(Ownership::OwnerOrAdmin)
        );
        let fields: Vec<_> = policy.outbound.fields.iter().map(|(f, _)| f.to_string()).collect();
        assert_eq!(fields, vec!["attributes.email", "relationships.tags"]);
    }

    #[test]
    fn test_unknown_type_gets_empty_policy() {
        let policy = EngineConfig::from_yaml_str(YAML).unwrap().policy_for("countries");
        assert_eq!(policy.root_path, "/api");
        assert!(policy.inbound(OperationKind::ReadById).is_none());
        assert!(policy.outbound.is_empty());
    }

    #[test]
    fn test_invalid_yaml_is_a_parse_error() {
        let err = EngineConfig::from_yaml_str("resources: [ {type: users, inbound: {bogus: {}}} ]")
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { file: None, .. }));
    }

    #[test]
    fn test_duplicate_resource_types_are_rejected() {
        let yaml = "resources:\n  - type: users\n  - type: users\n";
        assert!(matches!(
            EngineConfig::from_yaml_str(yaml),
            Err(ConfigError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_merge_overlays_per_field() {
        let mut base = EngineConfig::from_yaml_str(YAML).unwrap();
        let overlay = EngineConfig::from_yaml_str(
            r#"
resources:
  - type: users
    inbound:
      all: { tier: partner }
    relationships:
      - name: tags
        cardinality: to_many
  - type: countries
"#,
        )
        .unwrap();
        base.merge(overlay);

        assert_eq!(base.root_path, "/api");
        assert_eq!(base.resources.len(), 2);
        let users = base.resource("users").unwrap();
        let all = users.inbound.all.as_ref().unwrap();
        assert_eq!(all.tier, Some(AccessTier::Partner));
        assert_eq!(all.authentication, Some(Authentication::Authenticated));
        assert_eq!(users.relationships.len(), 2);
    }

    #[test]
    fn test_yaml_serialization() {
        let config = EngineConfig::from_yaml_str(YAML).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = EngineConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
