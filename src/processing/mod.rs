//! Document pipelines and the machinery they share

pub mod executor;
pub mod multiple;
pub mod relationship;
pub mod relationships;
pub mod single;

pub use executor::{Scheduled, TaskExecutor, TokioExecutor};
pub use multiple::{MultipleResourcesPipeline, MultipleResourcesPipelineBuilder};
pub use relationship::{RelationshipDocumentPipeline, RelationshipDocumentPipelineBuilder};
pub use relationships::RelationshipSet;
pub use single::{SingleResourcePipeline, SingleResourcePipelineBuilder};

use crate::config::ResourcePolicy;
use crate::core::auth::{AccessControlRequirements, ResourceOutbound, merge_requirements};
use crate::core::document::{Resource, assemble_resource};
use crate::core::error::EngineResult;
use crate::core::request::JsonApiRequest;
use crate::domain::{DataItem, Parent, ResourceDescriptor};
use crate::operations::OperationKind;
use std::sync::Arc;

/// One fetched item after the describe step
pub(crate) struct Described<D> {
    pub parent: Parent<D>,
    pub resource: Resource,
    pub owner_id: Option<String>,
}

/// Resolve id, attributes and resource-level links/meta of an item
pub(crate) fn describe<R: JsonApiRequest, D: DataItem>(
    descriptor: &ResourceDescriptor<R, D>,
    request: &R,
    item: D,
    root_path: &Arc<str>,
) -> EngineResult<Described<D>> {
    let id = descriptor.id_of(&item)?;
    let resource = assemble_resource(
        id.clone(),
        descriptor.resource_type().to_string(),
        descriptor.attributes_of(&item)?,
        descriptor.resource_links(request, &item, root_path, &id),
        descriptor.resource_meta(request, &item),
    );
    let owner_id = descriptor.owner_id_of(&item);
    Ok(Described {
        parent: Parent {
            resource_type: descriptor.resource_type().to_string(),
            id,
            root_path: root_path.clone(),
            item,
        },
        resource,
        owner_id,
    })
}

/// Access settings collected by a pipeline builder
///
/// Resolution order for both gates: pipeline-level, then descriptor-level
/// (outbound only), then config-level. The more specific value wins per
/// field.
#[derive(Default)]
pub(crate) struct AccessSettings {
    pub inbound: Option<AccessControlRequirements>,
    pub outbound: Option<ResourceOutbound>,
    pub policy: Option<ResourcePolicy>,
    pub root_path: Option<String>,
}

impl AccessSettings {
    pub fn effective_inbound(&self, kind: OperationKind) -> Option<AccessControlRequirements> {
        let configured = self.policy.as_ref().and_then(|p| p.inbound(kind));
        merge_requirements(self.inbound.as_ref(), configured.as_ref())
    }

    pub fn effective_outbound(&self, declared: &ResourceOutbound) -> ResourceOutbound {
        let code = match &self.outbound {
            Some(outbound) => outbound.merge(declared),
            None => declared.clone(),
        };
        match &self.policy {
            Some(policy) => code.merge(&policy.outbound),
            None => code,
        }
    }

    pub fn effective_root_path(&self) -> Arc<str> {
        let root = self
            .root_path
            .as_deref()
            .or_else(|| self.policy.as_ref().map(|p| p.root_path.as_str()))
            .unwrap_or("");
        Arc::from(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::auth::ResourceField;
    use crate::core::request::AccessTier;

    #[test]
    fn test_code_level_inbound_wins_per_field() {
        let config = EngineConfig::from_yaml_str(
            "root_path: /api\nresources:\n  - type: users\n    inbound:\n      all: { authentication: authenticated, tier: partner }\n",
        )
        .unwrap();
        let settings = AccessSettings {
            inbound: Some(AccessControlRequirements::new().with_tier(AccessTier::Admin)),
            policy: Some(config.policy_for("users")),
            ..AccessSettings::default()
        };

        let inbound = settings.effective_inbound(OperationKind::ReadById).unwrap();
        assert_eq!(inbound.tier, Some(AccessTier::Admin));
        assert!(inbound.authentication.is_some());
        assert_eq!(&*settings.effective_root_path(), "/api");
    }

    #[test]
    fn test_outbound_layers_are_merged() {
        let declared = ResourceOutbound::new().field(
            ResourceField::Attribute("email".into()),
            AccessControlRequirements::owner(),
        );
        let settings = AccessSettings {
            outbound: Some(
                ResourceOutbound::new().object(AccessControlRequirements::authenticated()),
            ),
            ..AccessSettings::default()
        };

        let outbound = settings.effective_outbound(&declared);
        assert!(outbound.object.is_some());
        assert_eq!(outbound.fields.len(), 1);
        assert_eq!(&*settings.effective_root_path(), "");
    }
}
