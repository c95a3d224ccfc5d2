//! Access control for document assembly
//!
//! Two gates:
//! - Inbound: evaluated against the request principal before any data fetch
//! - Outbound: evaluated against each fetched object and its owner id, either
//!   hiding the whole object or nulling individual fields
//!
//! Requirements can be declared at several levels (config-level per resource,
//! operation-level in code). [`AccessControlRequirements::merge`] combines
//! them; every field set at the more specific level wins.

use crate::core::document::Resource;
use crate::core::request::{AccessTier, AuthContext, JsonApiRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Authentication requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authentication {
    /// Any authenticated principal
    Authenticated,
    /// Only unauthenticated callers
    Anonymous,
    /// No constraint
    Any,
}

/// Ownership requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    /// Principal user id must equal the subject's owner id
    Owner,
    /// Owner, or any principal with at least the admin tier
    OwnerOrAdmin,
}

/// Access control requirements declared at one level
///
/// Every field is optional: an unset field places no constraint and falls
/// through to a broader declaration when merged.
///
/// Deserializes from a map of fields or from a compact policy string (see
/// [`AccessControlRequirements::parse_policy`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RequirementsRepr")]
pub struct AccessControlRequirements {
    pub authentication: Option<Authentication>,
    pub tier: Option<AccessTier>,
    pub scopes: Option<BTreeSet<String>>,
    pub ownership: Option<Ownership>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RequirementsRepr {
    Policy(String),
    Fields(RequirementFields),
}

#[derive(Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RequirementFields {
    authentication: Option<Authentication>,
    tier: Option<AccessTier>,
    scopes: Option<BTreeSet<String>>,
    ownership: Option<Ownership>,
}

impl TryFrom<RequirementsRepr> for AccessControlRequirements {
    type Error = String;

    fn try_from(repr: RequirementsRepr) -> Result<Self, Self::Error> {
        match repr {
            RequirementsRepr::Policy(policy) => Self::parse_policy(&policy)
                .ok_or_else(|| format!("invalid access policy `{}`", policy)),
            RequirementsRepr::Fields(fields) => Ok(Self {
                authentication: fields.authentication,
                tier: fields.tier,
                scopes: fields.scopes,
                ownership: fields.ownership,
            }),
        }
    }
}

impl AccessControlRequirements {
    /// Create empty requirements that let everything through
    pub fn new() -> Self {
        Self::default()
    }

    /// Require any authenticated principal
    pub fn authenticated() -> Self {
        Self::new().with_authentication(Authentication::Authenticated)
    }

    /// Require the principal to own the subject
    pub fn owner() -> Self {
        Self::new().with_ownership(Ownership::Owner)
    }

    /// Set the authentication requirement
    pub fn with_authentication(mut self, authentication: Authentication) -> Self {
        self.authentication = Some(authentication);
        self
    }

    /// Set the minimum access tier
    pub fn with_tier(mut self, tier: AccessTier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Set the scopes the principal must all hold
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Set the ownership requirement
    pub fn with_ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = Some(ownership);
        self
    }

    /// Whether no constraint is declared at all
    pub fn is_empty(&self) -> bool {
        self.authentication.is_none()
            && self.tier.is_none()
            && self.scopes.is_none()
            && self.ownership.is_none()
    }

    /// Merge with a broader declaration; values set on `self` win
    pub fn merge(&self, broader: &Self) -> Self {
        Self {
            authentication: self.authentication.or(broader.authentication),
            tier: self.tier.or(broader.tier),
            scopes: self.scopes.clone().or_else(|| broader.scopes.clone()),
            ownership: self.ownership.or(broader.ownership),
        }
    }

    /// Check a principal (and the subject's owner id) against these requirements
    pub fn check(&self, auth: &AuthContext, owner_id: Option<&str>) -> bool {
        let authentication_ok = match self.authentication {
            None | Some(Authentication::Any) => true,
            Some(Authentication::Authenticated) => auth.is_authenticated(),
            Some(Authentication::Anonymous) => !auth.is_authenticated(),
        };

        let tier_ok = self.tier.is_none_or(|required| auth.tier() >= required);

        let scopes_ok = self
            .scopes
            .as_ref()
            .is_none_or(|required| required.is_subset(auth.scopes()));

        let is_owner = || matches!((auth.user_id(), owner_id), (Some(u), Some(o)) if u == o);
        let ownership_ok = match self.ownership {
            None => true,
            Some(Ownership::Owner) => is_owner(),
            Some(Ownership::OwnerOrAdmin) => is_owner() || auth.tier() >= AccessTier::Admin,
        };

        authentication_ok && tier_ok && scopes_ok && ownership_ok
    }

    /// Parse a compact policy string
    ///
    /// Comma-separated terms: `public`, `authenticated`, `anonymous`, `owner`,
    /// `owner_or_admin`, `tier:<tier>`, `scope:<scope>`.
    pub fn parse_policy(s: &str) -> Option<Self> {
        let mut requirements = Self::new();
        for term in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match term {
                "public" => requirements.authentication = Some(Authentication::Any),
                "authenticated" => {
                    requirements.authentication = Some(Authentication::Authenticated)
                }
                "anonymous" => requirements.authentication = Some(Authentication::Anonymous),
                "owner" => requirements.ownership = Some(Ownership::Owner),
                "owner_or_admin" => requirements.ownership = Some(Ownership::OwnerOrAdmin),
                t if t.starts_with("tier:") => {
                    let tier = t.strip_prefix("tier:")?;
                    let tier: AccessTier =
                        serde_json::from_value(serde_json::Value::String(tier.to_string()))
                            .ok()?;
                    requirements.tier = Some(tier);
                }
                t if t.starts_with("scope:") => {
                    let scope = t.strip_prefix("scope:")?.to_string();
                    requirements.scopes.get_or_insert_with(BTreeSet::new).insert(scope);
                }
                _ => return None,
            }
        }
        Some(requirements)
    }
}

/// Merge two optional declarations; `specific` wins field by field
pub fn merge_requirements(
    specific: Option<&AccessControlRequirements>,
    broader: Option<&AccessControlRequirements>,
) -> Option<AccessControlRequirements> {
    match (specific, broader) {
        (Some(s), Some(b)) => Some(s.merge(b)),
        (Some(s), None) => Some(s.clone()),
        (None, Some(b)) => Some(b.clone()),
        (None, None) => None,
    }
}

/// Inbound gate: absent requirements always pass
pub fn evaluate_inbound<R: JsonApiRequest>(
    request: &R,
    requirements: Option<&AccessControlRequirements>,
) -> bool {
    requirements.is_none_or(|r| r.check(&request.context().auth, request.owner_id()))
}

/// Outbound gate for one candidate object
pub fn evaluate_outbound(
    auth: &AuthContext,
    owner_id: Option<&str>,
    requirements: Option<&AccessControlRequirements>,
) -> bool {
    requirements.is_none_or(|r| r.check(auth, owner_id))
}

// =============================================================================
// Anonymization
// =============================================================================

/// An object whose fields can be individually nulled
pub trait Anonymizable: Clone {
    /// Name of an anonymizable slot
    type Field: Clone + Ord + fmt::Debug;

    /// Null one field in place; false when the field is not present
    fn anonymize_field(&mut self, field: &Self::Field) -> bool;
}

/// Outbound requirements for one object type
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequirements<F> {
    /// Gate for the whole object
    pub object: Option<AccessControlRequirements>,
    /// Gates for individual fields, checked in declaration order
    pub fields: Vec<(F, AccessControlRequirements)>,
}

impl<F> Default for OutboundRequirements<F> {
    fn default() -> Self {
        Self {
            object: None,
            fields: Vec::new(),
        }
    }
}

impl<F: Clone + PartialEq> OutboundRequirements<F> {
    /// Create outbound requirements with no gates
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gate for the whole object
    pub fn object(mut self, requirements: AccessControlRequirements) -> Self {
        self.object = Some(requirements);
        self
    }

    /// Add a gate for one field
    pub fn field(mut self, field: F, requirements: AccessControlRequirements) -> Self {
        self.fields.push((field, requirements));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.object.is_none() && self.fields.is_empty()
    }

    /// Only the object-level gate
    pub fn object_only(&self) -> Self {
        Self {
            object: self.object.clone(),
            fields: Vec::new(),
        }
    }

    /// Only the field-level gates
    pub fn fields_only(&self) -> Self {
        Self {
            object: None,
            fields: self.fields.clone(),
        }
    }

    /// Merge with a broader declaration; `self` wins per field
    pub fn merge(&self, broader: &Self) -> Self {
        let mut fields = self.fields.clone();
        for (field, requirements) in &self.fields {
            if let Some((_, b)) = broader.fields.iter().find(|(f, _)| f == field)
                && let Some(slot) = fields.iter_mut().find(|(f, _)| f == field)
            {
                slot.1 = requirements.merge(b);
            }
        }
        for (field, requirements) in &broader.fields {
            if !fields.iter().any(|(f, _)| f == field) {
                fields.push((field.clone(), requirements.clone()));
            }
        }

        Self {
            object: merge_requirements(self.object.as_ref(), broader.object.as_ref()),
            fields,
        }
    }
}

/// Outcome of [`anonymize_if_needed`]
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymizationResult<T: Anonymizable> {
    pub target: Option<T>,
    pub fully_anonymized: bool,
    pub anonymized_fields: BTreeSet<T::Field>,
}

impl<T: Anonymizable> AnonymizationResult<T> {
    fn full() -> Self {
        Self {
            target: None,
            fully_anonymized: true,
            anonymized_fields: BTreeSet::new(),
        }
    }

    pub fn is_fully_anonymized(&self) -> bool {
        self.fully_anonymized
    }

    /// Whether at least one field was nulled
    pub fn is_partially_anonymized(&self) -> bool {
        !self.fully_anonymized && !self.anonymized_fields.is_empty()
    }

    pub fn into_target(self) -> Option<T> {
        self.target
    }
}

/// Apply outbound requirements to an object
///
/// A failing object gate (or an absent object) yields a fully anonymized
/// result without looking at fields. Otherwise each failing field gate nulls
/// its field on a copy; the original is left untouched.
pub fn anonymize_if_needed<T: Anonymizable>(
    original: Option<&T>,
    auth: &AuthContext,
    owner_id: Option<&str>,
    requirements: &OutboundRequirements<T::Field>,
) -> AnonymizationResult<T> {
    let Some(original) = original else {
        return AnonymizationResult::full();
    };

    if !evaluate_outbound(auth, owner_id, requirements.object.as_ref()) {
        return AnonymizationResult::full();
    }

    let mut target = original.clone();
    let mut anonymized_fields = BTreeSet::new();
    for (field, field_requirements) in &requirements.fields {
        if !field_requirements.check(auth, owner_id) && target.anonymize_field(field) {
            anonymized_fields.insert(field.clone());
        }
    }

    AnonymizationResult {
        target: Some(target),
        fully_anonymized: false,
        anonymized_fields,
    }
}

/// Anonymizable slots of a [`Resource`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceField {
    /// Attribute value, nulled
    Attribute(String),
    /// Relationship entry, removed from the relationships object
    Relationship(String),
}

impl fmt::Display for ResourceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceField::Attribute(name) => write!(f, "attributes.{}", name),
            ResourceField::Relationship(name) => write!(f, "relationships.{}", name),
        }
    }
}

impl Anonymizable for Resource {
    type Field = ResourceField;

    fn anonymize_field(&mut self, field: &ResourceField) -> bool {
        match field {
            ResourceField::Attribute(name) => self.null_attribute(name),
            ResourceField::Relationship(name) => self.drop_relationship(name),
        }
    }
}

/// Outbound requirements of a resource type
pub type ResourceOutbound = OutboundRequirements<ResourceField>;
