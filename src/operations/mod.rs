//! Operation descriptors and the dispatch table keyed by resource type
//!
//! Each resource type registers the operations it supports as [`Operation`]
//! values. A transport adapter looks the operation up by
//! `(resource type, relationship, kind)` and drives the matching pipeline.

use crate::core::auth::AccessControlRequirements;
use crate::core::document::ResourceIdentifier;
use crate::core::error::{ConfigError, EngineResult};
use crate::core::page::CursorPage;
use crate::core::request::JsonApiRequest;
use crate::domain::{DataItem, RelationshipBinding};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Single-item supplier; `Ok(None)` means not found
pub type ReadByIdFn<R, D> =
    Arc<dyn Fn(Arc<R>) -> BoxFuture<'static, EngineResult<Option<D>>> + Send + Sync>;

/// Cursor-aware multi-item supplier
pub type ReadManyFn<R, D> =
    Arc<dyn Fn(Arc<R>) -> BoxFuture<'static, EngineResult<CursorPage<D>>> + Send + Sync>;

/// Create or update handler returning the written item
pub type WriteFn<R, D> = Arc<dyn Fn(Arc<R>) -> BoxFuture<'static, EngineResult<D>> + Send + Sync>;

pub type DeleteFn<R> = Arc<dyn Fn(Arc<R>) -> BoxFuture<'static, EngineResult<()>> + Send + Sync>;

pub type UpdateToOneFn<R> = Arc<
    dyn Fn(Arc<R>, Option<ResourceIdentifier>) -> BoxFuture<'static, EngineResult<()>> + Send + Sync,
>;

pub type UpdateToManyFn<R> =
    Arc<dyn Fn(Arc<R>, Vec<ResourceIdentifier>) -> BoxFuture<'static, EngineResult<()>> + Send + Sync>;

/// Wrap a single-item supplier closure
pub fn read_by_id<R, D, F, Fut>(supplier: F) -> ReadByIdFn<R, D>
where
    F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EngineResult<Option<D>>> + Send + 'static,
{
    Arc::new(move |request: Arc<R>| supplier(request).boxed())
}

/// Wrap a multi-item supplier closure
pub fn read_many<R, D, F, Fut>(supplier: F) -> ReadManyFn<R, D>
where
    F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EngineResult<CursorPage<D>>> + Send + 'static,
{
    Arc::new(move |request: Arc<R>| supplier(request).boxed())
}

/// Kind of an operation, as used in dispatch keys and configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ReadById,
    ReadMany,
    Create,
    Update,
    Delete,
    ReadToOne,
    ReadToMany,
    UpdateToOne,
    UpdateToMany,
}

impl OperationKind {
    pub fn is_relationship_operation(&self) -> bool {
        matches!(
            self,
            OperationKind::ReadToOne
                | OperationKind::ReadToMany
                | OperationKind::UpdateToOne
                | OperationKind::UpdateToMany
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::ReadById => "read_by_id",
            OperationKind::ReadMany => "read_many",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::ReadToOne => "read_to_one",
            OperationKind::ReadToMany => "read_to_many",
            OperationKind::UpdateToOne => "update_to_one",
            OperationKind::UpdateToMany => "update_to_many",
        };
        f.write_str(name)
    }
}

/// One operation a resource type supports, with its function set
pub enum Operation<R, D> {
    ReadById {
        supplier: ReadByIdFn<R, D>,
        inbound: Option<AccessControlRequirements>,
    },
    ReadMany {
        supplier: ReadManyFn<R, D>,
        inbound: Option<AccessControlRequirements>,
    },
    Create {
        handler: WriteFn<R, D>,
        inbound: Option<AccessControlRequirements>,
    },
    Update {
        handler: WriteFn<R, D>,
        inbound: Option<AccessControlRequirements>,
    },
    Delete {
        handler: DeleteFn<R>,
        inbound: Option<AccessControlRequirements>,
    },
    ReadToOne {
        binding: RelationshipBinding<R, D>,
        inbound: Option<AccessControlRequirements>,
    },
    ReadToMany {
        binding: RelationshipBinding<R, D>,
        inbound: Option<AccessControlRequirements>,
    },
    UpdateToOne {
        relationship: String,
        handler: UpdateToOneFn<R>,
        inbound: Option<AccessControlRequirements>,
    },
    UpdateToMany {
        relationship: String,
        handler: UpdateToManyFn<R>,
        inbound: Option<AccessControlRequirements>,
    },
}

impl<R, D> Operation<R, D> {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::ReadById { .. } => OperationKind::ReadById,
            Operation::ReadMany { .. } => OperationKind::ReadMany,
            Operation::Create { .. } => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::ReadToOne { .. } => OperationKind::ReadToOne,
            Operation::ReadToMany { .. } => OperationKind::ReadToMany,
            Operation::UpdateToOne { .. } => OperationKind::UpdateToOne,
            Operation::UpdateToMany { .. } => OperationKind::UpdateToMany,
        }
    }

    /// Relationship the operation targets, for relationship operations
    pub fn relationship(&self) -> Option<&str> {
        match self {
            Operation::ReadToOne { binding, .. } | Operation::ReadToMany { binding, .. } => {
                Some(binding.name())
            }
            Operation::UpdateToOne { relationship, .. }
            | Operation::UpdateToMany { relationship, .. } => Some(relationship),
            _ => None,
        }
    }

    /// Operation-level inbound requirements
    pub fn inbound(&self) -> Option<&AccessControlRequirements> {
        match self {
            Operation::ReadById { inbound, .. }
            | Operation::ReadMany { inbound, .. }
            | Operation::Create { inbound, .. }
            | Operation::Update { inbound, .. }
            | Operation::Delete { inbound, .. }
            | Operation::ReadToOne { inbound, .. }
            | Operation::ReadToMany { inbound, .. }
            | Operation::UpdateToOne { inbound, .. }
            | Operation::UpdateToMany { inbound, .. } => inbound.as_ref(),
        }
    }
}

impl<R, D> Clone for Operation<R, D> {
    fn clone(&self) -> Self {
        match self {
            Operation::ReadById { supplier, inbound } => Operation::ReadById {
                supplier: supplier.clone(),
                inbound: inbound.clone(),
            },
            Operation::ReadMany { supplier, inbound } => Operation::ReadMany {
                supplier: supplier.clone(),
                inbound: inbound.clone(),
            },
            Operation::Create { handler, inbound } => Operation::Create {
                handler: handler.clone(),
                inbound: inbound.clone(),
            },
            Operation::Update { handler, inbound } => Operation::Update {
                handler: handler.clone(),
                inbound: inbound.clone(),
            },
            Operation::Delete { handler, inbound } => Operation::Delete {
                handler: handler.clone(),
                inbound: inbound.clone(),
            },
            Operation::ReadToOne { binding, inbound } => Operation::ReadToOne {
                binding: binding.clone(),
                inbound: inbound.clone(),
            },
            Operation::ReadToMany { binding, inbound } => Operation::ReadToMany {
                binding: binding.clone(),
                inbound: inbound.clone(),
            },
            Operation::UpdateToOne {
                relationship,
                handler,
                inbound,
            } => Operation::UpdateToOne {
                relationship: relationship.clone(),
                handler: handler.clone(),
                inbound: inbound.clone(),
            },
            Operation::UpdateToMany {
                relationship,
                handler,
                inbound,
            } => Operation::UpdateToMany {
                relationship: relationship.clone(),
                handler: handler.clone(),
                inbound: inbound.clone(),
            },
        }
    }
}

/// Where the multi-resource pipeline gets its items from
pub enum ReadManySource<R, D> {
    /// A real cursor-aware supplier
    Paged(ReadManyFn<R, D>),
    /// Synthesized from the single-item supplier, one call per filtered id
    DerivedFromReadById(ReadByIdFn<R, D>),
}

impl<R, D> Clone for ReadManySource<R, D> {
    fn clone(&self) -> Self {
        match self {
            ReadManySource::Paged(f) => ReadManySource::Paged(f.clone()),
            ReadManySource::DerivedFromReadById(f) => ReadManySource::DerivedFromReadById(f.clone()),
        }
    }
}

/// `(resource type, relationship, kind)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub resource_type: String,
    pub relationship: Option<String>,
    pub kind: OperationKind,
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relationship {
            Some(relationship) => write!(f, "{}.{}:{}", self.resource_type, relationship, self.kind),
            None => write!(f, "{}:{}", self.resource_type, self.kind),
        }
    }
}

/// Dispatch table of every registered operation
///
/// Generic over the request type only; item types are erased.
pub struct OperationRegistry<R> {
    operations: IndexMap<OperationKey, Arc<dyn Any + Send + Sync>>,
    _request: std::marker::PhantomData<fn(R)>,
}

impl<R> Default for OperationRegistry<R> {
    fn default() -> Self {
        Self {
            operations: IndexMap::new(),
            _request: std::marker::PhantomData,
        }
    }
}

impl<R: JsonApiRequest> OperationRegistry<R> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation; one per `(type, relationship, kind)`
    pub fn register<D: DataItem>(
        &mut self,
        resource_type: impl Into<String>,
        operation: Operation<R, D>,
    ) -> Result<(), ConfigError> {
        let key = OperationKey {
            resource_type: resource_type.into(),
            relationship: operation.relationship().map(str::to_string),
            kind: operation.kind(),
        };
        if self.operations.contains_key(&key) {
            return Err(ConfigError::duplicate("operation", key.to_string()));
        }
        tracing::debug!(operation = %key, "registered operation");
        self.operations.insert(key, Arc::new(operation));
        Ok(())
    }

    /// Typed lookup of a registered operation
    pub fn get<D: DataItem>(
        &self,
        resource_type: &str,
        relationship: Option<&str>,
        kind: OperationKind,
    ) -> Result<Option<&Operation<R, D>>, ConfigError> {
        let key = OperationKey {
            resource_type: resource_type.to_string(),
            relationship: relationship.map(str::to_string),
            kind,
        };
        match self.operations.get(&key) {
            None => Ok(None),
            Some(operation) => operation
                .downcast_ref::<Operation<R, D>>()
                .map(Some)
                .ok_or(ConfigError::TypeMismatch {
                    key: key.to_string(),
                }),
        }
    }

    pub fn contains(&self, resource_type: &str, relationship: Option<&str>, kind: OperationKind) -> bool {
        self.operations.keys().any(|k| {
            k.resource_type == resource_type && k.relationship.as_deref() == relationship && k.kind == kind
        })
    }

    /// Every registered key, in registration order
    pub fn keys(&self) -> impl Iterator<Item = &OperationKey> {
        self.operations.keys()
    }

    /// Operations registered for one resource type
    pub fn operations_of<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a OperationKey> + 'a {
        self.operations
            .keys()
            .filter(move |k| k.resource_type == resource_type)
    }

    /// The read-many source for a resource type
    ///
    /// Falls back to the read-by-id supplier when no read-many operation is
    /// registered. The derived source only serves requests filtering by ids
    /// alone; the multi-resource pipeline rejects anything else.
    pub fn read_many_or_derived<D: DataItem>(
        &self,
        resource_type: &str,
    ) -> Result<(ReadManySource<R, D>, Option<AccessControlRequirements>), ConfigError> {
        if let Some(Operation::ReadMany { supplier, inbound }) =
            self.get::<D>(resource_type, None, OperationKind::ReadMany)?
        {
            return Ok((ReadManySource::Paged(supplier.clone()), inbound.clone()));
        }
        if let Some(Operation::ReadById { supplier, inbound }) =
            self.get::<D>(resource_type, None, OperationKind::ReadById)?
        {
            tracing::debug!(
                resource_type = %resource_type,
                "no read-many operation, deriving it from read-by-id"
            );
            return Ok((
                ReadManySource::DerivedFromReadById(supplier.clone()),
                inbound.clone(),
            ));
        }
        Err(ConfigError::missing_argument(
            "read_many or read_by_id operation",
            resource_type,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::request::Request;

    #[derive(Clone, Debug, PartialEq)]
    struct User {
        id: String,
    }

    fn read_by_id_op() -> Operation<Request, User> {
        Operation::ReadById {
            supplier: read_by_id(|req: Arc<Request>| async move {
                EngineResult::Ok(req.resource_id().map(|id| User { id: id.to_string() }))
            }),
            inbound: Some(AccessControlRequirements::authenticated()),
        }
    }

    #[test]
    fn test_duplicate_operation_is_rejected() {
        let mut registry = OperationRegistry::<Request>::new();
        registry.register("users", read_by_id_op()).unwrap();
        let err = registry.register("users", read_by_id_op()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Duplicate {
                kind: "operation".into(),
                key: "users:read_by_id".into()
            }
        );
    }

    #[test]
    fn test_relationship_operations_are_keyed_by_name() {
        let mut registry = OperationRegistry::<Request>::new();
        let handler: UpdateToOneFn<Request> = Arc::new(|_, _| async { EngineResult::Ok(()) }.boxed());
        registry
            .register::<User>(
                "users",
                Operation::UpdateToOne {
                    relationship: "country".into(),
                    handler: handler.clone(),
                    inbound: None,
                },
            )
            .unwrap();
        registry
            .register::<User>(
                "users",
                Operation::UpdateToOne {
                    relationship: "manager".into(),
                    handler,
                    inbound: None,
                },
            )
            .unwrap();

        assert!(registry.contains("users", Some("country"), OperationKind::UpdateToOne));
        assert!(!registry.contains("users", None, OperationKind::UpdateToOne));
        assert_eq!(registry.operations_of("users").count(), 2);
    }

    #[tokio::test]
    async fn test_read_many_is_derived_from_read_by_id() {
        let mut registry = OperationRegistry::<Request>::new();
        registry.register("users", read_by_id_op()).unwrap();

        let (source, inbound) = registry.read_many_or_derived::<User>("users").unwrap();
        assert_eq!(inbound, Some(AccessControlRequirements::authenticated()));
        let ReadManySource::DerivedFromReadById(supplier) = source else {
            panic!("expected derived source");
        };
        let user = supplier(Arc::new(Request::builder().resource_id("7").build()))
            .await
            .unwrap();
        assert_eq!(user, Some(User { id: "7".into() }));
    }

    #[test]
    fn test_read_many_wins_over_derived() {
        let mut registry = OperationRegistry::<Request>::new();
        registry.register("users", read_by_id_op()).unwrap();
        registry
            .register(
                "users",
                Operation::<Request, User>::ReadMany {
                    supplier: read_many(|_req| async { EngineResult::Ok(CursorPage::empty()) }),
                    inbound: None,
                },
            )
            .unwrap();

        let (source, _) = registry.read_many_or_derived::<User>("users").unwrap();
        assert!(matches!(source, ReadManySource::Paged(_)));
    }

    #[test]
    fn test_no_read_operation_is_a_config_error() {
        let registry = OperationRegistry::<Request>::new();
        assert!(matches!(
            registry.read_many_or_derived::<User>("users"),
            Err(ConfigError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_lookup_with_wrong_item_type_fails() {
        let mut registry = OperationRegistry::<Request>::new();
        registry.register("users", read_by_id_op()).unwrap();
        assert!(matches!(
            registry.get::<String>("users", None, OperationKind::ReadById),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let value = serde_json::to_value(OperationKind::ReadToMany).unwrap();
        assert_eq!(value, serde_json::json!("read_to_many"));
        assert_eq!(OperationKind::ReadToMany.to_string(), "read_to_many");
    }
}
