//! Relationship resolution for a set of parent items
//!
//! Unrequested relationships stay link-only and never reach a resolver.
//! Requested ones are scheduled as tasks: one per item for simple resolvers,
//! one per relationship for batch resolvers. Every task is submitted before
//! the first join; joins then run per phase (to-many, then to-one) and are
//! keyed by relationship and parent id, never by completion order.

use super::executor::{Scheduled, TaskExecutor, schedule};
use crate::core::document::{Cardinality, RelationshipDoc, Relationships};
use crate::core::error::{ConfigError, EngineResult};
use crate::core::request::JsonApiRequest;
use crate::domain::relationship::ResolverKind;
use crate::domain::{DataItem, Parent, RelationshipBinding};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;

/// Bindings of one resource type, in declaration order
///
/// Built and validated once; shared by every request.
pub struct RelationshipSet<R, D> {
    resource_type: String,
    bindings: Vec<RelationshipBinding<R, D>>,
}

impl<R, D> Clone for RelationshipSet<R, D> {
    fn clone(&self) -> Self {
        Self {
            resource_type: self.resource_type.clone(),
            bindings: self.bindings.clone(),
        }
    }
}

impl<R: JsonApiRequest, D: DataItem> RelationshipSet<R, D> {
    /// Build from bindings, rejecting duplicate names
    pub fn new(
        resource_type: impl Into<String>,
        bindings: Vec<RelationshipBinding<R, D>>,
    ) -> Result<Self, ConfigError> {
        let resource_type = resource_type.into();
        for (index, binding) in bindings.iter().enumerate() {
            if bindings[..index].iter().any(|b| b.name() == binding.name()) {
                return Err(ConfigError::duplicate(
                    "relationship binding",
                    format!("{}.{}", resource_type, binding.name()),
                ));
            }
        }
        Ok(Self {
            resource_type,
            bindings,
        })
    }

    /// Check that every default relationship has a simple or batch resolver
    pub fn require_resolvers<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        for name in names {
            match self.get(name) {
                Some(binding) if binding.is_resolvable() => {
                    tracing::debug!(
                        resource_type = %self.resource_type,
                        relationship = %name,
                        strategy = binding.kind().label(),
                        "default relationship bound"
                    );
                }
                _ => {
                    return Err(ConfigError::MissingResolver {
                        resource_type: self.resource_type.clone(),
                        relationship: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Binding registered under `name`
    pub fn get(&self, name: &str) -> Option<&RelationshipBinding<R, D>> {
        self.bindings.iter().find(|b| b.name() == name)
    }

    /// Names of every binding, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.name())
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Resolve the relationships object of every parent
    ///
    /// The result is aligned with `parents`. A not-found raised by a resolver
    /// becomes an empty linkage for the affected parents only; any other
    /// failure is returned after every scheduled task has been submitted.
    pub async fn resolve(
        &self,
        request: &Arc<R>,
        parents: &[Parent<D>],
        executor: Option<&dyn TaskExecutor>,
    ) -> EngineResult<Vec<Relationships>> {
        if parents.is_empty() {
            return Ok(Vec::new());
        }

        let mut pending: Vec<Option<Pending>> = Vec::with_capacity(self.bindings.len());
        pending.resize_with(self.bindings.len(), || None);

        // submission: to-many phase first, then to-one
        for phase in [Cardinality::ToMany, Cardinality::ToOne] {
            for (index, binding) in self.bindings.iter().enumerate() {
                if binding.cardinality() != phase || !request.is_requested(binding.name()) {
                    continue;
                }
                pending[index] = self.submit(binding, request, parents, executor).await;
            }
        }

        // joins, in the same phase order
        let mut resolved: Vec<Option<Vec<RelationshipDoc>>> = Vec::with_capacity(pending.len());
        resolved.resize_with(pending.len(), || None);
        for phase in [Cardinality::ToMany, Cardinality::ToOne] {
            for (index, binding) in self.bindings.iter().enumerate() {
                if binding.cardinality() != phase {
                    continue;
                }
                if let Some(task) = pending[index].take() {
                    resolved[index] = Some(self.join(binding, task, request, parents).await?);
                }
            }
        }

        Ok(parents
            .iter()
            .enumerate()
            .map(|(position, parent)| {
                self.bindings
                    .iter()
                    .zip(resolved.iter_mut())
                    .map(|(binding, docs)| {
                        let doc = match docs {
                            Some(docs) => std::mem::replace(
                                &mut docs[position],
                                RelationshipDoc::link_only(binding.cardinality()),
                            ),
                            None => binding.link_only_doc(request, parent),
                        };
                        (binding.name().to_string(), doc)
                    })
                    .collect()
            })
            .collect())
    }

    async fn submit(
        &self,
        binding: &RelationshipBinding<R, D>,
        request: &Arc<R>,
        parents: &[Parent<D>],
        executor: Option<&dyn TaskExecutor>,
    ) -> Option<Pending> {
        match binding.kind() {
            ResolverKind::LinkOnly => None,
            ResolverKind::Batch(resolve) => {
                let task = format!("{}.{}[batch]", self.resource_type, binding.name());
                let call = resolve(request.clone(), parents.to_vec());
                let future = async move {
                    match call.await {
                        Ok(docs) => Ok(Some(docs)),
                        Err(e) if e.is_not_found() => Ok(None),
                        Err(e) => Err(e),
                    }
                }
                .boxed();
                Some(Pending::Batch(schedule(executor, task, future).await))
            }
            ResolverKind::Simple(resolve) => {
                let mut tasks = Vec::with_capacity(parents.len());
                for parent in parents {
                    let task = format!("{}.{}#{}", self.resource_type, binding.name(), parent.id);
                    let call = resolve(request.clone(), parent.clone());
                    let fallback = binding.clone();
                    let request = request.clone();
                    let parent = parent.clone();
                    let future = async move {
                        match call.await {
                            Err(e) if e.is_not_found() => {
                                tracing::debug!(
                                    relationship = %fallback.name(),
                                    parent = %parent.id,
                                    "relationship target not found, using empty linkage"
                                );
                                Ok(fallback.empty_doc(&request, &parent))
                            }
                            other => other,
                        }
                    }
                    .boxed();
                    tasks.push(schedule(executor, task, future).await);
                }
                Some(Pending::Simple(tasks))
            }
        }
    }

    async fn join(
        &self,
        binding: &RelationshipBinding<R, D>,
        task: Pending,
        request: &Arc<R>,
        parents: &[Parent<D>],
    ) -> EngineResult<Vec<RelationshipDoc>> {
        match task {
            Pending::Simple(tasks) => {
                let mut docs = Vec::with_capacity(tasks.len());
                for task in tasks {
                    docs.push(task.join().await?);
                }
                Ok(docs)
            }
            Pending::Batch(task) => {
                let Some(by_parent) = task.join().await? else {
                    tracing::debug!(
                        resource_type = %self.resource_type,
                        relationship = %binding.name(),
                        "batch resolver reported not found, using empty linkage"
                    );
                    return Ok(parents
                        .iter()
                        .map(|parent| binding.empty_doc(request, parent))
                        .collect());
                };
                Ok(parents
                    .iter()
                    .map(|parent| match by_parent.get(&parent.id) {
                        Some(doc) => doc.clone(),
                        None => {
                            tracing::warn!(
                                resource_type = %self.resource_type,
                                relationship = %binding.name(),
                                parent = %parent.id,
                                "batch result has no entry for parent, using empty linkage"
                            );
                            binding.empty_doc(request, parent)
                        }
                    })
                    .collect())
            }
        }
    }
}

/// Submitted, not yet joined work of one relationship
enum Pending {
    Simple(Vec<Scheduled<RelationshipDoc>>),
    Batch(Scheduled<Option<HashMap<String, RelationshipDoc>>>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EngineError;
    use crate::core::request::Request;
    use crate::domain::{ToManyRelationship, ToOneRelationship};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug)]
    struct User {
        id: String,
    }

    fn parents(ids: &[&str]) -> Vec<Parent<User>> {
        ids.iter()
            .map(|id| Parent {
                resource_type: "users".into(),
                id: id.to_string(),
                root_path: Arc::from(""),
                item: User { id: id.to_string() },
            })
            .collect()
    }

    fn tags() -> ToManyRelationship<Request, User, String> {
        ToManyRelationship::new("tags", "tags", |t: &String| t.clone()).links(|_, _| None)
    }

    #[test]
    fn test_duplicate_binding_names_are_rejected() {
        let result = RelationshipSet::new("users", vec![tags().link_only(), tags().link_only()]);
        assert!(matches!(result, Err(ConfigError::Duplicate { .. })));
    }

    #[test]
    fn test_default_relationship_without_resolver_fails() {
        let set = RelationshipSet::new("users", vec![tags().link_only()]).unwrap();
        assert!(matches!(
            set.require_resolvers(["tags"]),
            Err(ConfigError::MissingResolver { .. })
        ));
        assert!(matches!(
            set.require_resolvers(["country"]),
            Err(ConfigError::MissingResolver { .. })
        ));
    }

    #[tokio::test]
    async fn test_unrequested_relationship_is_never_resolved() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let binding = tags().resolved_by(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { EngineResult::Ok(vec!["a".to_string()]) }
        });
        let set = RelationshipSet::new("users", vec![binding]).unwrap();

        let request = Arc::new(Request::default());
        let docs = set.resolve(&request, &parents(&["1", "2"]), None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(serde_json::to_value(&docs[0]["tags"]).unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_simple_not_found_only_affects_one_parent() {
        let binding = tags().resolved_by(|_, user: User| async move {
            if user.id == "2" {
                return Err(EngineError::not_found("tags", "2"));
            }
            Ok(vec![format!("t{}", user.id)])
        });
        let set = RelationshipSet::new("users", vec![binding]).unwrap();
        let request = Arc::new(Request::builder().include("tags").build());

        let docs = set
            .resolve(&request, &parents(&["1", "2", "3"]), None)
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&docs[0]["tags"]).unwrap(),
            json!({"data": [{"id": "t1", "type": "tags"}]})
        );
        assert_eq!(serde_json::to_value(&docs[1]["tags"]).unwrap(), json!({"data": []}));
        assert_eq!(
            serde_json::to_value(&docs[2]["tags"]).unwrap(),
            json!({"data": [{"id": "t3", "type": "tags"}]})
        );
    }

    #[tokio::test]
    async fn test_batch_is_called_once_and_missing_keys_become_empty() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let country = ToOneRelationship::<Request, User, String>::new("country", "countries", |c| c.clone())
            .links(|_, _| None)
            .batch_resolved_by(move |_, users: Vec<User>| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    let found: HashMap<String, String> = users
                        .into_iter()
                        .filter(|u| u.id != "2")
                        .map(|u| (u.id, "DE".to_string()))
                        .collect();
                    EngineResult::Ok(found)
                }
            });
        let set = RelationshipSet::new("users", vec![country]).unwrap();
        let request = Arc::new(Request::builder().include("country").build());

        let docs = set
            .resolve(&request, &parents(&["1", "2", "3"]), None)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            serde_json::to_value(&docs[0]["country"]).unwrap(),
            json!({"data": {"id": "DE", "type": "countries"}})
        );
        assert_eq!(serde_json::to_value(&docs[1]["country"]).unwrap(), json!({"data": null}));
    }

    #[tokio::test]
    async fn test_resolver_failure_propagates() {
        let binding = tags().resolved_by(|_, _| async {
            EngineResult::<Vec<String>>::Err(anyhow::anyhow!("db down").into())
        });
        let set = RelationshipSet::new("users", vec![binding]).unwrap();
        let request = Arc::new(Request::builder().include("tags").build());

        let err = set.resolve(&request, &parents(&["1"]), None).await.unwrap_err();
        assert!(matches!(err, EngineError::Resolver(_)));
    }

    #[tokio::test]
    async fn test_relationships_keep_declaration_order() {
        let country = ToOneRelationship::<Request, User, String>::new("country", "countries", |c| c.clone())
            .link_only();
        let set = RelationshipSet::new("users", vec![country, tags().link_only()]).unwrap();
        let request = Arc::new(Request::default());

        let docs = set.resolve(&request, &parents(&["1"]), None).await.unwrap();
        let names: Vec<_> = docs[0].keys().cloned().collect();
        assert_eq!(names, vec!["country", "tags"]);
    }
}
