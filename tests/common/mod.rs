//! Shared fixtures for the integration tests
//!
//! A small user directory: users have a country (to-one) and tags (to-many),
//! and every resolver counts its invocations.

#![allow(dead_code)]

use jsonapi_engine::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub country: String,
    pub tags: Vec<String>,
}

#[derive(Serialize)]
pub struct UserAttributes {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct Country {
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct Tag {
    pub id: String,
}

pub fn user(id: &str, country: &str, tags: &[&str]) -> User {
    User {
        id: id.to_string(),
        name: format!("user {id}"),
        email: format!("{id}@example.com"),
        country: country.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

// =============================================================================
// Store
// =============================================================================

/// In-memory user store with a call counter per access path
#[derive(Clone, Default)]
pub struct UserStore {
    users: Arc<Vec<User>>,
    pub reads: Arc<AtomicUsize>,
}

impl UserStore {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: Arc::new(users),
            reads: Arc::default(),
        }
    }

    pub fn find(&self, id: &str) -> Option<User> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.users.iter().find(|u| u.id == id).cloned()
    }

    pub fn all(&self) -> Vec<User> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.users.as_ref().clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Counts resolver invocations
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Descriptors
// =============================================================================

pub fn users() -> Arc<ResourceDescriptor<Request, User>> {
    Arc::new(users_builder().build().unwrap())
}

pub fn users_builder() -> jsonapi_engine::domain::ResourceDescriptorBuilder<Request, User> {
    ResourceDescriptor::builder("users")
        .id(|u: &User| u.id.clone())
        .attributes(|u: &User| UserAttributes {
            name: u.name.clone(),
            email: u.email.clone(),
        })
        .owner_id(|u: &User| Some(u.id.clone()))
}

pub fn country() -> ToOneRelationship<Request, User, Country> {
    ToOneRelationship::new("country", "countries", |c: &Country| c.code.clone())
}

pub fn tags() -> ToManyRelationship<Request, User, Tag> {
    ToManyRelationship::new("tags", "tags", |t: &Tag| t.id.clone())
}

pub fn country_resolver(calls: Calls) -> RelationshipBinding<Request, User> {
    country().resolved_by(move |_req: Arc<Request>, user: User| {
        calls.hit();
        async move { EngineResult::Ok(Some(Country { code: user.country })) }
    })
}

pub fn tags_resolver(calls: Calls) -> RelationshipBinding<Request, User> {
    tags().resolved_by(move |_req: Arc<Request>, user: User| {
        calls.hit();
        async move {
            EngineResult::Ok(user.tags.into_iter().map(|id| Tag { id }).collect::<Vec<_>>())
        }
    })
}

pub fn tags_batch_resolver(calls: Calls) -> RelationshipBinding<Request, User> {
    tags().batch_resolved_by(move |_req: Arc<Request>, users: Vec<User>| {
        calls.hit();
        async move {
            let by_user: HashMap<String, Vec<Tag>> = users
                .into_iter()
                .map(|u| (u.id, u.tags.into_iter().map(|id| Tag { id }).collect()))
                .collect();
            EngineResult::Ok(by_user)
        }
    })
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
