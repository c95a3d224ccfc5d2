//! Request sub-contract consumed by the pipelines
//!
//! The engine never parses HTTP. A transport adapter normalizes whatever it
//! receives into a type implementing [`JsonApiRequest`]; the pipelines only
//! read the handful of values exposed here.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Access tier of a principal, ordered from least to most privileged
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    NoAccess,
    #[default]
    Public,
    Partner,
    Admin,
    RootAdmin,
}

/// Authenticated principal of a request
///
/// An anonymous context has no user id; everything else about it still
/// participates in tier and scope checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    user_id: Option<String>,
    tier: AccessTier,
    scopes: BTreeSet<String>,
}

impl AuthContext {
    /// Context of an unauthenticated caller
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context of an authenticated user
    pub fn user(user_id: impl Into<String>, tier: AccessTier) -> Self {
        Self {
            user_id: Some(user_id.into()),
            tier,
            scopes: BTreeSet::new(),
        }
    }

    /// Grant scopes to this context
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn tier(&self) -> AccessTier {
        self.tier
    }

    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Immutable per-request context handed to every scheduled task
///
/// Resolution tasks may run on any worker. They never read ambient state;
/// they receive this value through the request they were scheduled with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub auth: AuthContext,
    pub locale: Option<String>,
    pub trace_id: Uuid,
}

impl RequestContext {
    /// Create a context for a principal with a fresh trace id
    pub fn new(auth: AuthContext) -> Self {
        Self {
            auth,
            locale: None,
            trace_id: Uuid::new_v4(),
        }
    }

    /// Set the request locale
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(AuthContext::anonymous())
    }
}

/// What the pipelines read from a request
pub trait JsonApiRequest: Send + Sync + 'static {
    /// Primary resource id, when the request targets a single resource
    fn resource_id(&self) -> Option<&str>;

    /// Opaque continuation token of the requested page
    fn cursor(&self) -> Option<&str>;

    /// Requested include paths (`tags`, `tags.owner`, ...)
    fn includes(&self) -> &BTreeSet<String>;

    /// Ids listed in an explicit id filter
    fn id_filter(&self) -> Option<&[String]>;

    /// Whether any filter other than the id filter is present
    fn has_non_id_filters(&self) -> bool;

    /// Per-request principal and tracing context
    fn context(&self) -> &RequestContext;

    /// Same request narrowed to a single resource id
    fn with_resource_id(&self, id: &str) -> Self
    where
        Self: Sized;

    /// Owner id checked by inbound ownership requirements
    fn owner_id(&self) -> Option<&str> {
        self.resource_id()
    }

    /// Whether relationship `name` must be resolved with data
    ///
    /// A dotted include path requests its first segment.
    fn is_requested(&self, name: &str) -> bool {
        self.includes()
            .iter()
            .any(|path| path.split('.').next() == Some(name))
    }
}

/// Name of the filter holding explicit ids
pub const ID_FILTER: &str = "id";

/// Default request implementation
#[derive(Debug, Clone, Default)]
pub struct Request {
    resource_id: Option<String>,
    cursor: Option<String>,
    includes: BTreeSet<String>,
    filters: IndexMap<String, Vec<String>>,
    context: RequestContext,
}

impl Request {
    /// Create a new request builder
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub fn filters(&self) -> &IndexMap<String, Vec<String>> {
        &self.filters
    }
}

impl JsonApiRequest for Request {
    fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    fn includes(&self) -> &BTreeSet<String> {
        &self.includes
    }

    fn id_filter(&self) -> Option<&[String]> {
        self.filters.get(ID_FILTER).map(Vec::as_slice)
    }

    fn has_non_id_filters(&self) -> bool {
        self.filters.keys().any(|k| k != ID_FILTER)
    }

    fn context(&self) -> &RequestContext {
        &self.context
    }

    fn with_resource_id(&self, id: &str) -> Self {
        Self {
            resource_id: Some(id.to_string()),
            cursor: None,
            includes: self.includes.clone(),
            filters: IndexMap::new(),
            context: self.context.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RequestBuilder {
    inner: Request,
}

impl RequestBuilder {
    /// Set the addressed resource id
    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.inner.resource_id = Some(id.into());
        self
    }

    /// Set the page cursor
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.inner.cursor = Some(cursor.into());
        self
    }

    /// Add one include path
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.inner.includes.insert(path.into());
        self
    }

    /// Add several include paths
    pub fn includes<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.includes.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Add a filter with its values
    pub fn filter<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner
            .filters
            .entry(name.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Set the whole request context
    pub fn context(mut self, context: RequestContext) -> Self {
        self.inner.context = context;
        self
    }

    /// Set the principal of the request context
    pub fn auth(mut self, auth: AuthContext) -> Self {
        self.inner.context.auth = auth;
        self
    }

    /// Build the request
    pub fn build(self) -> Request {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_include_requests_first_segment() {
        let req = Request::builder().include("tags.owner").build();
        assert!(req.is_requested("tags"));
        assert!(!req.is_requested("owner"));
        assert!(!req.is_requested("tag"));
    }

    #[test]
    fn test_id_filter_and_other_filters() {
        let req = Request::builder().filter("id", ["1", "2"]).build();
        assert_eq!(req.id_filter(), Some(&["1".to_string(), "2".to_string()][..]));
        assert!(!req.has_non_id_filters());

        let req = Request::builder()
            .filter("id", ["1"])
            .filter("status", ["active"])
            .build();
        assert!(req.has_non_id_filters());
    }

    #[test]
    fn test_with_resource_id_keeps_context_and_includes() {
        let req = Request::builder()
            .auth(AuthContext::user("u1", AccessTier::Partner))
            .include("country")
            .filter("id", ["7", "8"])
            .cursor("c1")
            .build();
        let narrowed = req.with_resource_id("7");

        assert_eq!(narrowed.resource_id(), Some("7"));
        assert_eq!(narrowed.cursor(), None);
        assert!(narrowed.id_filter().is_none());
        assert!(narrowed.is_requested("country"));
        assert_eq!(narrowed.context(), req.context());
    }

    #[test]
    fn test_access_tier_ordering() {
        assert!(AccessTier::RootAdmin > AccessTier::Admin);
        assert!(AccessTier::Partner > AccessTier::Public);
        assert!(AccessTier::Public > AccessTier::NoAccess);
    }

    #[test]
    fn test_anonymous_context() {
        let ctx = AuthContext::anonymous();
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.tier(), AccessTier::Public);
    }
}
