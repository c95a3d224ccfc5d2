//! Build-time validation and runtime error propagation

mod common;

use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use common::*;
use jsonapi_engine::prelude::*;

fn one_user(_req: Arc<Request>) -> impl std::future::Future<Output = EngineResult<Option<User>>> {
    async { Ok(Some(user("1", "FR", &["rust"]))) }
}

// =============================================================================
// Build-time errors
// =============================================================================

#[test]
fn test_missing_supplier_is_rejected() {
    let result = SingleResourcePipeline::<Request, User>::builder(users()).build();
    assert!(matches!(result, Err(ConfigError::MissingArgument { .. })));

    let result = MultipleResourcesPipeline::<Request, User>::builder(users()).build();
    assert!(matches!(result, Err(ConfigError::MissingArgument { .. })));
}

#[test]
fn test_missing_id_resolver_is_rejected() {
    let result = ResourceDescriptor::<Request, User>::builder("users").build();
    assert!(matches!(result, Err(ConfigError::MissingArgument { .. })));
}

#[test]
fn test_default_relationship_needs_a_resolver() {
    let result = SingleResourcePipeline::builder(users())
        .supplier(one_user)
        .relationship(country().link_only())
        .default_relationships(["country"])
        .build();
    match result {
        Err(ConfigError::MissingResolver {
            resource_type,
            relationship,
        }) => {
            assert_eq!(resource_type, "users");
            assert_eq!(relationship, "country");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected a missing resolver error"),
    }

    let result = SingleResourcePipeline::builder(users())
        .supplier(one_user)
        .default_relationships(["tags"])
        .build();
    assert!(matches!(result, Err(ConfigError::MissingResolver { .. })));
}

#[test]
fn test_duplicate_relationship_is_rejected() {
    let result = SingleResourcePipeline::builder(users())
        .supplier(one_user)
        .relationship(tags_resolver(Calls::default()))
        .relationship(tags_batch_resolver(Calls::default()))
        .build();
    assert!(matches!(result, Err(ConfigError::Duplicate { .. })));
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let mut domain = DomainRegistry::new();
    domain.register_resource(users_builder().build().unwrap()).unwrap();
    assert!(matches!(
        domain.register_resource(users_builder().build().unwrap()),
        Err(ConfigError::Duplicate { .. })
    ));
    assert!(matches!(
        domain.register_relationship("countries", country().link_only()),
        Err(ConfigError::UnknownResourceType { .. })
    ));
}

// =============================================================================
// Runtime errors
// =============================================================================

#[tokio::test]
async fn test_supplier_failure_propagates() {
    let pipeline = SingleResourcePipeline::builder(users())
        .supplier(|_req: Arc<Request>| async {
            EngineResult::<Option<User>>::Err(anyhow::anyhow!("connection refused").into())
        })
        .build()
        .unwrap();

    let err = pipeline
        .to_document(Request::builder().resource_id("1").build())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "RESOLVER_FAILED");
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test]
async fn test_resolver_failure_propagates_unmodified() {
    let pipeline = SingleResourcePipeline::builder(users())
        .supplier(one_user)
        .relationship(tags().resolved_by(|_req: Arc<Request>, _user: User| async {
            EngineResult::<Vec<Tag>>::Err(EngineError::TaskAborted {
                task: "upstream".into(),
            })
        }))
        .build()
        .unwrap();

    let err = pipeline
        .to_document(Request::builder().resource_id("1").include("tags").build())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TaskAborted { task } if task == "upstream"));
}

#[tokio::test]
async fn test_batch_not_found_empties_every_parent() {
    let batch = tags().batch_resolved_by(|_req: Arc<Request>, _users: Vec<User>| async {
        EngineResult::<std::collections::HashMap<String, Vec<Tag>>>::Err(EngineError::not_found(
            "tags", "*",
        ))
    });
    let pipeline = MultipleResourcesPipeline::builder(users())
        .supplier(|_req: Arc<Request>| async {
            EngineResult::Ok(CursorPage::last(vec![user("1", "FR", &["a"]), user("2", "DE", &["b"])]))
        })
        .relationship(batch)
        .build()
        .unwrap();

    let doc = pipeline
        .to_document(Request::builder().include("tags").build())
        .await
        .unwrap();
    let value = serde_json::to_value(&doc).unwrap();
    for index in 0..2 {
        assert_eq!(
            value["data"][index]["relationships"]["tags"]["data"],
            serde_json::json!([])
        );
    }
}

#[tokio::test]
async fn test_empty_id_is_an_error() {
    let pipeline = SingleResourcePipeline::builder(Arc::new(
        ResourceDescriptor::<Request, User>::builder("users")
            .id(|_u: &User| String::new())
            .build()
            .unwrap(),
    ))
    .supplier(one_user)
    .build()
    .unwrap();

    let err = pipeline
        .to_document(Request::builder().resource_id("1").build())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Resolver(_)));
}

// =============================================================================
// HTTP responses
// =============================================================================

#[test]
fn test_error_response_status() {
    let response = EngineError::not_found("users", "1").into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = EngineError::from(ConfigError::UnknownResourceType {
        resource_type: "orders".into(),
    })
    .into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_document_response_uses_json_api_media_type() {
    let pipeline = SingleResourcePipeline::builder(users())
        .supplier(one_user)
        .build()
        .unwrap();
    let doc = pipeline
        .to_document(Request::builder().resource_id("1").build())
        .await
        .unwrap();

    let response = doc.into_response();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/vnd.api+json"
    );
}
