//! Tests for the admin facade: route validation and app lifecycle

mod common;

use common::MockHeliographServer;
use heliograph_admin::traits::FixedDelay;
use heliograph_admin::{
    AdminCredentials, AdminError, HeliographAdmin, ReadRoute, SdkConfig, WriteRoute,
};
use serde_json::json;
use std::time::Duration;

fn offline_admin() -> HeliographAdmin {
    // validation never touches the network, any endpoint will do
    HeliographAdmin::new(
        AdminCredentials::new("test-project", "test-key"),
        SdkConfig::with_domain("ws://127.0.0.1:9"),
    )
}

fn online_admin(server: &MockHeliographServer) -> HeliographAdmin {
    let config = SdkConfig::with_domain(server.ws_url())
        .ready_poll(Duration::from_millis(20), 5)
        .reconnect_strategy(FixedDelay::new(Duration::from_millis(50), None));
    HeliographAdmin::new(AdminCredentials::new("test-project", "test-key"), config)
}

fn assert_configuration_error(result: heliograph_admin::Result<()>, expected: &str) {
    match result {
        Err(AdminError::Configuration(message)) => assert_eq!(message, expected),
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn test_read_route_requires_id() {
    let admin = offline_admin();
    assert_configuration_error(
        admin.reads().route(ReadRoute::new("", "users")),
        "Route ID is a required property for read configuration",
    );
}

#[test]
fn test_duplicate_read_route_rejected() {
    let admin = offline_admin();
    admin.reads().route(ReadRoute::new("users", "users")).unwrap();
    assert_configuration_error(
        admin.reads().route(ReadRoute::new("users", "users")),
        "Route ID: users already configured for read operation",
    );
}

#[test]
fn test_projection_must_keep_primary_key() {
    let admin = offline_admin();
    assert_configuration_error(
        admin
            .reads()
            .route(ReadRoute::new("users", "users").projection(json!({ "_id": false }))),
        "Error at users config. Query projection must not exclude primary key of this collection.",
    );
    assert_configuration_error(
        admin
            .reads()
            .route(ReadRoute::new("posts", "posts").projection(json!({ "_id": -1 }))),
        "Error at posts config. Query projection must not exclude primary key of this collection.",
    );
    // keeping the key is fine
    admin
        .reads()
        .route(ReadRoute::new("names", "users").projection(json!({ "_id": true, "name": true })))
        .unwrap();
}

#[test]
fn test_custom_sort_rejected() {
    let admin = offline_admin();
    assert_configuration_error(
        admin
            .reads()
            .route(ReadRoute::new("users", "users").sort(json!({ "createdAt": -1 }))),
        "Routes that require database index to be created are not supported yet!",
    );
}

#[test]
fn test_indexable_options_rejected_on_single_document() {
    let admin = offline_admin();
    assert_configuration_error(
        admin
            .reads()
            .route(ReadRoute::new("user", "users").limit(1).single_document()),
        "Indexable query options (sort, limit, filter) cannot be applied to single document query",
    );
}

#[test]
fn test_write_route_requires_id_and_uniqueness() {
    let admin = offline_admin();
    assert_configuration_error(
        admin.writes().route(WriteRoute::new("")),
        "Route ID is a required property for write configuration",
    );

    admin.writes().route(WriteRoute::new("createUser")).unwrap();
    assert_configuration_error(
        admin.writes().route(WriteRoute::new("createUser")),
        "Route ID: createUser already configured for write operation",
    );
}

#[tokio::test]
async fn test_start_rejects_unknown_trigger() {
    let admin = offline_admin();
    admin
        .writes()
        .route(WriteRoute::new("createUser").triggers(vec!["auditLog".to_string()]))
        .unwrap();

    // trigger validation runs before the session is touched
    assert_configuration_error(
        admin.start().await,
        "'auditLog' is not a valid routeId as trigger for 'createUser'",
    );
}

#[test]
fn test_settings_store() {
    let admin = offline_admin();
    admin.configure("region", json!("eu-west-1"));
    admin.configure("region", json!("us-east-1"));

    assert_eq!(admin.setting("region"), Some(json!("us-east-1")));
    assert_eq!(admin.setting("missing"), None);
}

#[tokio::test]
async fn test_start_declares_routes_with_defaults() {
    let server = MockHeliographServer::start().await;
    let admin = online_admin(&server);

    admin
        .reads()
        .route(ReadRoute::new("users", "users").limit(50))
        .unwrap();
    admin.writes().route(WriteRoute::new("createUser")).unwrap();

    admin.start().await.unwrap();

    let activations = server.state.activations.lock().clone();
    assert_eq!(activations.len(), 1);

    let read = &activations[0]["readRoutes"][0];
    assert_eq!(read["routeId"], json!("users"));
    assert_eq!(read["collection"], json!("users"));
    assert_eq!(read["limit"], json!(50));
    // limit without an explicit sort falls back to the primary index
    assert_eq!(read["sort"], json!({ "_id": 1 }));
    assert_eq!(read["skip"], json!(0));

    let write = &activations[0]["writeRoutes"][0];
    assert_eq!(write["routeId"], json!("createUser"));
    assert_eq!(write["triggers"], json!([]));

    admin.shutdown();
}

#[tokio::test]
async fn test_start_twice_rejected() {
    let server = MockHeliographServer::start().await;
    let admin = online_admin(&server);
    admin.reads().route(ReadRoute::new("users", "users")).unwrap();

    admin.start().await.unwrap();
    assert_configuration_error(
        admin.start().await,
        "Heliograph app instance started more than once",
    );

    admin.shutdown();
}

#[tokio::test]
async fn test_stop_sends_stop_command_and_ends_serving() {
    let server = MockHeliographServer::start().await;
    let admin = online_admin(&server);
    admin.reads().route(ReadRoute::new("users", "users")).unwrap();

    admin.start().await.unwrap();
    admin.stop().await.unwrap();

    let commands = server.frames_for("ADMIN_SOCKET_API_ACTION");
    assert!(commands.iter().any(|c| c["action"] == json!("STOP_APP")));

    // inbound requests are no longer served
    server.emit(
        "ADMIN_SOCKET_GET_QUERY",
        json!({ "routeId": "users", "body": {}, "responseId": "r1" }),
    );
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(server.frames_for("r1").is_empty());

    admin.shutdown();
}
