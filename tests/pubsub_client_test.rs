//! Integration tests for the Pub/Sub REST client against a mock server

use ckg_bridge::adapters::pubsub::{MessageBus, OutgoingMessage, PubSubClient};
use ckg_bridge::config::{AuthMode, GoogleConfig, PubSubConfig, RetryConfig};
use ckg_bridge::domain::{BridgeError, MessageBusError};
use mockito::{Matcher, Server};
use serde_json::json;
use std::collections::BTreeMap;

fn client_for(server: &Server) -> PubSubClient {
    let google = GoogleConfig {
        project_id: "p".to_string(),
        endpoint: server.url(),
        auth: AuthMode::None,
        access_token: None,
        timeout_seconds: 5,
        retry: RetryConfig {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        },
    };
    let pubsub = PubSubConfig {
        topic: "t".to_string(),
        subscription: "s".to_string(),
        message_ordering: false,
        ordering_key: None,
    };
    PubSubClient::new(&google, &pubsub).unwrap()
}

#[tokio::test]
async fn test_publish_sends_base64_data_and_attributes() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/projects/p/topics/t:publish")
        .match_body(Matcher::PartialJson(json!({
            "messages": [{
                "data": "eyJhIjoxfQ==",
                "attributes": {"environment": "staging"}
            }]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"messageIds":["4711"]}"#)
        .create_async()
        .await;

    let mut attributes = BTreeMap::new();
    attributes.insert("environment".to_string(), "staging".to_string());
    let message = OutgoingMessage::new(br#"{"a":1}"#.to_vec()).with_attributes(attributes);

    let id = client_for(&server).publish(message).await.unwrap();

    assert_eq!(id, "4711");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_publish_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/projects/p/topics/t:publish")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let result = client_for(&server).publish(OutgoingMessage::new("x")).await;

    assert!(matches!(
        result,
        Err(BridgeError::MessageBus(MessageBusError::ServerError { status: 503, .. }))
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_pull_decodes_messages() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/projects/p/subscriptions/s:pull")
        .match_body(Matcher::Json(json!({"maxMessages": 10})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "receivedMessages": [{
                    "ackId": "ack-1",
                    "message": {
                        "data": "aGVsbG8=",
                        "messageId": "m1",
                        "attributes": {"k": "v"},
                        "publishTime": "2025-01-01T00:00:00Z"
                    }
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let messages = client_for(&server).pull(10).await.unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].ack_id, "ack-1");
    assert_eq!(messages[0].message_id, "m1");
    assert_eq!(messages[0].data_text(), "hello");
    assert_eq!(messages[0].attributes["k"], "v");
}

#[tokio::test]
async fn test_empty_pull_response() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/projects/p/subscriptions/s:pull")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    assert!(client_for(&server).pull(5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pull_retries_server_errors() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/projects/p/subscriptions/s:pull")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    assert!(client_for(&server).pull(5).await.is_err());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_acknowledge() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/projects/p/subscriptions/s:acknowledge")
        .match_body(Matcher::Json(json!({"ackIds": ["a1", "a2"]})))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let client = client_for(&server);
    client
        .acknowledge(&["a1".to_string(), "a2".to_string()])
        .await
        .unwrap();
    client.acknowledge(&[]).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_rejected_acknowledge_is_reported() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/projects/p/subscriptions/s:acknowledge")
        .with_status(400)
        .with_body("bad ack id")
        .create_async()
        .await;

    let result = client_for(&server).acknowledge(&["gone".to_string()]).await;
    assert!(matches!(
        result,
        Err(BridgeError::MessageBus(MessageBusError::AcknowledgeFailed(_)))
    ));
}

#[tokio::test]
async fn test_topic_and_subscription_existence() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/projects/p/topics/t")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/projects/p/subscriptions/s")
        .with_status(200)
        .with_body(r#"{"name":"projects/p/subscriptions/s"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    assert!(!client.topic_exists().await.unwrap());
    assert!(client.subscription_exists().await.unwrap());
}
