mod harness;

use harness::config;
use harness::mock_deployment::MockDeployment;
use tether_llm::{CompletionRequest, DeploymentClient, LlmError, TransportError};

#[tokio::test]
async fn transient_failures_are_retried() {
    let mock = MockDeployment::start_failing(2).await.unwrap();
    let client = DeploymentClient::from_config(&config::deployment(mock.endpoint())).unwrap();

    let response = client.complete(&CompletionRequest::new("hi")).await.unwrap();

    assert_eq!(response.text, "Hello from mock deployment");
    assert_eq!(mock.request_count(), 3);
}

#[tokio::test]
async fn retries_are_bounded() {
    let mock = MockDeployment::start_failing(10).await.unwrap();
    let client = DeploymentClient::from_config(&config::deployment(mock.endpoint())).unwrap();

    let err = client.complete(&CompletionRequest::new("hi")).await.unwrap_err();

    assert!(matches!(
        &err,
        LlmError::Transport(TransportError::Status { status, .. }) if status.as_u16() == 503
    ));
    assert!(err.is_retryable());
    // one attempt plus three retries
    assert_eq!(mock.request_count(), 4);
}

#[tokio::test]
async fn no_retries_when_disabled() {
    let mock = MockDeployment::start_failing(1).await.unwrap();
    let client = DeploymentClient::from_config(&config::deployment_without_retries(mock.endpoint())).unwrap();

    assert!(client.complete(&CompletionRequest::new("hi")).await.is_err());
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    // Reserve a port, then free it so nothing listens there
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let endpoint = format!("http://{addr}/predict").parse().unwrap();
    let client = DeploymentClient::from_config(&config::deployment_without_retries(endpoint)).unwrap();
    let err = client.complete(&CompletionRequest::new("hi")).await.unwrap_err();

    assert!(matches!(err, LlmError::Transport(TransportError::Request(_))));
}
