//! End-to-end verification runs.
//!
//! One mock server stands in for every back end the verifier talks to:
//!
//! 1. Kubernetes API (service inventory)
//! 2. Checker gateway (snapcheck and compliance)
//! 3. Load-test coordinator (groups, test runs, results)
//!
//! Each test wires a real [`Verifier`] against it and runs one stage.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p netverify-e2e --test happy_path
//! ```

use std::sync::Arc;
use std::time::Duration;

use netverify_assertions::{AssertionBuilder, BuildContext, Stage};
use netverify_inventory::{
    InventorySource, KubernetesConfig, KubernetesInventory, ServiceRecord, StaticInventory,
};
use netverify_verifier::compliance::HttpComplianceReporter;
use netverify_verifier::coordinator::CoordinatorClient;
use netverify_verifier::device::DeviceRef;
use netverify_verifier::engine::HttpConfigEngine;
use netverify_verifier::stages::TrafficSettings;
use netverify_verifier::{Verifier, VerifyError};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn device() -> DeviceRef {
    DeviceRef {
        host: "192.168.100.1".to_string(),
        port: 830,
        username: "root".to_string(),
    }
}

fn traffic_settings() -> TrafficSettings {
    TrafficSettings {
        agent_poll_interval: Duration::from_millis(20),
        result_poll_interval: Duration::from_millis(20),
        agent_wait_timeout: Some(Duration::from_secs(2)),
        result_wait_timeout: Some(Duration::from_secs(2)),
        ..TrafficSettings::default()
    }
}

fn verifier(server: &MockServer, inventory: Arc<dyn InventorySource>) -> Verifier {
    let builder = AssertionBuilder::new(BuildContext {
        target_host: Some("minikubeip".to_string()),
        extra_reachability: Vec::new(),
        expected_interfaces: vec!["ge-0/0/0".to_string(), "ge-0/0/1".to_string()],
    });

    Verifier::new(
        inventory,
        builder,
        Arc::new(HttpConfigEngine::new(&server.uri(), device(), TIMEOUT).unwrap()),
        Arc::new(HttpComplianceReporter::new(&server.uri(), device(), TIMEOUT).unwrap()),
        CoordinatorClient::new(&format!("{}/v1", server.uri()), TIMEOUT).unwrap(),
        traffic_settings(),
    )
}

async fn kubernetes(server: &MockServer) -> Arc<dyn InventorySource> {
    Arc::new(
        KubernetesInventory::connect(&KubernetesConfig {
            api_url: Some(server.uri()),
            accept_invalid_certs: false,
            timeout: TIMEOUT,
        })
        .await
        .unwrap(),
    )
}

fn web_only() -> Arc<dyn InventorySource> {
    Arc::new(StaticInventory::new(vec![ServiceRecord::new("web", Some(30080))]))
}

async fn mount_services(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "v1",
            "kind": "ServiceList",
            "metadata": {},
            "items": [
                {
                    "metadata": {"name": "web", "namespace": "default"},
                    "spec": {"ports": [{"port": 80, "nodePort": 30080}]}
                },
                {
                    "metadata": {"name": "kubernetes", "namespace": "default"},
                    "spec": {"ports": [{"port": 443}]}
                }
            ]
        })))
        .mount(server)
        .await;
}

async fn mount_coordinator(server: &MockServer, http_code: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/object/create"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;

    let membership: serde_json::Map<String, serde_json::Value> = (1..=6)
        .map(|i| (format!("agent{i}"), json!("bastion_agents")))
        .collect();
    Mock::given(method("GET"))
        .and(path("/v1/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(membership))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/testrun/run"))
        .respond_with(ResponseTemplate::new(200).set_body_string("5b1a3c2e"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/testdata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agent1": {"minikubeip:30080": {"http_code": http_code}}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_config_stage_passes_for_matching_application() {
    init_tracing();
    let server = MockServer::start().await;
    mount_services(&server).await;
    Mock::given(method("POST"))
        .and(path("/snapcheck"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"test_name": "test_app_web", "result": "Passed"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let summary = verifier(&server, kubernetes(&server).await)
        .run(Stage::Config)
        .await
        .unwrap();

    assert_eq!(summary.stage, Stage::Config);
    assert_eq!(summary.verified, 1);
}

#[tokio::test]
async fn test_config_stage_mismatch_names_service() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/snapcheck"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "test_name": "test_app_web",
                "result": "Failed",
                "message": "Test Failed!!!, destination-port is <30081>"
            }
        ])))
        .mount(&server)
        .await;

    let err = verifier(&server, web_only())
        .run(Stage::Config)
        .await
        .unwrap_err();

    match err {
        VerifyError::ConfigMismatch { service, detail } => {
            assert_eq!(service, "web");
            assert!(detail.contains("30081"));
        }
        other => panic!("expected config mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_inventory_passes_vacuously() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/snapcheck"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let summary = verifier(&server, Arc::new(StaticInventory::new(Vec::new())))
        .run(Stage::Config)
        .await
        .unwrap();

    assert_eq!(summary.verified, 0);
}

#[tokio::test]
async fn test_operational_stage_follows_compliance_report() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/compliance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "complies": true,
            "skipped": [],
            "pingtest_web": {"complies": true},
            "get_facts": {"complies": true}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let verdict = verifier(&server, web_only())
        .verify(Stage::Operational)
        .await
        .unwrap();

    assert!(verdict.overall_pass);
    // One ping per service plus the device facts
    assert_eq!(verdict.results.len(), 2);
}

#[tokio::test]
async fn test_operational_stage_non_compliance_fails() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/compliance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "complies": false,
            "pingtest_web": {"complies": false, "nested": true},
            "get_facts": {"complies": true}
        })))
        .mount(&server)
        .await;

    let err = verifier(&server, web_only())
        .run(Stage::Operational)
        .await
        .unwrap_err();

    match err {
        VerifyError::ComplianceCheck { detail } => {
            assert!(detail.starts_with("web: pingtest_web"));
            assert!(detail.contains("1 of 2 statements failed"));
        }
        other => panic!("expected compliance failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_traffic_stage_passes_when_agents_get_200() {
    init_tracing();
    let server = MockServer::start().await;
    mount_services(&server).await;
    mount_coordinator(&server, "200").await;

    let summary = verifier(&server, kubernetes(&server).await)
        .run(Stage::Traffic)
        .await
        .unwrap();

    assert_eq!(summary.stage, Stage::Traffic);
    assert_eq!(summary.verified, 1);
}

#[tokio::test]
async fn test_traffic_stage_503_aborts_with_service_name() {
    init_tracing();
    let server = MockServer::start().await;
    mount_services(&server).await;
    mount_coordinator(&server, "503").await;

    let err = verifier(&server, kubernetes(&server).await)
        .run(Stage::Traffic)
        .await
        .unwrap_err();

    match err {
        VerifyError::TrafficAssertion { service, detail } => {
            assert_eq!(service, "web");
            assert!(detail.contains("\"503\""));
        }
        other => panic!("expected traffic assertion failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_traffic_stage_without_target_host_fails_to_build() {
    init_tracing();
    let server = MockServer::start().await;

    let verifier = Verifier::new(
        web_only(),
        AssertionBuilder::new(BuildContext::default()),
        Arc::new(HttpConfigEngine::new(&server.uri(), device(), TIMEOUT).unwrap()),
        Arc::new(HttpComplianceReporter::new(&server.uri(), device(), TIMEOUT).unwrap()),
        CoordinatorClient::new(&server.uri(), TIMEOUT).unwrap(),
        traffic_settings(),
    );

    let err = verifier.run(Stage::Traffic).await.unwrap_err();
    assert_eq!(err.reason_code(), "assertion_build_error");
}
