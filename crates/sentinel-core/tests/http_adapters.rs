use sentinel_core::{
    ApiConfig, ConfigClient, FetchError, HttpMetricsSource, HttpProbeTarget, LoadConfig,
    LoadGenerator, MetricsSource, ProbeConfig, ProbeTarget, RuleUpdate, Sampler, SamplerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_config(server: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: server.uri(),
        ..ApiConfig::default()
    }
}

fn probe_config(server: &MockServer) -> ProbeConfig {
    ProbeConfig {
        base_url: server.uri(),
        ..ProbeConfig::default()
    }
}

#[tokio::test]
async fn metrics_source_decodes_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "allowed_requests": 105,
            "blocked_requests": 2,
            "redis_errors": 0
        })))
        .mount(&server)
        .await;

    let source = HttpMetricsSource::new(&api_config(&server)).unwrap();
    let snapshot = source.fetch_metrics().await.unwrap();
    assert_eq!(snapshot.allowed_requests, 105);
    assert_eq!(snapshot.blocked_requests, 2);
}

#[tokio::test]
async fn metrics_source_classifies_failures() {
    let server = MockServer::start().await;
    Mock::given(path("/metrics"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let source = HttpMetricsSource::new(&api_config(&server)).unwrap();
    assert_eq!(source.fetch_metrics().await, Err(FetchError::Status(503)));
    assert!(matches!(
        source.fetch_metrics().await,
        Err(FetchError::Malformed(_))
    ));
}

#[tokio::test]
async fn metrics_source_reports_unreachable_host() {
    let config = ApiConfig {
        // Nothing listens on the discard port.
        base_url: "http://127.0.0.1:9".to_string(),
        timeout_ms: Some(2_000),
        ..ApiConfig::default()
    };
    let source = HttpMetricsSource::new(&config).unwrap();
    let err = source.fetch_metrics().await.unwrap_err();
    assert!(err.is_transport(), "got {:?}", err);
}

#[tokio::test]
async fn probe_target_returns_raw_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/playground"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/playground"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let target = HttpProbeTarget::new(&probe_config(&server)).unwrap();
    assert_eq!(target.probe().await, Ok(200));
    assert_eq!(target.probe().await, Ok(429));
}

#[tokio::test]
async fn sampler_polls_live_endpoint() {
    let server = MockServer::start().await;
    Mock::given(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "allowed_requests": 100,
            "blocked_requests": 0,
            "redis_errors": 0
        })))
        .mount(&server)
        .await;

    let source = Arc::new(HttpMetricsSource::new(&api_config(&server)).unwrap());
    let config = SamplerConfig {
        interval_ms: 20,
        ..SamplerConfig::default()
    };
    let mut sampler = Sampler::new(source, &config);
    sampler.start();

    let mut rx = sampler.subscribe();
    let state = timeout(Duration::from_secs(5), rx.wait_for(|s| s.history.len() >= 3))
        .await
        .expect("sampler made no progress")
        .unwrap()
        .clone();
    sampler.stop();

    assert!(state.connected);
    assert_eq!(state.latest.unwrap().allowed_requests, 100);
}

#[tokio::test]
async fn load_generator_against_limited_route() {
    let server = MockServer::start().await;
    Mock::given(path("/playground"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(5)
        .mount(&server)
        .await;
    Mock::given(path("/playground"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let target = Arc::new(HttpProbeTarget::new(&probe_config(&server)).unwrap());
    let generator = LoadGenerator::new(target, &LoadConfig::default());
    for _ in 0..6 {
        generator.fire_one().await;
    }

    let mut rx = generator.subscribe();
    let state = timeout(Duration::from_secs(5), rx.wait_for(|s| s.stats.sent >= 6))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(state.stats.allowed, 5);
    assert_eq!(state.stats.blocked, 1);
    assert_eq!(state.log.newest().unwrap().outcome.status(), 429);
}

#[tokio::test]
async fn config_client_posts_rule() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/config"))
        .and(body_json(serde_json::json!({
            "path": "/login",
            "limit": 5,
            "window": 60
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("Updated /login: 5 reqs / 60s\n"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ConfigClient::new(&api_config(&server)).unwrap();
    let update = RuleUpdate {
        path: "/login".to_string(),
        limit: 5,
        window: 60,
    };
    let message = client.update_rule(&update).await.unwrap();
    assert_eq!(message, "Updated /login: 5 reqs / 60s");
}

#[tokio::test]
async fn config_client_surfaces_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&server)
        .await;

    let client = ConfigClient::new(&api_config(&server)).unwrap();
    let err = client
        .update_rule(&RuleUpdate::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("400"), "got {err}");
}
