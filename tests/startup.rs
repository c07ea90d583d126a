//! End-to-end run: start, serve, stop through the admin listener.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use service_host::http::ServerFactory;
use service_host::config::ValidationError;
use service_host::lifecycle::{run_with, StartupError};

mod common;

#[tokio::test]
async fn run_returns_after_remote_stop() {
    let mut config = common::test_config();
    config.server.http_port = common::free_port();
    config.server.http_admin_port = common::free_port();
    config.discovery.enabled = true;

    let registry = service_host::discovery::MemoryRegistry::new();
    let (hook, mut exits) = common::exit_hook();
    let factory = ServerFactory::new()
        .with_registry(Arc::new(registry.clone()))
        .with_retry_policy(common::fast_retry())
        .with_exit_hook(hook);

    let run_config = config.clone();
    let running = tokio::spawn(async move { run_with(factory, &run_config, common::app()).await });

    let client = common::client();
    let app_url = format!("http://127.0.0.1:{}/", config.server.http_port);
    let mut ready = false;
    for _ in 0..50 {
        if let Ok(res) = client.get(&app_url).send().await {
            assert_eq!(res.text().await.unwrap(), "hosted");
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(ready, "service never became ready");
    assert_eq!(registry.instances().len(), 1);

    let res = client
        .post(format!(
            "http://127.0.0.1:{}/stop",
            config.server.http_admin_port
        ))
        .form(&[("secret", common::SECRET)])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("run did not return")
        .unwrap()
        .unwrap();
    assert_eq!(common::next_exit(&mut exits).await, 0);
    assert!(registry.instances().is_empty());
}

#[tokio::test]
async fn port_clash_is_reported_by_startup() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = common::test_config();
    config.server.http_port = taken.local_addr().unwrap().port();

    let (hook, _exits) = common::exit_hook();
    let factory = ServerFactory::new().with_exit_hook(hook);

    let err = run_with(factory, &config, common::app()).await.unwrap_err();
    assert!(
        err.to_string().contains("application listener failed"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn invalid_config_is_rejected_before_binding() {
    let mut config = common::test_config();
    config.server.max_request_header_size = 1024;
    config.server.stop_secret.clear();

    let (hook, _exits) = common::exit_hook();
    let factory = ServerFactory::new().with_exit_hook(hook);

    let err = run_with(factory, &config, common::app()).await.unwrap_err();
    match err {
        StartupError::Config(errors) => {
            assert!(errors.contains(&ValidationError::HeaderSizeTooSmall(1024)));
            assert!(errors.contains(&ValidationError::EmptyStopSecret));
        }
        other => panic!("unexpected error: {other}"),
    }
}
