//! Wire-level scenarios through the typed facades and the reqwest transport.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use chrono::{TimeDelta, Utc};
use http::StatusCode;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{header, method, path},
};
// self
use crate::support::endpoint;
use rest_runtime::{
	ApiConfig, RestError, RestRuntime,
	addrs::{cache::AddressCache, endpoint::ApiEndpoint},
	engine::{
		operation::{OperationOutcome, RetryStrategy},
		queue::OperationQueue,
		transport::ReqwestTransport,
	},
	proxy::{api::ApiProxy, handlers::CacheableResponse, types::NewDevice},
};

const RELAYS_BODY: &str = r#"{
    "relays": [
        {
            "hostname": "se-got-wg-001",
            "ipv4_addr_in": "193.138.218.1",
            "public_key": "bWFkZS11cC1rZXk=",
            "location": "se-got"
        }
    ]
}"#;

fn plain_transport() -> Arc<ReqwestTransport> {
	Arc::new(
		ReqwestTransport::new(Duration::from_secs(5)).expect("transport").plain_http(),
	)
}

fn api_proxy_against(server: &MockServer, dir: &std::path::Path) -> ApiProxy {
	let server_endpoint = ApiEndpoint::from(*server.address());
	let cache =
		Arc::new(AddressCache::open(dir.join("cache.json"), None, server_endpoint));
	let queue = OperationQueue::new(plain_transport(), cache);

	ApiProxy::new(queue, "api.example.net")
}

#[tokio::test]
async fn conditional_get_returns_new_content_then_not_modified() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	// Wiremock evaluates mocks in mount order; the conditional branch must
	// come first.
	Mock::given(method("GET"))
		.and(path("/app/v1/relays"))
		.and(header("if-none-match", "W/\"v1\""))
		.respond_with(ResponseTemplate::new(304).insert_header("etag", "\"v1\""))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/app/v1/relays"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(RELAYS_BODY)
				.insert_header("content-type", "application/json")
				.insert_header("etag", "\"v1\""),
		)
		.mount(&server)
		.await;

	let dir = tempfile::tempdir().expect("tempdir");
	let proxy = api_proxy_against(&server, dir.path());
	let first = proxy.get_relays(None, RetryStrategy::no_retry()).wait().await;

	match first {
		OperationOutcome::Success(CacheableResponse::NewContent { etag, value }) => {
			assert_eq!(etag.as_deref(), Some("\"v1\""));
			assert_eq!(value.relays.len(), 1);
			assert_eq!(value.relays[0].hostname, "se-got-wg-001");
		},
		other => panic!("expected new content, got {other:?}"),
	}

	let second =
		proxy.get_relays(Some("\"v1\"".into()), RetryStrategy::no_retry()).wait().await;

	assert!(matches!(
		second,
		OperationOutcome::Success(CacheableResponse::NotModified)
	));
}

#[tokio::test]
async fn an_undeclared_status_surfaces_as_unhandled_response() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/app/v1/relays"))
		.respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
		.mount(&server)
		.await;

	let dir = tempfile::tempdir().expect("tempdir");
	let proxy = api_proxy_against(&server, dir.path());
	let outcome = proxy.get_relays(None, RetryStrategy::no_retry()).wait().await;

	match outcome {
		OperationOutcome::Failure(RestError::UnhandledResponse { status, error }) => {
			assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
			assert!(error.is_none());
		},
		other => panic!("expected an unhandled response, got {other:?}"),
	}
}

#[tokio::test]
async fn create_device_maps_recognized_error_codes() {
	let server = MockServer::start().await;
	let expiry = (Utc::now() + TimeDelta::hours(1)).to_rfc3339();

	Mock::given(method("POST"))
		.and(path("/auth/v1/token"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(format!(
					r#"{{"access_token":"tok","expiry":"{expiry}"}}"#
				))
				.insert_header("content-type", "application/json"),
		)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/accounts/v1/devices"))
		.and(header("authorization", "Bearer tok"))
		.respond_with(
			ResponseTemplate::new(400)
				.set_body_string(r#"{"code":"PUBKEY_IN_USE"}"#)
				.insert_header("content-type", "application/json"),
		)
		.expect(1)
		.mount(&server)
		.await;

	let dir = tempfile::tempdir().expect("tempdir");
	let config = ApiConfig::new(
		"api.example.net",
		ApiEndpoint::from(*server.address()),
		dir.path(),
	);
	let runtime = RestRuntime::with_transport(config, plain_transport());
	let outcome = runtime
		.devices_proxy()
		.create_device(
			"acct".into(),
			NewDevice { pubkey: "bWFkZS11cC1rZXk=".into(), hijack_dns: false },
			RetryStrategy::no_retry(),
		)
		.wait()
		.await;

	match outcome {
		OperationOutcome::Failure(RestError::Server(error)) => {
			assert!(error.is("PUBKEY_IN_USE"));
		},
		other => panic!("expected a typed server error, got {other:?}"),
	}

	server.verify().await;
}

#[tokio::test]
async fn account_data_is_fetched_with_the_legacy_credential() {
	let server = MockServer::start().await;
	let expiry = (Utc::now() + TimeDelta::days(30)).to_rfc3339();

	Mock::given(method("GET"))
		.and(path("/accounts/v1/accounts/me"))
		.and(header("authorization", "Token 1234567890"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(format!(r#"{{"id":"acct-1","expiry":"{expiry}"}}"#))
				.insert_header("content-type", "application/json"),
		)
		.expect(1)
		.mount(&server)
		.await;

	let dir = tempfile::tempdir().expect("tempdir");
	let config = ApiConfig::new(
		"api.example.net",
		ApiEndpoint::from(*server.address()),
		dir.path(),
	);
	let runtime = RestRuntime::with_transport(config, plain_transport());
	let outcome = runtime
		.accounts_proxy()
		.get_account_data("1234567890".into(), RetryStrategy::no_retry())
		.wait()
		.await;
	let account = outcome.success().expect("account data");

	assert_eq!(account.id, "acct-1");

	server.verify().await;
}

#[tokio::test]
async fn unused_default_endpoint_is_not_dialed() {
	// Construction alone must not touch the network: the runtime only dials
	// when an operation is submitted.
	let dir = tempfile::tempdir().expect("tempdir");
	let config = ApiConfig::new("api.example.net", endpoint(1), dir.path());
	let runtime = RestRuntime::with_transport(config, plain_transport());

	assert_eq!(runtime.address_cache().current_endpoint(), endpoint(1));
}
