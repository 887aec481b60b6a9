//! Failover, retry accounting, and cancellation scenarios for the engine.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use tokio::time;
// self
use crate::support::{MockTransport, Reply, endpoint, seeded_cache};
use rest_runtime::{
	RestError,
	engine::{
		operation::{OperationOutcome, OperationRequest, RestRequestHandler, RetryStrategy},
		queue::OperationQueue,
	},
	proxy::{handlers, requests::RequestFactory},
};

fn probe_handler() -> Arc<dyn RestRequestHandler> {
	let factory = RequestFactory::new("api.example.net", "/app/v1");

	Arc::new(OperationRequest::new(move |_, _| Ok(factory.get("/ping"))))
}

#[tokio::test]
async fn rotates_past_the_failed_endpoint_on_each_attempt() {
	let _ = tracing_subscriber::fmt::try_init();

	let dir = tempfile::tempdir().expect("tempdir");
	let cache = seeded_cache(dir.path(), &[endpoint(1), endpoint(2), endpoint(3)]);
	let transport = MockTransport::scripted([
		Reply::connection_failed(),
		Reply::connection_failed(),
		Reply::connection_failed(),
	]);
	let queue = OperationQueue::new(transport.clone(), cache.clone());
	let outcome = queue
		.submit("probe", RetryStrategy::immediate(2), probe_handler(), handlers::empty(&[]))
		.wait()
		.await;

	assert!(matches!(outcome, OperationOutcome::Failure(RestError::Network(_))));
	assert_eq!(transport.endpoints_dialed(), vec![endpoint(1), endpoint(2), endpoint(3)]);
	// Three rotations of a three-entry pool bring it back to the start.
	assert_eq!(cache.endpoints(), vec![endpoint(1), endpoint(2), endpoint(3)]);
}

#[tokio::test]
async fn transient_local_errors_keep_the_same_endpoint() {
	let dir = tempfile::tempdir().expect("tempdir");
	let cache = seeded_cache(dir.path(), &[endpoint(1), endpoint(2)]);
	let transport =
		MockTransport::scripted([Reply::offline(), Reply::offline(), Reply::ok("{}")]);
	let queue = OperationQueue::new(transport.clone(), cache.clone());
	let outcome = queue
		.submit("probe", RetryStrategy::immediate(3), probe_handler(), handlers::empty(&[]))
		.wait()
		.await;

	assert!(matches!(outcome, OperationOutcome::Success(())));
	assert_eq!(
		transport.endpoints_dialed(),
		vec![endpoint(1), endpoint(1), endpoint(1)]
	);
	assert_eq!(cache.endpoints(), vec![endpoint(1), endpoint(2)]);
}

#[tokio::test]
async fn an_always_failing_transport_sees_exactly_one_extra_attempt_per_retry() {
	for max_attempts in [0u32, 1, 3] {
		let dir = tempfile::tempdir().expect("tempdir");
		let cache = seeded_cache(dir.path(), &[endpoint(1), endpoint(2)]);
		let transport = MockTransport::scripted(
			std::iter::repeat_with(Reply::connection_failed).take(max_attempts as usize + 1),
		);
		let queue = OperationQueue::new(transport.clone(), cache);
		let outcome = queue
			.submit(
				"probe",
				RetryStrategy::immediate(max_attempts),
				probe_handler(),
				handlers::empty(&[]),
			)
			.wait()
			.await;

		assert!(matches!(outcome, OperationOutcome::Failure(RestError::Network(_))));
		assert_eq!(transport.request_count(), max_attempts as usize + 1);
	}
}

#[tokio::test]
async fn cancelling_during_backoff_stops_further_attempts() {
	let dir = tempfile::tempdir().expect("tempdir");
	let cache = seeded_cache(dir.path(), &[endpoint(1)]);
	let transport = MockTransport::scripted([Reply::connection_failed()]);
	let queue = OperationQueue::new(transport.clone(), cache);
	let handle = queue.submit(
		"probe",
		RetryStrategy::with_delay(5, Duration::from_secs(30)),
		probe_handler(),
		handlers::empty(&[]),
	);

	// Let the first attempt fail and the backoff timer arm.
	time::sleep(Duration::from_millis(100)).await;
	handle.cancel();

	let outcome = time::timeout(Duration::from_secs(5), handle.wait())
		.await
		.expect("cancellation must complete promptly");

	assert!(outcome.is_cancelled());
	assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn cancelling_an_in_flight_request_completes_with_cancelled() {
	let dir = tempfile::tempdir().expect("tempdir");
	let cache = seeded_cache(dir.path(), &[endpoint(1)]);
	let transport = MockTransport::scripted([Reply::Hang]);
	let queue = OperationQueue::new(transport.clone(), cache);
	let handle = queue.submit(
		"probe",
		RetryStrategy::no_retry(),
		probe_handler(),
		handlers::empty(&[]),
	);
	let canceller = handle.canceller();

	time::sleep(Duration::from_millis(100)).await;
	canceller.cancel();
	// A second cancel is a no-op.
	canceller.cancel();

	let outcome = time::timeout(Duration::from_secs(5), handle.wait())
		.await
		.expect("cancellation must complete promptly");

	assert!(outcome.is_cancelled());
	assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn operations_on_one_queue_run_in_submission_order() {
	let dir = tempfile::tempdir().expect("tempdir");
	let cache = seeded_cache(dir.path(), &[endpoint(1)]);
	let transport = MockTransport::scripted([Reply::ok("{}"), Reply::ok("{}")]);
	let queue = OperationQueue::new(transport.clone(), cache);
	let factory = RequestFactory::new("api.example.net", "/app/v1");
	let first_factory = factory.clone();
	let first = queue.submit(
		"first",
		RetryStrategy::no_retry(),
		Arc::new(OperationRequest::new(move |_, _| Ok(first_factory.get("/first")))),
		handlers::empty(&[]),
	);

	// Give the first operation its head start before queueing the second.
	time::sleep(Duration::from_millis(20)).await;

	let second = queue.submit(
		"second",
		RetryStrategy::no_retry(),
		Arc::new(OperationRequest::new(move |_, _| Ok(factory.get("/second")))),
		handlers::empty(&[]),
	);

	assert!(matches!(first.wait().await, OperationOutcome::Success(())));
	assert!(matches!(second.wait().await, OperationOutcome::Success(())));

	let paths: Vec<_> =
		transport.requests().into_iter().map(|(_, request)| request.path).collect();

	assert_eq!(paths, vec!["/app/v1/first".to_string(), "/app/v1/second".to_string()]);
}

#[tokio::test]
async fn a_failing_response_handler_is_not_retried() {
	let dir = tempfile::tempdir().expect("tempdir");
	let cache = seeded_cache(dir.path(), &[endpoint(1), endpoint(2)]);
	let transport = MockTransport::scripted([Reply::ok("not json")]);
	let queue = OperationQueue::new(transport.clone(), cache.clone());
	let outcome: OperationOutcome<serde_json::Value> = queue
		.submit(
			"probe",
			RetryStrategy::immediate(5),
			probe_handler(),
			handlers::json::<serde_json::Value>(),
		)
		.wait()
		.await;

	assert!(matches!(outcome, OperationOutcome::Failure(RestError::DecodeSuccessResponse(_))));
	// The transport succeeded, so no retry and no endpoint rotation.
	assert_eq!(transport.request_count(), 1);
	assert_eq!(cache.current_endpoint(), endpoint(1));
}
