//! Facade for the unauthenticated `/app/v1` service surface.

// self
use crate::{
	_prelude::*,
	addrs::endpoint::ApiEndpoint,
	engine::{
		operation::{OperationHandle, OperationOutcome, OperationRequest, RetryStrategy},
		queue::OperationQueue,
	},
	proxy::{
		handlers::{self, CacheableResponse},
		requests::RequestFactory,
		types::RelayList,
	},
};

const PREFIX: &str = "/app/v1";

/// Typed operations on the core application endpoints.
#[derive(Clone, Debug)]
pub struct ApiProxy {
	queue: OperationQueue,
	factory: RequestFactory,
}
impl ApiProxy {
	/// Create the facade over its own serial queue.
	pub fn new(queue: OperationQueue, hostname: impl Into<String>) -> Self {
		Self { queue, factory: RequestFactory::new(hostname, PREFIX) }
	}

	/// Fetch the canonical API endpoint pool from `/api-addrs`.
	pub fn get_api_addrs(&self, strategy: RetryStrategy) -> OperationHandle<Vec<ApiEndpoint>> {
		let factory = self.factory.clone();
		let handler = Arc::new(OperationRequest::new(move |_, _| Ok(factory.get("/api-addrs"))));

		self.queue.submit("get-api-addrs", strategy, handler, handlers::json::<Vec<ApiEndpoint>>())
	}

	/// Inline variant of [`ApiProxy::get_api_addrs`]; cancelled by drop.
	pub(crate) async fn run_get_api_addrs(
		&self,
		strategy: RetryStrategy,
	) -> OperationOutcome<Vec<ApiEndpoint>> {
		let factory = self.factory.clone();
		let handler = Arc::new(OperationRequest::new(move |_, _| Ok(factory.get("/api-addrs"))));

		self.queue
			.run("get-api-addrs", strategy, handler, handlers::json::<Vec<ApiEndpoint>>())
			.await
	}

	/// Fetch the relay catalogue, revalidating against `etag` when supplied.
	pub fn get_relays(
		&self,
		etag: Option<String>,
		strategy: RetryStrategy,
	) -> OperationHandle<CacheableResponse<RelayList>> {
		let factory = self.factory.clone();
		let handler = Arc::new(OperationRequest::new(move |_, _| {
			factory.get_with_etag("/relays", etag.as_deref())
		}));

		self.queue.submit(
			"get-relays",
			strategy,
			handler,
			handlers::cacheable_json::<RelayList>(&[]),
		)
	}
}
