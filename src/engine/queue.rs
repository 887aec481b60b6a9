//! Serial operation queue over the shared transport and address cache.

// crates.io
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	addrs::cache::AddressCache,
	engine::{
		operation::{self, OperationHandle, OperationOutcome, RestRequestHandler, RetryStrategy},
		transport::{ApiTransport, RestResponse},
	},
};

/// Serialized (`max_concurrent = 1`) executor for REST operations.
///
/// Operations submitted to one queue start in submission order; queues are
/// independent, so operations on different facades run in parallel.
#[derive(Clone, Debug)]
pub struct OperationQueue {
	transport: Arc<dyn ApiTransport>,
	cache: Arc<AddressCache>,
	serial: Arc<Mutex<()>>,
}
impl OperationQueue {
	/// Create a queue over the injected collaborators.
	pub fn new(transport: Arc<dyn ApiTransport>, cache: Arc<AddressCache>) -> Self {
		Self { transport, cache, serial: Arc::new(Mutex::new(())) }
	}

	/// Address cache consulted for endpoint selection and failover rotation.
	pub fn address_cache(&self) -> &Arc<AddressCache> {
		&self.cache
	}

	/// Spawn `name` on the queue, returning a cancellable handle.
	pub fn submit<T, R>(
		&self,
		name: &'static str,
		strategy: RetryStrategy,
		request_handler: Arc<dyn RestRequestHandler>,
		response_handler: R,
	) -> OperationHandle<T>
	where
		T: Send + 'static,
		R: Fn(&RestResponse) -> Result<T> + Send + Sync + 'static,
	{
		let token = CancellationToken::new();
		let queue = self.clone();
		let task_token = token.clone();
		let join = tokio::spawn(async move {
			queue.run_with_token(name, strategy, request_handler, response_handler, task_token).await
		});

		OperationHandle::new(name, token, join)
	}

	/// Run `name` inline. The returned future is cancelled by dropping it;
	/// use [`OperationQueue::submit`] when an explicit cancel handle is needed.
	pub async fn run<T, R>(
		&self,
		name: &'static str,
		strategy: RetryStrategy,
		request_handler: Arc<dyn RestRequestHandler>,
		response_handler: R,
	) -> OperationOutcome<T>
	where
		T: Send,
		R: Fn(&RestResponse) -> Result<T> + Send + Sync,
	{
		self.run_with_token(name, strategy, request_handler, response_handler, CancellationToken::new())
			.await
	}

	async fn run_with_token<T, R>(
		&self,
		name: &'static str,
		strategy: RetryStrategy,
		request_handler: Arc<dyn RestRequestHandler>,
		response_handler: R,
		token: CancellationToken,
	) -> OperationOutcome<T>
	where
		T: Send,
		R: Fn(&RestResponse) -> Result<T> + Send + Sync,
	{
		// Waiting for the serial slot is itself a suspension point and must
		// honour cancellation.
		let _slot = tokio::select! {
			_ = token.cancelled() => return OperationOutcome::Cancelled,
			slot = self.serial.lock() => slot,
		};

		operation::execute(
			name,
			self.transport.clone(),
			self.cache.clone(),
			strategy,
			request_handler,
			response_handler,
			token,
		)
		.await
	}
}
