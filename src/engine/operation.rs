//! Cancellable, retrying execution of a single REST operation.

// std
use std::fmt::{self, Debug, Formatter};
// crates.io
use async_trait::async_trait;
use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	addrs::{cache::AddressCache, endpoint::ApiEndpoint},
	engine::transport::{ApiTransport, Authorization, RestRequest, RestResponse},
	error::display_chain,
};

/// Bound on attempts and inter-attempt delay for one operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryStrategy {
	/// Additional attempts permitted after the initial one; zero disables
	/// retrying.
	pub max_attempts: u32,
	/// Sleep applied between attempts.
	pub delay: RetryDelay,
}
impl RetryStrategy {
	/// Single attempt, no retry.
	pub const fn no_retry() -> Self {
		Self { max_attempts: 0, delay: RetryDelay::Never }
	}

	/// Retry up to `max_attempts` extra times with no sleep in between.
	pub const fn immediate(max_attempts: u32) -> Self {
		Self { max_attempts, delay: RetryDelay::Never }
	}

	/// Retry up to `max_attempts` extra times with a fixed sleep in between.
	pub const fn with_delay(max_attempts: u32, delay: Duration) -> Self {
		Self { max_attempts, delay: RetryDelay::Wait(delay) }
	}
}

/// Inter-attempt delay policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDelay {
	/// Re-enter the pipeline immediately.
	Never,
	/// Arm a cancellable timer before the next attempt.
	Wait(Duration),
}

/// Terminal completion of an operation.
///
/// A genuine sum type: cancellation is never conflated with an error, and a
/// completed operation yields exactly one of these.
#[derive(Debug)]
pub enum OperationOutcome<T> {
	/// The pipeline produced a value.
	Success(T),
	/// The pipeline failed; see the carried error.
	Failure(RestError),
	/// The operation was cancelled before completion.
	Cancelled,
}
impl<T> OperationOutcome<T> {
	/// Extract the success value, if any.
	pub fn success(self) -> Option<T> {
		match self {
			Self::Success(value) => Some(value),
			_ => None,
		}
	}

	/// Whether the operation completed by cancellation.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}

	/// Map the success value, preserving failure and cancellation.
	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationOutcome<U> {
		match self {
			Self::Success(value) => OperationOutcome::Success(f(value)),
			Self::Failure(error) => OperationOutcome::Failure(error),
			Self::Cancelled => OperationOutcome::Cancelled,
		}
	}
}

/// Builds the wire request for each attempt of an operation.
pub trait RestRequestHandler: Send + Sync {
	/// Produce a fully-formed request for `endpoint`. Failures are fatal and
	/// never retried.
	fn build_request(
		&self,
		endpoint: ApiEndpoint,
		authorization: Option<&Authorization>,
	) -> Result<RestRequest>;

	/// Advertise the authorization provider, when the operation needs one.
	fn authorization_provider(&self) -> Option<Arc<dyn AuthorizationProvider>> {
		None
	}
}

/// Resolves the caller identity ahead of the transport stage.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
	/// Obtain an authorization value; may suspend until a token is available.
	/// The engine drops the future on cancellation.
	async fn authorization(&self) -> Result<Authorization>;
}

/// Request handler assembled from a build closure and an optional provider.
pub struct OperationRequest<F> {
	build: F,
	provider: Option<Arc<dyn AuthorizationProvider>>,
}
impl<F> OperationRequest<F>
where
	F: Fn(ApiEndpoint, Option<&Authorization>) -> Result<RestRequest> + Send + Sync,
{
	/// Handler for an unauthorized operation.
	pub fn new(build: F) -> Self {
		Self { build, provider: None }
	}

	/// Handler whose requests carry an authorization resolved by `provider`.
	pub fn with_provider(build: F, provider: Arc<dyn AuthorizationProvider>) -> Self {
		Self { build, provider: Some(provider) }
	}
}
impl<F> RestRequestHandler for OperationRequest<F>
where
	F: Fn(ApiEndpoint, Option<&Authorization>) -> Result<RestRequest> + Send + Sync,
{
	fn build_request(
		&self,
		endpoint: ApiEndpoint,
		authorization: Option<&Authorization>,
	) -> Result<RestRequest> {
		(self.build)(endpoint, authorization)
	}

	fn authorization_provider(&self) -> Option<Arc<dyn AuthorizationProvider>> {
		self.provider.clone()
	}
}

/// Cancellation handle detachable from a running operation.
#[derive(Clone, Debug)]
pub struct OperationCanceller {
	token: CancellationToken,
}
impl OperationCanceller {
	/// Request cooperative cancellation; idempotent and safe after completion.
	pub fn cancel(&self) {
		self.token.cancel();
	}
}

/// Owning handle for a submitted operation.
///
/// Dropping the handle detaches the operation (it keeps running); call
/// [`OperationHandle::cancel`] or use a detached [`OperationCanceller`] to
/// stop it.
pub struct OperationHandle<T> {
	name: &'static str,
	token: CancellationToken,
	join: JoinHandle<OperationOutcome<T>>,
}
impl<T> OperationHandle<T> {
	pub(crate) fn new(
		name: &'static str,
		token: CancellationToken,
		join: JoinHandle<OperationOutcome<T>>,
	) -> Self {
		Self { name, token, join }
	}

	/// Request cooperative cancellation; idempotent.
	pub fn cancel(&self) {
		self.token.cancel();
	}

	/// Detach a cancellation handle that outlives this owning handle.
	pub fn canceller(&self) -> OperationCanceller {
		OperationCanceller { token: self.token.clone() }
	}

	/// Await the terminal outcome; resolves exactly once.
	pub async fn wait(self) -> OperationOutcome<T> {
		match self.join.await {
			Ok(outcome) => outcome,
			Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
			// The runtime aborted the task (shutdown); report it as cancelled.
			Err(_) => OperationOutcome::Cancelled,
		}
	}
}
impl<T> Debug for OperationHandle<T> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.debug_struct("OperationHandle").field("name", &self.name).finish_non_exhaustive()
	}
}

/// Drive one operation through the attempt pipeline until it completes.
///
/// Per attempt: endpoint selection, authorization resolution (when the
/// handler advertises a provider), request construction, transport, response
/// mapping. Transport errors alone feed the retry decision; the cancellation
/// token is honoured at every suspension point.
pub(crate) async fn execute<T, R>(
	name: &'static str,
	transport: Arc<dyn ApiTransport>,
	cache: Arc<AddressCache>,
	strategy: RetryStrategy,
	request_handler: Arc<dyn RestRequestHandler>,
	response_handler: R,
	token: CancellationToken,
) -> OperationOutcome<T>
where
	R: Fn(&RestResponse) -> Result<T> + Send + Sync,
{
	let mut attempt: u32 = 0;

	loop {
		if token.is_cancelled() {
			return OperationOutcome::Cancelled;
		}

		let endpoint = cache.current_endpoint();
		let authorization = match request_handler.authorization_provider() {
			Some(provider) => {
				let resolved = tokio::select! {
					_ = token.cancelled() => return OperationOutcome::Cancelled,
					resolved = provider.authorization() => resolved,
				};

				match resolved {
					Ok(authorization) => Some(authorization),
					Err(error) => {
						tracing::error!(
							name,
							error = %display_chain(&error),
							"authorization resolution failed"
						);

						return OperationOutcome::Failure(error);
					},
				}
			},
			None => None,
		};
		let request = match request_handler.build_request(endpoint, authorization.as_ref()) {
			Ok(request) => request,
			Err(error) => {
				tracing::error!(
					name,
					error = %display_chain(&error),
					"request construction failed"
				);

				return OperationOutcome::Failure(error);
			},
		};

		tracing::debug!(name, %endpoint, attempt, "dispatching request");

		let reply = tokio::select! {
			_ = token.cancelled() => return OperationOutcome::Cancelled,
			reply = transport.send(endpoint, request) => reply,
		};

		match reply {
			Ok(response) => {
				return match response_handler(&response) {
					Ok(value) => OperationOutcome::Success(value),
					Err(error) => {
						tracing::error!(
							name,
							status = %response.status,
							error = %display_chain(&error),
							"response handling failed"
						);

						// The transport succeeded; the semantic error is
						// surfaced to the caller without retrying.
						OperationOutcome::Failure(error)
					},
				};
			},
			Err(error) => {
				if error.is_cancellation() {
					return OperationOutcome::Cancelled;
				}

				tracing::warn!(
					name,
					%endpoint,
					attempt,
					error = %display_chain(&error),
					"transport attempt failed"
				);

				if !error.is_transient_local() {
					cache.rotate_after_failure(endpoint);
				}
				if attempt >= strategy.max_attempts {
					return OperationOutcome::Failure(RestError::Network(error));
				}

				attempt += 1;

				if let RetryDelay::Wait(delay) = strategy.delay {
					tokio::select! {
						_ = token.cancelled() => return OperationOutcome::Cancelled,
						_ = time::sleep(delay) => {},
					}
				}
			},
		}
	}
}
