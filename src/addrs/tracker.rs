//! Periodic refresh driver for the address cache.

// std
use std::sync::{Mutex, MutexGuard, PoisonError};
// crates.io
use tokio::time;
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	addrs::cache::AddressCache,
	engine::operation::{OperationOutcome, RetryStrategy},
	error::display_chain,
	proxy::api::ApiProxy,
};

/// Interval between successful refreshes of the address cache.
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(60 * 60 * 24);
/// Interval before retrying after a failed or cancelled refresh.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(60 * 15);

/// Terminal completion of one tracker update cycle.
#[derive(Debug)]
pub enum UpdateOutcome {
	/// The cache was refreshed from the API and persisted.
	Finished,
	/// The cache was fresh enough; no request was made.
	Throttled,
	/// The update failed; the tracker retries at [`RETRY_INTERVAL`].
	Failed(UpdateError),
	/// The update was cancelled before completion.
	Cancelled,
}
impl UpdateOutcome {
	/// Whether the cycle counts as a success for scheduling purposes.
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Finished | Self::Throttled)
	}
}

/// Failure cause of a tracker update.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
	/// The address list could not be fetched from the API.
	#[error("Failure to fetch the address list")]
	Fetch(#[source] RestError),
	/// The fetched address list could not be installed.
	#[error("Failure to install the refreshed address list")]
	Install(#[source] AddressCacheError),
}

/// Host-side scheduler adapter for background execution.
///
/// The host wakes the tracker through
/// [`AddressCacheTracker::handle_background_task`]; cancellation from the
/// host maps to dropping (or aborting) that future.
pub trait BackgroundTaskHost: Send + Sync {
	/// Ask the host to invoke the tracker's handler no earlier than
	/// `earliest`.
	fn schedule(&self, earliest: DateTime<Utc>);
}

/// Drives periodic and ad-hoc refresh of the address cache.
///
/// At most one timer is armed at any time: starting periodic updates while
/// already running is a no-op, and stopping cancels the armed timer.
#[derive(Clone)]
pub struct AddressCacheTracker {
	cache: Arc<AddressCache>,
	proxy: ApiProxy,
	state: Arc<Mutex<TrackerState>>,
}
impl AddressCacheTracker {
	/// Create a tracker refreshing `cache` through `proxy`.
	pub fn new(cache: Arc<AddressCache>, proxy: ApiProxy) -> Self {
		Self {
			cache,
			proxy,
			state: Arc::new(Mutex::new(TrackerState { periodic: None, last_failure_at: None, host: None })),
		}
	}

	/// Begin periodic updates; a no-op when already running.
	pub fn start(&self) {
		let mut state = self.lock();

		if state.periodic.is_some() {
			return;
		}

		let token = CancellationToken::new();

		state.periodic = Some(token.clone());
		drop(state);

		let tracker = self.clone();

		tokio::spawn(async move { tracker.run_periodic(token).await });

		tracing::debug!("started periodic address cache updates");
	}

	/// Cancel the armed timer and stop periodic updates.
	pub fn stop(&self) {
		if let Some(token) = self.lock().periodic.take() {
			token.cancel();

			tracing::debug!("stopped periodic address cache updates");
		}
	}

	/// Next wall-clock instant a refresh should fire: the retry interval
	/// after a failure, otherwise the update interval past the last
	/// successful refresh.
	pub fn next_schedule_time(&self) -> DateTime<Utc> {
		match self.lock().last_failure_at {
			Some(failed_at) => failed_at + delta(RETRY_INTERVAL),
			None => self.cache.last_update_time() + delta(UPDATE_INTERVAL),
		}
	}

	/// Run a single update cycle, bypassing the periodic timer.
	///
	/// Throttled at the source: when the cache refreshed within
	/// [`UPDATE_INTERVAL`], the cycle short-circuits without a network
	/// request. Cancellable by dropping the returned future.
	pub async fn update(&self) -> UpdateOutcome {
		if Utc::now() - self.cache.last_update_time() < delta(UPDATE_INTERVAL) {
			tracing::debug!("address cache update throttled");

			return UpdateOutcome::Throttled;
		}

		match self.proxy.run_get_api_addrs(RetryStrategy::no_retry()).await {
			OperationOutcome::Success(endpoints) =>
				match self.cache.replace_endpoints(endpoints) {
					Ok(()) => UpdateOutcome::Finished,
					Err(error) => {
						tracing::error!(
							error = %display_chain(&error),
							"failure to install refreshed API addresses"
						);

						UpdateOutcome::Failed(UpdateError::Install(error))
					},
				},
			OperationOutcome::Failure(error) => {
				tracing::warn!(
					error = %display_chain(&error),
					"failure to fetch the API address list"
				);

				UpdateOutcome::Failed(UpdateError::Fetch(error))
			},
			OperationOutcome::Cancelled => UpdateOutcome::Cancelled,
		}
	}

	/// Register the host scheduler used for background execution and arm the
	/// first invocation.
	pub fn register_background_task(&self, host: Arc<dyn BackgroundTaskHost>) {
		self.lock().host = Some(host);
		self.schedule_background_task();
	}

	/// Hand the next fire time to the registered host scheduler.
	pub fn schedule_background_task(&self) {
		let host = self.lock().host.clone();

		if let Some(host) = host {
			let earliest = self.next_schedule_time();

			tracing::debug!(%earliest, "scheduled the next background address cache update");
			host.schedule(earliest);
		}
	}

	/// Host entry point: run one update, reschedule the next invocation, and
	/// report the completion back to the host.
	pub async fn handle_background_task(&self) -> UpdateOutcome {
		let outcome = self.update().await;

		self.note_outcome(&outcome);
		self.schedule_background_task();

		outcome
	}

	async fn run_periodic(self, token: CancellationToken) {
		loop {
			let delay = self.delay_until_next_fire();

			tokio::select! {
				_ = token.cancelled() => break,
				_ = time::sleep(delay) => {},
			}

			let outcome = tokio::select! {
				_ = token.cancelled() => break,
				outcome = self.update() => outcome,
			};

			self.note_outcome(&outcome);
		}
	}

	fn note_outcome(&self, outcome: &UpdateOutcome) {
		let mut state = self.lock();

		if outcome.is_success() {
			state.last_failure_at = None;
		} else {
			state.last_failure_at = Some(Utc::now());
		}
	}

	fn delay_until_next_fire(&self) -> Duration {
		(self.next_schedule_time() - Utc::now()).to_std().unwrap_or(Duration::ZERO)
	}

	fn lock(&self) -> MutexGuard<'_, TrackerState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

struct TrackerState {
	periodic: Option<CancellationToken>,
	last_failure_at: Option<DateTime<Utc>>,
	host: Option<Arc<dyn BackgroundTaskHost>>,
}

fn delta(interval: Duration) -> TimeDelta {
	TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX)
}
