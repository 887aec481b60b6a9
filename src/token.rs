//! Per-account access-token cache with single-flight obtain and refresh.

// std
use std::{
	collections::HashMap,
	sync::{PoisonError, RwLock},
};
// crates.io
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
// self
use crate::{
	_prelude::*,
	engine::{
		operation::{AuthorizationProvider, OperationOutcome, OperationRequest, RetryStrategy},
		queue::OperationQueue,
		transport::{Authorization, TransportError, TransportErrorCode},
	},
	error::display_chain,
	proxy::{
		handlers::{self, codes},
		requests::{RequestFactory, with_authorization},
	},
};

/// Path prefix of the token service surface.
const AUTH_PREFIX: &str = "/auth/v1";

/// Access token wire payload returned by the token service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessTokenData {
	/// Opaque bearer token string.
	pub access_token: String,
	/// Wall-clock instant the token stops being valid.
	pub expiry: DateTime<Utc>,
}

/// Cached access token for one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessTokenRecord {
	/// Account the token belongs to.
	pub account_number: String,
	/// Opaque bearer token string.
	pub access_token: String,
	/// Wall-clock expiry; the record is valid iff `expiry > now`.
	pub expiry: DateTime<Utc>,
}
impl AccessTokenRecord {
	/// Strict expiry test: a record whose expiry equals `now` is already
	/// expired.
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.expiry <= now
	}
}

/// Per-account token cache with obtain-on-miss and refresh-on-expiry.
///
/// The miss/refresh path is single-flight: concurrent callers for the same
/// account coalesce behind one guard, and the manager's serial operation
/// queue orders the network calls, so no two obtains for one account ever
/// run simultaneously within a manager instance.
#[derive(Debug)]
pub struct AccessTokenManager {
	queue: OperationQueue,
	factory: RequestFactory,
	store: RwLock<HashMap<String, AccessTokenRecord>>,
	single_flight: Mutex<()>,
}
impl AccessTokenManager {
	/// Create a manager issuing token operations on `queue`.
	pub fn new(queue: OperationQueue, hostname: impl Into<String>) -> Self {
		Self {
			queue,
			factory: RequestFactory::new(hostname, AUTH_PREFIX),
			store: RwLock::new(HashMap::new()),
			single_flight: Mutex::new(()),
		}
	}

	/// Serve a valid cached record, obtaining or refreshing over the network
	/// when needed. Cancellable by dropping the returned future.
	pub async fn get_token(
		&self,
		account_number: &str,
		strategy: RetryStrategy,
	) -> OperationOutcome<AccessTokenRecord> {
		if let Some(record) = self.lookup_valid(account_number, Utc::now()) {
			return OperationOutcome::Success(record);
		}

		let _flight = self.single_flight.lock().await;

		// A coalesced caller may have installed a record while we waited.
		if let Some(record) = self.lookup_valid(account_number, Utc::now()) {
			return OperationOutcome::Success(record);
		}

		match self.lookup(account_number) {
			Some(expired) => self.refresh(expired, strategy).await,
			None => self.obtain(account_number, strategy).await,
		}
	}

	/// Bearer authorization for `record`, refreshing first when it expired.
	pub async fn get_authorization(
		&self,
		record: &AccessTokenRecord,
	) -> Result<Authorization> {
		if !record.is_expired(Utc::now()) {
			return Ok(Authorization::BearerToken(record.access_token.clone()));
		}

		let _flight = self.single_flight.lock().await;

		// The winner of a coalesced refresh may already have installed a
		// newer record for this account.
		if let Some(fresh) = self.lookup_valid(&record.account_number, Utc::now()) {
			return Ok(Authorization::BearerToken(fresh.access_token));
		}

		match self.refresh(record.clone(), RetryStrategy::no_retry()).await {
			OperationOutcome::Success(fresh) =>
				Ok(Authorization::BearerToken(fresh.access_token)),
			OperationOutcome::Failure(error) => Err(error),
			OperationOutcome::Cancelled =>
				Err(RestError::Network(TransportError::new(TransportErrorCode::Cancelled))),
		}
	}

	async fn obtain(
		&self,
		account_number: &str,
		strategy: RetryStrategy,
	) -> OperationOutcome<AccessTokenRecord> {
		let factory = self.factory.clone();
		let body = TokenRequest { account_number: account_number.to_string() };
		let handler = Arc::new(OperationRequest::new(move |_, _| {
			factory.post_json("/token", &body)
		}));
		let outcome = self
			.queue
			.run(
				"obtain-access-token",
				strategy,
				handler,
				handlers::json_with_recognized::<AccessTokenData>(&[codes::INVALID_ACCOUNT]),
			)
			.await;

		match outcome {
			OperationOutcome::Success(data) =>
				OperationOutcome::Success(self.install(account_number, data)),
			OperationOutcome::Failure(error) => {
				tracing::error!(
					error = %display_chain(&error),
					"failure to obtain an access token"
				);

				OperationOutcome::Failure(error)
			},
			OperationOutcome::Cancelled => OperationOutcome::Cancelled,
		}
	}

	async fn refresh(
		&self,
		previous: AccessTokenRecord,
		strategy: RetryStrategy,
	) -> OperationOutcome<AccessTokenRecord> {
		let factory = self.factory.clone();
		let credential = Authorization::BearerToken(previous.access_token.clone());
		let handler = Arc::new(OperationRequest::new(move |_, _| {
			with_authorization(factory.post("/refresh"), Some(&credential))
		}));
		let outcome = self
			.queue
			.run(
				"refresh-access-token",
				strategy,
				handler,
				handlers::json_with_recognized::<AccessTokenData>(&[codes::INVALID_ACCOUNT]),
			)
			.await;

		match outcome {
			OperationOutcome::Success(data) =>
				OperationOutcome::Success(self.install(&previous.account_number, data)),
			OperationOutcome::Failure(error) => {
				tracing::error!(
					error = %display_chain(&error),
					"failure to refresh an access token"
				);

				OperationOutcome::Failure(error)
			},
			OperationOutcome::Cancelled => OperationOutcome::Cancelled,
		}
	}

	fn lookup(&self, account_number: &str) -> Option<AccessTokenRecord> {
		self.store
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(account_number)
			.cloned()
	}

	fn lookup_valid(
		&self,
		account_number: &str,
		now: DateTime<Utc>,
	) -> Option<AccessTokenRecord> {
		self.lookup(account_number).filter(|record| !record.is_expired(now))
	}

	fn install(&self, account_number: &str, data: AccessTokenData) -> AccessTokenRecord {
		let record = AccessTokenRecord {
			account_number: account_number.to_string(),
			access_token: data.access_token,
			expiry: data.expiry,
		};

		self.store
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(account_number.to_string(), record.clone());

		tracing::debug!(expiry = %record.expiry, "installed an access token record");

		record
	}
}

/// Authorization provider serving bearer tokens from an
/// [`AccessTokenManager`].
#[derive(Clone, Debug)]
pub struct AccessTokenProvider {
	manager: Arc<AccessTokenManager>,
	account_number: String,
}
impl AccessTokenProvider {
	/// Create a provider resolving tokens for `account_number`.
	pub fn new(manager: Arc<AccessTokenManager>, account_number: impl Into<String>) -> Self {
		Self { manager, account_number: account_number.into() }
	}
}
#[async_trait]
impl AuthorizationProvider for AccessTokenProvider {
	async fn authorization(&self) -> Result<Authorization> {
		match self.manager.get_token(&self.account_number, RetryStrategy::no_retry()).await {
			OperationOutcome::Success(record) =>
				self.manager.get_authorization(&record).await,
			OperationOutcome::Failure(error) => Err(error),
			OperationOutcome::Cancelled =>
				Err(RestError::Network(TransportError::new(TransportErrorCode::Cancelled))),
		}
	}
}

/// Provider emitting the raw account credential for legacy endpoints.
#[derive(Clone, Debug)]
pub struct AccountCredentialProvider {
	account_number: String,
}
impl AccountCredentialProvider {
	/// Create a provider for `account_number`.
	pub fn new(account_number: impl Into<String>) -> Self {
		Self { account_number: account_number.into() }
	}
}
#[async_trait]
impl AuthorizationProvider for AccountCredentialProvider {
	async fn authorization(&self) -> Result<Authorization> {
		Ok(Authorization::AccountCredential(self.account_number.clone()))
	}
}

#[derive(Serialize)]
struct TokenRequest {
	account_number: String,
}
