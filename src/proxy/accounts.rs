//! Facade for the `/accounts/v1` account endpoints.

// self
use crate::{
	_prelude::*,
	engine::{
		operation::{OperationHandle, OperationRequest, RetryStrategy},
		queue::OperationQueue,
	},
	proxy::{
		handlers::{self, codes},
		requests::{RequestFactory, with_authorization},
		types::AccountData,
	},
	token::AccountCredentialProvider,
};

const PREFIX: &str = "/accounts/v1";

/// Typed operations on accounts. These endpoints predate the token service
/// and authenticate with the raw account credential.
#[derive(Clone, Debug)]
pub struct AccountsProxy {
	queue: OperationQueue,
	factory: RequestFactory,
}
impl AccountsProxy {
	/// Create the facade over its own serial queue.
	pub fn new(queue: OperationQueue, hostname: impl Into<String>) -> Self {
		Self { queue, factory: RequestFactory::new(hostname, PREFIX) }
	}

	/// Create a fresh account and return its metadata.
	pub fn create_account(&self, strategy: RetryStrategy) -> OperationHandle<AccountData> {
		let factory = self.factory.clone();
		let handler = Arc::new(OperationRequest::new(move |_, _| Ok(factory.post("/accounts"))));

		self.queue.submit(
			"create-account",
			strategy,
			handler,
			handlers::json::<AccountData>(),
		)
	}

	/// Fetch metadata for `account_number`.
	pub fn get_account_data(
		&self,
		account_number: String,
		strategy: RetryStrategy,
	) -> OperationHandle<AccountData> {
		let factory = self.factory.clone();
		let provider = Arc::new(AccountCredentialProvider::new(account_number));
		let handler = Arc::new(OperationRequest::with_provider(
			move |_, authorization| {
				with_authorization(factory.get("/accounts/me"), authorization)
			},
			provider,
		));

		self.queue.submit(
			"get-account-data",
			strategy,
			handler,
			handlers::json_with_recognized::<AccountData>(&[codes::INVALID_ACCOUNT]),
		)
	}
}
