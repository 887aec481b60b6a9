//! Facade for the `/accounts/v1` device endpoints.

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
		types::{Device, NewDevice},
	},
	token::{AccessTokenManager, AccessTokenProvider},
};

const PREFIX: &str = "/accounts/v1";

/// Typed operations on devices, authorized with bearer tokens resolved by
/// the access-token manager.
#[derive(Clone, Debug)]
pub struct DevicesProxy {
	queue: OperationQueue,
	factory: RequestFactory,
	access_tokens: Arc<AccessTokenManager>,
}
impl DevicesProxy {
	/// Create the facade over its own serial queue.
	pub fn new(
		queue: OperationQueue,
		hostname: impl Into<String>,
		access_tokens: Arc<AccessTokenManager>,
	) -> Self {
		Self { queue, factory: RequestFactory::new(hostname, PREFIX), access_tokens }
	}

	/// List the devices registered to `account_number`.
	pub fn get_devices(
		&self,
		account_number: String,
		strategy: RetryStrategy,
	) -> OperationHandle<Vec<Device>> {
		let factory = self.factory.clone();
		let provider = self.provider(account_number);
		let handler = Arc::new(OperationRequest::with_provider(
			move |_, authorization| with_authorization(factory.get("/devices"), authorization),
			provider,
		));

		self.queue.submit(
			"get-devices",
			strategy,
			handler,
			handlers::json::<Vec<Device>>(),
		)
	}

	/// Register a new device for `account_number`.
	pub fn create_device(
		&self,
		account_number: String,
		device: NewDevice,
		strategy: RetryStrategy,
	) -> OperationHandle<Device> {
		let factory = self.factory.clone();
		let provider = self.provider(account_number);
		let handler = Arc::new(OperationRequest::with_provider(
			move |_, authorization| {
				with_authorization(factory.post_json("/devices", &device)?, authorization)
			},
			provider,
		));

		self.queue.submit(
			"create-device",
			strategy,
			handler,
			handlers::json_with_recognized::<Device>(&[
				codes::MAX_DEVICES_REACHED,
				codes::PUBKEY_IN_USE,
			]),
		)
	}

	/// Remove a registered device.
	pub fn delete_device(
		&self,
		account_number: String,
		device_id: String,
		strategy: RetryStrategy,
	) -> OperationHandle<()> {
		let factory = self.factory.clone();
		let provider = self.provider(account_number);
		let handler = Arc::new(OperationRequest::with_provider(
			move |_, authorization| {
				with_authorization(factory.delete(&format!("/devices/{device_id}")), authorization)
			},
			provider,
		));

		self.queue.submit(
			"delete-device",
			strategy,
			handler,
			handlers::empty(&[codes::DEVICE_NOT_FOUND]),
		)
	}

	fn provider(&self, account_number: String) -> Arc<AccessTokenProvider> {
		Arc::new(AccessTokenProvider::new(self.access_tokens.clone(), account_number))
	}
}
