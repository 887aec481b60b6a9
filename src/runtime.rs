//! Top-level wiring: configuration and long-lived collaborator ownership.

// std
use std::path::PathBuf;
// self
use crate::{
	_prelude::*,
	addrs::{cache::AddressCache, endpoint::ApiEndpoint, tracker::AddressCacheTracker},
	engine::{
		queue::OperationQueue,
		transport::{ApiTransport, ReqwestTransport, TransportError},
	},
	proxy::{accounts::AccountsProxy, api::ApiProxy, devices::DevicesProxy},
	token::AccessTokenManager,
};

/// Runtime configuration.
///
/// The crate has no CLI or environment surface; hosts construct this
/// explicitly and hand it to [`RestRuntime`].
#[derive(Clone, Debug)]
pub struct ApiConfig {
	/// Logical API hostname, set as `Host` on every request.
	pub hostname: String,
	/// Per-attempt network timeout applied by the default transport.
	pub network_timeout: Duration,
	/// Built-in fallback endpoint adopted when both disk and bundle fail.
	pub default_endpoint: ApiEndpoint,
	/// Directory holding the persisted address cache snapshot.
	pub cache_dir: PathBuf,
	/// Optional bundled seed with the shipped endpoint list.
	pub bundle_path: Option<PathBuf>,
}
impl ApiConfig {
	/// Default per-attempt network timeout.
	pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(10);
	/// File name of the persisted snapshot inside `cache_dir`.
	pub const CACHE_FILE_NAME: &'static str = "api-address-cache.json";

	/// Create a configuration with the default network timeout.
	pub fn new(
		hostname: impl Into<String>,
		default_endpoint: ApiEndpoint,
		cache_dir: impl Into<PathBuf>,
	) -> Self {
		Self {
			hostname: hostname.into(),
			network_timeout: Self::DEFAULT_NETWORK_TIMEOUT,
			default_endpoint,
			cache_dir: cache_dir.into(),
			bundle_path: None,
		}
	}

	/// Point the bootstrap at a bundled endpoint seed.
	pub fn with_bundle(mut self, path: impl Into<PathBuf>) -> Self {
		self.bundle_path = Some(path.into());

		self
	}

	/// Override the per-attempt network timeout.
	pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
		self.network_timeout = timeout;

		self
	}

	/// Full path of the persisted snapshot file.
	pub fn cache_file_path(&self) -> PathBuf {
		self.cache_dir.join(Self::CACHE_FILE_NAME)
	}
}

/// Owns the long-lived collaborators and mints per-service facades.
///
/// There are no process-wide singletons: the transport, address cache, and
/// token manager are constructed here and injected into every facade, so
/// tests can substitute any of them.
#[derive(Clone, Debug)]
pub struct RestRuntime {
	config: ApiConfig,
	transport: Arc<dyn ApiTransport>,
	address_cache: Arc<AddressCache>,
	access_tokens: Arc<AccessTokenManager>,
}
impl RestRuntime {
	/// Construct the runtime with the bundled `reqwest` transport.
	pub fn new(config: ApiConfig) -> Result<Self, TransportError> {
		let transport = Arc::new(ReqwestTransport::new(config.network_timeout)?);

		Ok(Self::with_transport(config, transport))
	}

	/// Construct the runtime over an injected transport (tests, pinning
	/// transports).
	pub fn with_transport(config: ApiConfig, transport: Arc<dyn ApiTransport>) -> Self {
		let address_cache = Arc::new(AddressCache::open(
			config.cache_file_path(),
			config.bundle_path.as_deref(),
			config.default_endpoint,
		));
		let access_tokens = Arc::new(AccessTokenManager::new(
			OperationQueue::new(transport.clone(), address_cache.clone()),
			config.hostname.clone(),
		));

		Self { config, transport, address_cache, access_tokens }
	}

	/// Shared address cache.
	pub fn address_cache(&self) -> &Arc<AddressCache> {
		&self.address_cache
	}

	/// Shared access-token manager.
	pub fn access_tokens(&self) -> &Arc<AccessTokenManager> {
		&self.access_tokens
	}

	/// Facade for the core application endpoints.
	pub fn api_proxy(&self) -> ApiProxy {
		ApiProxy::new(self.queue(), self.config.hostname.clone())
	}

	/// Facade for the account endpoints.
	pub fn accounts_proxy(&self) -> AccountsProxy {
		AccountsProxy::new(self.queue(), self.config.hostname.clone())
	}

	/// Facade for the device endpoints.
	pub fn devices_proxy(&self) -> DevicesProxy {
		DevicesProxy::new(self.queue(), self.config.hostname.clone(), self.access_tokens.clone())
	}

	/// Background driver keeping the address cache fresh.
	pub fn address_tracker(&self) -> AddressCacheTracker {
		AddressCacheTracker::new(self.address_cache.clone(), self.api_proxy())
	}

	fn queue(&self) -> OperationQueue {
		OperationQueue::new(self.transport.clone(), self.address_cache.clone())
	}
}
