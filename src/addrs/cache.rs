//! Persistent, priority-ordered pool of candidate API endpoints.

// std
use std::{
	collections::HashSet,
	fmt::{self, Display, Formatter},
	path::{Path, PathBuf},
	sync::{Mutex, MutexGuard, PoisonError},
};
// crates.io
use rand::{SeedableRng, rngs::SmallRng, seq::SliceRandom};
// self
use crate::{
	_prelude::*,
	addrs::{
		endpoint::ApiEndpoint,
		store::{SnapshotStore, StoredSnapshot, read_bundle},
	},
	error::display_chain,
};

/// Provenance of the active snapshot; informs logging and re-persist decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheSource {
	/// Snapshot decoded from the on-disk cache file.
	Disk,
	/// Snapshot seeded from the bundled endpoint list.
	Bundle,
	/// Built-in single-endpoint fallback.
	Default,
}
impl Display for CacheSource {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match self {
			Self::Disk => write!(f, "disk"),
			Self::Bundle => write!(f, "bundle"),
			Self::Default => write!(f, "default"),
		}
	}
}

/// Priority-ordered endpoint pool with failover rotation and atomic
/// persistence.
///
/// The pool is never empty while observable: bootstrap degrades through
/// disk, bundle, and the built-in default and cannot fail. All state sits
/// behind a single mutex; reads copy the head out, writes hold the lock
/// across persistence so concurrent readers never observe a torn snapshot.
#[derive(Debug)]
pub struct AddressCache {
	store: SnapshotStore,
	inner: Mutex<CacheInner>,
}
impl AddressCache {
	/// Open the cache, degrading disk → bundle → default.
	pub fn open(
		cache_path: impl Into<PathBuf>,
		bundle_path: Option<&Path>,
		default_endpoint: ApiEndpoint,
	) -> Self {
		Self::open_with_rng(
			cache_path,
			bundle_path,
			default_endpoint,
			SmallRng::from_rng(&mut rand::rng()),
		)
	}

	/// Same as [`AddressCache::open`] with a caller-supplied RNG, so shuffle
	/// order is reproducible in tests.
	pub fn open_with_rng(
		cache_path: impl Into<PathBuf>,
		bundle_path: Option<&Path>,
		default_endpoint: ApiEndpoint,
		mut rng: SmallRng,
	) -> Self {
		let store = SnapshotStore::new(cache_path);

		match store.read() {
			Ok(snapshot) => {
				let endpoints = dedup(snapshot.endpoints);

				if !endpoints.is_empty() {
					tracing::debug!(
						endpoints = endpoints.len(),
						source = %CacheSource::Disk,
						"adopted address cache snapshot"
					);

					return Self {
						store,
						inner: Mutex::new(CacheInner {
							endpoints,
							updated_at: snapshot.updated_at,
							source: CacheSource::Disk,
							rng,
						}),
					};
				}

				tracing::warn!("address cache file contains no endpoints");
			},
			Err(error) => {
				tracing::warn!(
					error = %display_chain(&error),
					"failure to load the address cache file"
				);
			},
		}

		if let Some(bundle_path) = bundle_path {
			match read_bundle(bundle_path) {
				Ok(endpoints) => {
					let mut endpoints = dedup(endpoints);

					if !endpoints.is_empty() {
						endpoints.shuffle(&mut rng);

						tracing::debug!(
							endpoints = endpoints.len(),
							source = %CacheSource::Bundle,
							"adopted address cache snapshot"
						);

						let cache = Self {
							store,
							inner: Mutex::new(CacheInner {
								endpoints,
								updated_at: DateTime::UNIX_EPOCH,
								source: CacheSource::Bundle,
								rng,
							}),
						};

						// Best effort: losing this write only costs a re-seed
						// on the next launch.
						if let Err(error) = cache.store.write(&cache.lock().stored()) {
							tracing::warn!(
								error = %display_chain(&error),
								"failure to persist the bundled address seed"
							);
						}

						return cache;
					}

					tracing::warn!("bundled address seed contains no endpoints");
				},
				Err(error) => {
					tracing::warn!(
						error = %display_chain(&error),
						"failure to load the bundled address seed"
					);
				},
			}
		}

		tracing::warn!(
			endpoint = %default_endpoint,
			source = %CacheSource::Default,
			"falling back to the built-in API endpoint"
		);

		Self {
			store,
			inner: Mutex::new(CacheInner {
				endpoints: vec![default_endpoint],
				updated_at: DateTime::UNIX_EPOCH,
				source: CacheSource::Default,
				rng,
			}),
		}
	}

	/// Head of the pool; the endpoint new requests dial.
	pub fn current_endpoint(&self) -> ApiEndpoint {
		self.lock().endpoints[0]
	}

	/// Copy of the full pool in priority order.
	pub fn endpoints(&self) -> Vec<ApiEndpoint> {
		self.lock().endpoints.clone()
	}

	/// Wall-clock time of the last successful refresh; epoch-0 if never.
	pub fn last_update_time(&self) -> DateTime<Utc> {
		self.lock().updated_at
	}

	/// Provenance of the snapshot adopted at bootstrap.
	pub fn source(&self) -> CacheSource {
		self.lock().source
	}

	/// Rotate past `failed` when it is still the head and return the new head.
	///
	/// When `failed` no longer heads the pool (a concurrent caller already
	/// rotated), the state is left untouched, which makes rotation idempotent
	/// under concurrent retries. A persistence failure is logged and the
	/// in-memory rotation kept; the next successful mutation rewrites the file.
	pub fn rotate_after_failure(&self, failed: ApiEndpoint) -> ApiEndpoint {
		let mut inner = self.lock();

		if inner.endpoints[0] != failed {
			return inner.endpoints[0];
		}

		inner.endpoints.rotate_left(1);

		let next = inner.endpoints[0];

		tracing::info!(failed = %failed, next = %next, "rotated to the next API endpoint");

		if let Err(error) = self.store.write(&inner.stored()) {
			tracing::warn!(
				error = %display_chain(&error),
				"failure to persist the address cache after rotation"
			);
		}

		next
	}

	/// Install a freshly fetched endpoint list.
	///
	/// Rejects empty input. When the endpoint set is unchanged only
	/// `updated_at` is bumped; otherwise the new list is shuffled uniformly
	/// and the previously current endpoint pinned back to the head when it
	/// survived the refresh. `updated_at` moves only after the snapshot is
	/// durably persisted.
	pub fn replace_endpoints(
		&self,
		new_endpoints: Vec<ApiEndpoint>,
	) -> Result<(), AddressCacheError> {
		let new_endpoints = dedup(new_endpoints);

		if new_endpoints.is_empty() {
			return Err(AddressCacheError::EmptyAddressList);
		}

		let mut inner = self.lock();
		let now = Utc::now();

		if same_set(&inner.endpoints, &new_endpoints) {
			let snapshot =
				StoredSnapshot { updated_at: now, endpoints: inner.endpoints.clone() };

			self.store.write(&snapshot)?;
			inner.updated_at = now;

			tracing::debug!("address list unchanged; bumped the update time");

			return Ok(());
		}

		let current = inner.endpoints[0];
		let mut endpoints = new_endpoints;

		endpoints.shuffle(&mut inner.rng);

		if let Some(index) = endpoints.iter().position(|endpoint| *endpoint == current) {
			endpoints.swap(0, index);
		}

		let snapshot = StoredSnapshot { updated_at: now, endpoints };

		self.store.write(&snapshot)?;

		tracing::info!(endpoints = snapshot.endpoints.len(), "installed a refreshed address list");

		inner.endpoints = snapshot.endpoints;
		inner.updated_at = now;

		Ok(())
	}

	fn lock(&self) -> MutexGuard<'_, CacheInner> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

#[derive(Debug)]
struct CacheInner {
	// Invariant: non-empty whenever the cache is observable.
	endpoints: Vec<ApiEndpoint>,
	updated_at: DateTime<Utc>,
	source: CacheSource,
	rng: SmallRng,
}
impl CacheInner {
	fn stored(&self) -> StoredSnapshot {
		StoredSnapshot { updated_at: self.updated_at, endpoints: self.endpoints.clone() }
	}
}

fn dedup(endpoints: Vec<ApiEndpoint>) -> Vec<ApiEndpoint> {
	let mut seen = HashSet::with_capacity(endpoints.len());

	endpoints.into_iter().filter(|endpoint| seen.insert(*endpoint)).collect()
}

fn same_set(a: &[ApiEndpoint], b: &[ApiEndpoint]) -> bool {
	a.len() == b.len() && a.iter().collect::<HashSet<_>>() == b.iter().collect::<HashSet<_>>()
}
