//! Bootstrap and invariant coverage for the address cache.

// std
use std::fs;
// crates.io
use chrono::DateTime;
use proptest::prelude::*;
// self
use crate::support::{endpoint, seeded_cache};
use rest_runtime::addrs::{
	cache::{AddressCache, CacheSource},
	store::{SnapshotStore, StoredSnapshot},
};

#[test]
fn bootstrap_with_missing_disk_file_adopts_the_bundle() {
	let _ = tracing_subscriber::fmt::try_init();

	let dir = tempfile::tempdir().expect("tempdir");
	let bundle_path = dir.path().join("bundled-endpoints.json");

	fs::write(&bundle_path, br#"[{"ip":"1.2.3.4","port":443},{"ip":"5.6.7.8","port":443}]"#)
		.expect("write bundle");

	let cache_path = dir.path().join("cache").join("api-address-cache.json");
	let cache = AddressCache::open(cache_path.clone(), Some(&bundle_path), endpoint(99));
	let expected = vec![
		"1.2.3.4:443".parse().expect("endpoint"),
		"5.6.7.8:443".parse().expect("endpoint"),
	];

	assert_eq!(cache.source(), CacheSource::Bundle);
	assert_eq!(cache.last_update_time(), DateTime::UNIX_EPOCH);
	assert!(expected.contains(&cache.current_endpoint()));

	// The seed is persisted right away so the next launch reads from disk.
	let stored = SnapshotStore::new(cache_path).read().expect("read persisted snapshot");
	let mut stored_endpoints = stored.endpoints.clone();

	stored_endpoints.sort_by_key(|endpoint| endpoint.ip);

	assert_eq!(stored_endpoints, expected);
	assert_eq!(stored.updated_at, DateTime::UNIX_EPOCH);
	assert_eq!(stored.endpoints, cache.endpoints());
}

#[test]
fn bootstrap_prefers_the_disk_snapshot_over_the_bundle() {
	let dir = tempfile::tempdir().expect("tempdir");
	let bundle_path = dir.path().join("bundled-endpoints.json");

	fs::write(&bundle_path, br#"[{"ip":"9.9.9.9","port":443}]"#).expect("write bundle");

	let cache_path = dir.path().join("cache.json");

	SnapshotStore::new(cache_path.clone())
		.write(&StoredSnapshot {
			updated_at: DateTime::UNIX_EPOCH,
			endpoints: vec![endpoint(1), endpoint(2)],
		})
		.expect("seed snapshot");

	let cache = AddressCache::open(cache_path, Some(&bundle_path), endpoint(99));

	assert_eq!(cache.source(), CacheSource::Disk);
	assert_eq!(cache.current_endpoint(), endpoint(1));
}

#[test]
fn bootstrap_falls_back_to_the_default_endpoint() {
	let dir = tempfile::tempdir().expect("tempdir");
	let bundle_path = dir.path().join("bundled-endpoints.json");

	fs::write(&bundle_path, b"not json").expect("write bundle");

	let cache = AddressCache::open(
		dir.path().join("cache.json"),
		Some(&bundle_path),
		endpoint(42),
	);

	assert_eq!(cache.source(), CacheSource::Default);
	assert_eq!(cache.endpoints(), vec![endpoint(42)]);
	assert_eq!(cache.last_update_time(), DateTime::UNIX_EPOCH);
}

#[test]
fn bootstrap_treats_an_empty_disk_list_as_missing() {
	let dir = tempfile::tempdir().expect("tempdir");
	let cache_path = dir.path().join("cache.json");

	fs::write(&cache_path, br#"{"updatedAt":"2024-01-01T00:00:00Z","endpoints":[]}"#)
		.expect("write cache");

	let cache = AddressCache::open(cache_path, None, endpoint(7));

	assert_eq!(cache.source(), CacheSource::Default);
	assert_eq!(cache.current_endpoint(), endpoint(7));
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(32))]

	#[test]
	fn rotation_preserves_the_endpoint_set(
		count in 1usize..8,
		rotations in proptest::collection::vec(0usize..8, 0..24),
	) {
		let dir = tempfile::tempdir().expect("tempdir");
		let endpoints: Vec<_> = (0..count).map(|i| endpoint(i as u8 + 1)).collect();
		let cache = seeded_cache(dir.path(), &endpoints);

		for index in rotations {
			cache.rotate_after_failure(endpoints[index % count]);
		}

		let mut rotated = cache.endpoints();
		let mut initial = endpoints;

		rotated.sort_by_key(|endpoint| endpoint.ip);
		initial.sort_by_key(|endpoint| endpoint.ip);

		prop_assert_eq!(rotated, initial);
	}

	#[test]
	fn rotating_twice_on_the_same_failure_equals_once(
		count in 1usize..8,
		target in 0usize..8,
	) {
		let dir = tempfile::tempdir().expect("tempdir");
		let endpoints: Vec<_> = (0..count).map(|i| endpoint(i as u8 + 1)).collect();
		let cache = seeded_cache(dir.path(), &endpoints);
		let failed = endpoints[target % count];

		let first_head = cache.rotate_after_failure(failed);
		let after_once = cache.endpoints();
		let second_head = cache.rotate_after_failure(failed);

		prop_assert_eq!(first_head, second_head);
		prop_assert_eq!(cache.endpoints(), after_once);
	}

	#[test]
	fn replace_retains_the_current_endpoint_at_the_head(
		count in 2usize..8,
	) {
		let dir = tempfile::tempdir().expect("tempdir");
		let endpoints: Vec<_> = (0..count).map(|i| endpoint(i as u8 + 1)).collect();
		let cache = seeded_cache(dir.path(), &endpoints);
		let current = cache.current_endpoint();

		// A refreshed list that still contains the current endpoint plus
		// fresh entries.
		let mut refreshed = vec![current];

		refreshed.extend((0..count).map(|i| endpoint(i as u8 + 100)));
		cache.replace_endpoints(refreshed).expect("replace");

		prop_assert_eq!(cache.current_endpoint(), current);
	}
}
