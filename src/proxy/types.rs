//! Wire payload types for the typed service facades.

// std
use std::net::Ipv4Addr;
// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Relay catalogue served by `/relays`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayList {
	/// Available relays.
	pub relays: Vec<Relay>,
}

/// One relay entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relay {
	/// Relay hostname, unique within the catalogue.
	pub hostname: String,
	/// Public IPv4 address clients connect to.
	pub ipv4_addr_in: Ipv4Addr,
	/// Relay public key, base64 encoded.
	pub public_key: String,
	/// Location code, e.g. `se-got`.
	pub location: String,
}

/// Account metadata returned by the accounts service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
	/// Server-side account identifier.
	pub id: String,
	/// Paid-until instant for the account.
	pub expiry: DateTime<Utc>,
}

/// A registered device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
	/// Server-side device identifier.
	pub id: String,
	/// Assigned device name.
	pub name: String,
	/// Device public key, base64 encoded.
	pub pubkey: String,
	/// Registration instant.
	pub created: DateTime<Utc>,
}

/// Request payload for registering a device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDevice {
	/// Device public key, base64 encoded.
	pub pubkey: String,
	/// Whether the server should hijack DNS traffic for this device.
	pub hijack_dns: bool,
}
