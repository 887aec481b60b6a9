//! API endpoint value type and its wire representation.

// std
use std::{
	fmt::{self, Display, Formatter},
	net::{AddrParseError, IpAddr, SocketAddr},
	str::FromStr,
};
// crates.io
use serde::{Deserialize, Serialize};

/// A single API frontend address: an IP literal plus TCP port.
///
/// Endpoints compare by value; a cache snapshot never contains duplicates.
/// The wire form is `{"ip": "<v4 or v6 literal>", "port": <u16>}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiEndpoint {
	/// IPv4 or IPv6 address of the frontend.
	pub ip: IpAddr,
	/// TCP port the frontend listens on.
	pub port: u16,
}
impl ApiEndpoint {
	/// Construct an endpoint from address parts.
	pub const fn new(ip: IpAddr, port: u16) -> Self {
		Self { ip, port }
	}

	/// View the endpoint as a socket address for transport dialing.
	pub fn socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.ip, self.port)
	}
}
impl Display for ApiEndpoint {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		self.socket_addr().fmt(f)
	}
}
impl From<SocketAddr> for ApiEndpoint {
	fn from(addr: SocketAddr) -> Self {
		Self { ip: addr.ip(), port: addr.port() }
	}
}
impl FromStr for ApiEndpoint {
	type Err = AddrParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.parse::<SocketAddr>().map(Self::from)
	}
}
