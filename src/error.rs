//! Crate-wide error taxonomy and `Result` alias.

// std
use std::fmt::{self, Display, Formatter};
// crates.io
use http::StatusCode;
use serde::{Deserialize, Serialize};
// self
use crate::engine::transport::TransportError;

/// Library-wide result type.
pub type Result<T, E = RestError> = std::result::Result<T, E>;

/// Caller-facing error for REST operations.
///
/// Only [`RestError::Network`] is ever produced by retry exhaustion; every
/// other variant surfaces on first occurrence.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
	/// Transport-layer failure after retry exhaustion. Carries the classified
	/// cause so callers can distinguish cancellation from connectivity loss.
	#[error("Transport failure")]
	Network(#[source] TransportError),
	/// Request construction failed while encoding the body or a header value.
	/// Fatal; never retried.
	#[error("Failure to encode the outgoing request")]
	EncodePayload(#[source] Box<dyn std::error::Error + Send + Sync>),
	/// A 2xx response body could not be decoded. Fatal.
	#[error("Failure to decode the success response")]
	DecodeSuccessResponse(#[source] serde_json::Error),
	/// A declared non-2xx response body could not be decoded. Fatal.
	#[error("Failure to decode the error response")]
	DecodeErrorResponse(#[source] serde_json::Error),
	/// Non-2xx response carrying a well-formed, recognized error body.
	#[error("Server error: {0}")]
	Server(ServerErrorResponse),
	/// Response status did not match any branch declared by the operation.
	#[error("Unhandled response status {status}")]
	UnhandledResponse {
		/// Status returned by the server.
		status: StatusCode,
		/// Best-effort decode of the error body, when one parsed.
		error: Option<ServerErrorResponse>,
	},
}
impl RestError {
	/// Whether the error is a transport failure caused by caller cancellation.
	pub fn is_network_cancellation(&self) -> bool {
		matches!(self, Self::Network(transport) if transport.is_cancellation())
	}
}

/// Failure modes of the address cache and its persistence layer.
///
/// All of these are recoverable at bootstrap (the cache degrades through
/// disk, bundle, and default sources) and surface only on explicit API.
#[derive(Debug, thiserror::Error)]
pub enum AddressCacheError {
	/// The on-disk snapshot could not be read.
	#[error("Failure to read the address cache file")]
	ReadCache(#[source] std::io::Error),
	/// The on-disk snapshot could not be decoded.
	#[error("Failure to decode the address cache file")]
	DecodeCache(#[source] serde_json::Error),
	/// The bundled seed file could not be read.
	#[error("Failure to read the bundled address seed")]
	ReadBundle(#[source] std::io::Error),
	/// The bundled seed file could not be decoded.
	#[error("Failure to decode the bundled address seed")]
	DecodeBundle(#[source] serde_json::Error),
	/// The in-memory snapshot could not be encoded for persistence.
	#[error("Failure to encode the address cache snapshot")]
	EncodeCache(#[source] serde_json::Error),
	/// The snapshot file could not be written.
	#[error("Failure to write the address cache file")]
	WriteCache(#[source] std::io::Error),
	/// An empty endpoint list was offered to the cache.
	#[error("Address list must not be empty")]
	EmptyAddressList,
}

/// Error body returned by the API on non-2xx statuses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorResponse {
	/// Machine-readable error code, e.g. `MAX_DEVICES_REACHED`.
	pub code: String,
	/// Human-readable detail, when the server provides one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
}
impl ServerErrorResponse {
	/// Whether the response carries the given machine-readable code.
	pub fn is(&self, code: &str) -> bool {
		self.code == code
	}
}
impl Display for ServerErrorResponse {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match &self.detail {
			Some(detail) => write!(f, "{} ({detail})", self.code),
			None => write!(f, "{}", self.code),
		}
	}
}

/// Render an error with its `source()` chain joined by `: `.
///
/// Used at logging sites so the full cause chain survives into the log line.
pub fn display_chain(error: &dyn std::error::Error) -> String {
	let mut rendered = error.to_string();
	let mut source = error.source();

	while let Some(cause) = source {
		rendered.push_str(": ");
		rendered.push_str(&cause.to_string());
		source = cause.source();
	}

	rendered
}
