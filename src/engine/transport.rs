//! Transport abstraction and the bundled `reqwest`-based implementation.

// std
use std::fmt::{self, Debug, Display, Formatter};
// crates.io
use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode, header};
use url::Url;
// self
use crate::{_prelude::*, addrs::endpoint::ApiEndpoint};

/// Caller identity attached to an outgoing request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authorization {
	/// Legacy raw account credential, rendered as `Token <account-number>`.
	AccountCredential(String),
	/// Session access token, rendered as `Bearer <access-token>`.
	BearerToken(String),
}
impl Authorization {
	/// Render the `Authorization` header value.
	pub fn header_value(&self) -> Result<header::HeaderValue, header::InvalidHeaderValue> {
		match self {
			Self::AccountCredential(account) =>
				header::HeaderValue::from_str(&format!("Token {account}")),
			Self::BearerToken(token) => header::HeaderValue::from_str(&format!("Bearer {token}")),
		}
	}
}

/// A fully-formed request, independent of the endpoint that serves it.
///
/// The path already includes the service prefix; the transport combines it
/// with the dialed endpoint to form the final URL.
#[derive(Clone, Debug)]
pub struct RestRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute path below the API root.
	pub path: String,
	/// Header set, including `Host` and content negotiation.
	pub headers: HeaderMap,
	/// Optional JSON body.
	pub body: Option<Vec<u8>>,
}

/// Response surfaced by the transport: an atomic body plus metadata.
#[derive(Clone, Debug)]
pub struct RestResponse {
	/// Status returned by the server.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Complete response body.
	pub body: Vec<u8>,
}
impl RestResponse {
	/// `ETag` header value, when present and readable.
	pub fn etag(&self) -> Option<String> {
		self.headers
			.get(header::ETAG)
			.and_then(|value| value.to_str().ok())
			.map(|value| value.to_string())
	}
}

/// Classified cause of a transport failure, consumed by retry logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorCode {
	/// The caller cancelled the request mid-flight.
	Cancelled,
	/// Local connectivity is unavailable (offline, roaming disabled, voice
	/// call active). Transient: retry keeps the same endpoint.
	Offline,
	/// The attempt exceeded its network timeout.
	Timeout,
	/// The endpoint could not be reached.
	ConnectionFailed,
	/// Any other transport-layer failure.
	Other,
}
impl Display for TransportErrorCode {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match self {
			Self::Cancelled => write!(f, "cancelled"),
			Self::Offline => write!(f, "offline"),
			Self::Timeout => write!(f, "timeout"),
			Self::ConnectionFailed => write!(f, "connection failed"),
			Self::Other => write!(f, "other"),
		}
	}
}

/// Transport-layer failure carrying its classified cause.
#[derive(Debug, thiserror::Error)]
#[error("Transport failure ({code})")]
pub struct TransportError {
	/// Classified cause.
	pub code: TransportErrorCode,
	/// Underlying transport error, when one exists.
	#[source]
	pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}
impl TransportError {
	/// Construct an error from a bare code.
	pub fn new(code: TransportErrorCode) -> Self {
		Self { code, source: None }
	}

	/// Construct an error wrapping the underlying cause.
	pub fn with_source(
		code: TransportErrorCode,
		source: impl std::error::Error + Send + Sync + 'static,
	) -> Self {
		Self { code, source: Some(Box::new(source)) }
	}

	/// Whether the failure was caused by caller cancellation.
	pub fn is_cancellation(&self) -> bool {
		self.code == TransportErrorCode::Cancelled
	}

	/// Whether the failure is a transient local condition; retrying keeps the
	/// same endpoint instead of rotating past it.
	pub fn is_transient_local(&self) -> bool {
		self.code == TransportErrorCode::Offline
	}
}

/// Pluggable transport: hand a request to the wire, await the atomic outcome.
///
/// Implementations own connection management, TLS, and certificate pinning;
/// the engine only sees status, headers, and a complete body.
#[async_trait]
pub trait ApiTransport: Debug + Send + Sync {
	/// Submit `request` to `endpoint`, resolving with the response metadata or
	/// a classified failure.
	async fn send(
		&self,
		endpoint: ApiEndpoint,
		request: RestRequest,
	) -> Result<RestResponse, TransportError>;
}

/// Default transport backed by a shared `reqwest` client.
///
/// Dials the numeric endpoint directly and relies on the request's `Host`
/// header for virtual-host routing. Deployments that require certificate
/// pinning inject their own [`ApiTransport`] instead.
#[derive(Debug)]
pub struct ReqwestTransport {
	client: reqwest::Client,
	timeout: Duration,
	use_https: bool,
}
impl ReqwestTransport {
	/// Build the transport with the crate's connection defaults.
	pub fn new(timeout: Duration) -> Result<Self, TransportError> {
		let client = reqwest::Client::builder()
			.user_agent(format!("rest-runtime/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(Duration::from_secs(5))
			.build()
			.map_err(|error| TransportError::with_source(TransportErrorCode::Other, error))?;

		Ok(Self { client, timeout, use_https: true })
	}

	/// Dial plain HTTP instead of HTTPS; intended for test fixtures.
	pub fn plain_http(mut self) -> Self {
		self.use_https = false;

		self
	}

	fn endpoint_url(
		&self,
		endpoint: ApiEndpoint,
		path: &str,
	) -> Result<Url, TransportError> {
		let scheme = if self.use_https { "https" } else { "http" };

		Url::parse(&format!("{scheme}://{endpoint}{path}"))
			.map_err(|error| TransportError::with_source(TransportErrorCode::Other, error))
	}
}
#[async_trait]
impl ApiTransport for ReqwestTransport {
	async fn send(
		&self,
		endpoint: ApiEndpoint,
		request: RestRequest,
	) -> Result<RestResponse, TransportError> {
		let url = self.endpoint_url(endpoint, &request.path)?;
		let mut builder =
			self.client.request(request.method.clone(), url).timeout(self.timeout);

		for (name, value) in request.headers.iter() {
			builder = builder.header(name, value);
		}
		if let Some(body) = request.body {
			builder = builder.body(body);
		}

		let response = builder.send().await.map_err(classify_reqwest_error)?;
		let status = response.status();
		let headers = response.headers().clone();
		let body = response.bytes().await.map_err(classify_reqwest_error)?.to_vec();

		tracing::debug!(%endpoint, status = %status, "transport exchange complete");

		Ok(RestResponse { status, headers, body })
	}
}

fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
	let code = if error.is_timeout() {
		TransportErrorCode::Timeout
	} else if error.is_connect() {
		TransportErrorCode::ConnectionFailed
	} else {
		TransportErrorCode::Other
	};

	TransportError::with_source(code, error)
}
