//! Request construction helpers shared by the typed facades.

// crates.io
use http::{HeaderMap, Method, header};
use serde::Serialize;
// self
use crate::{
	_prelude::*,
	engine::transport::{Authorization, RestRequest},
};

/// Builds wire requests for one service surface.
///
/// Every request carries the logical API hostname as `Host` (transports dial
/// numeric endpoints, so virtual-host routing rides on this header) and JSON
/// content negotiation.
#[derive(Clone, Debug)]
pub struct RequestFactory {
	hostname: String,
	path_prefix: &'static str,
}
impl RequestFactory {
	/// Create a factory for the service rooted at `path_prefix`.
	pub fn new(hostname: impl Into<String>, path_prefix: &'static str) -> Self {
		Self { hostname: hostname.into(), path_prefix }
	}

	/// GET without body.
	pub fn get(&self, path: &str) -> RestRequest {
		self.request(Method::GET, path)
	}

	/// Conditional GET. Strong validators are weakened (`W/` prefix) before
	/// transmission so the origin applies weak comparison.
	pub fn get_with_etag(&self, path: &str, etag: Option<&str>) -> Result<RestRequest> {
		let mut request = self.get(path);

		if let Some(etag) = etag {
			let weakened =
				if etag.starts_with("W/") { etag.to_string() } else { format!("W/{etag}") };
			let value = header::HeaderValue::from_str(&weakened)
				.map_err(|error| RestError::EncodePayload(Box::new(error)))?;

			request.headers.insert(header::IF_NONE_MATCH, value);
		}

		Ok(request)
	}

	/// POST without body.
	pub fn post(&self, path: &str) -> RestRequest {
		self.request(Method::POST, path)
	}

	/// POST with a JSON body.
	pub fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<RestRequest> {
		let encoded =
			serde_json::to_vec(body).map_err(|error| RestError::EncodePayload(Box::new(error)))?;
		let mut request = self.request(Method::POST, path);

		request.headers.insert(
			header::CONTENT_TYPE,
			header::HeaderValue::from_static("application/json"),
		);
		request.body = Some(encoded);

		Ok(request)
	}

	/// DELETE without body.
	pub fn delete(&self, path: &str) -> RestRequest {
		self.request(Method::DELETE, path)
	}

	fn request(&self, method: Method, path: &str) -> RestRequest {
		let mut headers = HeaderMap::new();

		match header::HeaderValue::from_str(&self.hostname) {
			Ok(value) => {
				headers.insert(header::HOST, value);
			},
			Err(_) => {
				tracing::warn!(
					hostname = %self.hostname,
					"hostname is not a valid header value; omitting Host"
				);
			},
		}

		headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

		RestRequest {
			method,
			path: format!("{}{path}", self.path_prefix),
			headers,
			body: None,
		}
	}
}

/// Attach the resolved authorization to a built request.
pub fn with_authorization(
	mut request: RestRequest,
	authorization: Option<&Authorization>,
) -> Result<RestRequest> {
	if let Some(authorization) = authorization {
		let value = authorization
			.header_value()
			.map_err(|error| RestError::EncodePayload(Box::new(error)))?;

		request.headers.insert(header::AUTHORIZATION, value);
	}

	Ok(request)
}
