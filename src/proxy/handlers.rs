//! Response-handler combinators shared by the typed facades.

// crates.io
use http::StatusCode;
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	engine::transport::RestResponse,
	error::ServerErrorResponse,
};

/// Machine-readable server error codes recognized by the typed proxies.
pub mod codes {
	/// Account number unknown or no longer active.
	pub const INVALID_ACCOUNT: &str = "INVALID_ACCOUNT";
	/// The referenced device does not exist for this account.
	pub const DEVICE_NOT_FOUND: &str = "DEVICE_NOT_FOUND";
	/// The account reached its device quota.
	pub const MAX_DEVICES_REACHED: &str = "MAX_DEVICES_REACHED";
	/// The submitted public key is already registered.
	pub const PUBKEY_IN_USE: &str = "PUBKEY_IN_USE";
}

/// Success branch of a conditional GET.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheableResponse<T> {
	/// 304: the caller's cached representation is still current.
	NotModified,
	/// Fresh content, with the validator for the next conditional request.
	NewContent {
		/// `ETag` returned alongside the new representation.
		etag: Option<String>,
		/// Decoded payload.
		value: T,
	},
}

/// Handler mapping 2xx to a decoded `T` and non-2xx through the error branch.
pub fn json<T>() -> impl Fn(&RestResponse) -> Result<T> + Send + Sync
where
	T: DeserializeOwned,
{
	json_with_recognized(&[])
}

/// Same as [`json`], mapping the given error codes to typed server errors.
pub fn json_with_recognized<T>(
	recognized: &'static [&'static str],
) -> impl Fn(&RestResponse) -> Result<T> + Send + Sync
where
	T: DeserializeOwned,
{
	move |response| {
		if response.status.is_success() {
			serde_json::from_slice(&response.body).map_err(RestError::DecodeSuccessResponse)
		} else {
			Err(map_error_status(response, recognized))
		}
	}
}

/// Handler for bodyless successes (e.g. DELETE returning 204).
pub fn empty(
	recognized: &'static [&'static str],
) -> impl Fn(&RestResponse) -> Result<()> + Send + Sync {
	move |response| {
		if response.status.is_success() {
			Ok(())
		} else {
			Err(map_error_status(response, recognized))
		}
	}
}

/// Handler for conditional GETs: 304 yields
/// [`CacheableResponse::NotModified`], 2xx decodes fresh content.
pub fn cacheable_json<T>(
	recognized: &'static [&'static str],
) -> impl Fn(&RestResponse) -> Result<CacheableResponse<T>> + Send + Sync
where
	T: DeserializeOwned,
{
	move |response| {
		if response.status == StatusCode::NOT_MODIFIED {
			return Ok(CacheableResponse::NotModified);
		}
		if response.status.is_success() {
			let value = serde_json::from_slice(&response.body)
				.map_err(RestError::DecodeSuccessResponse)?;

			return Ok(CacheableResponse::NewContent { etag: response.etag(), value });
		}

		Err(map_error_status(response, recognized))
	}
}

/// Map a non-2xx response into the error taxonomy.
///
/// 400 and 404 are declared statuses: their bodies must decode, and
/// recognized codes become typed server errors. Any other status becomes
/// `UnhandledResponse` with a best-effort body decode (failures logged and
/// dropped).
pub(crate) fn map_error_status(
	response: &RestResponse,
	recognized: &[&str],
) -> RestError {
	let status = response.status;

	if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
		match serde_json::from_slice::<ServerErrorResponse>(&response.body) {
			Ok(error) if recognized.contains(&error.code.as_str()) => RestError::Server(error),
			Ok(error) => RestError::UnhandledResponse { status, error: Some(error) },
			Err(error) => RestError::DecodeErrorResponse(error),
		}
	} else {
		let error = serde_json::from_slice::<ServerErrorResponse>(&response.body)
			.map_err(|error| {
				tracing::debug!(
					status = %status,
					error = %error,
					"failure to decode the server error body"
				);
			})
			.ok();

		RestError::UnhandledResponse { status, error }
	}
}
