//! Resilient async REST client runtime with endpoint failover, cancellable
//! retrying operations, and per-account access-token caching — built for API
//! fleets behind rotating addresses.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod addrs;
pub mod engine;
pub mod proxy;
pub mod token;

mod error;
mod runtime;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};

	pub use crate::error::{AddressCacheError, RestError, Result};
}
pub use crate::{
	error::{AddressCacheError, RestError, Result, ServerErrorResponse, display_chain},
	runtime::{ApiConfig, RestRuntime},
};
