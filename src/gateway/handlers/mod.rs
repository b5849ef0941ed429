//! HTTP handlers
//!
//! Handlers resolve the caller, delegate to the desk and wrap the result.
//! No lifecycle logic lives here.

mod custodian;
mod health;
mod trade;
mod trade_request;
mod vendor_job;

pub use custodian::*;
pub use health::*;
pub use trade::*;
pub use trade_request::*;
pub use vendor_job::*;

use std::str::FromStr;

use super::types::ApiError;

/// Parse a ULID path segment
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse::<T>()
        .map_err(|_| ApiError::bad_request(format!("Invalid {} id: {}", what, raw)))
}
