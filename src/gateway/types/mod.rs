//! Gateway request and response types

mod request;
mod response;

pub use request::*;
pub use response::*;
