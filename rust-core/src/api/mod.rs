//! Public entry points: the JSON request layer and its C wrapper.

pub mod ffi;
pub mod request;

pub use request::{dispatch, handle, Dataset, Request, Response};
