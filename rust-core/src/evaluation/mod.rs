//! Model evaluation against labelled housing records.

pub mod domain;
pub mod service;

pub use domain::EvalSuite;
pub use service::evaluate;
