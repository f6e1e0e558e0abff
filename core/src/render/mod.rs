//! Render identities and the requests that carry them.

pub mod key;
pub mod request;

pub use key::{RenderKey, fit_size};
pub use request::Request;
