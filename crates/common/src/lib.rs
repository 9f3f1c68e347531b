//! Common types shared by the OIDC client library and gateway service

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
