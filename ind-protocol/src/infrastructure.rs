//! Infrastructure shared by the protocol crate and its clients.

pub mod encoding;
pub mod logging;
pub mod pem_utils;
