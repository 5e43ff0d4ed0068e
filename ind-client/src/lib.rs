//! Client side of a confidential trade: the wallet service and relay
//! clients, the one-time address oracle and [`TradeClient`].
#![warn(unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]
#![forbid(rustdoc::broken_intra_doc_links)]

pub mod client;
pub mod config;
pub mod error;
pub mod oracle;
pub mod relay;
pub(crate) mod retry;
pub mod transport;
pub mod wallet;

pub use client::TradeClient;
pub use config::Config;
pub use error::{IndClientError, Result};
