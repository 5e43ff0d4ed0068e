//! Cryptography, wire types and protocol logic shared by every party of a
//! confidential trade.
//!
//! A trade record is split into field groups, each encrypted under its own
//! [`GroupKey`](crypto::GroupKey). Group keys are shared one group at a time
//! by wrapping them for another party's one-time public key, so an untrusted
//! relay only ever sees ciphertexts and single-use addresses.
#![warn(unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]
#![forbid(rustdoc::broken_intra_doc_links)]

pub mod assembler;
pub mod codec;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod endpoints;
pub mod error;
pub mod grant;
pub mod infrastructure;
pub mod key_store;
pub mod types;

pub use error::IndError;
