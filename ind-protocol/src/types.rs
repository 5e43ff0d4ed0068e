//! Data model and wire messages shared by every crate in the workspace.

pub mod messages;
pub mod record;
pub mod trade;
pub mod transaction;

pub use record::{EncryptedRecord, FieldGroup, KeyedFields};
pub use trade::{message_hash, Guid, OneTimeAddress, Party, PartyType, PlainRecord, TradeRecord};
pub use transaction::{RoutingInfo, TransactionEnvelope};
