//! Constants that are shared between other crates in this workspace.
//! Crate-specific constants should go in their respective crates.

/// The `error` value of every successful response. Compared byte for byte.
pub const OK: &str = "OK";

/// Contract registered by [`ContractsConfig::default`](crate::config::ContractsConfig).
pub const DEFAULT_CONTRACT: &str = "Trade";

pub mod endpoints {
    pub const ONE_TIME_ADDRESS: &str = "oneTimeAddress";
    pub const GRANT_ACCESS: &str = "grantAccess";
    pub const ENCRYPT_DATA: &str = "encryptData";
    pub const DECRYPT_DATA: &str = "decryptData";
    pub const POST_TRANSACTION: &str = "postTransaction";
    pub const CREATE_TRANSACTION: &str = "createTransaction";
    pub const REGISTER: &str = "register";
    pub const UNREGISTER: &str = "unregister";
}
