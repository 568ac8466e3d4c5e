mod db;
mod error;
mod reference;
mod sync;
mod tokens;
pub mod vault;

pub use db::Database;
pub use error::StoreError;
pub use reference::{GroupInfo, ReferenceStore, TypeInfo};
pub use sync::{AssetRecord, IndustryJobRecord, SyncStore};
pub use tokens::{CharacterBinding, StoredToken, TokenRecord, TokenStore, TokenSummary};
pub use vault::{CredentialVault, KeySource, VaultError, VaultKey};
