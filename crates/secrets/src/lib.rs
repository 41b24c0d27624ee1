//! Secrets crate
//!
//! Resolves a secret id into the [`Credential`](batchline_common::Credential)
//! the warehouse connection is built from. Stores only fetch payloads; the
//! unwrapping of the JSON document is shared by all of them.

pub mod payload;
pub mod store;

pub use payload::SecretPayload;
pub use store::{EnvSecretStore, FileSecretStore, SecretStore, StaticSecretStore};
