//! Durable state: the idempotency ledger and the credential store.

pub mod credentials;
pub mod ledger;

pub use credentials::{Credential, CredentialStore};
pub use ledger::{JobStatus, Ledger, LedgerError, LedgerRecord};
