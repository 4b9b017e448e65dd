//! Collaborator storage contracts.
//!
//! Persistence is external to this crate: implement these traits for your
//! database layer and hand one (shared) store to the services. All
//! cross-request coordination goes through the store, so the two
//! conditional-write operations ([`AccountStore::consume_backup_code`]
//! and [`RecoveryStore::consume_recovery`]) carry the only non-trivial
//! atomicity requirements — read their docs before implementing.
//!
//! [`InMemoryStore`] implements every trait and is the reference for the
//! required semantics.

mod account;
mod audit;
mod ledger;
mod memory;
mod recovery;

pub use account::{AccountStore, Contact, TwoFactorState};
pub use audit::AuditStore;
pub use ledger::{AttemptStore, LockStore};
pub use memory::InMemoryStore;
pub use recovery::RecoveryStore;
