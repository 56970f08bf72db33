//! Transaction consensus.
//!
//! A transaction is validated by a committee sampled from the validator
//! pool. The committee's leader executes it and proposes a receipt; every
//! member then commits to a vote and reveals it. A majority decides the
//! round. Decided rounds can be appealed to a larger committee, and a
//! successful appeal sends the transaction (and everything queued behind
//! it for the same recipient) back for another run.
//!
//! ## Module overview
//!
//! - [`coordinator`]: Entry point: every operation, staged and committed atomically.
//! - [`rounds`]: Committee draws, leader rotation, commit-reveal voting.
//! - [`appeals`]: Appeal committees and outcome reconciliation.
//! - [`majority`]: Vote classification.
//! - [`roles`]: Capability checks per operation.
//! - [`transaction`]: Transaction, round and appeal records.
//! - [`events`]: Signals emitted after each committed operation.
//! - [`config`]: TOML engine configuration.
//! - [`error`]: Consensus error types.

pub mod appeals;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod majority;
pub mod roles;
pub mod rounds;
pub mod transaction;

pub use appeals::{appeal_size, is_equivalent, next_appeal, open_appeal, reconcile};
pub use config::EngineConfig;
pub use coordinator::{Coordinator, Submission};
pub use error::ConsensusError;
pub use events::EngineEvent;
pub use majority::classify_votes;
pub use roles::{authorize, Operation, Role};
pub use rounds::{commit, reveal, rotate_leader, start_continuity_round, start_round, validators_for_round};
pub use transaction::{Appeal, NextRound, RoundRecord, Transaction};
