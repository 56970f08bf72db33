//! Nullable infrastructure for deterministic testing.
//!
//! Every collaborator the engine touches outside its own state (time,
//! storage, randomness proofs, message delivery) sits behind a trait. This
//! crate provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the filesystem, the network, or the wall clock
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod dispatcher;
pub mod store;
pub mod verifier;

pub use clock::NullClock;
pub use dispatcher::NullDispatcher;
pub use store::NullStore;
pub use verifier::NullVerifier;
