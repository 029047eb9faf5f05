//! Deterministic random number generation
//!
//! Uses the xorshift64* algorithm. The only randomness in the simulator is
//! message delivery jitter, and it MUST come from this module so that a
//! fixed seed replays the exact same interleaving.

mod xorshift;

pub use xorshift::RngManager;
