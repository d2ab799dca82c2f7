//! End-to-end tests of the attestation authority
//!
//! This test suite validates:
//! - both provisioning phases over SQLite-backed stores
//! - challenge state shared between authority instances
//! - single-use nonces under replay and concurrent redemption
//! - supply chain verdicts surfaced through the protocol

pub mod test_utils;

#[cfg(test)]
mod provisioning_flow_tests;

#[cfg(test)]
mod replay_attack_tests;

#[cfg(test)]
mod chain_of_trust_tests;
