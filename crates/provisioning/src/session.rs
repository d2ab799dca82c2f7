//! Per-request provisioning session state machine.
//!
//! ```text
//! AwaitingClaim
//!     ↓ (challenge issued)
//! ChallengeIssued
//!     ↓ (certificate issued)
//! Completed
//! ```
//!
//! Either non-terminal state can move to `Rejected`. Phase 1 starts a
//! session at `AwaitingClaim`; phase 2 resumes one at `ChallengeIssued`
//! from the stored challenge. Transitions are hashed for the audit log.

use crate::error::ProvisioningError;
use attestca_core::current_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of transitions kept per session.
const MAX_HISTORY_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    AwaitingClaim,

    ChallengeIssued {
        /// Lookup key of the outstanding nonce
        nonce_key: i64,
        issued_at: u64,
    },

    Completed {
        /// Serial of the issued identity certificate (hex)
        certificate_serial: String,
        completed_at: u64,
    },

    Rejected {
        reason: String,
        rejected_at: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: String,
    pub to_state: String,
    pub timestamp: u64,
    pub reason: Option<String>,
    /// blake3 over `from->to;timestamp`
    pub transition_hash: Vec<u8>,
}

pub struct ProvisioningSession {
    current_state: SessionState,
    history: VecDeque<StateTransition>,
}

impl ProvisioningSession {
    pub fn new() -> Self {
        Self {
            current_state: SessionState::AwaitingClaim,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    /// Session for a challenge issued by an earlier request.
    pub fn resume(nonce_key: i64, issued_at: u64) -> Self {
        Self {
            current_state: SessionState::ChallengeIssued {
                nonce_key,
                issued_at,
            },
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> &SessionState {
        &self.current_state
    }

    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.current_state,
            SessionState::Completed { .. } | SessionState::Rejected { .. }
        )
    }

    /// Transition: AwaitingClaim → ChallengeIssued
    pub fn on_challenge_issued(&mut self, nonce_key: i64) -> Result<(), ProvisioningError> {
        match &self.current_state {
            SessionState::AwaitingClaim => {
                let new_state = SessionState::ChallengeIssued {
                    nonce_key,
                    issued_at: current_timestamp(),
                };
                self.transition(new_state, Some("Identity claim accepted".to_string()));
                Ok(())
            }
            _ => Err(ProvisioningError::ProtocolState(
                "Can only issue a challenge from AwaitingClaim state".to_string(),
            )),
        }
    }

    /// Transition: ChallengeIssued → Completed
    pub fn on_certificate_issued(
        &mut self,
        certificate_serial: String,
    ) -> Result<(), ProvisioningError> {
        match &self.current_state {
            SessionState::ChallengeIssued { .. } => {
                let new_state = SessionState::Completed {
                    certificate_serial,
                    completed_at: current_timestamp(),
                };
                self.transition(new_state, Some("Identity certificate issued".to_string()));
                Ok(())
            }
            _ => Err(ProvisioningError::ProtocolState(
                "Can only issue a certificate from ChallengeIssued state".to_string(),
            )),
        }
    }

    /// Transition: AwaitingClaim | ChallengeIssued → Rejected
    pub fn reject(&mut self, reason: &str) -> Result<(), ProvisioningError> {
        if self.is_terminal() {
            return Err(ProvisioningError::ProtocolState(format!(
                "Cannot reject a session in terminal state {:?}",
                self.current_state
            )));
        }
        let new_state = SessionState::Rejected {
            reason: reason.to_string(),
            rejected_at: current_timestamp(),
        };
        self.transition(new_state, Some(format!("Request rejected: {}", reason)));
        Ok(())
    }

    fn transition(&mut self, new_state: SessionState, reason: Option<String>) {
        let now = current_timestamp();
        let from_state = format!("{:?}", self.current_state);
        let to_state = format!("{:?}", new_state);
        let transition_data = format!("{}->{};{}", from_state, to_state, now);
        let transition_hash = blake3::hash(transition_data.as_bytes()).as_bytes().to_vec();

        self.current_state = new_state;
        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from_state,
            to_state,
            timestamp: now,
            reason,
            transition_hash,
        });
    }

    /// Hash of the latest transition, hex encoded.
    pub fn last_transition_hash(&self) -> Option<String> {
        self.history.back().map(|t| hex::encode(&t.transition_hash))
    }
}

impl Default for ProvisioningSession {
    fn default() -> Self {
        Self::new()
    }
}
