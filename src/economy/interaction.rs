//! Short-lived per-account input flows (amount entry, confirmation).
//!
//! Each flow is a small state machine advanced by one line of player input at
//! a time. Nothing here blocks: a flow that is not answered before its deadline
//! is dropped by `expire_due`, which the sweep scheduler calls every second.
//! A finished flow yields exactly one `CoreCall` for the caller to execute.

use crate::economy::currency::parse_positive_amount;
use crate::economy::types::{Money, TransferDirection};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The operation a flow is collecting input for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Deposit { currency: String },
    Withdraw { currency: String },
    RequestLoan,
    RepayLoan { loan_id: String, amount_due: Money },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionState {
    AwaitingAmount {
        action: PendingAction,
        deadline: DateTime<Utc>,
    },
    AwaitingConfirmation {
        action: PendingAction,
        amount: Money,
        deadline: DateTime<Utc>,
    },
}

impl InteractionState {
    fn deadline(&self) -> DateTime<Utc> {
        match self {
            InteractionState::AwaitingAmount { deadline, .. }
            | InteractionState::AwaitingConfirmation { deadline, .. } => *deadline,
        }
    }
}

/// Single discrete call into the economy produced by a completed flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCall {
    Transfer {
        currency: String,
        amount: Money,
        direction: TransferDirection,
    },
    RequestLoan {
        principal: Money,
    },
    RepayLoan {
        loan_id: String,
    },
}

/// What the presentation layer should do after feeding input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionStep {
    /// Show this text and wait for the next line.
    Prompt(String),
    /// Flow finished; execute the call.
    Submit(CoreCall),
    Cancelled,
    Expired,
    /// Input rejected; the flow stays at the same step.
    Invalid(String),
    /// The account has no flow in progress.
    NoInteraction,
}

pub const CANCEL_WORD: &str = "cancel";
pub const CONFIRM_WORD: &str = "confirm";

pub struct InteractionTracker {
    sessions: Mutex<HashMap<String, InteractionState>>,
    timeout: Duration,
}

impl InteractionTracker {
    pub fn new(timeout_seconds: u64) -> Self {
        let seconds = i64::try_from(timeout_seconds).unwrap_or(i64::MAX / 1000);
        Self {
            sessions: Mutex::new(HashMap::new()),
            timeout: Duration::seconds(seconds),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, InteractionState>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a flow, replacing any flow already in progress for the account.
    pub fn begin(&self, account_id: &str, action: PendingAction, now: DateTime<Utc>) -> InteractionStep {
        let deadline = now + self.timeout;
        let (state, prompt) = match action {
            PendingAction::RepayLoan { amount_due, .. } => {
                let prompt = format!(
                    "Repay {} from your bank? Type '{}' or '{}'.",
                    amount_due, CONFIRM_WORD, CANCEL_WORD
                );
                (
                    InteractionState::AwaitingConfirmation {
                        action,
                        amount: amount_due,
                        deadline,
                    },
                    prompt,
                )
            }
            other => {
                let prompt = amount_prompt(&other);
                (
                    InteractionState::AwaitingAmount {
                        action: other,
                        deadline,
                    },
                    prompt,
                )
            }
        };
        debug!("interaction started for {}: {:?}", account_id, state);
        self.lock().insert(account_id.to_string(), state);
        InteractionStep::Prompt(prompt)
    }

    /// Feed one line of player input.
    pub fn handle_input(&self, account_id: &str, input: &str, now: DateTime<Utc>) -> InteractionStep {
        let mut sessions = self.lock();
        let Some(state) = sessions.get(account_id).cloned() else {
            return InteractionStep::NoInteraction;
        };
        if now > state.deadline() {
            sessions.remove(account_id);
            return InteractionStep::Expired;
        }
        let input = input.trim();
        if input.eq_ignore_ascii_case(CANCEL_WORD) {
            sessions.remove(account_id);
            return InteractionStep::Cancelled;
        }

        match state {
            InteractionState::AwaitingAmount { action, .. } => {
                let amount = match parse_positive_amount(input) {
                    Ok(amount) => amount,
                    Err(_) => {
                        return InteractionStep::Invalid(format!(
                            "'{}' is not a valid amount. Enter a positive number or '{}'.",
                            input, CANCEL_WORD
                        ))
                    }
                };
                match action {
                    PendingAction::Deposit { currency } => {
                        sessions.remove(account_id);
                        InteractionStep::Submit(CoreCall::Transfer {
                            currency,
                            amount,
                            direction: TransferDirection::Deposit,
                        })
                    }
                    PendingAction::Withdraw { currency } => {
                        sessions.remove(account_id);
                        InteractionStep::Submit(CoreCall::Transfer {
                            currency,
                            amount,
                            direction: TransferDirection::Withdraw,
                        })
                    }
                    action @ (PendingAction::RequestLoan | PendingAction::RepayLoan { .. }) => {
                        sessions.insert(
                            account_id.to_string(),
                            InteractionState::AwaitingConfirmation {
                                action,
                                amount,
                                deadline: now + self.timeout,
                            },
                        );
                        InteractionStep::Prompt(format!(
                            "Borrow {}? Type '{}' or '{}'.",
                            amount, CONFIRM_WORD, CANCEL_WORD
                        ))
                    }
                }
            }
            InteractionState::AwaitingConfirmation { action, amount, .. } => {
                sessions.remove(account_id);
                if !input.eq_ignore_ascii_case(CONFIRM_WORD) {
                    return InteractionStep::Cancelled;
                }
                match action {
                    PendingAction::RequestLoan => {
                        InteractionStep::Submit(CoreCall::RequestLoan { principal: amount })
                    }
                    PendingAction::RepayLoan { loan_id, .. } => {
                        InteractionStep::Submit(CoreCall::RepayLoan { loan_id })
                    }
                    PendingAction::Deposit { currency } => InteractionStep::Submit(CoreCall::Transfer {
                        currency,
                        amount,
                        direction: TransferDirection::Deposit,
                    }),
                    PendingAction::Withdraw { currency } => InteractionStep::Submit(CoreCall::Transfer {
                        currency,
                        amount,
                        direction: TransferDirection::Withdraw,
                    }),
                }
            }
        }
    }

    /// Drop a flow without a message (disconnect).
    pub fn cancel(&self, account_id: &str) -> bool {
        self.lock().remove(account_id).is_some()
    }

    pub fn state_of(&self, account_id: &str) -> Option<InteractionState> {
        self.lock().get(account_id).cloned()
    }

    /// Remove every flow whose deadline has passed; returns the affected accounts.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut sessions = self.lock();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, state)| now > state.deadline())
            .map(|(account, _)| account.clone())
            .collect();
        for account in &expired {
            sessions.remove(account);
        }
        expired
    }
}

fn amount_prompt(action: &PendingAction) -> String {
    match action {
        PendingAction::Deposit { currency } => {
            format!("How much {} to deposit? ('{}' to abort)", currency, CANCEL_WORD)
        }
        PendingAction::Withdraw { currency } => {
            format!("How much {} to withdraw? ('{}' to abort)", currency, CANCEL_WORD)
        }
        PendingAction::RequestLoan | PendingAction::RepayLoan { .. } => {
            format!("How much would you like to borrow? ('{}' to abort)", CANCEL_WORD)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_flow_submits_one_transfer() {
        let tracker = InteractionTracker::new(30);
        let now = Utc::now();
        let step = tracker.begin(
            "alice",
            PendingAction::Deposit {
                currency: "gold".to_string(),
            },
            now,
        );
        assert!(matches!(step, InteractionStep::Prompt(_)));

        assert!(matches!(
            tracker.handle_input("alice", "lots", now),
            InteractionStep::Invalid(_)
        ));
        assert_eq!(
            tracker.handle_input("alice", "12.5", now),
            InteractionStep::Submit(CoreCall::Transfer {
                currency: "gold".to_string(),
                amount: Money::from_minor(1250),
                direction: TransferDirection::Deposit,
            })
        );
        assert_eq!(
            tracker.handle_input("alice", "12.5", now),
            InteractionStep::NoInteraction
        );
    }

    #[test]
    fn loan_flow_needs_confirmation() {
        let tracker = InteractionTracker::new(30);
        let now = Utc::now();
        tracker.begin("alice", PendingAction::RequestLoan, now);
        assert!(matches!(
            tracker.handle_input("alice", "100", now),
            InteractionStep::Prompt(_)
        ));
        assert_eq!(
            tracker.handle_input("alice", "CONFIRM", now),
            InteractionStep::Submit(CoreCall::RequestLoan {
                principal: Money::from_major(100)
            })
        );

        tracker.begin(
            "alice",
            PendingAction::RepayLoan {
                loan_id: "L1".to_string(),
                amount_due: Money::from_major(107),
            },
            now,
        );
        assert_eq!(
            tracker.handle_input("alice", "nah", now),
            InteractionStep::Cancelled
        );
    }

    #[test]
    fn cancel_and_timeout() {
        let tracker = InteractionTracker::new(30);
        let now = Utc::now();
        tracker.begin("alice", PendingAction::RequestLoan, now);
        assert_eq!(
            tracker.handle_input("alice", " Cancel ", now),
            InteractionStep::Cancelled
        );

        tracker.begin("bob", PendingAction::RequestLoan, now);
        tracker.begin("carol", PendingAction::RequestLoan, now + Duration::seconds(20));
        let expired = tracker.expire_due(now + Duration::seconds(31));
        assert_eq!(expired, vec!["bob".to_string()]);
        assert!(tracker.state_of("carol").is_some());
        assert_eq!(
            tracker.handle_input("carol", "5", now + Duration::seconds(60)),
            InteractionStep::Expired
        );
    }
}
