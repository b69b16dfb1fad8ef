//! Loan issuance and repayment.
//!
//! A loan disburses its principal into the wallet and is repaid in one
//! payment of `amount_due` taken from the bank pocket only. Repaid loans stay
//! on the record as history until `prune_repaid` removes them.

use crate::economy::errors::EconomyError;
use crate::economy::ledger;
use crate::economy::types::{AccountRecord, Loan, Money, Pocket};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

/// Tunables applied to every new loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub max_amount: Money,
    /// Daily simple interest in basis points (1% == 100).
    pub daily_rate_bps: u32,
    pub repayment_period_days: u32,
    pub max_active_loans: usize,
    /// Currency loans are disbursed and repaid in.
    pub currency: String,
}

impl Default for LoanTerms {
    fn default() -> Self {
        Self {
            max_amount: Money::from_major(10_000),
            daily_rate_bps: 100,
            repayment_period_days: 7,
            max_active_loans: 3,
            currency: "gold".to_string(),
        }
    }
}

impl LoanTerms {
    /// One-line description for players, e.g. "up to 10000.00 gold at 1.00%/day, due in 7 days (max 3 active)".
    pub fn summary(&self) -> String {
        format!(
            "up to {} {} at {}.{:02}%/day, due in {} days (max {} active)",
            self.max_amount,
            self.currency,
            self.daily_rate_bps / 100,
            self.daily_rate_bps % 100,
            self.repayment_period_days,
            self.max_active_loans
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoanBook {
    terms: LoanTerms,
}

impl LoanBook {
    pub fn new(terms: LoanTerms) -> Self {
        Self { terms }
    }

    pub fn terms(&self) -> &LoanTerms {
        &self.terms
    }

    /// Issue a loan at the current time.
    pub fn request_loan(
        &self,
        record: &mut AccountRecord,
        principal: Money,
    ) -> Result<Loan, EconomyError> {
        self.request_loan_at(record, principal, Utc::now())
    }

    pub fn request_loan_at(
        &self,
        record: &mut AccountRecord,
        principal: Money,
        now: DateTime<Utc>,
    ) -> Result<Loan, EconomyError> {
        if record.unrepaid_loan_count() >= self.terms.max_active_loans {
            return Err(EconomyError::LoanLimitExceeded {
                max: self.terms.max_active_loans,
            });
        }
        if !principal.is_positive() || principal > self.terms.max_amount {
            return Err(EconomyError::AmountOutOfRange {
                amount: principal,
                max: self.terms.max_amount,
            });
        }

        let loan = Loan::issue(
            &self.terms.currency,
            principal,
            self.terms.daily_rate_bps,
            self.terms.repayment_period_days,
            now,
        );
        ledger::credit(record, &self.terms.currency, principal, Pocket::Wallet)?;
        record.active_loans.push(loan.clone());
        record.touch();

        info!(
            "loan {} issued to {}: principal {} {}, due {} by {}",
            loan.id(),
            record.id,
            principal,
            loan.currency(),
            loan.amount_due(),
            loan.due_at().format("%Y-%m-%d %H:%M")
        );
        Ok(loan)
    }

    /// Repay a loan in full from the bank pocket.
    pub fn repay(&self, record: &mut AccountRecord, loan_id: &str) -> Result<Loan, EconomyError> {
        let index = record
            .active_loans
            .iter()
            .position(|loan| loan.id() == loan_id)
            .ok_or_else(|| EconomyError::LoanNotFound(loan_id.to_string()))?;

        let (currency, amount_due) = {
            let loan = &record.active_loans[index];
            if loan.is_repaid() {
                return Err(EconomyError::AlreadyRepaid(loan_id.to_string()));
            }
            (loan.currency().to_string(), loan.amount_due())
        };

        ledger::debit(record, &currency, amount_due, Pocket::Bank)?;
        let loan = &mut record.active_loans[index];
        loan.mark_repaid();
        let repaid = loan.clone();
        record.touch();

        info!(
            "loan {} repaid by {}: {} {}",
            loan_id, record.id, amount_due, currency
        );
        Ok(repaid)
    }
}

/// Unrepaid loans in issuance order.
pub fn list_active_loans(record: &AccountRecord) -> Vec<Loan> {
    record
        .active_loans
        .iter()
        .filter(|loan| !loan.is_repaid())
        .cloned()
        .collect()
}

/// Overdue state of one loan on the record.
pub fn is_overdue(
    record: &AccountRecord,
    loan_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, EconomyError> {
    record
        .loan(loan_id)
        .map(|loan| loan.is_overdue_at(now))
        .ok_or_else(|| EconomyError::LoanNotFound(loan_id.to_string()))
}

/// Unrepaid loans past their due date.
pub fn overdue_loans(record: &AccountRecord, now: DateTime<Utc>) -> Vec<Loan> {
    record
        .active_loans
        .iter()
        .filter(|loan| loan.is_overdue_at(now))
        .cloned()
        .collect()
}

/// Drop repaid loans from the record; returns how many were removed.
pub fn prune_repaid(record: &mut AccountRecord) -> usize {
    let before = record.active_loans.len();
    record.active_loans.retain(|loan| !loan.is_repaid());
    let removed = before - record.active_loans.len();
    if removed > 0 {
        record.touch();
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn book() -> LoanBook {
        LoanBook::new(LoanTerms::default())
    }

    #[test]
    fn reference_loan_owes_107() {
        let mut record = AccountRecord::new("alice");
        let loan = book().request_loan(&mut record, Money::from_major(100)).unwrap();
        assert_eq!(loan.amount_due(), Money::from_minor(10_700));
        assert_eq!(
            ledger::get_balance(&record, "gold", Pocket::Wallet),
            Money::from_major(100)
        );
        assert_eq!(loan.due_at() - loan.issued_at(), Duration::days(7));
    }

    #[test]
    fn limit_counts_only_unrepaid_loans() {
        let terms = LoanTerms {
            max_active_loans: 1,
            ..LoanTerms::default()
        };
        let book = LoanBook::new(terms);
        let mut record = AccountRecord::new("alice");
        let first = book.request_loan(&mut record, Money::from_major(10)).unwrap();
        assert!(matches!(
            book.request_loan(&mut record, Money::from_major(10)),
            Err(EconomyError::LoanLimitExceeded { max: 1 })
        ));

        ledger::credit(&mut record, "gold", Money::from_major(20), Pocket::Bank).unwrap();
        book.repay(&mut record, first.id()).unwrap();
        assert!(book.request_loan(&mut record, Money::from_major(10)).is_ok());
    }

    #[test]
    fn principal_bounds_are_enforced() {
        let mut record = AccountRecord::new("alice");
        assert!(matches!(
            book().request_loan(&mut record, Money::ZERO),
            Err(EconomyError::AmountOutOfRange { .. })
        ));
        assert!(matches!(
            book().request_loan(&mut record, Money::from_major(10_001)),
            Err(EconomyError::AmountOutOfRange { .. })
        ));
        assert!(book().request_loan(&mut record, Money::from_major(10_000)).is_ok());
    }

    #[test]
    fn repay_uses_bank_only_and_keeps_history() {
        let book = book();
        let mut record = AccountRecord::new("alice");
        let loan = book.request_loan(&mut record, Money::from_major(100)).unwrap();

        // principal sits in the wallet; the bank is empty
        assert!(matches!(
            book.repay(&mut record, loan.id()),
            Err(EconomyError::InsufficientFunds { .. })
        ));
        assert!(!record.loan(loan.id()).unwrap().is_repaid());

        ledger::credit(&mut record, "gold", Money::from_major(110), Pocket::Bank).unwrap();
        book.repay(&mut record, loan.id()).unwrap();
        assert_eq!(
            ledger::get_balance(&record, "gold", Pocket::Bank),
            Money::from_minor(300)
        );
        assert!(list_active_loans(&record).is_empty());
        assert_eq!(record.active_loans.len(), 1);

        assert!(matches!(
            book.repay(&mut record, loan.id()),
            Err(EconomyError::AlreadyRepaid(_))
        ));
        assert_eq!(
            ledger::get_balance(&record, "gold", Pocket::Bank),
            Money::from_minor(300)
        );

        assert_eq!(prune_repaid(&mut record), 1);
        assert!(record.active_loans.is_empty());
    }

    #[test]
    fn overdue_is_read_time_classification() {
        let book = book();
        let mut record = AccountRecord::new("alice");
        let issued = Utc::now() - Duration::days(30);
        let loan = book
            .request_loan_at(&mut record, Money::from_major(5), issued)
            .unwrap();
        assert!(is_overdue(&record, loan.id(), Utc::now()).unwrap());
        assert_eq!(overdue_loans(&record, Utc::now()).len(), 1);
        assert!(!is_overdue(&record, loan.id(), issued).unwrap());
        assert!(matches!(
            is_overdue(&record, "missing", Utc::now()),
            Err(EconomyError::LoanNotFound(_))
        ));
    }
}
