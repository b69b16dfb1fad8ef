//! The economy facade used by host adapters.
//!
//! `EconomyService` owns every component and routes each operation to the
//! right account under that account's lock. Notifications and item grants are
//! sent to the host only after the lock is released.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::economy::accounts::AccountStore;
use crate::economy::booth::BoothAllocator;
use crate::economy::capabilities::{
    DiscardItems, EntityResolver, ItemRewardSink, MessageSink, NoEntities, NoRegion, Position,
    RegionPredicate, SilentSink,
};
use crate::economy::catalog::Catalog;
use crate::economy::currency::format_amount;
use crate::economy::errors::EconomyError;
use crate::economy::interaction::{CoreCall, InteractionStep, InteractionTracker, PendingAction};
use crate::economy::ledger;
use crate::economy::loan::{self, LoanBook, LoanTerms};
use crate::economy::persistence::{start_persistence_worker, PersistStats};
use crate::economy::quest::{self, ProgressSummary, QuestCompletion, QuestEngine, QuestEventOutcome};
use crate::economy::storage::EconomyStore;
use crate::economy::types::{
    AccountRecord, Booth, Loan, Money, Pocket, QuestDefinition, QuestEventKind, TransferDirection,
};

pub struct EconomyServiceBuilder {
    store: Arc<EconomyStore>,
    catalog: Catalog,
    terms: LoanTerms,
    interaction_timeout_seconds: u64,
    quest_seed: Option<u64>,
    messages: Arc<dyn MessageSink>,
    region: Arc<dyn RegionPredicate>,
    entities: Arc<dyn EntityResolver>,
    items: Arc<dyn ItemRewardSink>,
}

impl EconomyServiceBuilder {
    pub fn new(store: Arc<EconomyStore>, catalog: Catalog) -> Self {
        Self {
            store,
            catalog,
            terms: LoanTerms::default(),
            interaction_timeout_seconds: 30,
            quest_seed: None,
            messages: Arc::new(SilentSink),
            region: Arc::new(NoRegion),
            entities: Arc::new(NoEntities),
            items: Arc::new(DiscardItems),
        }
    }

    pub fn with_loan_terms(mut self, terms: LoanTerms) -> Self {
        self.terms = terms;
        self
    }

    pub fn with_interaction_timeout(mut self, seconds: u64) -> Self {
        self.interaction_timeout_seconds = seconds;
        self
    }

    /// Fixed RNG seed for quest selection and ranged rewards.
    pub fn with_quest_seed(mut self, seed: u64) -> Self {
        self.quest_seed = Some(seed);
        self
    }

    pub fn with_message_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.messages = sink;
        self
    }

    pub fn with_region(mut self, region: Arc<dyn RegionPredicate>) -> Self {
        self.region = region;
        self
    }

    pub fn with_entities(mut self, entities: Arc<dyn EntityResolver>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_item_sink(mut self, items: Arc<dyn ItemRewardSink>) -> Self {
        self.items = items;
        self
    }

    /// Load the booth registry and start the persistence worker.
    /// Must run inside a tokio runtime.
    pub fn build(self) -> Result<EconomyService, EconomyError> {
        let booths = BoothAllocator::load(self.store.list_booths()?);
        let persistence = start_persistence_worker(self.store.clone());
        let quests = match self.quest_seed {
            Some(seed) => QuestEngine::with_seed(seed),
            None => QuestEngine::new(),
        };
        info!(
            "economy ready: {} currencies, {} quests, {} booths",
            self.catalog.currencies().len(),
            self.catalog.quests().len(),
            booths.list_booths().len()
        );
        Ok(EconomyService {
            catalog: RwLock::new(Arc::new(self.catalog)),
            accounts: AccountStore::new(self.store, persistence),
            loans: LoanBook::new(self.terms),
            quests,
            booths,
            interactions: InteractionTracker::new(self.interaction_timeout_seconds),
            overdue_notified: Mutex::new(HashSet::new()),
            messages: self.messages,
            region: self.region,
            entities: self.entities,
            items: self.items,
        })
    }
}

pub struct EconomyService {
    catalog: RwLock<Arc<Catalog>>,
    accounts: AccountStore,
    loans: LoanBook,
    quests: QuestEngine,
    booths: BoothAllocator,
    interactions: InteractionTracker,
    /// Loan ids already announced as overdue during this process lifetime.
    overdue_notified: Mutex<HashSet<String>>,
    messages: Arc<dyn MessageSink>,
    region: Arc<dyn RegionPredicate>,
    entities: Arc<dyn EntityResolver>,
    items: Arc<dyn ItemRewardSink>,
}

impl EconomyService {
    pub fn builder(store: Arc<EconomyStore>, catalog: Catalog) -> EconomyServiceBuilder {
        EconomyServiceBuilder::new(store, catalog)
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Current catalog snapshot; stays valid across a concurrent reload.
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new catalog. Active quests missing from it keep their progress
    /// but report `QuestNotFound` from `progress_summary` until abandoned.
    pub fn reload_catalog(&self, catalog: Catalog) {
        info!(
            "catalog reloaded: {} currencies, {} quests",
            catalog.currencies().len(),
            catalog.quests().len()
        );
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
    }

    pub fn reload_catalog_from_files(
        &self,
        currencies_path: &Path,
        quests_path: &Path,
    ) -> Result<(), EconomyError> {
        let catalog = Catalog::load_from_files(currencies_path, quests_path)?;
        self.reload_catalog(catalog);
        Ok(())
    }

    fn notify(&self, account_id: &str, text: &str) {
        self.messages.deliver(account_id, text);
    }

    fn describe(&self, amount: Money, currency: &str) -> String {
        match self.catalog().currency(currency) {
            Some(c) => format_amount(amount, c),
            None => format!("{} {}", amount, currency),
        }
    }

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    /// Balance of a live account; unknown accounts and currencies read as zero.
    pub fn get_balance(&self, account_id: &str, currency: &str, pocket: Pocket) -> Money {
        self.accounts
            .with_account(account_id, |record| {
                Ok(ledger::get_balance(record, currency, pocket))
            })
            .unwrap_or(Money::ZERO)
    }

    /// Non-zero (wallet, bank) balances.
    pub fn balances(
        &self,
        account_id: &str,
    ) -> Result<(BTreeMap<String, Money>, BTreeMap<String, Money>), EconomyError> {
        self.accounts.with_account(account_id, |record| {
            Ok((ledger::wallet_balances(record), ledger::bank_balances(record)))
        })
    }

    pub fn transfer(
        &self,
        account_id: &str,
        currency: &str,
        amount: Money,
        direction: TransferDirection,
    ) -> Result<(), EconomyError> {
        if !self.catalog().has_currency(currency) {
            return Err(EconomyError::UnknownCurrency(currency.to_string()));
        }
        self.accounts.with_account(account_id, |record| {
            ledger::transfer(record, currency, amount, direction)
        })?;
        info!(
            "{} {:?} {} {}",
            account_id, direction, amount, currency
        );
        Ok(())
    }

    pub fn credit(
        &self,
        account_id: &str,
        currency: &str,
        amount: Money,
        pocket: Pocket,
    ) -> Result<(), EconomyError> {
        self.accounts.with_account(account_id, |record| {
            ledger::credit(record, currency, amount, pocket)
        })
    }

    pub fn debit(
        &self,
        account_id: &str,
        currency: &str,
        amount: Money,
        pocket: Pocket,
    ) -> Result<(), EconomyError> {
        self.accounts.with_account(account_id, |record| {
            ledger::debit(record, currency, amount, pocket)
        })
    }

    // ------------------------------------------------------------------
    // Loans
    // ------------------------------------------------------------------

    pub fn loan_terms(&self) -> &LoanTerms {
        self.loans.terms()
    }

    pub fn request_loan(&self, account_id: &str, principal: Money) -> Result<Loan, EconomyError> {
        self.accounts
            .with_account(account_id, |record| self.loans.request_loan(record, principal))
    }

    pub fn repay_loan(&self, account_id: &str, loan_id: &str) -> Result<Loan, EconomyError> {
        self.accounts.with_account(account_id, |record| {
            let loan = self.loans.repay(record, loan_id)?;
            self.overdue_notified
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(loan_id);
            Ok(loan)
        })
    }

    pub fn list_active_loans(&self, account_id: &str) -> Result<Vec<Loan>, EconomyError> {
        self.accounts
            .with_account(account_id, |record| Ok(loan::list_active_loans(record)))
    }

    pub fn is_overdue(&self, account_id: &str, loan_id: &str) -> Result<bool, EconomyError> {
        self.accounts
            .with_account(account_id, |record| loan::is_overdue(record, loan_id, Utc::now()))
    }

    pub fn prune_repaid_loans(&self, account_id: &str) -> Result<usize, EconomyError> {
        self.accounts
            .with_account(account_id, |record| Ok(loan::prune_repaid(record)))
    }

    /// Announce each overdue loan of every live account once per process.
    ///
    /// Candidates come from a snapshot and are confirmed under the account
    /// lock, so a loan repaid in between is never marked or announced.
    pub fn sweep_overdue_loans(&self, now: DateTime<Utc>) -> usize {
        let mut announcements = Vec::new();
        for snapshot in self.accounts.snapshot_all() {
            if loan::overdue_loans(&snapshot, now).is_empty() {
                continue;
            }
            let confirmed = self.accounts.with_account(&snapshot.id, |record| {
                let mut notified = self
                    .overdue_notified
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                Ok(loan::overdue_loans(record, now)
                    .into_iter()
                    .filter(|overdue| notified.insert(overdue.id().to_string()))
                    .collect::<Vec<_>>())
            });
            // accounts that disconnected since the snapshot are skipped
            if let Ok(loans) = confirmed {
                announcements.extend(loans.into_iter().map(|l| (snapshot.id.clone(), l)));
            }
        }
        for (account_id, overdue) in &announcements {
            warn!("loan {} of {} is overdue", overdue.id(), account_id);
            let text = format!(
                "Your loan {} is overdue: {} was due {}.",
                overdue.id(),
                self.describe(overdue.amount_due(), overdue.currency()),
                overdue.due_at().format("%Y-%m-%d %H:%M UTC")
            );
            self.notify(account_id, &text);
        }
        announcements.len()
    }

    // ------------------------------------------------------------------
    // Quests
    // ------------------------------------------------------------------

    pub fn assign_quest(&self, account_id: &str) -> Result<QuestDefinition, EconomyError> {
        let catalog = self.catalog();
        let quest = self
            .accounts
            .with_account(account_id, |record| self.quests.assign_quest(record, &catalog))?;
        let text = if quest.description.is_empty() {
            format!("New quest: {}", quest.name)
        } else {
            format!("New quest: {} - {}", quest.name, quest.description)
        };
        self.notify(account_id, &text);
        Ok(quest)
    }

    pub fn abandon_quest(&self, account_id: &str) -> Result<String, EconomyError> {
        self.accounts.with_account(account_id, quest::abandon_quest)
    }

    pub fn record_event(
        &self,
        account_id: &str,
        kind: QuestEventKind,
        target: &str,
        amount: u32,
    ) -> Result<QuestEventOutcome, EconomyError> {
        let catalog = self.catalog();
        let outcome = self.accounts.with_account(account_id, |record| {
            self.quests
                .record_event(record, &catalog, kind, target, amount)
        })?;
        if let QuestEventOutcome::Completed(completion) = &outcome {
            self.deliver_completion(account_id, completion);
        }
        Ok(outcome)
    }

    /// Attribute a world event to whichever account the host entity belongs to.
    /// Unresolved entities yield `Ok(None)`.
    pub fn record_entity_event(
        &self,
        entity_ref: &str,
        kind: QuestEventKind,
        target: &str,
        amount: u32,
    ) -> Result<Option<QuestEventOutcome>, EconomyError> {
        let Some(account_id) = self.entities.account_for_entity(entity_ref) else {
            return Ok(None);
        };
        if !self.accounts.is_loaded(&account_id) {
            return Ok(None);
        }
        self.record_event(&account_id, kind, target, amount).map(Some)
    }

    pub fn progress_summary(
        &self,
        account_id: &str,
    ) -> Result<Option<ProgressSummary>, EconomyError> {
        let catalog = self.catalog();
        self.accounts
            .with_account(account_id, |record| quest::progress_summary(record, &catalog))
    }

    fn deliver_completion(&self, account_id: &str, completion: &QuestCompletion) {
        for item in &completion.items {
            self.items.grant(account_id, item);
        }
        let mut text = format!("Quest complete: {}!", completion.quest_name);
        for (currency, amount) in &completion.currency {
            text.push_str(&format!(" +{} to bank.", self.describe(*amount, currency)));
        }
        self.notify(account_id, &text);
    }

    // ------------------------------------------------------------------
    // Booths
    // ------------------------------------------------------------------

    pub fn register_booth(&self, id: &str, location: &str) -> Result<(), EconomyError> {
        let record = self.booths.register_booth(id, location)?;
        self.accounts.persistence().put_booth(record);
        Ok(())
    }

    /// Remove a booth; its occupant (if any) is told and returned.
    pub fn unregister_booth(&self, id: &str) -> Result<Option<String>, EconomyError> {
        let evicted = self.booths.unregister_booth(id)?;
        self.accounts.persistence().remove_booth(id);
        if let Some(account_id) = &evicted {
            self.notify(account_id, "Your booth was closed.");
        }
        Ok(evicted)
    }

    /// Seat a connected account. Runs under the account lock so a concurrent
    /// disconnect cannot leave a seat behind.
    pub fn assign_booth(&self, account_id: &str) -> Result<Booth, EconomyError> {
        self.accounts
            .with_account(account_id, |_| self.booths.assign_booth(account_id))
    }

    pub fn release_booth(&self, account_id: &str) -> Option<String> {
        self.booths.release_booth(account_id)
    }

    pub fn booth_of(&self, account_id: &str) -> Option<Booth> {
        self.booths.booth_of(account_id)
    }

    pub fn list_booths(&self) -> Vec<Booth> {
        self.booths.list_booths()
    }

    /// Movement hook from the host; entering the bank region seats the player.
    pub fn on_player_moved(
        &self,
        account_id: &str,
        position: &Position,
    ) -> Result<Option<Booth>, EconomyError> {
        let assigned = self.accounts.with_account(account_id, |_| {
            self.booths
                .on_player_moved(account_id, position, self.region.as_ref())
        })?;
        if let Some(booth) = &assigned {
            self.notify(account_id, &format!("Please proceed to booth {}.", booth.id));
        }
        Ok(assigned)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn on_connect(&self, account_id: &str) -> Result<AccountRecord, EconomyError> {
        self.accounts.on_connect(account_id)
    }

    /// Persist and evict, then release the booth and drop any open interaction.
    pub fn on_disconnect(&self, account_id: &str) -> Option<AccountRecord> {
        let last = self.accounts.on_disconnect(account_id);
        self.booths.release_booth(account_id);
        self.interactions.cancel(account_id);
        last
    }

    pub fn is_connected(&self, account_id: &str) -> bool {
        self.accounts.is_loaded(account_id)
    }

    pub fn snapshot(&self, account_id: &str) -> Result<AccountRecord, EconomyError> {
        self.accounts.snapshot(account_id)
    }

    pub fn snapshot_all(&self) -> Vec<AccountRecord> {
        self.accounts.snapshot_all()
    }

    pub fn autosave(&self) -> usize {
        self.accounts.autosave()
    }

    pub async fn flush(&self) -> Result<PersistStats, EconomyError> {
        self.accounts.persistence().flush().await
    }

    pub async fn shutdown(&self) -> Result<PersistStats, EconomyError> {
        self.accounts.shutdown().await
    }

    // ------------------------------------------------------------------
    // Interactive flows
    // ------------------------------------------------------------------

    pub fn begin_interaction(
        &self,
        account_id: &str,
        action: PendingAction,
    ) -> Result<InteractionStep, EconomyError> {
        if !self.accounts.is_loaded(account_id) {
            return Err(EconomyError::AccountNotLoaded(account_id.to_string()));
        }
        if let PendingAction::Deposit { currency } | PendingAction::Withdraw { currency } = &action
        {
            if !self.catalog().has_currency(currency) {
                return Err(EconomyError::UnknownCurrency(currency.clone()));
            }
        }
        let step = self.interactions.begin(account_id, action, Utc::now());
        if let InteractionStep::Prompt(text) = &step {
            self.notify(account_id, text);
        }
        Ok(step)
    }

    /// Start the confirm/cancel flow for repaying one loan.
    pub fn begin_repayment(
        &self,
        account_id: &str,
        loan_id: &str,
    ) -> Result<InteractionStep, EconomyError> {
        let amount_due = self.accounts.with_account(account_id, |record| {
            let loan = record
                .loan(loan_id)
                .ok_or_else(|| EconomyError::LoanNotFound(loan_id.to_string()))?;
            if loan.is_repaid() {
                return Err(EconomyError::AlreadyRepaid(loan_id.to_string()));
            }
            Ok(loan.amount_due())
        })?;
        self.begin_interaction(
            account_id,
            PendingAction::RepayLoan {
                loan_id: loan_id.to_string(),
                amount_due,
            },
        )
    }

    /// Feed one line of input; a finished flow executes its single core call.
    pub fn handle_input(
        &self,
        account_id: &str,
        input: &str,
    ) -> Result<InteractionStep, EconomyError> {
        let step = self.interactions.handle_input(account_id, input, Utc::now());
        match &step {
            InteractionStep::Prompt(text) | InteractionStep::Invalid(text) => {
                self.notify(account_id, text)
            }
            InteractionStep::Cancelled => self.notify(account_id, "Cancelled."),
            InteractionStep::Expired => self.notify(account_id, "Timed out."),
            InteractionStep::Submit(call) => {
                let text = self.execute(account_id, call)?;
                self.notify(account_id, &text);
            }
            InteractionStep::NoInteraction => {}
        }
        Ok(step)
    }

    fn execute(&self, account_id: &str, call: &CoreCall) -> Result<String, EconomyError> {
        match call {
            CoreCall::Transfer {
                currency,
                amount,
                direction,
            } => {
                self.transfer(account_id, currency, *amount, *direction)?;
                let verb = match direction {
                    TransferDirection::Deposit => "Deposited",
                    TransferDirection::Withdraw => "Withdrew",
                };
                Ok(format!("{} {}.", verb, self.describe(*amount, currency)))
            }
            CoreCall::RequestLoan { principal } => {
                let issued = self.request_loan(account_id, *principal)?;
                Ok(format!(
                    "Loan approved: {} now, repay {} by {}.",
                    self.describe(issued.principal(), issued.currency()),
                    self.describe(issued.amount_due(), issued.currency()),
                    issued.due_at().format("%Y-%m-%d")
                ))
            }
            CoreCall::RepayLoan { loan_id } => {
                let repaid = self.repay_loan(account_id, loan_id)?;
                Ok(format!(
                    "Loan repaid: {}.",
                    self.describe(repaid.amount_due(), repaid.currency())
                ))
            }
        }
    }

    /// Drop interactions past their deadline and tell the players.
    pub fn expire_interactions(&self, now: DateTime<Utc>) -> usize {
        let expired = self.interactions.expire_due(now);
        for account_id in &expired {
            self.notify(account_id, "Timed out.");
        }
        expired.len()
    }
}
