//! Quest assignment, progress tracking and reward payout
//!
//! An account holds at most one quest. World events advance it; reaching the
//! required count completes it in the same call and credits every currency
//! reward to the bank pocket. Item rewards are returned in the completion
//! report for the caller to hand to the inventory collaborator.
use crate::economy::catalog::Catalog;
use crate::economy::errors::EconomyError;
use crate::economy::ledger;
use crate::economy::types::{
    AccountRecord, ItemSpec, Money, Pocket, QuestDefinition, QuestEventKind, QuestProgress,
    RewardAmount,
};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

/// Result of feeding one world event to an account's quest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestEventOutcome {
    /// No active quest, or the event does not match it.
    Ignored,
    Progressed { current: u32, required: u32 },
    Completed(QuestCompletion),
}

/// What a completed quest paid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestCompletion {
    pub quest_id: String,
    pub quest_name: String,
    /// Amounts credited to the bank, per currency.
    pub currency: Vec<(String, Money)>,
    /// Item specs still to be granted by the inventory collaborator.
    pub items: Vec<ItemSpec>,
}

/// Read-only view of the active quest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSummary {
    pub quest_id: String,
    pub name: String,
    pub description: String,
    pub kind: QuestEventKind,
    pub target: String,
    pub current: u32,
    pub required: u32,
}

impl ProgressSummary {
    pub fn is_complete(&self) -> bool {
        self.current >= self.required
    }
}

/// Randomised parts of the quest loop (assignment and ranged rewards).
pub struct QuestEngine {
    rng: Mutex<StdRng>,
}

impl Default for QuestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestEngine {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic engine for tests and replays.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Pick a quest uniformly at random from the catalog and make it active.
    pub fn assign_quest(
        &self,
        record: &mut AccountRecord,
        catalog: &Catalog,
    ) -> Result<QuestDefinition, EconomyError> {
        if let Some(active) = &record.active_quest {
            return Err(EconomyError::QuestAlreadyActive(active.quest_id.clone()));
        }
        let quests = catalog.quests();
        if quests.is_empty() {
            return Err(EconomyError::NoQuestsDefined);
        }

        let index = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.gen_range(0..quests.len())
        };
        let quest = quests[index].clone();
        record.active_quest = Some(QuestProgress::new(&quest.id));
        record.touch();

        info!("quest {} assigned to {}", quest.id, record.id);
        Ok(quest)
    }

    /// Advance the active quest; completes it when the count reaches the requirement.
    pub fn record_event(
        &self,
        record: &mut AccountRecord,
        catalog: &Catalog,
        kind: QuestEventKind,
        target: &str,
        amount: u32,
    ) -> Result<QuestEventOutcome, EconomyError> {
        if amount == 0 {
            return Ok(QuestEventOutcome::Ignored);
        }
        let quest_id = match &record.active_quest {
            Some(active) => active.quest_id.clone(),
            None => return Ok(QuestEventOutcome::Ignored),
        };
        let Some(quest) = catalog.quest(&quest_id) else {
            warn!(
                "{} holds quest {} which is no longer in the catalog",
                record.id, quest_id
            );
            return Ok(QuestEventOutcome::Ignored);
        };
        if !quest.objective.matches(kind, target) {
            return Ok(QuestEventOutcome::Ignored);
        }

        let key = quest.objective.progress_key();
        let required = quest.objective.required_amount();
        let current = match record.active_quest.as_mut() {
            Some(active) => {
                let counter = active.progress.entry(key).or_insert(0);
                *counter = counter.saturating_add(amount);
                *counter
            }
            None => return Ok(QuestEventOutcome::Ignored),
        };
        record.touch();
        debug!(
            "{} progress on {}: {}/{}",
            record.id, quest_id, current, required
        );

        if current >= required {
            if let Some(completion) = self.complete_quest(record, catalog, &quest_id)? {
                return Ok(QuestEventOutcome::Completed(completion));
            }
        }
        Ok(QuestEventOutcome::Progressed { current, required })
    }

    /// Pay out and clear the active quest if it is `quest_id`.
    ///
    /// Returns `Ok(None)` when no matching quest is active, so a duplicate
    /// trigger never pays twice.
    pub fn complete_quest(
        &self,
        record: &mut AccountRecord,
        catalog: &Catalog,
        quest_id: &str,
    ) -> Result<Option<QuestCompletion>, EconomyError> {
        match &record.active_quest {
            Some(active) if active.quest_id == quest_id => {}
            _ => return Ok(None),
        }
        let quest = catalog
            .quest(quest_id)
            .ok_or_else(|| EconomyError::QuestNotFound(quest_id.to_string()))?;

        let mut staged = record.clone();
        let mut credited = Vec::new();
        for (currency, reward) in &quest.rewards.currency {
            let amount = self.sample(*reward);
            if amount.is_positive() {
                ledger::credit(&mut staged, currency, amount, Pocket::Bank)?;
                credited.push((currency.clone(), amount));
            }
        }
        staged.active_quest = None;
        staged.touch();
        *record = staged;

        info!(
            "quest {} completed by {} ({} currency rewards, {} items)",
            quest_id,
            record.id,
            credited.len(),
            quest.rewards.items.len()
        );
        Ok(Some(QuestCompletion {
            quest_id: quest.id.clone(),
            quest_name: quest.name.clone(),
            currency: credited,
            items: quest.rewards.items.clone(),
        }))
    }

    fn sample(&self, reward: RewardAmount) -> Money {
        match reward {
            RewardAmount::Fixed(amount) => amount,
            RewardAmount::Range { min, max } if min >= max => min,
            RewardAmount::Range { min, max } => {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                Money::from_minor(rng.gen_range(min.minor_units()..=max.minor_units()))
            }
        }
    }
}

/// Drop the active quest without rewards; returns its id.
pub fn abandon_quest(record: &mut AccountRecord) -> Result<String, EconomyError> {
    let active = record
        .active_quest
        .take()
        .ok_or(EconomyError::NoActiveQuest)?;
    record.touch();
    info!("quest {} abandoned by {}", active.quest_id, record.id);
    Ok(active.quest_id)
}

/// Current counter against the requirement, or `None` with no active quest.
pub fn progress_summary(
    record: &AccountRecord,
    catalog: &Catalog,
) -> Result<Option<ProgressSummary>, EconomyError> {
    let Some(active) = &record.active_quest else {
        return Ok(None);
    };
    let quest = catalog
        .quest(&active.quest_id)
        .ok_or_else(|| EconomyError::QuestNotFound(active.quest_id.clone()))?;
    Ok(Some(ProgressSummary {
        quest_id: quest.id.clone(),
        name: quest.name.clone(),
        description: quest.description.clone(),
        kind: quest.objective.kind(),
        target: quest.objective.target().to_string(),
        current: active.count(&quest.objective.progress_key()),
        required: quest.objective.required_amount(),
    }))
}
