use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const ACCOUNT_SCHEMA_VERSION: u8 = 1;
pub const BOOTH_SCHEMA_VERSION: u8 = 1;

/// Number of decimal places carried by every currency.
pub const MINOR_DIGITS: u32 = 2;
/// Minor units per major unit (100 cents to the coin).
pub const MINOR_PER_MAJOR: i64 = 100;

// ============================================================================
// Money
// ============================================================================

/// A currency amount stored as integer minor units (e.g. 1234 == 12.34).
///
/// Balances never use binary floating point, so any sequence of deposits and
/// withdrawals is exactly reversible.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Whole major units, e.g. `Money::from_major(5)` is 5.00.
    pub const fn from_major(major_units: i64) -> Self {
        Self(major_units * MINOR_PER_MAJOR)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let divisor = MINOR_PER_MAJOR as u64;
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            abs / divisor,
            abs % divisor,
            width = MINOR_DIGITS as usize
        )
    }
}

// ============================================================================
// Currencies and pockets
// ============================================================================

/// Catalog entry for one currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Currency {
    /// Stable key used in balances (e.g. "gold").
    pub key: String,
    pub display_name: String,
    pub symbol: String,
}

impl Currency {
    pub fn new(key: &str, display_name: &str, symbol: &str) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            symbol: symbol.to_string(),
        }
    }
}

/// The two balance pockets every account holds per currency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Pocket {
    /// Freely spendable, carried by the player ("moneybag").
    Wallet,
    /// Secured storage; the only source loans are repaid from.
    Bank,
}

impl fmt::Display for Pocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pocket::Wallet => write!(f, "wallet"),
            Pocket::Bank => write!(f, "bank"),
        }
    }
}

/// Direction of a wallet/bank transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Wallet to bank.
    Deposit,
    /// Bank to wallet.
    Withdraw,
}

impl TransferDirection {
    pub fn source(self) -> Pocket {
        match self {
            TransferDirection::Deposit => Pocket::Wallet,
            TransferDirection::Withdraw => Pocket::Bank,
        }
    }

    pub fn destination(self) -> Pocket {
        match self {
            TransferDirection::Deposit => Pocket::Bank,
            TransferDirection::Withdraw => Pocket::Wallet,
        }
    }
}

// ============================================================================
// Loans
// ============================================================================

/// A fixed-term simple-interest advance.
///
/// `amount_due` is fixed when the loan is issued and never recomputed. Overdue is a
/// read-time classification (`is_overdue_at`), not a stored state; only `repaid` is
/// ever written after issuance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Loan {
    id: String,
    currency: String,
    principal: Money,
    daily_rate_bps: u32,
    issued_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
    amount_due: Money,
    repaid: bool,
}

impl Loan {
    /// Issue a loan at `now`, due `repayment_period_days` later.
    pub fn issue(
        currency: &str,
        principal: Money,
        daily_rate_bps: u32,
        repayment_period_days: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            currency: currency.to_string(),
            principal,
            daily_rate_bps,
            issued_at: now,
            due_at: now + Duration::days(i64::from(repayment_period_days)),
            amount_due: simple_interest_due(principal, daily_rate_bps, repayment_period_days),
            repaid: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn principal(&self) -> Money {
        self.principal
    }

    /// Daily rate in basis points (1% == 100).
    pub fn daily_rate_bps(&self) -> u32 {
        self.daily_rate_bps
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn due_at(&self) -> DateTime<Utc> {
        self.due_at
    }

    pub fn amount_due(&self) -> Money {
        self.amount_due
    }

    pub fn is_repaid(&self) -> bool {
        self.repaid
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        !self.repaid && now > self.due_at
    }

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }

    pub(crate) fn mark_repaid(&mut self) {
        self.repaid = true;
    }
}

/// `principal + principal * rate * days`, non-compounding, truncated to whole minor units.
pub fn simple_interest_due(principal: Money, daily_rate_bps: u32, days: u32) -> Money {
    let p = i128::from(principal.minor_units());
    let interest = p * i128::from(daily_rate_bps) * i128::from(days) / 10_000;
    let total = (p + interest).clamp(i128::from(i64::MIN), i128::from(i64::MAX));
    Money::from_minor(total as i64)
}

// ============================================================================
// Quests
// ============================================================================

/// World occurrences that can advance a quest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestEventKind {
    BreakBlock,
    KillMob,
    CraftItem,
    Fish,
    Harvest,
}

impl QuestEventKind {
    /// Suffix used in progress keys, e.g. `DIAMOND_ORE_broken`.
    pub fn progress_suffix(self) -> &'static str {
        match self {
            QuestEventKind::BreakBlock => "broken",
            QuestEventKind::KillMob => "killed",
            QuestEventKind::CraftItem => "crafted",
            QuestEventKind::Fish => "caught",
            QuestEventKind::Harvest => "harvested",
        }
    }

    /// Parse the catalog spelling (`BREAK_BLOCK`, `break_block`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BREAK_BLOCK" => Some(QuestEventKind::BreakBlock),
            "KILL_MOB" => Some(QuestEventKind::KillMob),
            "CRAFT_ITEM" => Some(QuestEventKind::CraftItem),
            "FISH" => Some(QuestEventKind::Fish),
            "HARVEST" => Some(QuestEventKind::Harvest),
            _ => None,
        }
    }
}

impl fmt::Display for QuestEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuestEventKind::BreakBlock => "BREAK_BLOCK",
            QuestEventKind::KillMob => "KILL_MOB",
            QuestEventKind::CraftItem => "CRAFT_ITEM",
            QuestEventKind::Fish => "FISH",
            QuestEventKind::Harvest => "HARVEST",
        };
        f.write_str(name)
    }
}

/// What a quest asks for. One variant per quest type; add a variant to add a type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestObjective {
    BreakBlock { material: String, amount: u32 },
    KillMob { entity_type: String, amount: u32 },
    CraftItem { material: String, amount: u32 },
    Fish { item: String, amount: u32 },
    Harvest { crop: String, amount: u32 },
}

impl QuestObjective {
    pub fn kind(&self) -> QuestEventKind {
        match self {
            QuestObjective::BreakBlock { .. } => QuestEventKind::BreakBlock,
            QuestObjective::KillMob { .. } => QuestEventKind::KillMob,
            QuestObjective::CraftItem { .. } => QuestEventKind::CraftItem,
            QuestObjective::Fish { .. } => QuestEventKind::Fish,
            QuestObjective::Harvest { .. } => QuestEventKind::Harvest,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            QuestObjective::BreakBlock { material, .. } => material,
            QuestObjective::KillMob { entity_type, .. } => entity_type,
            QuestObjective::CraftItem { material, .. } => material,
            QuestObjective::Fish { item, .. } => item,
            QuestObjective::Harvest { crop, .. } => crop,
        }
    }

    pub fn required_amount(&self) -> u32 {
        match self {
            QuestObjective::BreakBlock { amount, .. }
            | QuestObjective::KillMob { amount, .. }
            | QuestObjective::CraftItem { amount, .. }
            | QuestObjective::Fish { amount, .. }
            | QuestObjective::Harvest { amount, .. } => *amount,
        }
    }

    /// Whether an event of `kind` on `target` counts toward this objective.
    /// Targets compare case-insensitively.
    pub fn matches(&self, kind: QuestEventKind, target: &str) -> bool {
        match self {
            QuestObjective::BreakBlock { material, .. } => {
                kind == QuestEventKind::BreakBlock && material.eq_ignore_ascii_case(target)
            }
            QuestObjective::KillMob { entity_type, .. } => {
                kind == QuestEventKind::KillMob && entity_type.eq_ignore_ascii_case(target)
            }
            QuestObjective::CraftItem { material, .. } => {
                kind == QuestEventKind::CraftItem && material.eq_ignore_ascii_case(target)
            }
            QuestObjective::Fish { item, .. } => {
                kind == QuestEventKind::Fish && item.eq_ignore_ascii_case(target)
            }
            QuestObjective::Harvest { crop, .. } => {
                kind == QuestEventKind::Harvest && crop.eq_ignore_ascii_case(target)
            }
        }
    }

    /// Key under which progress for this objective is counted.
    pub fn progress_key(&self) -> String {
        format!(
            "{}_{}",
            self.target().to_ascii_uppercase(),
            self.kind().progress_suffix()
        )
    }
}

/// A currency reward: a fixed amount or a uniformly sampled range (inclusive).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RewardAmount {
    Fixed(Money),
    Range { min: Money, max: Money },
}

/// Opaque item reward, e.g. `DIAMOND_SWORD:1` or `STONE:1:{"display":"Magic Stone"}`.
/// The core never interprets it; it is handed to the inventory collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ItemSpec(pub String);

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestRewards {
    #[serde(default)]
    pub currency: BTreeMap<String, RewardAmount>,
    #[serde(default)]
    pub items: Vec<ItemSpec>,
}

/// Read-only catalog definition of a quest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub objective: QuestObjective,
    pub rewards: QuestRewards,
}

impl QuestDefinition {
    pub fn new(id: &str, objective: QuestObjective) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            objective,
            rewards: QuestRewards::default(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_currency_reward(mut self, currency: &str, amount: RewardAmount) -> Self {
        self.rewards.currency.insert(currency.to_string(), amount);
        self
    }

    pub fn with_item_reward(mut self, spec: &str) -> Self {
        self.rewards.items.push(ItemSpec(spec.to_string()));
        self
    }
}

/// Progress on the one quest an account may hold at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestProgress {
    pub quest_id: String,
    #[serde(default)]
    pub progress: BTreeMap<String, u32>,
    pub started_at: DateTime<Utc>,
}

impl QuestProgress {
    pub fn new(quest_id: &str) -> Self {
        Self {
            quest_id: quest_id.to_string(),
            progress: BTreeMap::new(),
            started_at: Utc::now(),
        }
    }

    pub fn count(&self, key: &str) -> u32 {
        self.progress.get(key).copied().unwrap_or(0)
    }
}

// ============================================================================
// Accounts
// ============================================================================

/// Live and durable per-player record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountRecord {
    pub id: String,
    #[serde(default)]
    pub wallet_balances: BTreeMap<String, Money>,
    #[serde(default)]
    pub bank_balances: BTreeMap<String, Money>,
    #[serde(default)]
    pub active_quest: Option<QuestProgress>,
    /// Issued loans in issuance order. Repaid loans stay as history until pruned.
    #[serde(default)]
    pub active_loans: Vec<Loan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl AccountRecord {
    pub fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            wallet_balances: BTreeMap::new(),
            bank_balances: BTreeMap::new(),
            active_quest: None,
            active_loans: Vec::new(),
            created_at: now,
            updated_at: now,
            schema_version: ACCOUNT_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn pocket(&self, pocket: Pocket) -> &BTreeMap<String, Money> {
        match pocket {
            Pocket::Wallet => &self.wallet_balances,
            Pocket::Bank => &self.bank_balances,
        }
    }

    pub(crate) fn pocket_mut(&mut self, pocket: Pocket) -> &mut BTreeMap<String, Money> {
        match pocket {
            Pocket::Wallet => &mut self.wallet_balances,
            Pocket::Bank => &mut self.bank_balances,
        }
    }

    pub fn loan(&self, loan_id: &str) -> Option<&Loan> {
        self.active_loans.iter().find(|loan| loan.id() == loan_id)
    }

    pub fn unrepaid_loan_count(&self) -> usize {
        self.active_loans.iter().filter(|loan| !loan.is_repaid()).count()
    }
}

// ============================================================================
// Booths
// ============================================================================

/// One slot of the finite booth pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booth {
    pub id: String,
    /// Host-side location reference; opaque to the core.
    pub location: String,
    pub occupant: Option<String>,
}

/// Durable form of a registered booth. Occupancy is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoothRecord {
    pub id: String,
    pub location: String,
    /// Registration sequence; restores first-fit order after a restart.
    pub sequence: u64,
    pub registered_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl BoothRecord {
    pub fn new(id: &str, location: &str, sequence: u64) -> Self {
        Self {
            id: id.to_string(),
            location: location.to_string(),
            sequence,
            registered_at: Utc::now(),
            schema_version: BOOTH_SCHEMA_VERSION,
        }
    }
}
