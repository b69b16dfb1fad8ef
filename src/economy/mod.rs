//! Economy core: wallet/bank ledger, loans, quests and booth allocation.
//!
//! Every per-account operation runs under that account's lock inside
//! [`AccountStore`]; the booth pool has one pool-wide lock. Durable writes go
//! through the asynchronous [`persistence`] worker and never block a caller.

pub mod accounts;
pub mod booth;
pub mod capabilities;
pub mod catalog;
pub mod currency;
pub mod errors;
pub mod interaction;
pub mod ledger;
pub mod loan;
pub mod persistence;
pub mod quest;
pub mod service;
pub mod storage;
pub mod sweeps;
pub mod types;

pub use accounts::AccountStore;
pub use booth::BoothAllocator;
pub use capabilities::{
    DiscardItems, EntityResolver, ItemRewardSink, MessageSink, NoEntities, NoRegion, Position,
    RegionPredicate, SilentSink,
};
pub use catalog::Catalog;
pub use currency::{format_amount, parse_amount, parse_positive_amount};
pub use errors::EconomyError;
pub use interaction::{CoreCall, InteractionStep, InteractionTracker, PendingAction};
pub use loan::{LoanBook, LoanTerms};
pub use persistence::{start_persistence_worker, PersistStats, PersistenceHandle, RecordWriter};
pub use quest::{ProgressSummary, QuestCompletion, QuestEngine, QuestEventOutcome};
pub use service::{EconomyService, EconomyServiceBuilder};
pub use storage::EconomyStore;
pub use sweeps::{start_sweeps, SweepHandles, SweepIntervals};
pub use types::*;
