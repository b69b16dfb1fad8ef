//! Test utilities & fixtures.
//! Builds an `EconomyService` over a temporary sled store with recording sinks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use questbank::economy::{
    Catalog, EconomyService, EconomyStore, EntityResolver, ItemRewardSink, ItemSpec, LoanTerms,
    MessageSink, Money, Position, RegionPredicate,
};
use tempfile::TempDir;

/// Collects every message delivered to players.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    #[allow(dead_code)]
    pub fn messages_for(&self, account: &str) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == account)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl MessageSink for RecordingSink {
    fn deliver(&self, account_id: &str, text: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((account_id.to_string(), text.to_string()));
    }
}

/// Collects item rewards instead of touching an inventory.
#[derive(Default)]
pub struct RecordingItems {
    grants: Mutex<Vec<(String, ItemSpec)>>,
}

impl RecordingItems {
    #[allow(dead_code)]
    pub fn grants(&self) -> Vec<(String, ItemSpec)> {
        self.grants.lock().unwrap().clone()
    }
}

impl ItemRewardSink for RecordingItems {
    fn grant(&self, account_id: &str, item: &ItemSpec) {
        self.grants
            .lock()
            .unwrap()
            .push((account_id.to_string(), item.clone()));
    }
}

/// Maps entity references to accounts from a fixed table.
#[derive(Default)]
pub struct TableResolver(pub HashMap<String, String>);

impl EntityResolver for TableResolver {
    fn account_for_entity(&self, entity_ref: &str) -> Option<String> {
        self.0.get(entity_ref).cloned()
    }
}

/// Bank region is every position in the world named "bank".
pub struct BankWorld;

impl RegionPredicate for BankWorld {
    fn in_bank_region(&self, position: &Position) -> bool {
        position.world == "bank"
    }
}

#[allow(dead_code)]
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<EconomyStore>,
    pub service: EconomyService,
    pub messages: Arc<RecordingSink>,
    pub items: Arc<RecordingItems>,
}

/// Default catalog and loan terms. Must be called inside a tokio runtime.
#[allow(dead_code)]
pub fn harness() -> Harness {
    harness_with(Catalog::defaults(), LoanTerms::default())
}

#[allow(dead_code)]
pub fn harness_with(catalog: Catalog, terms: LoanTerms) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(EconomyStore::open(dir.path()).expect("open store"));
    let messages = Arc::new(RecordingSink::default());
    let items = Arc::new(RecordingItems::default());
    let mut resolver = TableResolver::default();
    resolver
        .0
        .insert("entity-17".to_string(), "alice".to_string());

    let service = EconomyService::builder(store.clone(), catalog)
        .with_loan_terms(terms)
        .with_quest_seed(42)
        .with_message_sink(messages.clone())
        .with_item_sink(items.clone())
        .with_entities(Arc::new(resolver))
        .with_region(Arc::new(BankWorld))
        .build()
        .expect("build service");

    Harness {
        dir,
        store,
        service,
        messages,
        items,
    }
}

#[allow(dead_code)]
pub fn gold(major: i64) -> Money {
    Money::from_major(major)
}
