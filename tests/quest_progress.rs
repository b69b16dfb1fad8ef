//! Quest assignment, event matching, completion payouts and catalog reloads
mod common;

use common::{gold, harness, harness_with};
use questbank::economy::{
    Catalog, Currency, EconomyError, ItemSpec, LoanTerms, Money, Pocket, QuestDefinition,
    QuestEventKind, QuestEventOutcome, QuestObjective, RewardAmount,
};

fn zombie_catalog() -> Catalog {
    Catalog::new(
        vec![
            Currency::new("gold", "Gold Coin", "G"),
            Currency::new("silver", "Silver Piece", "S"),
        ],
        vec![QuestDefinition::new(
            "zombies",
            QuestObjective::KillMob {
                entity_type: "ZOMBIE".to_string(),
                amount: 3,
            },
        )
        .with_name("Zombie Hunter")
        .with_currency_reward("gold", RewardAmount::Fixed(gold(25)))
        .with_currency_reward(
            "silver",
            RewardAmount::Range {
                min: gold(5),
                max: gold(10),
            },
        )
        .with_item_reward("IRON_SWORD:1")],
    )
    .unwrap()
}

#[tokio::test]
async fn second_assignment_is_rejected() {
    let h = harness();
    let economy = &h.service;
    economy.on_connect("alice").unwrap();

    let quest = economy.assign_quest("alice").unwrap();
    assert!(Catalog::defaults().quest(&quest.id).is_some());
    assert!(matches!(
        economy.assign_quest("alice"),
        Err(EconomyError::QuestAlreadyActive(_))
    ));
    assert!(h
        .messages
        .messages_for("alice")
        .iter()
        .any(|m| m.starts_with("New quest:")));
}

#[tokio::test]
async fn empty_catalog_reports_no_quests() {
    let h = harness_with(Catalog::default(), LoanTerms::default());
    h.service.on_connect("alice").unwrap();
    assert!(matches!(
        h.service.assign_quest("alice"),
        Err(EconomyError::NoQuestsDefined)
    ));
}

#[tokio::test]
async fn mismatched_events_never_count() {
    let h = harness_with(zombie_catalog(), LoanTerms::default());
    let economy = &h.service;
    economy.on_connect("alice").unwrap();
    economy.assign_quest("alice").unwrap();

    let misses = [
        (QuestEventKind::KillMob, "SKELETON"),
        (QuestEventKind::BreakBlock, "ZOMBIE"),
        (QuestEventKind::CraftItem, "zombie"),
    ];
    for (kind, target) in misses {
        assert_eq!(
            economy.record_event("alice", kind, target, 5).unwrap(),
            QuestEventOutcome::Ignored
        );
    }
    let summary = economy.progress_summary("alice").unwrap().unwrap();
    assert_eq!(summary.current, 0);

    // events without an active quest are ignored too
    economy.on_connect("bob").unwrap();
    assert_eq!(
        economy
            .record_event("bob", QuestEventKind::KillMob, "ZOMBIE", 1)
            .unwrap(),
        QuestEventOutcome::Ignored
    );
}

#[tokio::test]
async fn reaching_the_target_completes_exactly_once() {
    let h = harness_with(zombie_catalog(), LoanTerms::default());
    let economy = &h.service;
    economy.on_connect("alice").unwrap();
    economy.assign_quest("alice").unwrap();

    for expected in 1..=2 {
        assert_eq!(
            economy
                .record_event("alice", QuestEventKind::KillMob, "zombie", 1)
                .unwrap(),
            QuestEventOutcome::Progressed {
                current: expected,
                required: 3
            }
        );
    }
    let outcome = economy
        .record_event("alice", QuestEventKind::KillMob, "Zombie", 1)
        .unwrap();
    let QuestEventOutcome::Completed(completion) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(completion.quest_name, "Zombie Hunter");

    assert_eq!(economy.get_balance("alice", "gold", Pocket::Bank), gold(25));
    assert_eq!(economy.get_balance("alice", "gold", Pocket::Wallet), Money::ZERO);
    let silver = economy.get_balance("alice", "silver", Pocket::Bank);
    assert!(silver >= gold(5) && silver <= gold(10));
    assert_eq!(
        h.items.grants(),
        vec![("alice".to_string(), ItemSpec("IRON_SWORD:1".to_string()))]
    );
    assert_eq!(economy.progress_summary("alice").unwrap(), None);

    // duplicate trigger after completion pays nothing
    assert_eq!(
        economy
            .record_event("alice", QuestEventKind::KillMob, "ZOMBIE", 1)
            .unwrap(),
        QuestEventOutcome::Ignored
    );
    assert_eq!(economy.get_balance("alice", "gold", Pocket::Bank), gold(25));
    assert_eq!(h.items.grants().len(), 1);

    // and a new quest can be taken
    assert!(economy.assign_quest("alice").is_ok());
}

#[tokio::test]
async fn overshooting_in_one_event_still_completes() {
    let h = harness_with(zombie_catalog(), LoanTerms::default());
    let economy = &h.service;
    economy.on_connect("alice").unwrap();
    economy.assign_quest("alice").unwrap();
    assert!(matches!(
        economy
            .record_event("alice", QuestEventKind::KillMob, "ZOMBIE", 10)
            .unwrap(),
        QuestEventOutcome::Completed(_)
    ));
}

#[tokio::test]
async fn entity_events_resolve_to_accounts() {
    let h = harness_with(zombie_catalog(), LoanTerms::default());
    let economy = &h.service;
    economy.on_connect("alice").unwrap();
    economy.assign_quest("alice").unwrap();

    let outcome = economy
        .record_entity_event("entity-17", QuestEventKind::KillMob, "ZOMBIE", 2)
        .unwrap();
    assert_eq!(
        outcome,
        Some(QuestEventOutcome::Progressed {
            current: 2,
            required: 3
        })
    );
    assert_eq!(
        economy
            .record_entity_event("entity-99", QuestEventKind::KillMob, "ZOMBIE", 1)
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn reload_that_drops_the_active_quest() {
    let h = harness_with(zombie_catalog(), LoanTerms::default());
    let economy = &h.service;
    economy.on_connect("alice").unwrap();
    economy.assign_quest("alice").unwrap();

    economy.reload_catalog(Catalog::defaults());
    assert!(matches!(
        economy.progress_summary("alice"),
        Err(EconomyError::QuestNotFound(_))
    ));
    assert_eq!(
        economy
            .record_event("alice", QuestEventKind::KillMob, "ZOMBIE", 3)
            .unwrap(),
        QuestEventOutcome::Ignored
    );

    assert_eq!(economy.abandon_quest("alice").unwrap(), "zombies");
    assert!(matches!(
        economy.abandon_quest("alice"),
        Err(EconomyError::NoActiveQuest)
    ));
    assert!(economy.assign_quest("alice").is_ok());
}

#[tokio::test]
async fn reload_from_files_swaps_catalog() {
    let h = harness();
    let files = tempfile::tempdir().unwrap();
    let currencies = files.path().join("catalog/currencies.json");
    let quests = files.path().join("catalog/quests.json");
    zombie_catalog().write_to_files(&currencies, &quests).unwrap();

    h.service
        .reload_catalog_from_files(&currencies, &quests)
        .unwrap();
    let catalog = h.service.catalog();
    assert_eq!(catalog.quests().len(), 1);
    assert_eq!(catalog.quests()[0].id, "zombies");
}
