//! Wallet/bank ledger behaviour through the service facade
mod common;

use common::{gold, harness};
use questbank::economy::{EconomyError, Money, Pocket, TransferDirection};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[tokio::test]
async fn deposit_then_withdraw_restores_exact_balances() {
    let h = harness();
    let economy = &h.service;
    economy.on_connect("alice").unwrap();
    economy
        .credit("alice", "gold", Money::from_minor(12_345), Pocket::Wallet)
        .unwrap();

    economy
        .transfer("alice", "gold", gold(50), TransferDirection::Deposit)
        .unwrap();
    assert_eq!(
        economy.get_balance("alice", "gold", Pocket::Wallet),
        Money::from_minor(7_345)
    );
    assert_eq!(economy.get_balance("alice", "gold", Pocket::Bank), gold(50));

    economy
        .transfer("alice", "gold", gold(50), TransferDirection::Withdraw)
        .unwrap();
    assert_eq!(
        economy.get_balance("alice", "gold", Pocket::Wallet),
        Money::from_minor(12_345)
    );
    assert_eq!(economy.get_balance("alice", "gold", Pocket::Bank), Money::ZERO);
}

#[tokio::test]
async fn failed_transfers_leave_both_pockets_untouched() {
    let h = harness();
    let economy = &h.service;
    economy.on_connect("alice").unwrap();
    economy.credit("alice", "gold", gold(10), Pocket::Wallet).unwrap();

    assert!(matches!(
        economy.transfer("alice", "gold", gold(11), TransferDirection::Deposit),
        Err(EconomyError::InsufficientFunds { .. })
    ));
    assert!(matches!(
        economy.transfer("alice", "gold", Money::ZERO, TransferDirection::Deposit),
        Err(EconomyError::InvalidAmount(_))
    ));
    assert!(matches!(
        economy.transfer("alice", "rubies", gold(1), TransferDirection::Deposit),
        Err(EconomyError::UnknownCurrency(_))
    ));

    let (wallet, bank) = economy.balances("alice").unwrap();
    assert_eq!(wallet.get("gold"), Some(&gold(10)));
    assert!(bank.is_empty());
}

#[tokio::test]
async fn unknown_accounts_and_currencies_read_zero() {
    let h = harness();
    let economy = &h.service;
    assert_eq!(economy.get_balance("nobody", "gold", Pocket::Wallet), Money::ZERO);

    economy.on_connect("alice").unwrap();
    assert_eq!(
        economy.get_balance("alice", "platinum", Pocket::Bank),
        Money::ZERO
    );
    assert!(matches!(
        economy.credit("nobody", "gold", gold(1), Pocket::Wallet),
        Err(EconomyError::AccountNotLoaded(_))
    ));
}

#[tokio::test]
async fn random_operation_sequences_never_go_negative() {
    let h = harness();
    let economy = &h.service;
    economy.on_connect("alice").unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..500 {
        let amount = Money::from_minor(rng.gen_range(-50..5_000));
        let currency = if rng.gen_bool(0.5) { "gold" } else { "silver" };
        let _ = match rng.gen_range(0..4) {
            0 => economy.credit("alice", currency, amount, Pocket::Wallet),
            1 => economy.transfer("alice", currency, amount, TransferDirection::Deposit),
            2 => economy.transfer("alice", currency, amount, TransferDirection::Withdraw),
            _ => economy.debit("alice", currency, amount, Pocket::Bank),
        };
        for currency in ["gold", "silver"] {
            for pocket in [Pocket::Wallet, Pocket::Bank] {
                assert!(!economy.get_balance("alice", currency, pocket).is_negative());
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transfers_on_one_account_conserve_money() {
    let h = harness();
    let economy = &h.service;
    economy.on_connect("alice").unwrap();
    economy.credit("alice", "gold", gold(1_000), Pocket::Wallet).unwrap();

    std::thread::scope(|scope| {
        for worker in 0..8 {
            scope.spawn(move || {
                let direction = if worker % 2 == 0 {
                    TransferDirection::Deposit
                } else {
                    TransferDirection::Withdraw
                };
                for _ in 0..200 {
                    let _ = economy.transfer("alice", "gold", Money::from_minor(137), direction);
                }
            });
        }
    });

    let wallet = economy.get_balance("alice", "gold", Pocket::Wallet);
    let bank = economy.get_balance("alice", "gold", Pocket::Bank);
    assert_eq!(wallet.checked_add(bank), Some(gold(1_000)));
}
