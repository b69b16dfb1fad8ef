//! # Questbank - in-game economy core
//!
//! Questbank backs a multiplayer game economy: per-player currency balances
//! split between a carried wallet and a secured bank, interest-bearing loans,
//! a quest loop with currency and item rewards, and a finite pool of bank
//! booths assigned to connected players.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use questbank::economy::{Catalog, EconomyService, EconomyStore, Money, TransferDirection};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(EconomyStore::open("data/economy")?);
//!     let economy = EconomyService::builder(store, Catalog::defaults()).build()?;
//!
//!     economy.on_connect("steve")?;
//!     economy.request_loan("steve", Money::from_major(100))?;
//!     economy.transfer("steve", "gold", Money::from_major(40), TransferDirection::Deposit)?;
//!     economy.on_disconnect("steve");
//!
//!     economy.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`economy`] - ledger, loans, quests, booths, accounts and persistence
//! - [`config`] - TOML configuration and validation

pub mod config;
pub mod economy;
