//! Currency and quest catalog
//!
//! The catalog is read-only at runtime. It is loaded from two JSON files
//! (`currencies.json`, `quests.json`) so admins can change content without
//! recompiling, and replaced wholesale on an admin reload.

use crate::economy::currency::parse_amount;
use crate::economy::errors::EconomyError;
use crate::economy::types::{
    Currency, ItemSpec, Money, QuestDefinition, QuestEventKind, QuestObjective, QuestRewards,
    RewardAmount,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Currencies and quest definitions known to the economy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    currencies: Vec<Currency>,
    quests: Vec<QuestDefinition>,
}

impl Catalog {
    /// Build a catalog, validating ids and reward ranges.
    pub fn new(
        currencies: Vec<Currency>,
        quests: Vec<QuestDefinition>,
    ) -> Result<Self, EconomyError> {
        let catalog = Self { currencies, quests };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Built-in content written by `questbank init`.
    pub fn defaults() -> Self {
        let currencies = vec![
            Currency::new("gold", "Gold Coin", "G"),
            Currency::new("silver", "Silver Piece", "S"),
        ];
        let quests = vec![
            QuestDefinition::new(
                "diamond_miner",
                QuestObjective::BreakBlock {
                    material: "DIAMOND_ORE".to_string(),
                    amount: 5,
                },
            )
            .with_name("Diamond Miner")
            .with_description("Mine 5 diamond ore for the bank's vault.")
            .with_currency_reward("gold", RewardAmount::Fixed(Money::from_major(50)))
            .with_currency_reward(
                "silver",
                RewardAmount::Range {
                    min: Money::from_major(10),
                    max: Money::from_major(25),
                },
            ),
            QuestDefinition::new(
                "zombie_hunter",
                QuestObjective::KillMob {
                    entity_type: "ZOMBIE".to_string(),
                    amount: 10,
                },
            )
            .with_name("Zombie Hunter")
            .with_description("Clear 10 zombies from the roads.")
            .with_currency_reward(
                "gold",
                RewardAmount::Range {
                    min: Money::from_major(20),
                    max: Money::from_major(40),
                },
            )
            .with_item_reward("IRON_SWORD:1"),
            QuestDefinition::new(
                "master_crafter",
                QuestObjective::CraftItem {
                    material: "CRAFTING_TABLE".to_string(),
                    amount: 3,
                },
            )
            .with_name("Master Crafter")
            .with_description("Craft 3 crafting tables for new settlers.")
            .with_currency_reward("silver", RewardAmount::Fixed(Money::from_major(15))),
        ];
        Self { currencies, quests }
    }

    /// Load both catalog files.
    pub fn load_from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        currencies_path: P,
        quests_path: Q,
    ) -> Result<Self, EconomyError> {
        let currencies = load_currencies_from_json(currencies_path)?;
        let quests = load_quests_from_json(quests_path)?;
        Self::new(currencies, quests)
    }

    /// Write the default catalog, creating parent directories as needed.
    pub fn write_defaults<P: AsRef<Path>, Q: AsRef<Path>>(
        currencies_path: P,
        quests_path: Q,
    ) -> Result<(), EconomyError> {
        Self::defaults().write_to_files(currencies_path, quests_path)
    }

    pub fn write_to_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        currencies_path: P,
        quests_path: Q,
    ) -> Result<(), EconomyError> {
        let currencies: Vec<CurrencySeed> =
            self.currencies.iter().map(CurrencySeed::from).collect();
        let quests: Vec<QuestSeed> = self.quests.iter().map(QuestSeed::from).collect();
        write_json(currencies_path.as_ref(), &currencies)?;
        write_json(quests_path.as_ref(), &quests)?;
        Ok(())
    }

    pub fn currencies(&self) -> &[Currency] {
        &self.currencies
    }

    pub fn currency(&self, key: &str) -> Option<&Currency> {
        self.currencies.iter().find(|c| c.key == key)
    }

    pub fn has_currency(&self, key: &str) -> bool {
        self.currency(key).is_some()
    }

    pub fn quests(&self) -> &[QuestDefinition] {
        &self.quests
    }

    pub fn quest(&self, id: &str) -> Option<&QuestDefinition> {
        self.quests.iter().find(|q| q.id == id)
    }

    fn validate(&self) -> Result<(), EconomyError> {
        let mut seen = HashSet::new();
        for currency in &self.currencies {
            if currency.key.trim().is_empty() {
                return Err(EconomyError::InvalidCatalog(
                    "currency with empty key".to_string(),
                ));
            }
            if !seen.insert(currency.key.as_str()) {
                return Err(EconomyError::InvalidCatalog(format!(
                    "duplicate currency key '{}'",
                    currency.key
                )));
            }
        }

        let mut seen = HashSet::new();
        for quest in &self.quests {
            if !seen.insert(quest.id.as_str()) {
                return Err(EconomyError::InvalidCatalog(format!(
                    "duplicate quest id '{}'",
                    quest.id
                )));
            }
            if quest.objective.required_amount() == 0 {
                return Err(EconomyError::InvalidCatalog(format!(
                    "quest '{}' requires zero progress",
                    quest.id
                )));
            }
            for (currency, reward) in &quest.rewards.currency {
                match reward {
                    RewardAmount::Fixed(amount) if amount.is_negative() => {
                        return Err(EconomyError::InvalidCatalog(format!(
                            "quest '{}' has negative {} reward",
                            quest.id, currency
                        )));
                    }
                    RewardAmount::Range { min, max } if min.is_negative() || min > max => {
                        return Err(EconomyError::InvalidCatalog(format!(
                            "quest '{}' has invalid {} range {}..{}",
                            quest.id, currency, min, max
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

/// Load currencies from a JSON array of `{key, display_name, symbol}`.
pub fn load_currencies_from_json<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<Currency>, EconomyError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let seeds: Vec<CurrencySeed> = serde_json::from_str(&contents).map_err(|e| {
        EconomyError::InvalidCatalog(format!("failed to parse {}: {}", path.display(), e))
    })?;
    Ok(seeds
        .into_iter()
        .map(|seed| Currency::new(&seed.key, &seed.display_name, &seed.symbol))
        .collect())
}

/// Load quest definitions from a JSON array of quest seeds.
pub fn load_quests_from_json<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<QuestDefinition>, EconomyError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let seeds: Vec<QuestSeed> = serde_json::from_str(&contents).map_err(|e| {
        EconomyError::InvalidCatalog(format!("failed to parse {}: {}", path.display(), e))
    })?;
    seeds.into_iter().map(QuestSeed::into_definition).collect()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EconomyError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

// ============================================================================
// Seed data structures (JSON format)
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
struct CurrencySeed {
    key: String,
    #[serde(alias = "displayName")]
    display_name: String,
    #[serde(default)]
    symbol: String,
}

impl From<&Currency> for CurrencySeed {
    fn from(currency: &Currency) -> Self {
        Self {
            key: currency.key.clone(),
            display_name: currency.display_name.clone(),
            symbol: currency.symbol.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct QuestSeed {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    quest_type: String,
    target: TargetSeed,
    #[serde(default)]
    rewards: RewardsSeed,
}

#[derive(Debug, Deserialize, Serialize)]
struct TargetSeed {
    #[serde(
        alias = "material",
        alias = "entity_type",
        alias = "item",
        alias = "crop"
    )]
    identifier: String,
    #[serde(alias = "required_amount")]
    amount: u32,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RewardsSeed {
    /// Each value is a number or decimal string (fixed) or `{min, max}` (range).
    #[serde(default)]
    currency: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    items: Vec<String>,
}

impl QuestSeed {
    fn into_definition(self) -> Result<QuestDefinition, EconomyError> {
        let kind = QuestEventKind::parse(&self.quest_type).ok_or_else(|| {
            EconomyError::InvalidCatalog(format!(
                "quest '{}' has unknown type '{}'",
                self.id, self.quest_type
            ))
        })?;
        let target = self.target.identifier;
        let amount = self.target.amount;
        let objective = match kind {
            QuestEventKind::BreakBlock => QuestObjective::BreakBlock {
                material: target,
                amount,
            },
            QuestEventKind::KillMob => QuestObjective::KillMob {
                entity_type: target,
                amount,
            },
            QuestEventKind::CraftItem => QuestObjective::CraftItem {
                material: target,
                amount,
            },
            QuestEventKind::Fish => QuestObjective::Fish {
                item: target,
                amount,
            },
            QuestEventKind::Harvest => QuestObjective::Harvest {
                crop: target,
                amount,
            },
        };

        let mut currency = BTreeMap::new();
        for (key, value) in self.rewards.currency {
            let reward = parse_reward(&self.id, &key, &value)?;
            currency.insert(key, reward);
        }

        Ok(QuestDefinition {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            description: self.description,
            objective,
            rewards: QuestRewards {
                currency,
                items: self.rewards.items.into_iter().map(ItemSpec).collect(),
            },
        })
    }
}

impl From<&QuestDefinition> for QuestSeed {
    fn from(quest: &QuestDefinition) -> Self {
        let currency = quest
            .rewards
            .currency
            .iter()
            .map(|(key, reward)| {
                let value = match reward {
                    RewardAmount::Fixed(amount) => serde_json::json!(amount.to_string()),
                    RewardAmount::Range { min, max } => serde_json::json!({
                        "min": min.to_string(),
                        "max": max.to_string(),
                    }),
                };
                (key.clone(), value)
            })
            .collect();
        Self {
            id: quest.id.clone(),
            name: Some(quest.name.clone()),
            description: quest.description.clone(),
            quest_type: quest.objective.kind().to_string(),
            target: TargetSeed {
                identifier: quest.objective.target().to_string(),
                amount: quest.objective.required_amount(),
            },
            rewards: RewardsSeed {
                currency,
                items: quest.rewards.items.iter().map(|i| i.0.clone()).collect(),
            },
        }
    }
}

fn parse_reward(
    quest_id: &str,
    currency: &str,
    value: &serde_json::Value,
) -> Result<RewardAmount, EconomyError> {
    let invalid = || {
        EconomyError::InvalidCatalog(format!(
            "quest '{}' has unreadable {} reward: {}",
            quest_id, currency, value
        ))
    };
    let scalar = |v: &serde_json::Value| -> Result<Money, EconomyError> {
        match v {
            // Number's textual form keeps decimal input exact
            serde_json::Value::Number(n) => parse_amount(&n.to_string()).map_err(|_| invalid()),
            serde_json::Value::String(s) => parse_amount(s).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    };
    match value {
        serde_json::Value::Object(map) => {
            let min = map.get("min").ok_or_else(invalid)?;
            let max = map.get("max").ok_or_else(invalid)?;
            Ok(RewardAmount::Range {
                min: scalar(min)?,
                max: scalar(max)?,
            })
        }
        other => Ok(RewardAmount::Fixed(scalar(other)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_survive_write_and_load() {
        let dir = TempDir::new().unwrap();
        let currencies = dir.path().join("catalog/currencies.json");
        let quests = dir.path().join("catalog/quests.json");
        Catalog::write_defaults(&currencies, &quests).unwrap();

        let loaded = Catalog::load_from_files(&currencies, &quests).unwrap();
        assert_eq!(loaded, Catalog::defaults());
    }

    #[test]
    fn parses_hand_written_quest_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quests.json");
        fs::write(
            &path,
            r#"[
                {
                    "id": "angler",
                    "type": "FISH",
                    "target": { "item": "SALMON", "amount": 4 },
                    "rewards": {
                        "currency": { "gold": 12.5, "silver": { "min": 1, "max": "2.50" } },
                        "items": ["FISHING_ROD:1"]
                    }
                }
            ]"#,
        )
        .unwrap();

        let quests = load_quests_from_json(&path).unwrap();
        assert_eq!(quests.len(), 1);
        let quest = &quests[0];
        assert_eq!(quest.name, "angler");
        assert_eq!(quest.objective.kind(), QuestEventKind::Fish);
        assert_eq!(quest.objective.target(), "SALMON");
        assert_eq!(
            quest.rewards.currency.get("gold"),
            Some(&RewardAmount::Fixed(Money::from_minor(1250)))
        );
        assert_eq!(
            quest.rewards.currency.get("silver"),
            Some(&RewardAmount::Range {
                min: Money::from_minor(100),
                max: Money::from_minor(250),
            })
        );
    }

    #[test]
    fn rejects_duplicate_ids_and_inverted_ranges() {
        let objective = QuestObjective::KillMob {
            entity_type: "SPIDER".to_string(),
            amount: 2,
        };
        let dup = Catalog::new(
            vec![],
            vec![
                QuestDefinition::new("a", objective.clone()),
                QuestDefinition::new("a", objective.clone()),
            ],
        );
        assert!(matches!(dup, Err(EconomyError::InvalidCatalog(_))));

        let inverted = Catalog::new(
            vec![],
            vec![QuestDefinition::new("b", objective).with_currency_reward(
                "gold",
                RewardAmount::Range {
                    min: Money::from_major(5),
                    max: Money::from_major(1),
                },
            )],
        );
        assert!(matches!(inverted, Err(EconomyError::InvalidCatalog(_))));
    }

    #[test]
    fn unknown_quest_type_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quests.json");
        fs::write(
            &path,
            r#"[{"id":"x","type":"DANCE","target":{"identifier":"FLOOR","amount":1}}]"#,
        )
        .unwrap();
        assert!(matches!(
            load_quests_from_json(&path),
            Err(EconomyError::InvalidCatalog(_))
        ));
    }
}
