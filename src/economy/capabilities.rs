//! Host-provided capabilities the economy calls out to.
//!
//! World geometry, entity targeting, chat delivery and inventories belong to
//! the host. The core only sees these traits.

use crate::economy::types::ItemSpec;
use log::debug;
use serde::{Deserialize, Serialize};

/// A point in a host world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(world: &str, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.to_string(),
            x,
            y,
            z,
        }
    }
}

/// Bank-region containment test.
pub trait RegionPredicate: Send + Sync {
    fn in_bank_region(&self, position: &Position) -> bool;
}

/// Maps a host entity reference (e.g. the killer of a mob) to an account id.
pub trait EntityResolver: Send + Sync {
    fn account_for_entity(&self, entity_ref: &str) -> Option<String>;
}

/// Player notifications.
pub trait MessageSink: Send + Sync {
    fn deliver(&self, account_id: &str, text: &str);
}

/// Receives item rewards; the item string is passed through untouched.
pub trait ItemRewardSink: Send + Sync {
    fn grant(&self, account_id: &str, item: &ItemSpec);
}

/// No bank region anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRegion;

impl RegionPredicate for NoRegion {
    fn in_bank_region(&self, _position: &Position) -> bool {
        false
    }
}

/// Resolves no entity.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEntities;

impl EntityResolver for NoEntities {
    fn account_for_entity(&self, _entity_ref: &str) -> Option<String> {
        None
    }
}

/// Drops messages after logging them at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl MessageSink for SilentSink {
    fn deliver(&self, account_id: &str, text: &str) {
        debug!("message to {} dropped: {}", account_id, text);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardItems;

impl ItemRewardSink for DiscardItems {
    fn grant(&self, account_id: &str, item: &ItemSpec) {
        debug!("item reward {} for {} discarded", item.0, account_id);
    }
}
