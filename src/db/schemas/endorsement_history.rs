//! Endorsement history document schema
//!
//! One document per (user, endorsed entity) pair, keyed by the composite
//! string `{userId}_{entityType}_{entityId}`. The document embeds the full
//! sequence of endorsement periods; the "current" state (endorsed right now,
//! at which rank, since when) is derived from the single open period rather
//! than persisted as separate fields.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for endorsement histories
pub const ENDORSEMENT_HISTORY_COLLECTION: &str = "endorsement_histories";

/// Kind of entity a user can endorse
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[default]
    Brand,
    Business,
    Place,
    Value,
}

impl EntityType {
    /// Stable string form, used in composite keys and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Brand => "brand",
            EntityType::Business => "business",
            EntityType::Place => "place",
            EntityType::Value => "value",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brand" => Ok(EntityType::Brand),
            "business" => Ok(EntityType::Business),
            "place" => Ok(EntityType::Place),
            "value" => Ok(EntityType::Value),
            other => Err(format!("Unknown entity type: {}", other)),
        }
    }
}

/// Composite document key for a (user, entity) history
pub fn history_id(user_id: &str, entity_type: EntityType, entity_id: &str) -> String {
    format!("{}_{}_{}", user_id, entity_type.as_str(), entity_id)
}

/// A recorded rank change within a period
///
/// Appended in arrival order; NOT guaranteed sorted by date. Consumers
/// must sort before walking the history.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionChange {
    pub date: DateTime,
    pub position: i32,
}

/// One contiguous span during which the user endorsed the entity
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EndorsementPeriod {
    /// Process-unique period identifier
    pub id: String,

    pub start_date: DateTime,

    /// `None` means the period is currently active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime>,

    /// Rank at period start (1 = highest)
    pub start_position: i32,

    /// Rank changes within the period, unsorted
    #[serde(default)]
    pub position_history: Vec<PositionChange>,

    /// Day counts, computed when the period closes. Zero and provisional
    /// while the period is open; readers recompute from `start_date`..now.
    #[serde(default)]
    pub days_in_period: i64,
    #[serde(default)]
    pub days_in_top5: i64,
    #[serde(default)]
    pub days_in_top10: i64,
}

impl EndorsementPeriod {
    /// Create a fresh open period
    pub fn open(start_date: DateTime, start_position: i32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start_date,
            end_date: None,
            start_position,
            position_history: Vec::new(),
            days_in_period: 0,
            days_in_top5: 0,
            days_in_top10: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }

    /// The rank in effect at the end of the recorded history
    ///
    /// Sorts the position history by date before picking the last entry,
    /// since insertion order is not trusted.
    pub fn latest_position(&self) -> i32 {
        self.position_history
            .iter()
            .max_by_key(|c| c.date.timestamp_millis())
            .map(|c| c.position)
            .unwrap_or(self.start_position)
    }
}

/// Endorsement history document, one per user x entity
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct EndorsementHistoryDoc {
    /// Composite key: `{userId}_{entityType}_{entityId}`
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub mongo_id: Option<String>,

    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,

    /// Display name, refreshed on writes that carry one
    pub entity_name: String,

    /// Cumulative totals over CLOSED periods only. The open period's
    /// contribution is computed live at read time, never persisted here
    /// until the period closes.
    #[serde(default)]
    pub total_days_endorsed: i64,
    #[serde(default)]
    pub total_days_in_top5: i64,
    #[serde(default)]
    pub total_days_in_top10: i64,

    /// Periods in append order; admin inserts re-sort by start date
    #[serde(default)]
    pub periods: Vec<EndorsementPeriod>,

    /// Optimistic-concurrency version, bumped on every write
    #[serde(default)]
    pub revision: i64,

    /// Common metadata (created_at, updated_at, soft delete)
    #[serde(default)]
    pub metadata: Metadata,
}

impl EndorsementHistoryDoc {
    /// Create a new history document with no periods yet
    pub fn new(
        user_id: impl Into<String>,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: impl Into<String>,
    ) -> Self {
        let user_id = user_id.into();
        let entity_id = entity_id.into();
        Self {
            mongo_id: Some(history_id(&user_id, entity_type, &entity_id)),
            user_id,
            entity_type,
            entity_id,
            entity_name: entity_name.into(),
            total_days_endorsed: 0,
            total_days_in_top5: 0,
            total_days_in_top10: 0,
            periods: Vec::new(),
            revision: 0,
            metadata: Metadata::new(),
        }
    }

    /// The document key
    pub fn id(&self) -> String {
        self.mongo_id
            .clone()
            .unwrap_or_else(|| history_id(&self.user_id, self.entity_type, &self.entity_id))
    }

    /// The single open period, if any
    ///
    /// Invariant: at most one period has `end_date == None`.
    pub fn open_period(&self) -> Option<&EndorsementPeriod> {
        self.periods.iter().find(|p| p.is_open())
    }

    pub fn open_period_mut(&mut self) -> Option<&mut EndorsementPeriod> {
        self.periods.iter_mut().find(|p| p.is_open())
    }

    /// Derived: is the user currently endorsing this entity?
    pub fn is_currently_endorsed(&self) -> bool {
        self.open_period().is_some()
    }

    /// Derived: the current rank, from the open period's latest position
    pub fn current_position(&self) -> Option<i32> {
        self.open_period().map(|p| p.latest_position())
    }

    /// Derived: when the current endorsement span began
    pub fn current_period_start(&self) -> Option<DateTime> {
        self.open_period().map(|p| p.start_date)
    }

    /// Re-sort periods chronologically by start date
    pub fn sort_periods(&mut self) {
        self.periods
            .sort_by_key(|p| p.start_date.timestamp_millis());
    }
}

impl IntoIndexes for EndorsementHistoryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // All histories for a user (bonus days, profile listing, purge)
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_id_index".to_string())
                        .build(),
                ),
            ),
            // Lookups by entity across users
            (
                doc! { "entity_type": 1, "entity_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("entity_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for EndorsementHistoryDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
