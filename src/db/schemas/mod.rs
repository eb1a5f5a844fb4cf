//! Document schemas

pub mod endorsement_history;
pub mod metadata;

pub use endorsement_history::{
    history_id, EndorsementHistoryDoc, EndorsementPeriod, EntityType, PositionChange,
    ENDORSEMENT_HISTORY_COLLECTION,
};
pub use metadata::Metadata;
