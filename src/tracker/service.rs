//! Endorsement period tracking service
//!
//! Maintains, per (user, entity) pair, the history of endorsement periods
//! and the cumulative day totals derived from them. Every mutation is a
//! read, an in-memory rewrite, and a compare-and-swap write; a concurrent
//! writer surfaces as a conflict for the caller to handle.

use bson::DateTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::schemas::{
    history_id, EndorsementHistoryDoc, EndorsementPeriod, EntityType, PositionChange,
};
use crate::tracker::daycount::{count_period_days, BACKDATE_POSITION};
use crate::tracker::store::HistoryStore;
use crate::types::{Result, TrackerError};

/// Cumulative read-path summary for one history
///
/// The totals are `stored + live contribution of the open period`, so the
/// read path never writes anything back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeTotals {
    pub total_days_endorsed: i64,
    pub total_days_in_top5: i64,
    pub total_days_in_top10: i64,
    pub is_currently_endorsed: bool,
    pub current_position: Option<i32>,
}

/// Partial overwrite of stored totals (admin corrective edits)
///
/// Fields left `None` are untouched; provided fields are written verbatim
/// with no recomputation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TotalsPatch {
    pub total_days_endorsed: Option<i64>,
    pub total_days_in_top5: Option<i64>,
    pub total_days_in_top10: Option<i64>,
}

/// Evaluate a history's cumulative totals as of `now`
///
/// Applies the same day-counting walk used at close time to the open
/// period, with `now` as the provisional end date.
pub fn cumulative_at(doc: &EndorsementHistoryDoc, now: DateTime) -> CumulativeTotals {
    let mut totals = CumulativeTotals {
        total_days_endorsed: doc.total_days_endorsed,
        total_days_in_top5: doc.total_days_in_top5,
        total_days_in_top10: doc.total_days_in_top10,
        is_currently_endorsed: false,
        current_position: None,
    };

    if let Some(open) = doc.open_period() {
        let live = count_period_days(
            open.start_date,
            open.start_position,
            &open.position_history,
            now,
        );
        totals.total_days_endorsed += live.days_in_period;
        totals.total_days_in_top5 += live.days_in_top5;
        totals.total_days_in_top10 += live.days_in_top10;
        totals.is_currently_endorsed = true;
        totals.current_position = Some(open.latest_position());
    }

    totals
}

/// Recompute all three totals from scratch as the sum over closed periods
///
/// Never incremental, so partial updates cannot drift the totals. Note
/// that this deliberately discards any verbatim admin overwrite or bonus
/// days the next time a period closes; bonus days are advisory.
fn recompute_totals(doc: &mut EndorsementHistoryDoc) {
    let closed = doc.periods.iter().filter(|p| !p.is_open());
    let (mut endorsed, mut top5, mut top10) = (0i64, 0i64, 0i64);
    for p in closed {
        endorsed += p.days_in_period;
        top5 += p.days_in_top5;
        top10 += p.days_in_top10;
    }
    doc.total_days_endorsed = endorsed;
    doc.total_days_in_top5 = top5;
    doc.total_days_in_top10 = top10;
}

/// The endorsement period tracker
pub struct EndorsementTracker {
    store: Arc<dyn HistoryStore>,
}

impl EndorsementTracker {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Start an endorsement period
    ///
    /// Lazily creates the history on first contact. If a period is already
    /// open this degrades to a position update: no duplicate period is ever
    /// created, so repeated calls are idempotent. `start_date` supports
    /// backdating and defaults to now.
    pub async fn start_period(
        &self,
        user_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        entity_name: &str,
        position: Option<i32>,
        start_date: Option<DateTime>,
    ) -> Result<EndorsementHistoryDoc> {
        let position = position.unwrap_or(1);
        let id = history_id(user_id, entity_type, entity_id);

        match self.store.get(&id).await? {
            None => {
                let mut doc =
                    EndorsementHistoryDoc::new(user_id, entity_type, entity_id, entity_name);
                doc.periods.push(EndorsementPeriod::open(
                    start_date.unwrap_or_else(DateTime::now),
                    position,
                ));
                self.store.insert(doc.clone()).await?;
                info!(history = %id, position = position, "Started first endorsement period");
                Ok(doc)
            }
            Some(mut doc) => {
                let expected = doc.revision;
                doc.entity_name = entity_name.to_string();

                if let Some(open) = doc.open_period_mut() {
                    // Already endorsed: merge into a position update
                    open.position_history.push(PositionChange {
                        date: DateTime::now(),
                        position,
                    });
                    debug!(history = %id, position = position, "Period already open, updated position");
                } else {
                    doc.periods.push(EndorsementPeriod::open(
                        start_date.unwrap_or_else(DateTime::now),
                        position,
                    ));
                    info!(history = %id, position = position, "Started endorsement period");
                }

                doc.revision += 1;
                self.store.replace(doc.clone(), expected).await?;
                Ok(doc)
            }
        }
    }

    /// End the open endorsement period
    ///
    /// Returns `None` when no history exists, and the unmodified record
    /// when no period is open. Closing computes the period's day counts and
    /// recomputes the cumulative totals over closed periods.
    pub async fn end_period(
        &self,
        user_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        end_date: Option<DateTime>,
    ) -> Result<Option<EndorsementHistoryDoc>> {
        let id = history_id(user_id, entity_type, entity_id);

        let Some(mut doc) = self.store.get(&id).await? else {
            return Ok(None);
        };
        if doc.open_period().is_none() {
            debug!(history = %id, "No open period to end");
            return Ok(Some(doc));
        }

        let expected = doc.revision;
        let end = end_date.unwrap_or_else(DateTime::now);

        if let Some(open) = doc.open_period_mut() {
            let totals =
                count_period_days(open.start_date, open.start_position, &open.position_history, end);
            open.end_date = Some(end);
            open.days_in_period = totals.days_in_period;
            open.days_in_top5 = totals.days_in_top5;
            open.days_in_top10 = totals.days_in_top10;
        }
        recompute_totals(&mut doc);
        doc.revision += 1;

        self.store.replace(doc.clone(), expected).await?;
        info!(
            history = %id,
            total_days = doc.total_days_endorsed,
            "Ended endorsement period"
        );
        Ok(Some(doc))
    }

    /// Record a rank change within the open period
    ///
    /// No-op when the history is missing (`None`) or no period is open
    /// (unmodified record). Totals are untouched; they are realized at
    /// close time or computed live at read time.
    pub async fn update_position(
        &self,
        user_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        new_position: i32,
    ) -> Result<Option<EndorsementHistoryDoc>> {
        let id = history_id(user_id, entity_type, entity_id);

        let Some(mut doc) = self.store.get(&id).await? else {
            return Ok(None);
        };
        if doc.open_period().is_none() {
            return Ok(Some(doc));
        }

        let expected = doc.revision;
        if let Some(open) = doc.open_period_mut() {
            open.position_history.push(PositionChange {
                date: DateTime::now(),
                position: new_position,
            });
        }
        doc.revision += 1;

        self.store.replace(doc.clone(), expected).await?;
        debug!(history = %id, position = new_position, "Updated position");
        Ok(Some(doc))
    }

    /// Read the cumulative totals for a (user, entity) pair
    ///
    /// Side-effect free: the open period's contribution is computed with
    /// now as the provisional end, nothing is persisted. A missing history
    /// reads as all zeroes.
    pub async fn get_cumulative(
        &self,
        user_id: &str,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<CumulativeTotals> {
        let id = history_id(user_id, entity_type, entity_id);
        Ok(self
            .store
            .get(&id)
            .await?
            .map(|doc| cumulative_at(&doc, DateTime::now()))
            .unwrap_or_default())
    }

    /// All histories for a user
    pub async fn list_histories(&self, user_id: &str) -> Result<Vec<EndorsementHistoryDoc>> {
        self.store.list_for_user(user_id).await
    }

    /// Admin: backdate the start of the current endorsement
    ///
    /// Destructively rewrites the open period (or creates one): the span
    /// from `new_start_date` to now runs at the sentinel position, earning
    /// days-endorsed credit but never top-5/top-10 credit, and the position
    /// history restarts at the previously-current rank (or 1). Prior rank
    /// changes in the open period are discarded.
    pub async fn admin_backdate(
        &self,
        user_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        entity_name: &str,
        new_start_date: DateTime,
    ) -> Result<()> {
        let id = history_id(user_id, entity_type, entity_id);
        let resume_at = DateTime::now();

        match self.store.get(&id).await? {
            None => {
                let mut doc =
                    EndorsementHistoryDoc::new(user_id, entity_type, entity_id, entity_name);
                doc.periods
                    .push(backdated_open_period(new_start_date, resume_at, 1));
                self.store.insert(doc).await?;
            }
            Some(mut doc) => {
                let expected = doc.revision;
                doc.entity_name = entity_name.to_string();
                let resume_position = doc.current_position().unwrap_or(1);

                if let Some(open) = doc.open_period_mut() {
                    open.start_date = new_start_date;
                    open.start_position = BACKDATE_POSITION;
                    open.position_history = vec![PositionChange {
                        date: resume_at,
                        position: resume_position,
                    }];
                    open.days_in_period = 0;
                    open.days_in_top5 = 0;
                    open.days_in_top10 = 0;
                } else {
                    doc.periods.push(backdated_open_period(
                        new_start_date,
                        resume_at,
                        resume_position,
                    ));
                }

                doc.revision += 1;
                self.store.replace(doc, expected).await?;
            }
        }

        info!(history = %id, "Backdated endorsement start");
        Ok(())
    }

    /// Admin: insert a historical period wholesale
    ///
    /// Day counts are precomputed from the span alone (no rank changes are
    /// known for historical data). A `None` end date inserts an open-ended
    /// period, rejected if one is already open. Periods are re-sorted by
    /// start date and totals recomputed over closed periods.
    pub async fn admin_add_backdated_period(
        &self,
        user_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        entity_name: &str,
        start_date: DateTime,
        end_date: Option<DateTime>,
        start_position: i32,
    ) -> Result<EndorsementHistoryDoc> {
        let id = history_id(user_id, entity_type, entity_id);
        let existing = self.store.get(&id).await?;
        let is_new = existing.is_none();

        let mut doc = existing.unwrap_or_else(|| {
            EndorsementHistoryDoc::new(user_id, entity_type, entity_id, entity_name)
        });
        let expected = doc.revision;
        doc.entity_name = entity_name.to_string();

        if end_date.is_none() && doc.open_period().is_some() {
            return Err(TrackerError::Conflict(format!(
                "History {} already has an open period",
                id
            )));
        }

        let mut period = EndorsementPeriod::open(start_date, start_position);
        if let Some(end) = end_date {
            let totals = count_period_days(start_date, start_position, &[], end);
            period.end_date = Some(end);
            period.days_in_period = totals.days_in_period;
            period.days_in_top5 = totals.days_in_top5;
            period.days_in_top10 = totals.days_in_top10;
        }
        doc.periods.push(period);
        doc.sort_periods();
        recompute_totals(&mut doc);

        if is_new {
            self.store.insert(doc.clone()).await?;
        } else {
            doc.revision += 1;
            self.store.replace(doc.clone(), expected).await?;
        }

        info!(history = %id, "Added backdated period");
        Ok(doc)
    }

    /// Admin: remove a period outright, then recompute totals
    pub async fn admin_delete_period(&self, history_id: &str, period_id: &str) -> Result<()> {
        let Some(mut doc) = self.store.get(history_id).await? else {
            return Err(TrackerError::NotFound(format!(
                "History not found: {}",
                history_id
            )));
        };

        let before = doc.periods.len();
        doc.periods.retain(|p| p.id != period_id);
        if doc.periods.len() == before {
            return Err(TrackerError::NotFound(format!(
                "Period not found: {}",
                period_id
            )));
        }

        let expected = doc.revision;
        recompute_totals(&mut doc);
        doc.revision += 1;
        self.store.replace(doc, expected).await?;

        info!(history = %history_id, period = %period_id, "Deleted period");
        Ok(())
    }

    /// Admin: overwrite stored totals verbatim, no recomputation
    pub async fn admin_set_totals(&self, history_id: &str, patch: TotalsPatch) -> Result<()> {
        let Some(mut doc) = self.store.get(history_id).await? else {
            return Err(TrackerError::NotFound(format!(
                "History not found: {}",
                history_id
            )));
        };

        let expected = doc.revision;
        if let Some(v) = patch.total_days_endorsed {
            doc.total_days_endorsed = v;
        }
        if let Some(v) = patch.total_days_in_top5 {
            doc.total_days_in_top5 = v;
        }
        if let Some(v) = patch.total_days_in_top10 {
            doc.total_days_in_top10 = v;
        }
        doc.revision += 1;
        self.store.replace(doc, expected).await?;

        info!(history = %history_id, "Overwrote totals");
        Ok(())
    }

    /// Add referral bonus days to every history of a user
    ///
    /// Bonus days are not tied to any ranked period, so they only ever
    /// raise `total_days_endorsed`. Returns the number of records updated.
    /// The value is applied as-is; validating it is the caller's job.
    pub async fn add_bonus_days(&self, user_id: &str, bonus_days: i64) -> Result<u64> {
        let histories = self.store.list_for_user(user_id).await?;
        let mut updated = 0u64;

        for mut doc in histories {
            let expected = doc.revision;
            doc.total_days_endorsed += bonus_days;
            doc.revision += 1;
            self.store.replace(doc, expected).await?;
            updated += 1;
        }

        info!(user = %user_id, bonus_days = bonus_days, updated = updated, "Added bonus days");
        Ok(updated)
    }

    /// Remove every history of a user (account deletion)
    pub async fn purge_user(&self, user_id: &str) -> Result<u64> {
        let purged = self.store.purge_user(user_id).await?;
        info!(user = %user_id, purged = purged, "Purged endorsement histories");
        Ok(purged)
    }
}

fn backdated_open_period(
    start_date: DateTime,
    resume_at: DateTime,
    resume_position: i32,
) -> EndorsementPeriod {
    let mut period = EndorsementPeriod::open(start_date, BACKDATE_POSITION);
    period.position_history.push(PositionChange {
        date: resume_at,
        position: resume_position,
    });
    period
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::daycount::MS_PER_DAY;
    use crate::tracker::store::MemoryHistoryStore;

    fn tracker() -> EndorsementTracker {
        EndorsementTracker::new(Arc::new(MemoryHistoryStore::new()))
    }

    fn at_day(n: i64) -> DateTime {
        DateTime::from_millis(n * MS_PER_DAY)
    }

    const BRAND: EntityType = EntityType::Brand;

    #[tokio::test]
    async fn test_start_creates_history_lazily() {
        let t = tracker();
        let doc = t
            .start_period("u1", BRAND, "acme", "Acme", Some(3), Some(at_day(0)))
            .await
            .unwrap();

        assert_eq!(doc.id(), "u1_brand_acme");
        assert_eq!(doc.periods.len(), 1);
        assert!(doc.is_currently_endorsed());
        assert_eq!(doc.current_position(), Some(3));
        assert_eq!(doc.current_period_start(), Some(at_day(0)));
        assert_eq!(doc.total_days_endorsed, 0);
    }

    #[tokio::test]
    async fn test_start_twice_is_idempotent() {
        let t = tracker();
        t.start_period("u1", BRAND, "acme", "Acme", Some(3), Some(at_day(0)))
            .await
            .unwrap();
        let doc = t
            .start_period("u1", BRAND, "acme", "Acme Inc", Some(1), None)
            .await
            .unwrap();

        // No duplicate period; the call became a position update
        assert_eq!(doc.periods.len(), 1);
        assert_eq!(doc.current_position(), Some(1));
        assert_eq!(doc.entity_name, "Acme Inc");
    }

    #[tokio::test]
    async fn test_at_most_one_open_period() {
        let t = tracker();
        t.start_period("u1", BRAND, "acme", "Acme", None, Some(at_day(0)))
            .await
            .unwrap();
        t.end_period("u1", BRAND, "acme", Some(at_day(5)))
            .await
            .unwrap();
        let doc = t
            .start_period("u1", BRAND, "acme", "Acme", None, Some(at_day(8)))
            .await
            .unwrap();

        assert_eq!(doc.periods.len(), 2);
        assert_eq!(doc.periods.iter().filter(|p| p.is_open()).count(), 1);
    }

    #[tokio::test]
    async fn test_end_closes_and_computes_days() {
        let t = tracker();
        t.start_period("u1", BRAND, "acme", "Acme", Some(3), Some(at_day(0)))
            .await
            .unwrap();
        let doc = t
            .end_period("u1", BRAND, "acme", Some(at_day(10)))
            .await
            .unwrap()
            .unwrap();

        assert!(!doc.is_currently_endorsed());
        assert_eq!(doc.current_position(), None);
        let period = &doc.periods[0];
        assert_eq!(period.days_in_period, 10);
        assert_eq!(period.days_in_top5, 10);
        assert_eq!(period.days_in_top10, 10);
        assert_eq!(doc.total_days_endorsed, 10);
        assert_eq!(doc.total_days_in_top5, 10);
        assert_eq!(doc.total_days_in_top10, 10);
    }

    #[tokio::test]
    async fn test_end_walks_position_history() {
        let t = tracker();
        t.start_period("u1", BRAND, "acme", "Acme", Some(7), Some(at_day(0)))
            .await
            .unwrap();
        t.update_position("u1", BRAND, "acme", 2).await.unwrap();

        // Rewrite the change date for determinism: position 2 from day 4
        let doc = t.store.get("u1_brand_acme").await.unwrap().unwrap();
        let mut doc = doc;
        let expected = doc.revision;
        doc.open_period_mut().unwrap().position_history[0].date = at_day(4);
        doc.revision += 1;
        t.store.replace(doc, expected).await.unwrap();

        let doc = t
            .end_period("u1", BRAND, "acme", Some(at_day(9)))
            .await
            .unwrap()
            .unwrap();
        let period = &doc.periods[0];
        assert_eq!(period.days_in_period, 9);
        assert_eq!(period.days_in_top5, 5);
        assert_eq!(period.days_in_top10, 9);
    }

    #[tokio::test]
    async fn test_end_without_history_is_none() {
        let t = tracker();
        assert!(t
            .end_period("ghost", BRAND, "acme", None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_end_twice_does_not_double_count() {
        let t = tracker();
        t.start_period("u1", BRAND, "acme", "Acme", Some(3), Some(at_day(0)))
            .await
            .unwrap();
        t.end_period("u1", BRAND, "acme", Some(at_day(10)))
            .await
            .unwrap();
        let doc = t
            .end_period("u1", BRAND, "acme", Some(at_day(12)))
            .await
            .unwrap()
            .unwrap();

        // Second end is a no-op, totals unchanged
        assert_eq!(doc.total_days_endorsed, 10);

        // A later period adds on top without re-counting the first
        t.start_period("u1", BRAND, "acme", "Acme", Some(1), Some(at_day(20)))
            .await
            .unwrap();
        let doc = t
            .end_period("u1", BRAND, "acme", Some(at_day(23)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.total_days_endorsed, 13);
        let closed_sum: i64 = doc
            .periods
            .iter()
            .filter(|p| !p.is_open())
            .map(|p| p.days_in_period)
            .sum();
        assert_eq!(doc.total_days_endorsed, closed_sum);
    }

    #[tokio::test]
    async fn test_update_position_without_open_period_is_noop() {
        let t = tracker();
        assert!(t
            .update_position("ghost", BRAND, "acme", 1)
            .await
            .unwrap()
            .is_none());

        t.start_period("u1", BRAND, "acme", "Acme", None, Some(at_day(0)))
            .await
            .unwrap();
        t.end_period("u1", BRAND, "acme", Some(at_day(5)))
            .await
            .unwrap();
        let doc = t
            .update_position("u1", BRAND, "acme", 2)
            .await
            .unwrap()
            .unwrap();
        assert!(doc.periods[0].position_history.is_empty());
    }

    #[tokio::test]
    async fn test_cumulative_adds_live_open_period() {
        let t = tracker();
        // One closed 10-day period
        t.start_period("u1", BRAND, "acme", "Acme", Some(3), Some(at_day(0)))
            .await
            .unwrap();
        t.end_period("u1", BRAND, "acme", Some(at_day(10)))
            .await
            .unwrap();
        // Reopened 3 days before the observation point
        t.start_period("u1", BRAND, "acme", "Acme", Some(1), Some(at_day(27)))
            .await
            .unwrap();

        let doc = t.store.get("u1_brand_acme").await.unwrap().unwrap();
        let totals = cumulative_at(&doc, at_day(30));
        assert_eq!(totals.total_days_endorsed, 13);
        assert_eq!(totals.total_days_in_top5, 13);
        assert_eq!(totals.total_days_in_top10, 13);
        assert!(totals.is_currently_endorsed);
        assert_eq!(totals.current_position, Some(1));

        // Stored totals untouched by the read
        let doc = t.store.get("u1_brand_acme").await.unwrap().unwrap();
        assert_eq!(doc.total_days_endorsed, 10);
    }

    #[tokio::test]
    async fn test_cumulative_missing_history_is_zero() {
        let t = tracker();
        let totals = t.get_cumulative("ghost", BRAND, "acme").await.unwrap();
        assert_eq!(totals, CumulativeTotals::default());
    }

    #[tokio::test]
    async fn test_backdate_creates_sentinel_period() {
        let t = tracker();
        t.admin_backdate("u1", BRAND, "acme", "Acme", at_day(0))
            .await
            .unwrap();

        let doc = t.store.get("u1_brand_acme").await.unwrap().unwrap();
        let open = doc.open_period().unwrap();
        assert_eq!(open.start_position, BACKDATE_POSITION);
        assert_eq!(open.position_history.len(), 1);
        assert_eq!(open.position_history[0].position, 1);

        // Evaluated at the resume point: all days endorsed, no rank credit
        let resume = open.position_history[0].date;
        let totals = cumulative_at(&doc, resume);
        assert!(totals.total_days_endorsed > 0);
        assert_eq!(totals.total_days_in_top5, 0);
        assert_eq!(totals.total_days_in_top10, 0);
        assert_eq!(totals.current_position, Some(1));
    }

    #[tokio::test]
    async fn test_backdate_rewrites_open_period() {
        let t = tracker();
        t.start_period("u1", BRAND, "acme", "Acme", Some(2), Some(at_day(10)))
            .await
            .unwrap();
        t.update_position("u1", BRAND, "acme", 4).await.unwrap();

        t.admin_backdate("u1", BRAND, "acme", "Acme", at_day(1))
            .await
            .unwrap();

        let doc = t.store.get("u1_brand_acme").await.unwrap().unwrap();
        assert_eq!(doc.periods.len(), 1);
        let open = doc.open_period().unwrap();
        assert_eq!(open.start_date, at_day(1));
        assert_eq!(open.start_position, BACKDATE_POSITION);
        // Prior rank changes were discarded; history restarts at the
        // previously-current rank
        assert_eq!(open.position_history.len(), 1);
        assert_eq!(open.position_history[0].position, 4);
    }

    #[tokio::test]
    async fn test_backdate_preserves_stored_rank_totals() {
        let t = tracker();
        t.start_period("u1", BRAND, "acme", "Acme", Some(1), Some(at_day(0)))
            .await
            .unwrap();
        t.end_period("u1", BRAND, "acme", Some(at_day(10)))
            .await
            .unwrap();

        let before = t.store.get("u1_brand_acme").await.unwrap().unwrap();
        t.admin_backdate("u1", BRAND, "acme", "Acme", at_day(12))
            .await
            .unwrap();
        let after = t.store.get("u1_brand_acme").await.unwrap().unwrap();

        // Only days-endorsed can grow from the sentinel span
        assert_eq!(after.total_days_in_top5, before.total_days_in_top5);
        assert_eq!(after.total_days_in_top10, before.total_days_in_top10);
    }

    #[tokio::test]
    async fn test_add_backdated_period_precomputes_and_sorts() {
        let t = tracker();
        t.start_period("u1", BRAND, "acme", "Acme", Some(1), Some(at_day(50)))
            .await
            .unwrap();
        t.end_period("u1", BRAND, "acme", Some(at_day(60)))
            .await
            .unwrap();

        let doc = t
            .admin_add_backdated_period("u1", BRAND, "acme", "Acme", at_day(0), Some(at_day(7)), 3)
            .await
            .unwrap();

        // Sorted by start date: the backdated span comes first
        assert_eq!(doc.periods[0].start_date, at_day(0));
        assert_eq!(doc.periods[0].days_in_period, 7);
        assert_eq!(doc.periods[0].days_in_top5, 7);
        assert_eq!(doc.total_days_endorsed, 17);
        assert_eq!(doc.total_days_in_top5, 17);
    }

    #[tokio::test]
    async fn test_add_open_backdated_period_conflicts_with_open() {
        let t = tracker();
        t.start_period("u1", BRAND, "acme", "Acme", None, Some(at_day(0)))
            .await
            .unwrap();

        let result = t
            .admin_add_backdated_period("u1", BRAND, "acme", "Acme", at_day(5), None, 1)
            .await;
        assert!(matches!(result, Err(TrackerError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_add_open_backdated_period_without_existing_open() {
        let t = tracker();
        let doc = t
            .admin_add_backdated_period("u2", BRAND, "acme", "Acme", at_day(5), None, 2)
            .await
            .unwrap();

        assert!(doc.is_currently_endorsed());
        // Open-ended: nothing realized into totals yet
        assert_eq!(doc.total_days_endorsed, 0);
    }

    #[tokio::test]
    async fn test_delete_period_recomputes() {
        let t = tracker();
        t.admin_add_backdated_period("u1", BRAND, "acme", "Acme", at_day(0), Some(at_day(7)), 3)
            .await
            .unwrap();
        let doc = t
            .admin_add_backdated_period("u1", BRAND, "acme", "Acme", at_day(10), Some(at_day(15)), 8)
            .await
            .unwrap();
        assert_eq!(doc.total_days_endorsed, 12);

        let period_id = doc.periods[0].id.clone();
        t.admin_delete_period(&doc.id(), &period_id).await.unwrap();

        let doc = t.store.get("u1_brand_acme").await.unwrap().unwrap();
        assert_eq!(doc.periods.len(), 1);
        assert_eq!(doc.total_days_endorsed, 5);
        assert_eq!(doc.total_days_in_top5, 0);
        assert_eq!(doc.total_days_in_top10, 5);
    }

    #[tokio::test]
    async fn test_delete_period_unknown_history_errors() {
        let t = tracker();
        let result = t.admin_delete_period("nope", "p1").await;
        assert!(matches!(result, Err(TrackerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_totals_overwrites_verbatim() {
        let t = tracker();
        t.admin_add_backdated_period("u1", BRAND, "acme", "Acme", at_day(0), Some(at_day(7)), 3)
            .await
            .unwrap();

        t.admin_set_totals(
            "u1_brand_acme",
            TotalsPatch {
                total_days_endorsed: Some(100),
                total_days_in_top5: None,
                total_days_in_top10: None,
            },
        )
        .await
        .unwrap();

        let doc = t.store.get("u1_brand_acme").await.unwrap().unwrap();
        assert_eq!(doc.total_days_endorsed, 100);
        // Unpatched fields untouched
        assert_eq!(doc.total_days_in_top5, 7);

        let result = t.admin_set_totals("nope", TotalsPatch::default()).await;
        assert!(matches!(result, Err(TrackerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bonus_days_touch_only_days_endorsed() {
        let t = tracker();
        t.admin_add_backdated_period("u1", BRAND, "acme", "Acme", at_day(0), Some(at_day(7)), 3)
            .await
            .unwrap();
        t.admin_add_backdated_period(
            "u1",
            EntityType::Place,
            "park",
            "Park",
            at_day(0),
            Some(at_day(4)),
            9,
        )
        .await
        .unwrap();
        t.admin_add_backdated_period("u2", BRAND, "acme", "Acme", at_day(0), Some(at_day(3)), 1)
            .await
            .unwrap();

        let updated = t.add_bonus_days("u1", 7).await.unwrap();
        assert_eq!(updated, 2);

        let acme = t.store.get("u1_brand_acme").await.unwrap().unwrap();
        assert_eq!(acme.total_days_endorsed, 14);
        assert_eq!(acme.total_days_in_top5, 7);
        assert_eq!(acme.total_days_in_top10, 7);

        let park = t.store.get("u1_place_park").await.unwrap().unwrap();
        assert_eq!(park.total_days_endorsed, 11);
        assert_eq!(park.total_days_in_top10, 4);

        // Other users untouched
        let other = t.store.get("u2_brand_acme").await.unwrap().unwrap();
        assert_eq!(other.total_days_endorsed, 3);
    }

    #[tokio::test]
    async fn test_purge_user() {
        let t = tracker();
        t.start_period("u1", BRAND, "acme", "Acme", None, None)
            .await
            .unwrap();
        t.start_period("u1", EntityType::Value, "honesty", "Honesty", None, None)
            .await
            .unwrap();

        assert_eq!(t.purge_user("u1").await.unwrap(), 2);
        assert!(t.list_histories("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purged_user_can_reendorse() {
        let t = tracker();
        t.start_period("u1", BRAND, "acme", "Acme", Some(3), None)
            .await
            .unwrap();
        assert_eq!(t.purge_user("u1").await.unwrap(), 1);

        // Endorsing the same entity again starts from a clean slate
        let doc = t
            .start_period("u1", BRAND, "acme", "Acme", Some(2), None)
            .await
            .unwrap();
        assert_eq!(doc.periods.len(), 1);

        let totals = t.get_cumulative("u1", BRAND, "acme").await.unwrap();
        assert!(totals.is_currently_endorsed);
        assert_eq!(totals.current_position, Some(2));
    }
}
