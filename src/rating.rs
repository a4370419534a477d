use std::sync::Arc;

use crate::error::StoreResult;
use crate::models::{ScoreRating, Semester};
use crate::store::{keys, KeyValueStore, ScoreOrder, ScoreWindow};

/// Totals outside this window (unscored or corrupt) do not count towards the
/// cohort bounds.
pub const COHORT_BOUNDS_WINDOW: ScoreWindow = ScoreWindow {
    min: 0.1,
    max: 100.0,
};

pub struct RatingCalculator {
    store: Arc<dyn KeyValueStore>,
}

impl RatingCalculator {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Standing of `student_id` among everyone with a total in the
    /// discipline's semester ranking.
    pub async fn load(
        &self,
        year: i32,
        semester: Semester,
        discipline_id: i64,
        student_id: i64,
    ) -> StoreResult<ScoreRating> {
        let key = keys::totals(year, semester, discipline_id);

        let students_count = self.store.zcard(&key).await?;
        let total = self
            .store
            .zscore(&key, &student_id.to_string())
            .await?
            .unwrap_or(0.0);

        let rating = if total > 0.0 {
            self.store.zcount_above(&key, total).await? + 1
        } else {
            students_count
        };

        let min_total = self.cohort_bound(&key, ScoreOrder::Ascending).await?;
        let max_total = self.cohort_bound(&key, ScoreOrder::Descending).await?;

        Ok(ScoreRating {
            total: total as f32,
            students_count,
            rating,
            min_total,
            max_total,
        })
    }

    async fn cohort_bound(&self, key: &str, order: ScoreOrder) -> StoreResult<f32> {
        Ok(self
            .store
            .zfirst_in_window(key, COHORT_BOUNDS_WINDOW, order)
            .await?
            .map(|(_, score)| score as f32)
            .unwrap_or(0.0))
    }
}
