//! Builds the three response shapes served to API clients.
//!
//! Each entry point reads the config snapshot once and uses that year and
//! lesson type catalog for the whole request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, info};

use crate::codec::{self, LessonKey, LessonValue, ScoreValue};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Discipline, DisciplineScore, DisciplineScoreResult, DisciplineSemester, Score, Semester,
};
use crate::rating::RatingCalculator;
use crate::semester::SemesterResolver;
use crate::snapshot::{ConfigSnapshot, SnapshotReader};
use crate::store::{keys, KeyValueStore};

/// Upper bound on concurrent per-discipline lookups within one request.
pub const MAX_DISCIPLINE_LOOKUPS: usize = 8;

pub struct ResultAssembler {
    store: Arc<dyn KeyValueStore>,
    resolver: SemesterResolver,
    rating: Arc<RatingCalculator>,
    snapshot: SnapshotReader,
}

impl ResultAssembler {
    pub fn new(store: Arc<dyn KeyValueStore>, snapshot: SnapshotReader) -> Self {
        Self {
            resolver: SemesterResolver::new(Arc::clone(&store)),
            rating: Arc::new(RatingCalculator::new(Arc::clone(&store))),
            store,
            snapshot,
        }
    }

    /// Name and rating for every discipline the student currently attends,
    /// in the order the semester resolver returned them.
    ///
    /// At most [`MAX_DISCIPLINE_LOOKUPS`] lookups run at once. Once started,
    /// every lookup finishes before this returns; dropping the returned
    /// future aborts the lookups still in flight. If any lookup failed or
    /// panicked, the error of the earliest such discipline is returned and
    /// the other results are discarded.
    pub async fn discipline_results(
        &self,
        student_id: i64,
    ) -> StoreResult<Vec<DisciplineScoreResult>> {
        let snapshot = self.snapshot.current();
        let year = snapshot.year;
        let disciplines = self
            .resolver
            .current_disciplines(year, student_id, Utc::now())
            .await?;
        debug!(student_id, count = disciplines.len(), "resolved current disciplines");

        let sem = Arc::new(Semaphore::new(MAX_DISCIPLINE_LOOKUPS));
        let mut join_set = JoinSet::new();
        let mut task_slots: HashMap<task::Id, usize> = HashMap::with_capacity(disciplines.len());
        for (idx, discipline) in disciplines.iter().copied().enumerate() {
            let store = Arc::clone(&self.store);
            let rating = Arc::clone(&self.rating);
            let sem = Arc::clone(&sem);
            let handle = join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let result =
                    discipline_summary(store.as_ref(), &rating, year, discipline, student_id)
                        .await;
                (idx, result)
            });
            task_slots.insert(handle.id(), idx);
        }

        let mut slots: Vec<Option<DisciplineScoreResult>> = vec![None; disciplines.len()];
        let mut first_error: Option<(usize, StoreError)> = None;

        while let Some(joined) = join_set.join_next().await {
            let (idx, err) = match joined {
                Ok((idx, Ok(result))) => {
                    slots[idx] = Some(result);
                    continue;
                }
                Ok((idx, Err(err))) => (idx, err),
                Err(err) => {
                    let idx = task_slots.get(&err.id()).copied().unwrap_or(usize::MAX);
                    (idx, StoreError::Task(err.to_string()))
                }
            };
            if first_error.as_ref().map_or(true, |(seen, _)| idx < *seen) {
                first_error = Some((idx, err));
            }
        }

        if let Some((_, err)) = first_error {
            return Err(err);
        }

        slots
            .into_iter()
            .zip(&disciplines)
            .map(|(slot, discipline)| {
                slot.ok_or_else(|| {
                    StoreError::Task(format!(
                        "missing result for discipline {}",
                        discipline.discipline_id
                    ))
                })
            })
            .collect()
    }

    /// Rating and the full score list for one discipline. A zero-valued
    /// result means the student is not enrolled in it.
    pub async fn discipline_result(
        &self,
        student_id: i64,
        discipline_id: i64,
    ) -> StoreResult<DisciplineScoreResult> {
        let snapshot = self.snapshot.current();
        let year = snapshot.year;
        let semester = self
            .resolver
            .semester_for_discipline(year, student_id, discipline_id)
            .await?;
        if semester.is_none() {
            info!(student_id, discipline_id, "discipline not found for student");
            return Ok(DisciplineScoreResult::default());
        }

        let discipline = self.discipline(year, discipline_id).await?;
        let score_rating = self
            .rating
            .load(year, semester, discipline_id, student_id)
            .await?;
        let scores = self
            .scores(&snapshot, semester, discipline_id, student_id)
            .await?;

        Ok(DisciplineScoreResult {
            discipline,
            score_rating,
            scores,
        })
    }

    /// One lesson's score. A zero-valued result means the student is not
    /// enrolled in the discipline.
    pub async fn discipline_score(
        &self,
        student_id: i64,
        discipline_id: i64,
        lesson_id: i64,
    ) -> StoreResult<DisciplineScore> {
        let snapshot = self.snapshot.current();
        let year = snapshot.year;
        let semester = self
            .resolver
            .semester_for_discipline(year, student_id, discipline_id)
            .await?;
        if semester.is_none() {
            info!(student_id, discipline_id, lesson_id, "discipline not found for student");
            return Ok(DisciplineScore::default());
        }

        let discipline = self.discipline(year, discipline_id).await?;
        let score = self
            .score(&snapshot, semester, discipline_id, student_id, lesson_id)
            .await?;

        Ok(DisciplineScore { discipline, score })
    }

    async fn discipline(&self, year: i32, discipline_id: i64) -> StoreResult<Discipline> {
        Ok(Discipline {
            id: discipline_id,
            name: discipline_name(self.store.as_ref(), year, discipline_id).await?,
        })
    }

    async fn scores(
        &self,
        snapshot: &ConfigSnapshot,
        semester: Semester,
        discipline_id: i64,
        student_id: i64,
    ) -> StoreResult<Vec<Score>> {
        let year = snapshot.year;
        let raw_scores = self
            .store
            .hgetall(&keys::scores(year, semester, student_id, discipline_id))
            .await?;
        if raw_scores.is_empty() {
            return Ok(Vec::new());
        }

        let lessons = codec::decode_lessons(
            self.store
                .hgetall(&keys::lessons(year, semester, discipline_id))
                .await?,
        );

        Ok(codec::merge_scores(&raw_scores, &lessons, &snapshot.lesson_types))
    }

    async fn score(
        &self,
        snapshot: &ConfigSnapshot,
        semester: Semester,
        discipline_id: i64,
        student_id: i64,
        lesson_id: i64,
    ) -> StoreResult<Score> {
        let year = snapshot.year;
        let Some(raw_lesson) = self
            .lesson_value(year, semester, discipline_id, lesson_id)
            .await?
        else {
            debug!(discipline_id, lesson_id, "lesson not found");
            return Ok(Score::default());
        };

        let mut score = Score {
            lesson: LessonValue::decode(&raw_lesson)
                .into_lesson(lesson_id, &snapshot.lesson_types),
            ..Score::default()
        };

        let halves = [LessonKey::new(lesson_id, 1), LessonKey::new(lesson_id, 2)];
        let fields: Vec<String> = halves.iter().map(LessonKey::encode).collect();
        let values = self
            .store
            .hmget(&keys::scores(year, semester, student_id, discipline_id), &fields)
            .await?;

        for (key, value) in halves.iter().zip(values) {
            if let Some(raw) = value {
                score.apply_half(key.half, ScoreValue::decode(&raw));
            }
        }

        Ok(score)
    }

    /// Live lesson hash first, then the deleted-lesson key.
    async fn lesson_value(
        &self,
        year: i32,
        semester: Semester,
        discipline_id: i64,
        lesson_id: i64,
    ) -> StoreResult<Option<String>> {
        let live = self
            .store
            .hget(&keys::lessons(year, semester, discipline_id), &lesson_id.to_string())
            .await?;
        if let Some(value) = live.filter(|v| !v.is_empty()) {
            return Ok(Some(value));
        }

        let deleted = self
            .store
            .get(&keys::deleted_lesson(year, semester, discipline_id, lesson_id))
            .await?;
        Ok(deleted.filter(|v| !v.is_empty()))
    }
}

async fn discipline_name(
    store: &dyn KeyValueStore,
    year: i32,
    discipline_id: i64,
) -> StoreResult<String> {
    Ok(store
        .hget(&keys::discipline(year, discipline_id), keys::DISCIPLINE_NAME_FIELD)
        .await?
        .unwrap_or_default())
}

async fn discipline_summary(
    store: &dyn KeyValueStore,
    rating: &RatingCalculator,
    year: i32,
    discipline: DisciplineSemester,
    student_id: i64,
) -> StoreResult<DisciplineScoreResult> {
    let DisciplineSemester {
        discipline_id,
        semester,
    } = discipline;
    Ok(DisciplineScoreResult {
        discipline: Discipline {
            id: discipline_id,
            name: discipline_name(store, year, discipline_id).await?,
        },
        score_rating: rating.load(year, semester, discipline_id, student_id).await?,
        scores: Vec::new(),
    })
}
