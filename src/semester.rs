//! Deciding which semester of the academic year is current for a student.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::debug;

use crate::error::StoreResult;
use crate::models::{DisciplineSemester, Semester};
use crate::store::{keys, KeyValueStore};

/// Winter holidays, exams and the first lectures of the next term.
pub const SEMESTER_SWITCH_GRACE_WINDOW: Duration = Duration::weeks(6);

/// Decoded `discipline_semester_updated_at` marker: one semester digit
/// followed by a unix timestamp. Only the timestamp drives the grace window;
/// the semester is kept for diagnostics and logged with each decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemesterSwitchMarker {
    pub semester: Semester,
    pub updated_at: DateTime<Utc>,
}

impl SemesterSwitchMarker {
    pub fn never_updated() -> Self {
        Self {
            semester: Semester::None,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn decode(raw: &str) -> Self {
        if raw.len() < 2 {
            return Self::never_updated();
        }
        let semester = raw
            .get(..1)
            .and_then(|s| s.parse().ok())
            .map(Semester::from_number)
            .unwrap_or(Semester::None);
        let updated_at = raw
            .get(1..)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            semester,
            updated_at,
        }
    }

    pub fn within_grace_window(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.updated_at) < SEMESTER_SWITCH_GRACE_WINDOW
    }
}

pub struct SemesterResolver {
    store: Arc<dyn KeyValueStore>,
}

impl SemesterResolver {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Disciplines the student currently attends.
    ///
    /// Semester 2 membership wins once it exists; a semester 1 discipline
    /// missing from it is carried over while its switch marker is younger
    /// than [`SEMESTER_SWITCH_GRACE_WINDOW`]. Carried-over disciplines come
    /// first, each group in store order.
    pub async fn current_disciplines(
        &self,
        year: i32,
        student_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<DisciplineSemester>> {
        let first = self
            .disciplines_for_semester(year, student_id, Semester::First)
            .await?;
        let second = self
            .disciplines_for_semester(year, student_id, Semester::Second)
            .await?;

        if second.is_empty() {
            return Ok(first);
        }

        let mut current = Vec::with_capacity(first.len() + second.len());
        for candidate in first {
            if second
                .iter()
                .any(|d| d.discipline_id == candidate.discipline_id)
            {
                continue;
            }
            let marker = self.switch_marker(year, candidate.discipline_id).await?;
            let keep = marker.within_grace_window(now);
            debug!(
                student_id,
                discipline_id = candidate.discipline_id,
                marker_semester = marker.semester.number(),
                updated_at = %marker.updated_at,
                keep,
                "first semester discipline missing from second semester"
            );
            if keep {
                current.push(candidate);
            }
        }
        current.extend(second);

        Ok(current)
    }

    /// Semester in which the student is a member of `discipline_id`, checking
    /// semester 2 first; [`Semester::None`] when absent from both.
    pub async fn semester_for_discipline(
        &self,
        year: i32,
        student_id: i64,
        discipline_id: i64,
    ) -> StoreResult<Semester> {
        let member = discipline_id.to_string();
        for semester in [Semester::Second, Semester::First] {
            let key = keys::student_disciplines(year, semester, student_id);
            if self.store.sismember(&key, &member).await? {
                return Ok(semester);
            }
        }
        Ok(Semester::None)
    }

    pub async fn switch_marker(
        &self,
        year: i32,
        discipline_id: i64,
    ) -> StoreResult<SemesterSwitchMarker> {
        let key = keys::discipline_semester_updated_at(year, discipline_id);
        Ok(self
            .store
            .get(&key)
            .await?
            .map(|raw| SemesterSwitchMarker::decode(&raw))
            .unwrap_or_else(SemesterSwitchMarker::never_updated))
    }

    async fn disciplines_for_semester(
        &self,
        year: i32,
        student_id: i64,
        semester: Semester,
    ) -> StoreResult<Vec<DisciplineSemester>> {
        let key = keys::student_disciplines(year, semester, student_id);
        Ok(self
            .store
            .smembers(&key)
            .await?
            .iter()
            .map(|raw| DisciplineSemester {
                discipline_id: raw.parse().unwrap_or(0),
                semester,
            })
            .collect())
    }
}
