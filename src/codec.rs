//! Positional string encodings written by the ingestion pipeline.
//!
//! - lesson key: `<lessonId>:<half>`; the half is the last character and the
//!   id is everything before the separator, split purely by position.
//! - lesson value: `YYMMDD<typeId>` (year offset from 2000).
//! - score value: a decimal string, `-999999` marking an absence.
//!
//! Malformed input never fails: fragments that do not parse decode to zero.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{Lesson, LessonType, Score};

/// Score value the pipeline stores when a student was marked absent.
pub const ABSENT_SCORE_VALUE: f64 = -999999.0;

const LESSON_VALUE_MIN_LEN: usize = 7;

/// Field of a student score hash, `<lessonId>:<half>`: the lesson a
/// sub-score belongs to and which of its two halves it fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonKey {
    pub lesson_id: i64,
    pub half: u8,
}

impl LessonKey {
    pub fn new(lesson_id: i64, half: u8) -> Self {
        Self { lesson_id, half }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.lesson_id, self.half)
    }

    pub fn decode(raw: &str) -> Self {
        let len = raw.len();
        if len < 2 {
            return Self::new(0, 0);
        }
        let lesson_id = raw.get(..len - 2).and_then(|s| s.parse().ok()).unwrap_or(0);
        let half = raw.get(len - 1..).and_then(|s| s.parse().ok()).unwrap_or(0);
        Self { lesson_id, half }
    }
}

/// Date and type id packed into a lesson hash value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LessonValue {
    pub date: Option<NaiveDate>,
    pub type_id: i64,
}

impl LessonValue {
    pub fn decode(raw: &str) -> Self {
        if raw.len() < LESSON_VALUE_MIN_LEN {
            return Self::default();
        }
        let field = |range: std::ops::Range<usize>| -> u32 {
            raw.get(range).and_then(|s| s.parse().ok()).unwrap_or(0)
        };
        let year = 2000 + field(0..2) as i32;
        let date = NaiveDate::from_ymd_opt(year, field(2..4), field(4..6));
        let type_id = raw.get(6..).and_then(|s| s.parse().ok()).unwrap_or(0);
        Self { date, type_id }
    }

    pub fn into_lesson(self, lesson_id: i64, lesson_types: &HashMap<i64, LessonType>) -> Lesson {
        Lesson {
            id: lesson_id,
            date: self.date,
            lesson_type: lesson_types.get(&self.type_id).cloned().unwrap_or_default(),
        }
    }
}

/// A decoded score value: either a number or the absence marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreValue {
    Points(f32),
    Absent,
}

impl ScoreValue {
    pub fn decode(raw: &str) -> Self {
        let value: f64 = raw.trim().parse().unwrap_or(0.0);
        // exact match, not a tolerance
        if value == ABSENT_SCORE_VALUE {
            ScoreValue::Absent
        } else {
            ScoreValue::Points(value as f32)
        }
    }
}

impl Score {
    /// Fold one half-record into this score. An absence on either half marks
    /// the whole lesson absent; halves other than 1 and 2 are ignored.
    pub fn apply_half(&mut self, half: u8, value: ScoreValue) {
        match (value, half) {
            (ScoreValue::Absent, _) => self.is_absent = true,
            (ScoreValue::Points(points), 1) => self.first_score = Some(points),
            (ScoreValue::Points(points), 2) => self.second_score = Some(points),
            _ => {}
        }
    }
}

/// Merge raw `<lessonId>:<half> -> value` records into one [`Score`] per
/// lesson, ordered by lesson date then lesson id.
pub fn merge_scores(
    raw_scores: &HashMap<String, String>,
    lessons: &HashMap<i64, LessonValue>,
    lesson_types: &HashMap<i64, LessonType>,
) -> Vec<Score> {
    let mut merged: HashMap<i64, Score> = HashMap::with_capacity(raw_scores.len());

    for (raw_key, raw_value) in raw_scores {
        let key = LessonKey::decode(raw_key);
        let score = merged.entry(key.lesson_id).or_insert_with(|| Score {
            lesson: lessons
                .get(&key.lesson_id)
                .copied()
                .unwrap_or_default()
                .into_lesson(key.lesson_id, lesson_types),
            ..Score::default()
        });
        score.apply_half(key.half, ScoreValue::decode(raw_value));
    }

    let mut scores: Vec<Score> = merged.into_values().collect();
    sort_scores(&mut scores);
    scores
}

/// Stable sort by lesson date ascending, then lesson id ascending.
pub fn sort_scores(scores: &mut [Score]) {
    scores.sort_by(|a, b| {
        a.lesson
            .date
            .cmp(&b.lesson.date)
            .then_with(|| a.lesson.id.cmp(&b.lesson.id))
    });
}

/// Decode a lesson hash (`lessonId -> YYMMDD<typeId>`), skipping ids that do
/// not parse.
pub fn decode_lessons(raw: HashMap<String, String>) -> HashMap<i64, LessonValue> {
    raw.into_iter()
        .filter_map(|(id, value)| {
            let id: i64 = id.parse().ok()?;
            Some((id, LessonValue::decode(&value)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn lesson_key_round_trips() {
        for (id, half) in [(245, 1), (7, 2), (1_000_000, 1)] {
            let key = LessonKey::new(id, half);
            assert_eq!(LessonKey::decode(&key.encode()), key);
        }
    }

    #[test]
    fn lesson_key_splits_by_position() {
        assert_eq!(LessonKey::decode("245:2"), LessonKey::new(245, 2));
        assert_eq!(LessonKey::decode("x"), LessonKey::new(0, 0));
        assert_eq!(LessonKey::decode("ab:c"), LessonKey::new(0, 0));
    }

    #[test]
    fn lesson_value_decodes_date_and_type() {
        let value = LessonValue::decode("2302121");
        assert_eq!(value.date, date(2023, 2, 12));
        assert_eq!(value.type_id, 1);

        let value = LessonValue::decode("23021415");
        assert_eq!(value.date, date(2023, 2, 14));
        assert_eq!(value.type_id, 15);
    }

    #[test]
    fn short_or_invalid_lesson_value_decodes_to_zero() {
        assert_eq!(LessonValue::decode("230212"), LessonValue::default());
        assert_eq!(LessonValue::decode(""), LessonValue::default());

        let value = LessonValue::decode("2313401");
        assert_eq!(value.date, None);
        assert_eq!(value.type_id, 1);
    }

    #[test]
    fn absent_marker_matches_formatting_variants() {
        for raw in ["-999999", "-999999.0", "-999999.000", "-9.99999e5"] {
            assert_eq!(ScoreValue::decode(raw), ScoreValue::Absent, "{raw}");
        }
        assert_eq!(ScoreValue::decode("-999998.5"), ScoreValue::Points(-999998.5));
        assert_eq!(ScoreValue::decode("0"), ScoreValue::Points(0.0));
        assert_eq!(ScoreValue::decode("garbage"), ScoreValue::Points(0.0));
    }

    #[test]
    fn halves_merge_into_one_score_per_lesson() {
        let raw: HashMap<String, String> = [
            ("245:1", "2.5"),
            ("245:2", "3"),
            ("247:1", "-999999"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let lessons = decode_lessons(
            [("245", "2302121"), ("247", "2302122")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );

        let scores = merge_scores(&raw, &lessons, &HashMap::new());

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].lesson.id, 245);
        assert_eq!(scores[0].first_score, Some(2.5));
        assert_eq!(scores[0].second_score, Some(3.0));
        assert!(!scores[0].is_absent);
        assert_eq!(scores[1].lesson.id, 247);
        assert!(scores[1].is_absent);
        assert_eq!(scores[1].first_score, None);
    }

    #[test]
    fn scores_sort_by_date_then_lesson_id() {
        let lesson = |id, d| Score {
            lesson: Lesson {
                id,
                date: date(2023, 2, d),
                lesson_type: LessonType::default(),
            },
            ..Score::default()
        };
        let mut scores = vec![lesson(255, 14), lesson(247, 12), lesson(245, 12)];

        sort_scores(&mut scores);

        let ids: Vec<i64> = scores.iter().map(|s| s.lesson.id).collect();
        assert_eq!(ids, vec![245, 247, 255]);
    }

    #[test]
    fn unknown_lesson_gets_zero_date_and_default_type() {
        let raw: HashMap<String, String> =
            [("300:1".to_string(), "4".to_string())].into_iter().collect();
        let scores = merge_scores(&raw, &HashMap::new(), &HashMap::new());
        assert_eq!(scores[0].lesson.id, 300);
        assert_eq!(scores[0].lesson.date, None);
        assert_eq!(scores[0].lesson.lesson_type, LessonType::default());
    }
}
