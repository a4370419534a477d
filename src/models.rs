use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One of the two academic terms, or `None` when the student has no
/// membership for the requested discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Semester {
    None,
    First,
    Second,
}

impl Semester {
    pub fn from_number(value: u8) -> Self {
        match value {
            1 => Semester::First,
            2 => Semester::Second,
            _ => Semester::None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Semester::None => 0,
            Semester::First => 1,
            Semester::Second => 2,
        }
    }

    pub fn is_none(self) -> bool {
        self == Semester::None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonType {
    pub id: i64,
    pub short_name: String,
    pub long_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Discipline {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Lesson {
    pub id: i64,
    pub date: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub lesson_type: LessonType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub lesson: Lesson,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_score: Option<f32>,
    pub is_absent: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRating {
    pub total: f32,
    pub students_count: u64,
    pub rating: u64,
    pub min_total: f32,
    pub max_total: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisciplineScoreResult {
    pub discipline: Discipline,
    pub score_rating: ScoreRating,
    pub scores: Vec<Score>,
}

impl DisciplineScoreResult {
    pub fn is_found(&self) -> bool {
        self.discipline.id != 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisciplineScore {
    pub discipline: Discipline,
    pub score: Score,
}

impl DisciplineScore {
    pub fn is_found(&self) -> bool {
        self.discipline.id != 0
    }
}

/// A discipline id paired with the semester its membership was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisciplineSemester {
    pub discipline_id: i64,
    pub semester: Semester,
}
