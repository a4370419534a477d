//! Read-only access to the key-value store populated by the ingestion
//! pipeline.
//!
//! [`KeyValueStore`] exposes the handful of primitive reads the score layer
//! needs. Missing keys are not errors: they come back as `None`, empty
//! collections, `false` or `0`.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::StoreResult;

/// Direction in which a sorted-set score window is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOrder {
    Ascending,
    Descending,
}

/// Inclusive score window over a sorted set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWindow {
    pub min: f64,
    pub max: f64,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// One slot per requested field, `None` where the field is missing.
    async fn hmget(&self, key: &str, fields: &[String]) -> StoreResult<Vec<Option<String>>>;

    async fn zcard(&self, key: &str) -> StoreResult<u64>;

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;

    /// Members with a score strictly greater than `score`.
    async fn zcount_above(&self, key: &str, score: f64) -> StoreResult<u64>;

    /// First `(member, score)` inside `window` when walked in `order`.
    async fn zfirst_in_window(
        &self,
        key: &str,
        window: ScoreWindow,
        order: ScoreOrder,
    ) -> StoreResult<Option<(String, f64)>>;
}

/// Key layout shared with the ingestion pipeline.
pub mod keys {
    use crate::models::Semester;

    pub const CURRENT_YEAR: &str = "currentYear";
    pub const LESSON_TYPES: &str = "lessonTypes";
    pub const DISCIPLINE_NAME_FIELD: &str = "name";

    pub fn student_disciplines(year: i32, semester: Semester, student_id: i64) -> String {
        format!("{year}:{}:student_disciplines:{student_id}", semester.number())
    }

    pub fn discipline(year: i32, discipline_id: i64) -> String {
        format!("{year}:discipline:{discipline_id}")
    }

    pub fn discipline_semester_updated_at(year: i32, discipline_id: i64) -> String {
        format!("{year}:discipline_semester_updated_at:{discipline_id}")
    }

    pub fn lessons(year: i32, semester: Semester, discipline_id: i64) -> String {
        format!("{year}:{}:lessons:{discipline_id}", semester.number())
    }

    pub fn deleted_lesson(
        year: i32,
        semester: Semester,
        discipline_id: i64,
        lesson_id: i64,
    ) -> String {
        format!(
            "{year}:{}:deleted-lessons:{discipline_id}:{lesson_id}",
            semester.number()
        )
    }

    pub fn scores(year: i32, semester: Semester, student_id: i64, discipline_id: i64) -> String {
        format!(
            "{year}:{}:scores:{student_id}:{discipline_id}",
            semester.number()
        )
    }

    pub fn totals(year: i32, semester: Semester, discipline_id: i64) -> String {
        format!("{year}:{}:totals:{discipline_id}", semester.number())
    }
}

/// [`KeyValueStore`] backed by a Redis connection manager, which reconnects
/// on its own after transient failures.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(dsn: &str) -> StoreResult<Self> {
        let client = redis::Client::open(dsn)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.sismember(key, member).await?)
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(key, field).await?)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> StoreResult<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(key).await?)
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        let mut conn = self.conn.clone();
        Ok(conn.zscore(key, member).await?)
    }

    async fn zcount_above(&self, key: &str, score: f64) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.zcount(key, format!("({score}"), "+inf").await?)
    }

    async fn zfirst_in_window(
        &self,
        key: &str,
        window: ScoreWindow,
        order: ScoreOrder,
    ) -> StoreResult<Option<(String, f64)>> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, f64)> = match order {
            ScoreOrder::Ascending => {
                conn.zrangebyscore_limit_withscores(key, window.min, window.max, 0, 1)
                    .await?
            }
            ScoreOrder::Descending => {
                conn.zrevrangebyscore_limit_withscores(key, window.max, window.min, 0, 1)
                    .await?
            }
        };
        Ok(entries.into_iter().next())
    }
}
