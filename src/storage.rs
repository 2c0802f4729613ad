//! SQLite persistence for users and finished exercises.
//!
//! Structured values (answers, transcripts, word lists) are stored as JSON
//! text columns.

use std::str::FromStr;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use teloxide::types::UserId;

use crate::dialogue::Turn;
use crate::error::TutorResult;
use crate::quiz::QuizResults;
use crate::vocabulary::{VocabularyEntry, VocabularySet};

const QUIZ_HISTORY_LIMIT: i64 = 10;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    username TEXT,
    first_name TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS dialogues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    messages TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users (user_id)
);

CREATE TABLE IF NOT EXISTS vocabulary (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    topic TEXT NOT NULL,
    words TEXT NOT NULL,
    learned_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users (user_id)
);

CREATE TABLE IF NOT EXISTS grammar_tests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    test_data TEXT NOT NULL,
    score INTEGER NOT NULL,
    completed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users (user_id)
);
";

#[derive(Debug, Clone, PartialEq)]
pub struct QuizRecord {
    pub score: u32,
    pub completed_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyRecord {
    pub topic: String,
    pub entries: Vec<VocabularyEntry>,
    pub learned_at: String,
}

#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn connect(url: &str) -> TutorResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        info!("Connected to {}", url);
        Self::with_pool(pool).await
    }

    /// A private database that lives as long as the storage.
    #[cfg(test)]
    pub async fn in_memory() -> TutorResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> TutorResult<Self> {
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub async fn add_user(
        &self,
        user: UserId,
        username: Option<&str>,
        first_name: &str,
    ) -> TutorResult<()> {
        sqlx::query(
            "INSERT INTO users (user_id, username, first_name) VALUES (?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name",
        )
        .bind(db_id(user))
        .bind(username)
        .bind(first_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records may arrive for users who never sent /start; the foreign keys
    /// still need a parent row.
    async fn ensure_user(&self, user: UserId) -> TutorResult<()> {
        sqlx::query("INSERT OR IGNORE INTO users (user_id) VALUES (?)")
            .bind(db_id(user))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_quiz_result(&self, user: UserId, results: &QuizResults) -> TutorResult<()> {
        self.ensure_user(user).await?;
        sqlx::query("INSERT INTO grammar_tests (user_id, test_data, score) VALUES (?, ?, ?)")
            .bind(db_id(user))
            .bind(serde_json::to_string(results)?)
            .bind(results.score as i64)
            .execute(&self.pool)
            .await?;
        info!("Saved test result {}% for user {}", results.score, user);
        Ok(())
    }

    pub async fn save_dialogue(&self, user: UserId, turns: &[Turn]) -> TutorResult<()> {
        self.ensure_user(user).await?;
        sqlx::query("INSERT INTO dialogues (user_id, messages) VALUES (?, ?)")
            .bind(db_id(user))
            .bind(serde_json::to_string(turns)?)
            .execute(&self.pool)
            .await?;
        info!("Saved dialogue of {} turns for user {}", turns.len(), user);
        Ok(())
    }

    pub async fn save_vocabulary(&self, user: UserId, set: &VocabularySet) -> TutorResult<()> {
        self.ensure_user(user).await?;
        sqlx::query("INSERT INTO vocabulary (user_id, topic, words) VALUES (?, ?, ?)")
            .bind(db_id(user))
            .bind(&set.topic)
            .bind(serde_json::to_string(&set.entries)?)
            .execute(&self.pool)
            .await?;
        info!("Saved {} words on {:?} for user {}", set.len(), set.topic, user);
        Ok(())
    }

    /// Latest test scores, newest first.
    pub async fn get_quiz_history(&self, user: UserId) -> TutorResult<Vec<QuizRecord>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT score, completed_at FROM grammar_tests WHERE user_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(db_id(user))
        .bind(QUIZ_HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(score, completed_at)| QuizRecord {
                score: score.max(0) as u32,
                completed_at,
            })
            .collect())
    }

    /// Every saved word set, newest first.
    pub async fn get_vocabulary_history(&self, user: UserId) -> TutorResult<Vec<VocabularyRecord>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT topic, words, learned_at FROM vocabulary WHERE user_id = ? ORDER BY id DESC",
        )
        .bind(db_id(user))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(topic, words, learned_at)| -> TutorResult<VocabularyRecord> {
                Ok(VocabularyRecord {
                    topic,
                    entries: serde_json::from_str(&words)?,
                    learned_at,
                })
            })
            .collect()
    }

    #[cfg(test)]
    pub async fn dialogue_transcripts(&self, user: UserId) -> TutorResult<Vec<Vec<Turn>>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT messages FROM dialogues WHERE user_id = ? ORDER BY id")
                .bind(db_id(user))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(messages,)| -> TutorResult<Vec<Turn>> { Ok(serde_json::from_str(&messages)?) })
            .collect()
    }
}

// SQLite has no unsigned 64-bit integers; Telegram ids fit in i64.
fn db_id(user: UserId) -> i64 {
    user.0 as i64
}
