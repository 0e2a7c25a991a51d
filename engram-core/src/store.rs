//! Per-agent durable memory store.
//!
//! Each agent owns one SQLite database at `<memory_dir>/<agent>.db` with
//! three tables: decisions (choices with outcome tracking), patterns
//! (learned rules subject to reinforcement), and knowledge (facts with
//! TTL). The database is opened in WAL mode with a busy timeout, so
//! readers of the same agent's store stay live while a writer commits and
//! contended writes fail with [`StoreError::Busy`] instead of blocking
//! indefinitely.

use crate::config::StorageConfig;
use crate::error::StoreError;
use crate::relevance;
use crate::types::{
    Decision, Knowledge, MAX_DECISION_TEXT, MAX_KNOWLEDGE_CATEGORY, MAX_KNOWLEDGE_KEY,
    MAX_KNOWLEDGE_SOURCE, MAX_KNOWLEDGE_VALUE, MAX_PATTERN_DESC, MAX_PATTERN_TYPE, MemoryStats,
    Pattern, clamp_confidence, clamp_score, format_timestamp, mint_id, parse_timestamp,
    truncate_chars,
};
use chrono::Local;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Ceiling for reinforced pattern confidence.
const MAX_PATTERN_CONFIDENCE: f64 = 0.99;

/// Fixed confidence increment applied on each reinforcement, regardless
/// of how much evidence arrived in the call.
const REINFORCEMENT_STEP: f64 = 0.05;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    context TEXT NOT NULL,
    decision TEXT NOT NULL,
    reasoning TEXT DEFAULT '',
    confidence REAL DEFAULT 0.5,
    outcome TEXT DEFAULT '',
    outcome_score REAL DEFAULT 0.0,
    resolved INTEGER DEFAULT 0,
    tags TEXT DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS patterns (
    id TEXT PRIMARY KEY,
    pattern_type TEXT NOT NULL,
    description TEXT NOT NULL,
    evidence_count INTEGER DEFAULT 1,
    confidence REAL DEFAULT 0.5,
    active INTEGER DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    tags TEXT DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS knowledge (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    source TEXT DEFAULT '',
    ttl_hours INTEGER DEFAULT 0,
    created_at TEXT NOT NULL,
    expires_at TEXT DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_decisions_ts ON decisions(timestamp);
CREATE INDEX IF NOT EXISTS idx_decisions_resolved ON decisions(resolved);
CREATE INDEX IF NOT EXISTS idx_patterns_type ON patterns(pattern_type);
CREATE INDEX IF NOT EXISTS idx_patterns_active ON patterns(active);
CREATE INDEX IF NOT EXISTS idx_knowledge_cat ON knowledge(category);
CREATE INDEX IF NOT EXISTS idx_knowledge_key ON knowledge(key);
";

const DECISION_COLUMNS: &str =
    "id, timestamp, context, decision, reasoning, confidence, outcome, outcome_score, resolved, tags";

const PATTERN_COLUMNS: &str =
    "id, pattern_type, description, evidence_count, confidence, active, created_at, updated_at, tags";

const KNOWLEDGE_COLUMNS: &str =
    "id, category, key, value, source, ttl_hours, created_at, expires_at";

/// One agent's durable memory.
///
/// The connection lives behind a mutex so a single store value can be
/// shared across threads; independent processes of the same agent open
/// their own store against the same file and coordinate through WAL and
/// the busy timeout.
pub struct MemoryStore {
    agent: String,
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl MemoryStore {
    /// Open (creating if absent) the store for `agent`.
    ///
    /// The agent name is normalized to lower-case and names the database
    /// file inside the configured memory directory.
    pub fn open(agent: &str, config: &StorageConfig) -> Result<Self, StoreError> {
        let agent = agent.to_lowercase();
        let dir = config.memory_dir();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Unavailable {
            path: dir.clone(),
            message: e.to_string(),
        })?;

        let db_path = dir.join(format!("{agent}.db"));
        let conn = Connection::open(&db_path).map_err(|e| StoreError::Unavailable {
            path: db_path.clone(),
            message: e.to_string(),
        })?;

        conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;

        debug!(agent = %agent, path = %db_path.display(), "opened memory store");
        Ok(Self {
            agent,
            db_path,
            conn: Mutex::new(conn),
        })
    }

    /// The normalized agent name this store belongs to.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Path of the underlying database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- Decisions ---

    /// Log a decision the agent made. Returns the new decision id.
    ///
    /// Text fields are truncated to their bounds and confidence is
    /// clamped into [0, 1]; both are lossy-but-available, never errors.
    pub fn record_decision(
        &self,
        context: &str,
        decision: &str,
        reasoning: &str,
        confidence: f64,
        tags: &[String],
    ) -> Result<String, StoreError> {
        let id = mint_id("dec");
        let now = format_timestamp(&Local::now());
        let conn = self.conn();
        conn.execute(
            "INSERT INTO decisions (id, timestamp, context, decision, reasoning, confidence, tags) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                now,
                truncate_chars(context, MAX_DECISION_TEXT),
                truncate_chars(decision, MAX_DECISION_TEXT),
                truncate_chars(reasoning, MAX_DECISION_TEXT),
                clamp_confidence(confidence),
                tags_json(tags),
            ],
        )?;
        debug!(agent = %self.agent, id = %id, "recorded decision");
        Ok(id)
    }

    /// Record the outcome of a past decision, marking it resolved.
    ///
    /// Returns `false` when the id does not exist; callers racing on
    /// resolution treat that as a normal result, not a failure. Calling
    /// again on a resolved decision overwrites the outcome and score.
    pub fn record_outcome(
        &self,
        decision_id: &str,
        outcome: &str,
        score: f64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE decisions SET outcome = ?1, outcome_score = ?2, resolved = 1 WHERE id = ?3",
            params![
                truncate_chars(outcome, MAX_DECISION_TEXT),
                clamp_score(score),
                decision_id,
            ],
        )?;
        Ok(updated > 0)
    }

    /// Recent decisions, newest first.
    pub fn recent_decisions(
        &self,
        limit: usize,
        resolved_only: bool,
    ) -> Result<Vec<Decision>, StoreError> {
        let filter = if resolved_only { "WHERE resolved = 1 " } else { "" };
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions {filter}ORDER BY timestamp DESC LIMIT ?1"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], decision_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Search decisions by raw substring against context or decision
    /// text. Case-sensitive, newest first.
    pub fn search_decisions(&self, query: &str, limit: usize) -> Result<Vec<Decision>, StoreError> {
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions \
             WHERE instr(context, ?1) > 0 OR instr(decision, ?1) > 0 \
             ORDER BY timestamp DESC LIMIT ?2"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![query, limit as i64], decision_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Find past decisions relevant to the current situation.
    ///
    /// Recall-biased lexical match: a decision qualifies when its
    /// lower-cased context contains any situation token as a substring
    /// (see [`relevance::situation_tokens`]). Most recent matches first.
    pub fn relevant_decisions(
        &self,
        situation: &str,
        limit: usize,
    ) -> Result<Vec<Decision>, StoreError> {
        let tokens = relevance::situation_tokens(situation);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let conditions = tokens
            .iter()
            .map(|_| "instr(lower(context), ?) > 0")
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE {conditions} \
             ORDER BY timestamp DESC LIMIT ?"
        );

        let mut sql_params: Vec<Box<dyn ToSql>> = tokens
            .into_iter()
            .map(|t| Box::new(t) as Box<dyn ToSql>)
            .collect();
        sql_params.push(Box::new(limit as i64));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(sql_params.iter().map(|p| p.as_ref())),
            decision_from_row,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // --- Patterns ---

    /// Store a learned rule, or reinforce the active rule with the same
    /// (pattern_type, description).
    ///
    /// Reinforcement sums evidence and nudges confidence up by a fixed
    /// step, capped at 0.99. The lookup and the write run in one
    /// immediate transaction so concurrent writers cannot both insert.
    pub fn add_pattern(
        &self,
        pattern_type: &str,
        description: &str,
        evidence_count: i64,
        confidence: f64,
        tags: &[String],
    ) -> Result<String, StoreError> {
        let pattern_type = truncate_chars(pattern_type, MAX_PATTERN_TYPE);
        let description = truncate_chars(description, MAX_PATTERN_DESC);
        let evidence_count = evidence_count.max(1);
        let now = format_timestamp(&Local::now());

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<(String, i64, f64)> = tx
            .query_row(
                "SELECT id, evidence_count, confidence FROM patterns \
                 WHERE pattern_type = ?1 AND description = ?2 AND active = 1",
                params![pattern_type, description],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let id = match existing {
            Some((id, count, old_confidence)) => {
                let reinforced =
                    (old_confidence + REINFORCEMENT_STEP).min(MAX_PATTERN_CONFIDENCE);
                tx.execute(
                    "UPDATE patterns SET evidence_count = ?1, confidence = ?2, updated_at = ?3 \
                     WHERE id = ?4",
                    params![count + evidence_count, reinforced, now, id],
                )?;
                debug!(agent = %self.agent, id = %id, "reinforced pattern");
                id
            }
            None => {
                let id = mint_id("pat");
                tx.execute(
                    "INSERT INTO patterns (id, pattern_type, description, evidence_count, \
                     confidence, created_at, updated_at, tags) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        id,
                        pattern_type,
                        description,
                        evidence_count,
                        clamp_confidence(confidence),
                        now,
                        now,
                        tags_json(tags),
                    ],
                )?;
                debug!(agent = %self.agent, id = %id, pattern_type = %pattern_type, "added pattern");
                id
            }
        };

        tx.commit()?;
        Ok(id)
    }

    /// Active learned patterns, ordered by confidence then evidence,
    /// both descending.
    pub fn active_patterns(
        &self,
        pattern_type: Option<&str>,
        min_confidence: f64,
    ) -> Result<Vec<Pattern>, StoreError> {
        let mut sql = format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE active = 1");
        let mut sql_params: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(kind) = pattern_type {
            sql.push_str(" AND pattern_type = ?");
            sql_params.push(Box::new(kind.to_string()));
        }
        if min_confidence > 0.0 {
            sql.push_str(" AND confidence >= ?");
            sql_params.push(Box::new(min_confidence));
        }
        sql.push_str(" ORDER BY confidence DESC, evidence_count DESC");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(sql_params.iter().map(|p| p.as_ref())),
            pattern_from_row,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Deactivate a pattern that turned out to be wrong. The row is kept
    /// for audit. Returns `false` when the id does not exist.
    pub fn deactivate_pattern(&self, pattern_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE patterns SET active = 0 WHERE id = ?1",
            params![pattern_id],
        )?;
        Ok(updated > 0)
    }

    // --- Knowledge ---

    /// Store an agent-scoped fact, upserting by (category, key).
    ///
    /// `ttl_hours` of 0 means the fact never expires; otherwise the
    /// expiry is recomputed from now on every write.
    pub fn set_knowledge(
        &self,
        category: &str,
        key: &str,
        value: &str,
        source: &str,
        ttl_hours: i64,
    ) -> Result<String, StoreError> {
        let category = truncate_chars(category, MAX_KNOWLEDGE_CATEGORY);
        let key = truncate_chars(key, MAX_KNOWLEDGE_KEY);
        let value = truncate_chars(value, MAX_KNOWLEDGE_VALUE);
        let source = truncate_chars(source, MAX_KNOWLEDGE_SOURCE);
        let ttl_hours = ttl_hours.max(0);

        let now = Local::now();
        let now_text = format_timestamp(&now);
        let expires = if ttl_hours > 0 {
            format_timestamp(&(now + chrono::Duration::hours(ttl_hours)))
        } else {
            String::new()
        };

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM knowledge WHERE category = ?1 AND key = ?2",
                params![category, key],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE knowledge SET value = ?1, source = ?2, ttl_hours = ?3, \
                     created_at = ?4, expires_at = ?5 WHERE id = ?6",
                    params![value, source, ttl_hours, now_text, expires, id],
                )?;
                id
            }
            None => {
                let id = mint_id("kn");
                tx.execute(
                    "INSERT INTO knowledge (id, category, key, value, source, ttl_hours, \
                     created_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![id, category, key, value, source, ttl_hours, now_text, expires],
                )?;
                id
            }
        };

        tx.commit()?;
        Ok(id)
    }

    /// Knowledge entries, newest first, optionally filtered by category
    /// and key.
    ///
    /// Every read first physically purges rows whose expiry has passed,
    /// store-wide; there is no background expiry timer.
    pub fn get_knowledge(
        &self,
        category: Option<&str>,
        key: Option<&str>,
    ) -> Result<Vec<Knowledge>, StoreError> {
        let now = format_timestamp(&Local::now());
        let conn = self.conn();
        conn.execute(
            "DELETE FROM knowledge WHERE expires_at != '' AND expires_at < ?1",
            params![now],
        )?;

        let mut sql = format!("SELECT {KNOWLEDGE_COLUMNS} FROM knowledge WHERE 1=1");
        let mut sql_params: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(category) = category {
            sql.push_str(" AND category = ?");
            sql_params.push(Box::new(category.to_string()));
        }
        if let Some(key) = key {
            sql.push_str(" AND key = ?");
            sql_params.push(Box::new(key.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(sql_params.iter().map(|p| p.as_ref())),
            knowledge_from_row,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // --- Stats ---

    /// Aggregate health metrics for dashboards, derived entirely from
    /// the three entity tables.
    pub fn stats(&self) -> Result<MemoryStats, StoreError> {
        let conn = self.conn();
        let scalar = |sql: &str| -> rusqlite::Result<i64> {
            conn.query_row(sql, [], |row| row.get(0))
        };

        let total_decisions = scalar("SELECT COUNT(*) FROM decisions")? as u64;
        let resolved_decisions =
            scalar("SELECT COUNT(*) FROM decisions WHERE resolved = 1")? as u64;
        let active_patterns = scalar("SELECT COUNT(*) FROM patterns WHERE active = 1")? as u64;
        let total_knowledge = scalar("SELECT COUNT(*) FROM knowledge")? as u64;
        let win_count =
            scalar("SELECT COUNT(*) FROM decisions WHERE resolved = 1 AND outcome_score > 0")?
                as u64;
        let loss_count =
            scalar("SELECT COUNT(*) FROM decisions WHERE resolved = 1 AND outcome_score < 0")?
                as u64;

        let avg_confidence: f64 = conn
            .query_row(
                "SELECT AVG(confidence) FROM decisions WHERE resolved = 1",
                [],
                |row| row.get::<_, Option<f64>>(0),
            )?
            .unwrap_or(0.0);

        let week_ago = format_timestamp(&(Local::now() - chrono::Duration::days(7)));
        let recent_patterns_7d: u64 = conn.query_row(
            "SELECT COUNT(*) FROM patterns WHERE created_at > ?1",
            params![week_ago],
            |row| row.get::<_, i64>(0),
        )? as u64;

        let win_rate =
            win_count as f64 / (win_count + loss_count).max(1) as f64 * 100.0;
        let db_size_kb = std::fs::metadata(&self.db_path)
            .map(|m| m.len() as f64 / 1024.0)
            .unwrap_or(0.0);

        Ok(MemoryStats {
            agent: self.agent.clone(),
            total_decisions,
            resolved_decisions,
            unresolved_decisions: total_decisions - resolved_decisions,
            active_patterns,
            total_knowledge,
            win_count,
            loss_count,
            win_rate: round_to(win_rate, 1),
            avg_confidence: round_to(avg_confidence, 3),
            recent_patterns_7d,
            db_size_kb: round_to(db_size_kb, 1),
        })
    }
}

/// Agents with a database in the memory directory, sorted by name.
pub fn list_agents(memory_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(memory_dir) else {
        return Vec::new();
    };
    let mut agents: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "db") {
                path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            } else {
                None
            }
        })
        .collect();
    agents.sort();
    agents
}

fn tags_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

fn timestamp_at(idx: usize, text: &str) -> rusqlite::Result<chrono::DateTime<Local>> {
    parse_timestamp(text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {text}").into(),
        )
    })
}

fn decision_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Decision> {
    let timestamp: String = row.get(1)?;
    let tags: String = row.get(9)?;
    Ok(Decision {
        id: row.get(0)?,
        timestamp: timestamp_at(1, &timestamp)?,
        context: row.get(2)?,
        decision: row.get(3)?,
        reasoning: row.get(4)?,
        confidence: row.get(5)?,
        outcome: row.get(6)?,
        outcome_score: row.get(7)?,
        resolved: row.get::<_, i64>(8)? != 0,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
    })
}

fn pattern_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pattern> {
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    let tags: String = row.get(8)?;
    Ok(Pattern {
        id: row.get(0)?,
        pattern_type: row.get(1)?,
        description: row.get(2)?,
        evidence_count: row.get(3)?,
        confidence: row.get(4)?,
        active: row.get::<_, i64>(5)? != 0,
        created_at: timestamp_at(6, &created_at)?,
        updated_at: timestamp_at(7, &updated_at)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
    })
}

fn knowledge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Knowledge> {
    let created_at: String = row.get(6)?;
    let expires_at: String = row.get(7)?;
    Ok(Knowledge {
        id: row.get(0)?,
        category: row.get(1)?,
        key: row.get(2)?,
        value: row.get(3)?,
        source: row.get(4)?,
        ttl_hours: row.get(5)?,
        created_at: timestamp_at(6, &created_at)?,
        expires_at: if expires_at.is_empty() {
            None
        } else {
            Some(timestamp_at(7, &expires_at)?)
        },
    })
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            memory_dir: Some(dir.path().to_path_buf()),
            ..StorageConfig::default()
        };
        let store = MemoryStore::open("Hawk", &config).unwrap();
        (dir, store)
    }

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn agent_name_is_normalized() {
        let (_dir, store) = test_store();
        assert_eq!(store.agent(), "hawk");
        assert!(store.db_path().ends_with("hawk.db"));
    }

    #[test]
    fn record_then_read_back() {
        let (_dir, store) = test_store();
        let id = store
            .record_decision("BTC high vol", "Take YES position", "F&G=25", 0.7, &[])
            .unwrap();

        let recent = store.recent_decisions(1, false).unwrap();
        assert_eq!(recent.len(), 1);
        let dec = &recent[0];
        assert_eq!(dec.id, id);
        assert_eq!(dec.context, "BTC high vol");
        assert_eq!(dec.decision, "Take YES position");
        assert_eq!(dec.confidence, 0.7);
        assert!(!dec.resolved);
        assert_eq!(dec.outcome, "");
        assert_eq!(dec.outcome_score, 0.0);
    }

    #[test]
    fn confidence_is_clamped_on_write() {
        let (_dir, store) = test_store();
        store.record_decision("a", "b", "", 1.7, &[]).unwrap();
        store.record_decision("c", "d", "", -0.5, &[]).unwrap();

        let recent = store.recent_decisions(10, false).unwrap();
        let confidences: Vec<f64> = recent.iter().map(|d| d.confidence).collect();
        assert!(confidences.contains(&1.0));
        assert!(confidences.contains(&0.0));
    }

    #[test]
    fn oversized_text_is_truncated() {
        let (_dir, store) = test_store();
        let long = "x".repeat(MAX_DECISION_TEXT + 500);
        store.record_decision(&long, "d", "", 0.5, &[]).unwrap();

        let recent = store.recent_decisions(1, false).unwrap();
        assert_eq!(recent[0].context.chars().count(), MAX_DECISION_TEXT);
    }

    #[test]
    fn record_outcome_resolves_and_clamps() {
        let (_dir, store) = test_store();
        let id = store.record_decision("ctx", "dec", "", 0.5, &[]).unwrap();

        assert!(store.record_outcome(&id, "Won +$8.50", 0.85).unwrap());
        let dec = &store.recent_decisions(1, true).unwrap()[0];
        assert!(dec.resolved);
        assert_eq!(dec.outcome, "Won +$8.50");
        assert_eq!(dec.outcome_score, 0.85);

        assert!(store.record_outcome(&id, "adjusted", 2.5).unwrap());
        let dec = &store.recent_decisions(1, true).unwrap()[0];
        assert_eq!(dec.outcome_score, 1.0);
    }

    #[test]
    fn record_outcome_unknown_id_is_not_found() {
        let (_dir, store) = test_store();
        store.record_decision("ctx", "dec", "", 0.5, &[]).unwrap();

        assert!(!store.record_outcome("dec_0000000000", "Won", 1.0).unwrap());
        // Nothing was mutated.
        assert!(!store.recent_decisions(1, false).unwrap()[0].resolved);
    }

    #[test]
    fn recent_decisions_resolved_filter() {
        let (_dir, store) = test_store();
        let id = store.record_decision("first", "a", "", 0.5, &[]).unwrap();
        store.record_decision("second", "b", "", 0.5, &[]).unwrap();
        store.record_outcome(&id, "Won", 0.5).unwrap();

        assert_eq!(store.recent_decisions(10, false).unwrap().len(), 2);
        let resolved = store.recent_decisions(10, true).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].context, "first");
    }

    #[test]
    fn search_is_case_sensitive_substring() {
        let (_dir, store) = test_store();
        store
            .record_decision("BTC dropped 5%", "hold", "", 0.5, &[])
            .unwrap();

        assert_eq!(store.search_decisions("BTC", 10).unwrap().len(), 1);
        assert_eq!(store.search_decisions("btc", 10).unwrap().len(), 0);
        // Decision text is searched too.
        assert_eq!(store.search_decisions("hold", 10).unwrap().len(), 1);
    }

    #[test]
    fn relevant_decisions_matches_on_token_overlap() {
        let (_dir, store) = test_store();
        store
            .record_decision("BTC dropped 5% in high volatility", "exit", "", 0.5, &[])
            .unwrap();
        store
            .record_decision("ETH staking rewards announced", "stake", "", 0.5, &[])
            .unwrap();

        let relevant = store
            .relevant_decisions("BTC high volatility trade", 5)
            .unwrap();
        assert_eq!(relevant.len(), 1);
        assert!(relevant[0].context.contains("volatility"));
    }

    #[test]
    fn relevant_decisions_no_qualifying_tokens() {
        let (_dir, store) = test_store();
        store.record_decision("anything", "x", "", 0.5, &[]).unwrap();
        assert!(store.relevant_decisions("a an of", 5).unwrap().is_empty());
    }

    #[test]
    fn add_pattern_twice_reinforces() {
        let (_dir, store) = test_store();
        let first = store
            .add_pattern("trend", "BTC DOWN in fear markets", 1, 0.5, &[])
            .unwrap();
        let second = store
            .add_pattern("trend", "BTC DOWN in fear markets", 1, 0.5, &[])
            .unwrap();
        assert_eq!(first, second);

        let patterns = store.active_patterns(Some("trend"), 0.0).unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].evidence_count, 2);
        assert!((patterns[0].confidence - 0.55).abs() < 1e-9);
    }

    #[test]
    fn reinforcement_caps_confidence() {
        let (_dir, store) = test_store();
        store.add_pattern("trend", "capped", 1, 0.97, &[]).unwrap();
        store.add_pattern("trend", "capped", 1, 0.97, &[]).unwrap();

        let patterns = store.active_patterns(Some("trend"), 0.0).unwrap();
        assert!((patterns[0].confidence - 0.99).abs() < 1e-9);
    }

    #[test]
    fn deactivated_pattern_is_not_reinforced() {
        let (_dir, store) = test_store();
        let id = store.add_pattern("trend", "wrong", 1, 0.5, &[]).unwrap();
        assert!(store.deactivate_pattern(&id).unwrap());

        let new_id = store.add_pattern("trend", "wrong", 1, 0.5, &[]).unwrap();
        assert_ne!(id, new_id);

        let active = store.active_patterns(None, 0.0).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].evidence_count, 1);
    }

    #[test]
    fn deactivate_unknown_pattern_is_not_found() {
        let (_dir, store) = test_store();
        assert!(!store.deactivate_pattern("pat_0000000000").unwrap());
    }

    #[test]
    fn active_patterns_ordering_and_filters() {
        let (_dir, store) = test_store();
        store.add_pattern("trend", "low", 2, 0.3, &[]).unwrap();
        store.add_pattern("trend", "high", 1, 0.9, &[]).unwrap();
        store.add_pattern("trend", "mid-more", 5, 0.6, &[]).unwrap();
        store.add_pattern("trend", "mid-less", 2, 0.6, &[]).unwrap();
        store.add_pattern("other", "elsewhere", 1, 0.95, &[]).unwrap();

        let all = store.active_patterns(Some("trend"), 0.0).unwrap();
        let order: Vec<&str> = all.iter().map(|p| p.description.as_str()).collect();
        assert_eq!(order, vec!["high", "mid-more", "mid-less", "low"]);

        let confident = store.active_patterns(Some("trend"), 0.5).unwrap();
        assert_eq!(confident.len(), 3);
    }

    #[test]
    fn pattern_tags_roundtrip() {
        let (_dir, store) = test_store();
        store
            .add_pattern("trend", "tagged", 1, 0.5, &tags(&["btc", "fear"]))
            .unwrap();
        let patterns = store.active_patterns(Some("trend"), 0.0).unwrap();
        assert_eq!(patterns[0].tags, tags(&["btc", "fear"]));
    }

    #[test]
    fn knowledge_upsert_keeps_one_row() {
        let (_dir, store) = test_store();
        let first = store
            .set_knowledge("risk", "btc_vol", "high", "scanner", 0)
            .unwrap();
        let second = store
            .set_knowledge("risk", "btc_vol", "extreme", "scanner", 0)
            .unwrap();
        assert_eq!(first, second);

        let rows = store.get_knowledge(Some("risk"), Some("btc_vol")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, "extreme");
    }

    #[test]
    fn knowledge_without_ttl_never_expires() {
        let (_dir, store) = test_store();
        store
            .set_knowledge("market", "regime", "risk-off", "", 0)
            .unwrap();
        let rows = store.get_knowledge(None, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].expires_at.is_none());
    }

    #[test]
    fn expired_knowledge_is_purged_on_read() {
        let (_dir, store) = test_store();
        store
            .set_knowledge("risk", "btc_vol", "high", "scanner", 1)
            .unwrap();
        assert_eq!(store.get_knowledge(None, None).unwrap().len(), 1);

        // Backdate the expiry through a second connection, the way a
        // sibling process of the same agent would see the row.
        let raw = Connection::open(store.db_path()).unwrap();
        let past = format_timestamp(&(Local::now() - chrono::Duration::hours(2)));
        raw.execute("UPDATE knowledge SET expires_at = ?1", params![past])
            .unwrap();

        assert!(store.get_knowledge(None, None).unwrap().is_empty());
        // The row is physically gone, not merely hidden.
        let count: i64 = raw
            .query_row("SELECT COUNT(*) FROM knowledge", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn stats_reflect_store_contents() {
        let (_dir, store) = test_store();
        let won = store.record_decision("a", "x", "", 0.8, &[]).unwrap();
        let lost = store.record_decision("b", "y", "", 0.6, &[]).unwrap();
        store.record_decision("c", "z", "", 0.4, &[]).unwrap();
        store.record_outcome(&won, "Won", 0.9).unwrap();
        store.record_outcome(&lost, "Lost", -0.4).unwrap();
        store.add_pattern("trend", "something", 2, 0.7, &[]).unwrap();
        store.set_knowledge("risk", "k", "v", "", 0).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.agent, "hawk");
        assert_eq!(stats.total_decisions, 3);
        assert_eq!(stats.resolved_decisions, 2);
        assert_eq!(stats.unresolved_decisions, 1);
        assert_eq!(stats.active_patterns, 1);
        assert_eq!(stats.total_knowledge, 1);
        assert_eq!(stats.win_count, 1);
        assert_eq!(stats.loss_count, 1);
        assert_eq!(stats.win_rate, 50.0);
        assert!((stats.avg_confidence - 0.7).abs() < 1e-9);
        assert_eq!(stats.recent_patterns_7d, 1);
    }

    #[test]
    fn list_agents_finds_databases() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            memory_dir: Some(dir.path().to_path_buf()),
            ..StorageConfig::default()
        };
        MemoryStore::open("zeta", &config).unwrap();
        MemoryStore::open("alpha", &config).unwrap();

        assert_eq!(list_agents(dir.path()), vec!["alpha", "zeta"]);
        assert!(list_agents(Path::new("/nonexistent")).is_empty());
    }
}
