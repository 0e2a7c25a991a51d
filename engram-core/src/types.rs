//! Core entity types for the engram memory store.
//!
//! One agent's memory is three kinds of records: [`Decision`] (a choice
//! with outcome tracking), [`Pattern`] (a learned rule with evidence and
//! confidence), and [`Knowledge`] (a scoped fact with optional TTL).

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length (chars) for decision context, decision, reasoning,
/// and outcome text.
pub const MAX_DECISION_TEXT: usize = 2000;
/// Maximum length (chars) for a pattern type tag.
pub const MAX_PATTERN_TYPE: usize = 100;
/// Maximum length (chars) for a pattern description.
pub const MAX_PATTERN_DESC: usize = 1000;
/// Maximum length (chars) for a knowledge category.
pub const MAX_KNOWLEDGE_CATEGORY: usize = 200;
/// Maximum length (chars) for a knowledge key.
pub const MAX_KNOWLEDGE_KEY: usize = 200;
/// Maximum length (chars) for a knowledge value.
pub const MAX_KNOWLEDGE_VALUE: usize = 5000;
/// Maximum length (chars) for a knowledge source label.
pub const MAX_KNOWLEDGE_SOURCE: usize = 100;

/// A single choice made by an agent, optionally resolved later with an
/// outcome.
///
/// Until resolved, `outcome` is empty and `outcome_score` is 0.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Opaque unique id (`dec_` prefix), assigned at creation.
    pub id: String,
    /// When the decision was made, in the agent's local zone.
    pub timestamp: DateTime<Local>,
    /// The situation the agent was in.
    pub context: String,
    /// The choice that was made.
    pub decision: String,
    /// Optional free-text reasoning.
    pub reasoning: String,
    /// Stated confidence at decision time, clamped to [0.0, 1.0].
    pub confidence: f64,
    /// Free-text outcome, empty until resolved.
    pub outcome: String,
    /// Outcome quality in [-1.0, 1.0]; sign encodes win/loss.
    pub outcome_score: f64,
    /// Whether an outcome has been recorded.
    pub resolved: bool,
    /// Short labels used for grouping during mining.
    pub tags: Vec<String>,
}

/// A learned rule describing a statistical regularity in past decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Opaque unique id (`pat_` prefix).
    pub id: String,
    /// Short classifier tag (mining strategy name or caller-supplied).
    pub pattern_type: String,
    /// Human-readable rule, embedding the supporting statistic.
    pub description: String,
    /// Accumulated supporting observations, >= 1.
    pub evidence_count: i64,
    /// Confidence in [0.0, 1.0]; reinforcement nudges it toward 0.99.
    pub confidence: f64,
    /// Deactivated patterns are retained for audit but excluded from
    /// read paths.
    pub active: bool,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    pub tags: Vec<String>,
}

/// An agent-scoped fact with optional expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Knowledge {
    /// Opaque unique id (`kn_` prefix).
    pub id: String,
    pub category: String,
    pub key: String,
    pub value: String,
    /// Provenance label.
    pub source: String,
    /// 0 means the fact never expires.
    pub ttl_hours: i64,
    pub created_at: DateTime<Local>,
    /// `None` when ttl_hours is 0, else creation + ttl.
    pub expires_at: Option<DateTime<Local>>,
}

/// Read-only aggregate view over one agent's store, derived entirely from
/// the three entity tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub agent: String,
    pub total_decisions: u64,
    pub resolved_decisions: u64,
    pub unresolved_decisions: u64,
    pub active_patterns: u64,
    pub total_knowledge: u64,
    /// Resolved decisions with outcome_score > 0.
    pub win_count: u64,
    /// Resolved decisions with outcome_score < 0.
    pub loss_count: u64,
    /// Percent of wins among wins + losses, one decimal.
    pub win_rate: f64,
    /// Mean stated confidence of resolved decisions, three decimals.
    pub avg_confidence: f64,
    /// Patterns created in the last 7 days.
    pub recent_patterns_7d: u64,
    pub db_size_kb: f64,
}

/// Result of a [`Brain::think`](crate::brain::Brain::think) call, carrying
/// the response plus memory-usage telemetry for the caller.
#[derive(Debug, Clone)]
pub struct ThinkResult {
    /// Generated response; empty when the generation collaborator failed.
    pub content: String,
    /// The memory block that was injected, empty if none was available.
    pub memory_context: String,
    /// How many learned patterns were referenced.
    pub patterns_used: usize,
    /// How many similar past decisions were found.
    pub decisions_found: usize,
}

/// Mint a prefixed record id: the prefix plus the first 10 hex chars of a
/// fresh UUIDv4.
pub(crate) fn mint_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..10])
}

/// Clamp a stated confidence into [0.0, 1.0].
pub(crate) fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Clamp an outcome score into [-1.0, 1.0].
pub(crate) fn clamp_score(value: f64) -> f64 {
    value.clamp(-1.0, 1.0)
}

/// Truncate to at most `max` chars, respecting char boundaries.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Render a timestamp as RFC 3339 with fixed microsecond precision, so
/// the stored text sorts chronologically.
pub(crate) fn format_timestamp(ts: &DateTime<Local>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse a stored RFC 3339 timestamp back into the local zone.
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Local))
}
