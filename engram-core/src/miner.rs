//! Pattern miner: batch extraction of learned rules from decision
//! history.
//!
//! Reads an agent's resolved decisions and derives statistical patterns
//! through four independent strategies: tag performance, keyword signal,
//! confidence calibration, and temporal (hour-of-day). Results are
//! written back through pattern reinforcement, then single-observation
//! noise is pruned. Designed to run nightly or on demand, per agent.

use crate::config::{EngramConfig, MinerConfig};
use crate::error::StoreError;
use crate::events::{EventSink, LEARNING_APPLIED, Severity, publish_best_effort};
use crate::relevance::extract_keywords;
use crate::store::{MemoryStore, list_agents};
use crate::types::Decision;
use chrono::Timelike;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{info, warn};

/// Win-rate threshold above which a keyword counts as a win signal.
const KEYWORD_WIN_THRESHOLD: f64 = 0.65;
/// Win-rate threshold below which a keyword counts as a loss signal.
const KEYWORD_LOSS_THRESHOLD: f64 = 0.35;
/// Stated-confidence cutoffs for the calibration buckets.
const CALIBRATION_HIGH: f64 = 0.7;
const CALIBRATION_LOW: f64 = 0.4;
/// Win-rate thresholds for hour-of-day patterns.
const TEMPORAL_WIN_THRESHOLD: f64 = 0.7;
const TEMPORAL_LOSS_THRESHOLD: f64 = 0.3;

/// Outcome of one agent's mining pass.
#[derive(Debug, Clone, Serialize)]
pub struct MineReport {
    pub agent: String,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub resolved_decisions: u64,
    pub patterns_extracted: usize,
    pub patterns_pruned: usize,
    pub new_patterns: Vec<String>,
}

impl MineReport {
    fn skipped(agent: &str, reason: &str, resolved: u64) -> Self {
        Self {
            agent: agent.to_string(),
            skipped: true,
            skip_reason: Some(reason.to_string()),
            resolved_decisions: resolved,
            patterns_extracted: 0,
            patterns_pruned: 0,
            new_patterns: Vec::new(),
        }
    }
}

/// Mine patterns from a single agent's decision history.
///
/// Skips the agent entirely when it has fewer than
/// [`MinerConfig::min_evidence`] resolved decisions. Re-running over
/// unchanged data reinforces existing patterns instead of duplicating
/// them, which keeps nudging their confidence toward 0.99; that drift is
/// accepted. Two concurrent runs for the same agent each reinforce
/// independently, so callers serialize mining per agent.
pub fn mine_agent(store: &MemoryStore, config: &MinerConfig) -> Result<MineReport, StoreError> {
    let agent = store.agent();
    let stats = store.stats()?;

    if (stats.resolved_decisions as usize) < config.min_evidence {
        info!(
            agent,
            resolved = stats.resolved_decisions,
            needed = config.min_evidence,
            "skipping agent: not enough resolved decisions"
        );
        return Ok(MineReport::skipped(
            agent,
            "insufficient_data",
            stats.resolved_decisions,
        ));
    }

    let resolved = store.recent_decisions(config.scan_limit, true)?;
    let mut new_patterns = Vec::new();

    mine_tag_performance(store, &resolved, config, &mut new_patterns)?;
    mine_keyword_signals(store, &resolved, config, &mut new_patterns)?;
    mine_calibration(store, &resolved, config, &mut new_patterns)?;
    mine_temporal(store, &resolved, config, &mut new_patterns)?;

    let pruned = prune_weak_patterns(store)?;

    info!(
        agent,
        extracted = new_patterns.len(),
        pruned,
        "mining pass complete"
    );
    Ok(MineReport {
        agent: agent.to_string(),
        skipped: false,
        skip_reason: None,
        resolved_decisions: stats.resolved_decisions,
        patterns_extracted: new_patterns.len(),
        patterns_pruned: pruned,
        new_patterns,
    })
}

/// Mine every agent with a database in the configured memory directory.
///
/// A failing agent is reported as skipped with the error text and the
/// batch continues. After each successful pass a `learning_applied`
/// event is published best-effort through `events`.
pub async fn mine_all(config: &EngramConfig, events: &dyn EventSink) -> Vec<MineReport> {
    let memory_dir = config.storage.memory_dir();
    let agents = list_agents(&memory_dir);
    if agents.is_empty() {
        info!(dir = %memory_dir.display(), "no agent databases found");
        return Vec::new();
    }

    info!(count = agents.len(), "mining patterns for all agents");
    let mut reports = Vec::with_capacity(agents.len());
    for agent in agents {
        let report = match MemoryStore::open(&agent, &config.storage)
            .and_then(|store| mine_agent(&store, &config.miner))
        {
            Ok(report) => report,
            Err(e) => {
                warn!(agent = %agent, error = %e, "mining failed for agent");
                MineReport::skipped(&agent, &e.to_string(), 0)
            }
        };

        if !report.skipped {
            publish_best_effort(
                events,
                &report.agent,
                LEARNING_APPLIED,
                json!({
                    "patterns_extracted": report.patterns_extracted,
                    "patterns_pruned": report.patterns_pruned,
                }),
                Severity::Info,
                &format!(
                    "{}: {} patterns extracted, {} pruned",
                    report.agent, report.patterns_extracted, report.patterns_pruned
                ),
            )
            .await;
        }
        reports.push(report);
    }

    let extracted: usize = reports.iter().map(|r| r.patterns_extracted).sum();
    let skipped = reports.iter().filter(|r| r.skipped).count();
    info!(
        mined = reports.len() - skipped,
        skipped, extracted, "mining batch complete"
    );
    reports
}

/// Strategy 1: win rates per tag.
fn mine_tag_performance(
    store: &MemoryStore,
    resolved: &[Decision],
    config: &MinerConfig,
    new_patterns: &mut Vec<String>,
) -> Result<(), StoreError> {
    #[derive(Default)]
    struct Tally {
        wins: u64,
        losses: u64,
        total: u64,
    }

    let mut tallies: HashMap<&str, Tally> = HashMap::new();
    for dec in resolved {
        for tag in &dec.tags {
            let tally = tallies.entry(tag.as_str()).or_default();
            tally.total += 1;
            if dec.outcome_score > 0.0 {
                tally.wins += 1;
            } else if dec.outcome_score < 0.0 {
                tally.losses += 1;
            }
        }
    }

    for (tag, tally) in tallies {
        if (tally.total as usize) < config.min_evidence {
            continue;
        }
        let win_rate = tally.wins as f64 / (tally.wins + tally.losses).max(1) as f64;
        if win_rate >= config.min_confidence || win_rate <= 1.0 - config.min_confidence {
            let result = if win_rate >= 0.5 { "wins" } else { "loses" };
            let shown = if win_rate >= 0.5 { win_rate } else { 1.0 - win_rate };
            let description = format!(
                "Tag '{tag}': {result} {:.0}% of the time ({}W/{}L over {} decisions)",
                shown * 100.0,
                tally.wins,
                tally.losses,
                tally.total
            );
            store.add_pattern(
                "tag_performance",
                &description,
                tally.total as i64,
                win_rate.max(1.0 - win_rate),
                &[],
            )?;
            info!(agent = %store.agent(), "{description}");
            new_patterns.push(description);
        }
    }
    Ok(())
}

/// Strategy 2: context keywords strongly associated with wins or losses.
fn mine_keyword_signals(
    store: &MemoryStore,
    resolved: &[Decision],
    config: &MinerConfig,
    new_patterns: &mut Vec<String>,
) -> Result<(), StoreError> {
    let mut win_words: HashMap<String, u64> = HashMap::new();
    let mut loss_words: HashMap<String, u64> = HashMap::new();
    for dec in resolved {
        let words = extract_keywords(&dec.context);
        let counter = if dec.outcome_score > 0.0 {
            &mut win_words
        } else if dec.outcome_score < 0.0 {
            &mut loss_words
        } else {
            continue;
        };
        for word in words {
            *counter.entry(word).or_insert(0) += 1;
        }
    }

    let mut all_words: Vec<&String> = win_words.keys().chain(loss_words.keys()).collect();
    all_words.sort();
    all_words.dedup();

    for word in all_words {
        let wins = win_words.get(word).copied().unwrap_or(0);
        let losses = loss_words.get(word).copied().unwrap_or(0);
        let total = wins + losses;
        if (total as usize) < config.min_evidence {
            continue;
        }
        let win_rate = wins as f64 / total as f64;
        if win_rate >= KEYWORD_WIN_THRESHOLD {
            let description = format!(
                "Keyword '{word}' in context: {:.0}% win rate ({wins}W/{losses}L)",
                win_rate * 100.0
            );
            store.add_pattern("keyword_signal", &description, total as i64, win_rate, &[])?;
            info!(agent = %store.agent(), "{description}");
            new_patterns.push(description);
        } else if win_rate <= KEYWORD_LOSS_THRESHOLD {
            let description = format!(
                "Keyword '{word}' in context: {:.0}% loss rate ({losses}L/{wins}W)",
                (1.0 - win_rate) * 100.0
            );
            store.add_pattern(
                "keyword_signal",
                &description,
                total as i64,
                1.0 - win_rate,
                &[],
            )?;
            info!(agent = %store.agent(), "{description}");
            new_patterns.push(description);
        }
    }
    Ok(())
}

/// Strategy 3: how well the agent's stated confidence predicts outcomes.
fn mine_calibration(
    store: &MemoryStore,
    resolved: &[Decision],
    config: &MinerConfig,
    new_patterns: &mut Vec<String>,
) -> Result<(), StoreError> {
    let high: Vec<&Decision> = resolved
        .iter()
        .filter(|d| d.confidence >= CALIBRATION_HIGH)
        .collect();
    let low: Vec<&Decision> = resolved
        .iter()
        .filter(|d| d.confidence < CALIBRATION_LOW)
        .collect();

    if high.len() >= config.min_evidence {
        let win_rate =
            high.iter().filter(|d| d.outcome_score > 0.0).count() as f64 / high.len() as f64;
        let description = format!(
            "High-confidence decisions (>=0.7): actual win rate {:.0}% over {} decisions",
            win_rate * 100.0,
            high.len()
        );
        store.add_pattern("calibration", &description, high.len() as i64, win_rate, &[])?;
        new_patterns.push(description);
    }

    if low.len() >= config.min_evidence {
        let win_rate =
            low.iter().filter(|d| d.outcome_score > 0.0).count() as f64 / low.len() as f64;
        let description = format!(
            "Low-confidence decisions (<0.4): actual win rate {:.0}% over {} decisions",
            win_rate * 100.0,
            low.len()
        );
        store.add_pattern(
            "calibration",
            &description,
            low.len() as i64,
            win_rate.max(1.0 - win_rate),
            &[],
        )?;
        new_patterns.push(description);
    }
    Ok(())
}

/// Strategy 4: hour-of-day windows that are clearly favorable or not.
fn mine_temporal(
    store: &MemoryStore,
    resolved: &[Decision],
    config: &MinerConfig,
    new_patterns: &mut Vec<String>,
) -> Result<(), StoreError> {
    let mut hours: HashMap<u32, (u64, u64)> = HashMap::new();
    for dec in resolved {
        let hour = dec.timestamp.hour();
        let (wins, losses) = hours.entry(hour).or_insert((0, 0));
        if dec.outcome_score > 0.0 {
            *wins += 1;
        } else if dec.outcome_score < 0.0 {
            *losses += 1;
        }
    }

    for (hour, (wins, losses)) in hours {
        let total = wins + losses;
        if (total as usize) < config.min_evidence {
            continue;
        }
        let win_rate = wins as f64 / total as f64;
        if win_rate >= TEMPORAL_WIN_THRESHOLD || win_rate <= TEMPORAL_LOSS_THRESHOLD {
            let period = match hour {
                6..=11 => "morning",
                12..=17 => "afternoon",
                18..=21 => "evening",
                _ => "night",
            };
            let result = if win_rate >= 0.5 { "favorable" } else { "unfavorable" };
            let shown = if win_rate >= 0.5 { win_rate } else { 1.0 - win_rate };
            let description = format!(
                "Hour {hour}:00 ({period}): {result} - {:.0}% WR ({wins}W/{losses}L)",
                shown * 100.0
            );
            store.add_pattern(
                "temporal",
                &description,
                total as i64,
                win_rate.max(1.0 - win_rate),
                &[],
            )?;
            info!(agent = %store.agent(), "{description}");
            new_patterns.push(description);
        }
    }
    Ok(())
}

/// Deactivate single-observation patterns that never accumulated
/// support.
fn prune_weak_patterns(store: &MemoryStore) -> Result<usize, StoreError> {
    let mut pruned = 0;
    for pattern in store.active_patterns(None, 0.0)? {
        if pattern.evidence_count <= 1 && pattern.confidence < 0.5
            && store.deactivate_pattern(&pattern.id)?
        {
            pruned += 1;
        }
    }
    Ok(pruned)
}
