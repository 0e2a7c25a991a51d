//! Brain: text generation with injected memory context.
//!
//! Wraps a [`MemoryStore`] and an external [`TextGenerator`] into one
//! interface. Before answering, the brain pulls learned patterns and
//! similar past decisions, renders them into a bounded memory block, and
//! appends it to the system prompt so the model sees its own history.

use crate::config::{ContextConfig, EngramConfig};
use crate::error::{GenerateError, Result, StoreError};
use crate::store::MemoryStore;
use crate::types::{Decision, MemoryStats, Pattern, ThinkResult, truncate_chars};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Options forwarded to the text-generation collaborator.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Routing hint for the provider; the brain fills in its default
    /// when unset.
    pub task_type: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.3,
            task_type: None,
        }
    }
}

/// Per-call options for [`Brain::think`].
#[derive(Debug, Clone)]
pub struct ThinkOptions {
    pub generate: GenerateOptions,
    /// Set to `false` to answer without injected memory.
    pub include_memory: bool,
}

impl Default for ThinkOptions {
    fn default() -> Self {
        Self {
            generate: GenerateOptions::default(),
            include_memory: true,
        }
    }
}

/// External text-generation collaborator: produce text given a system
/// prompt and a user prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> std::result::Result<String, GenerateError>;
}

/// Combined generation + memory interface for one agent.
pub struct Brain {
    agent: String,
    system_prompt: String,
    task_type: String,
    context: ContextConfig,
    store: MemoryStore,
    generator: Arc<dyn TextGenerator>,
}

impl Brain {
    /// Open (or create) the agent's store and wrap it with the given
    /// generator.
    pub fn new(
        agent: &str,
        system_prompt: impl Into<String>,
        generator: Arc<dyn TextGenerator>,
        config: &EngramConfig,
    ) -> std::result::Result<Self, StoreError> {
        let store = MemoryStore::open(agent, &config.storage)?;
        Ok(Self {
            agent: store.agent().to_string(),
            system_prompt: system_prompt.into(),
            task_type: "reasoning".to_string(),
            context: config.context.clone(),
            store,
            generator,
        })
    }

    /// Override the default routing hint sent to the generator.
    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    /// The underlying memory store.
    pub fn memory(&self) -> &MemoryStore {
        &self.store
    }

    /// Think about a situation with memory context.
    ///
    /// Store failures surface as errors; a generation failure degrades
    /// to an empty `content` with the memory telemetry intact, so the
    /// caller can proceed as "no response".
    pub async fn think(
        &self,
        situation: &str,
        question: &str,
        options: ThinkOptions,
    ) -> Result<ThinkResult> {
        let (memory_context, patterns_used, decisions_found) = if options.include_memory {
            self.build_memory_context(situation)?
        } else {
            (String::new(), 0, 0)
        };

        let mut system = self.system_prompt.clone();
        if !memory_context.is_empty() {
            system.push_str("\n\n--- YOUR MEMORY (learned from past experience) ---\n");
            system.push_str(&memory_context);
            system.push_str(
                "\n--- END MEMORY ---\n\nUse this memory to inform your decision, but don't \
                 blindly follow patterns if the current situation is significantly different.",
            );
        }
        let user = format!("SITUATION: {situation}\n\n{question}");

        let mut generate = options.generate.clone();
        if generate.task_type.is_none() {
            generate.task_type = Some(self.task_type.clone());
        }

        let content = match self.generator.generate(&system, &user, &generate).await {
            Ok(content) => content,
            Err(e) => {
                warn!(agent = %self.agent, error = %e, "generation failed; returning no response");
                String::new()
            }
        };

        debug!(
            agent = %self.agent,
            patterns_used,
            decisions_found,
            "think complete"
        );
        Ok(ThinkResult {
            content,
            memory_context,
            patterns_used,
            decisions_found,
        })
    }

    /// Build the memory block from learned patterns and similar past
    /// decisions. Returns the block plus the two counts used.
    fn build_memory_context(
        &self,
        situation: &str,
    ) -> std::result::Result<(String, usize, usize), StoreError> {
        let mut parts: Vec<String> = Vec::new();

        let patterns = self
            .store
            .active_patterns(None, self.context.min_pattern_confidence)?;
        let patterns: Vec<&Pattern> = patterns.iter().take(self.context.max_patterns).collect();
        if !patterns.is_empty() {
            parts.push("LEARNED PATTERNS:".to_string());
            for p in &patterns {
                let confidence_pct = (p.confidence * 100.0) as i64;
                parts.push(format!(
                    "  [{confidence_pct}% confidence, {} evidence] {}",
                    p.evidence_count, p.description
                ));
            }
        }

        let decisions = self
            .store
            .relevant_decisions(situation, self.context.max_decisions)?;
        if !decisions.is_empty() {
            parts.push("\nSIMILAR PAST DECISIONS:".to_string());
            for d in &decisions {
                parts.push(render_decision(d));
            }
        }

        Ok((parts.join("\n"), patterns.len(), decisions.len()))
    }

    // --- Memory shortcuts ---

    /// Record a decision. Returns the decision id.
    pub fn remember_decision(
        &self,
        context: &str,
        decision: &str,
        reasoning: &str,
        confidence: f64,
        tags: &[String],
    ) -> std::result::Result<String, StoreError> {
        self.store
            .record_decision(context, decision, reasoning, confidence, tags)
    }

    /// Record the outcome of a past decision.
    pub fn remember_outcome(
        &self,
        decision_id: &str,
        outcome: &str,
        score: f64,
    ) -> std::result::Result<bool, StoreError> {
        self.store.record_outcome(decision_id, outcome, score)
    }

    /// Store or reinforce a learned rule.
    pub fn learn_pattern(
        &self,
        pattern_type: &str,
        description: &str,
        evidence_count: i64,
        confidence: f64,
    ) -> std::result::Result<String, StoreError> {
        self.store
            .add_pattern(pattern_type, description, evidence_count, confidence, &[])
    }

    /// Store a fact in the knowledge base.
    pub fn remember_fact(
        &self,
        category: &str,
        key: &str,
        value: &str,
        source: &str,
        ttl_hours: i64,
    ) -> std::result::Result<String, StoreError> {
        self.store.set_knowledge(category, key, value, source, ttl_hours)
    }

    /// Active learned patterns at or above the given confidence.
    pub fn patterns(&self, min_confidence: f64) -> std::result::Result<Vec<Pattern>, StoreError> {
        self.store.active_patterns(None, min_confidence)
    }

    /// Memory stats for dashboards.
    pub fn stats(&self) -> std::result::Result<MemoryStats, StoreError> {
        self.store.stats()
    }
}

/// Render one past decision as a short preview block.
fn render_decision(d: &Decision) -> String {
    let outcome = if d.resolved {
        let marker = if d.outcome_score > 0.0 {
            "WIN"
        } else if d.outcome_score < 0.0 {
            "LOSS"
        } else {
            "NEUTRAL"
        };
        format!(" -> {marker}: {}", truncate_chars(&d.outcome, 100))
    } else {
        String::new()
    };
    format!(
        "  Context: {}\n  Decision: {}\n  Confidence: {:.0}%{}",
        truncate_chars(&d.context, 150),
        truncate_chars(&d.decision, 150),
        d.confidence * 100.0,
        outcome
    )
}

/// Generator that returns canned responses, for tests and offline use.
pub struct MockGenerator {
    response: String,
    fail: bool,
    last_system: std::sync::Mutex<Option<String>>,
}

impl MockGenerator {
    /// A generator that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        Self {
            response: text.to_string(),
            fail: false,
            last_system: std::sync::Mutex::new(None),
        }
    }

    /// A generator whose every call fails.
    pub fn failing() -> Self {
        Self {
            response: String::new(),
            fail: true,
            last_system: std::sync::Mutex::new(None),
        }
    }

    /// The system prompt received by the most recent call.
    pub fn last_system_prompt(&self) -> Option<String> {
        self.last_system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(
        &self,
        system: &str,
        _user: &str,
        _options: &GenerateOptions,
    ) -> std::result::Result<String, GenerateError> {
        *self
            .last_system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(system.to_string());
        if self.fail {
            return Err(GenerateError::Request {
                message: "mock failure".to_string(),
            });
        }
        Ok(self.response.clone())
    }
}
