//! End-to-end test of the learning loop: record decisions, resolve
//! outcomes, mine patterns, and see them surface in assembled context.

use engram_core::{
    Brain, EngramConfig, MemoryStore, MockGenerator, StorageConfig, ThinkOptions, mine_agent,
};
use std::sync::Arc;

fn config_in(dir: &std::path::Path) -> EngramConfig {
    EngramConfig {
        storage: StorageConfig {
            memory_dir: Some(dir.to_path_buf()),
            ..StorageConfig::default()
        },
        ..EngramConfig::default()
    }
}

#[tokio::test]
async fn decisions_become_patterns_become_context() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    // An agent records a run of breakout trades and their outcomes.
    let store = MemoryStore::open("hawk", &config.storage).unwrap();
    for i in 0..8 {
        let id = store
            .record_decision(
                &format!("BTC breakout setup, attempt {i}"),
                "Enter long",
                "volume confirms",
                0.7,
                &["breakout".to_string()],
            )
            .unwrap();
        store.record_outcome(&id, "Won", 0.8).unwrap();
    }
    for i in 0..2 {
        let id = store
            .record_decision(
                &format!("BTC breakout fakeout, attempt {i}"),
                "Enter long",
                "",
                0.7,
                &["breakout".to_string()],
            )
            .unwrap();
        store.record_outcome(&id, "Lost", -0.5).unwrap();
    }

    // The nightly miner turns that history into a rule.
    let report = mine_agent(&store, &config.miner).unwrap();
    assert!(!report.skipped);
    assert!(report.patterns_extracted >= 1);

    let tag_patterns = store
        .active_patterns(Some("tag_performance"), 0.0)
        .unwrap();
    assert_eq!(tag_patterns.len(), 1);
    assert_eq!(tag_patterns[0].evidence_count, 10);
    assert!((tag_patterns[0].confidence - 0.8).abs() < 1e-9);

    // A brain opened on the same agent sees the mined rule and the past
    // decisions when asked about a similar situation.
    let generator = Arc::new(MockGenerator::with_response("Enter with reduced size."));
    let brain = Brain::new("hawk", "You are Hawk.", generator.clone(), &config).unwrap();

    let result = brain
        .think(
            "BTC breakout forming on high volume",
            "Should I enter?",
            ThinkOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.content, "Enter with reduced size.");
    assert!(result.patterns_used >= 1);
    assert!(result.decisions_found >= 1);
    assert!(result.memory_context.contains("breakout"));

    let system = generator.last_system_prompt().unwrap();
    assert!(system.contains("--- YOUR MEMORY"));
    assert!(system.contains("Tag 'breakout'"));
}

#[tokio::test]
async fn empty_store_yields_empty_context_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let generator = Arc::new(MockGenerator::with_response("Proceeding blind."));
    let brain = Brain::new("fresh", "You are new here.", generator, &config).unwrap();

    let result = brain
        .think("never seen before", "What now?", ThinkOptions::default())
        .await
        .unwrap();

    assert_eq!(result.content, "Proceeding blind.");
    assert_eq!(result.memory_context, "");
    assert_eq!(result.patterns_used, 0);
    assert_eq!(result.decisions_found, 0);
}
