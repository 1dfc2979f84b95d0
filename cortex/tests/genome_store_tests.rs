// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use genesis_cortex::{
    EvolutionEventType, FitnessMetrics, GenomeSpec, GenomeStore, GenomeStoreError, Mutation,
    SledGenomeRepository,
};
use serde_json::{json, Map, Value};

fn spec(value: Value) -> GenomeSpec {
    value.as_object().cloned().unwrap_or_default()
}

fn score(value: f64) -> FitnessMetrics {
    FitnessMetrics::from([("score".to_string(), value)])
}

fn sled_store(dir: &tempfile::TempDir) -> GenomeStore {
    let repo = SledGenomeRepository::open(dir.path().join("genomes")).unwrap();
    GenomeStore::new(Arc::new(repo))
}

async fn assert_version_law(store: &GenomeStore) {
    for n in 1..=4u32 {
        let stored = store
            .store_genome("worker", format!("code v{}", n), spec(json!({"name": "worker", "rev": n})), None)
            .await
            .unwrap();
        assert_eq!(stored.version, n);
    }

    let latest = store.get_genome("worker", None).await.unwrap().unwrap();
    assert_eq!(latest.version, 4);

    for v in 1..=4u32 {
        let snapshot = store.get_genome("worker", Some(v)).await.unwrap().unwrap();
        assert_eq!(snapshot.code, format!("code v{}", v));
        assert_eq!(snapshot.spec["rev"], json!(v));
    }
    assert!(store.get_genome("worker", Some(5)).await.unwrap().is_none());
    assert!(store.get_genome("nobody", None).await.unwrap().is_none());
}

async fn assert_lineage_law(store: &GenomeStore) {
    store.store_genome("A", "a", GenomeSpec::new(), None).await.unwrap();
    store.store_genome("B", "b", GenomeSpec::new(), Some("A".into())).await.unwrap();
    store.store_genome("C", "c", GenomeSpec::new(), Some("B".into())).await.unwrap();

    let lineage: Vec<String> = store
        .get_lineage("C")
        .await
        .unwrap()
        .into_iter()
        .map(|g| g.agent_id)
        .collect();
    assert_eq!(lineage, vec!["A", "B", "C"]);
    assert!(store.get_lineage("unknown").await.unwrap().is_empty());
}

async fn assert_soft_delete(store: &GenomeStore) {
    store.store_genome("x", "v1", GenomeSpec::new(), None).await.unwrap();
    store.store_genome("x", "v2", GenomeSpec::new(), None).await.unwrap();

    assert!(store.delete_genome("x", true).await.unwrap());

    assert!(store.get_genome("x", None).await.unwrap().is_none());
    assert_eq!(store.get_all_versions("x").await.unwrap().len(), 2);

    let kills: Vec<_> = store
        .get_evolution_history(Some("x"), None)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == EvolutionEventType::Kill)
        .collect();
    assert_eq!(kills.len(), 1);
    assert_eq!(kills[0].details["keep_versions"], json!(true));
}

#[tokio::test]
async fn test_version_law() {
    assert_version_law(&GenomeStore::in_memory()).await;
}

#[tokio::test]
async fn test_lineage_law() {
    assert_lineage_law(&GenomeStore::in_memory()).await;
}

#[tokio::test]
async fn test_soft_delete_keeps_snapshots() {
    assert_soft_delete(&GenomeStore::in_memory()).await;
}

#[tokio::test]
async fn test_sled_backend_matches_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let store = sled_store(&dir);
    assert_version_law(&store).await;
    assert_lineage_law(&store).await;
    assert_soft_delete(&store).await;
}

#[tokio::test]
async fn test_sled_backend_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = sled_store(&dir);
        store.store_genome("durable", "v1", GenomeSpec::new(), None).await.unwrap();
        store.update_metrics("durable", score(0.8)).await.unwrap();
    }

    let store = sled_store(&dir);
    let genome = store.get_genome("durable", None).await.unwrap().unwrap();
    assert_eq!(genome.metric("score"), Some(0.8));

    let next = store.store_genome("durable", "v2", GenomeSpec::new(), None).await.unwrap();
    assert_eq!(next.version, 2);
}

#[tokio::test]
async fn test_fitness_law() {
    let store = GenomeStore::in_memory();
    for (id, value) in [("g1", 0.9), ("g2", 0.5), ("g3", 0.7)] {
        store.store_genome(id, "code", GenomeSpec::new(), None).await.unwrap();
        store.update_metrics(id, score(value)).await.unwrap();
    }
    store.store_genome("unscored", "code", GenomeSpec::new(), None).await.unwrap();
    store
        .update_metrics("unscored", FitnessMetrics::from([("latency".to_string(), 10.0)]))
        .await
        .unwrap();

    let fittest: Vec<String> = store
        .find_fittest("score", 2)
        .await
        .unwrap()
        .into_iter()
        .map(|g| g.agent_id)
        .collect();
    assert_eq!(fittest, vec!["g1", "g3"]);

    let all = store.find_fittest("score", 10).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|g| g.agent_id != "unscored"));
}

async fn assert_non_finite_rejected(store: &GenomeStore) {
    for (id, value) in [("steady", 0.6), ("spiky", 0.3)] {
        store.store_genome(id, "code", GenomeSpec::new(), None).await.unwrap();
        store.update_metrics(id, score(value)).await.unwrap();
    }

    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let mut metrics = score(bad);
        metrics.insert("latency".to_string(), 1.0);
        assert!(matches!(
            store.update_metrics("spiky", metrics).await,
            Err(GenomeStoreError::Validation(_))
        ));
    }

    let spiky = store.get_genome("spiky", None).await.unwrap().unwrap();
    assert_eq!(spiky.metric("score"), Some(0.3));
    assert_eq!(spiky.metric("latency"), None);

    let ranked: Vec<String> = store
        .find_fittest("score", 5)
        .await
        .unwrap()
        .into_iter()
        .map(|g| g.agent_id)
        .collect();
    assert_eq!(ranked, vec!["steady", "spiky"]);
}

#[tokio::test]
async fn test_non_finite_metrics_rejected_in_memory() {
    assert_non_finite_rejected(&GenomeStore::in_memory()).await;
}

#[tokio::test]
async fn test_non_finite_metrics_rejected_by_sled() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = sled_store(&dir);
        assert_non_finite_rejected(&store).await;
    }

    // The database still decodes after reopening
    let store = sled_store(&dir);
    assert_eq!(store.get_all_versions("spiky").await.unwrap().len(), 1);
    assert_eq!(store.find_fittest("score", 5).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_fitness_ignores_superseded_versions() {
    let store = GenomeStore::in_memory();
    store.store_genome("a", "v1", GenomeSpec::new(), None).await.unwrap();
    store.update_metrics("a", score(0.99)).await.unwrap();
    store.store_genome("a", "v2", GenomeSpec::new(), None).await.unwrap();

    assert!(store.find_fittest("score", 5).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stores_get_distinct_versions() {
    let store = Arc::new(GenomeStore::in_memory());

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .store_genome("shared", format!("writer {}", i), GenomeSpec::new(), None)
                    .await
                    .map(|g| g.version)
            })
        })
        .collect();

    let mut versions: Vec<u32> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    versions.sort_unstable();

    assert_eq!(versions, (1..=20).collect::<Vec<u32>>());
    assert_eq!(store.get_genome("shared", None).await.unwrap().unwrap().version, 20);
}

#[tokio::test]
async fn test_hard_delete_restarts_versions() {
    let store = GenomeStore::in_memory();
    store.store_genome("temp", "v1", GenomeSpec::new(), None).await.unwrap();
    store.store_genome("temp", "v2", GenomeSpec::new(), None).await.unwrap();

    assert!(store.delete_genome("temp", false).await.unwrap());
    assert!(store.get_all_versions("temp").await.unwrap().is_empty());

    let fresh = store.store_genome("temp", "v1 again", GenomeSpec::new(), None).await.unwrap();
    assert_eq!(fresh.version, 1);
}

#[tokio::test]
async fn test_delete_unknown_agent_still_records_kill() {
    let store = GenomeStore::in_memory();
    assert!(!store.delete_genome("ghost", false).await.unwrap());

    let history = store.get_evolution_history(Some("ghost"), None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_type, EvolutionEventType::Kill);
}

#[tokio::test]
async fn test_replicate_applies_known_mutations() {
    let store = GenomeStore::in_memory();
    store
        .store_genome(
            "researcher",
            "class Researcher: ...",
            spec(json!({"name": "researcher", "temperature": 0.2})),
            None,
        )
        .await
        .unwrap();

    let mutations = vec![
        Mutation::new("temperature", "temperature", json!(0.7)).with_reason("explore more"),
        Mutation::new("tool", "tools", json!(["search"])),
    ];
    let copy = store
        .replicate_genome("researcher", "researcher-2", &mutations)
        .await
        .unwrap();

    assert_eq!(copy.version, 1);
    assert_eq!(copy.parent_id.as_deref(), Some("researcher"));
    assert_eq!(copy.code, "class Researcher: ...");
    assert_eq!(copy.spec["name"], json!("researcher-2"));
    assert_eq!(copy.spec["temperature"], json!(0.7));
    assert!(!copy.spec.contains_key("tools"));

    let history = store.get_evolution_history(Some("researcher-2"), None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_type, EvolutionEventType::Replicate);
    assert_eq!(history[0].details["source_id"], json!("researcher"));
    let applied = history[0].details["mutations"].as_array().unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0]["old_value"], json!(0.2));

    let lineage = store.get_lineage("researcher-2").await.unwrap();
    assert_eq!(lineage.len(), 2);
}

#[tokio::test]
async fn test_replicate_errors() {
    let store = GenomeStore::in_memory();
    assert!(matches!(
        store.replicate_genome("missing", "copy", &[]).await,
        Err(GenomeStoreError::NotFound(_))
    ));

    store.store_genome("self", "code", GenomeSpec::new(), None).await.unwrap();
    assert!(matches!(
        store.replicate_genome("self", "self", &[]).await,
        Err(GenomeStoreError::Validation(_))
    ));
}

#[tokio::test]
async fn test_history_is_newest_first_and_filtered() {
    let store = GenomeStore::in_memory().with_history_limit(2);
    store.store_genome("a", "v1", GenomeSpec::new(), None).await.unwrap();
    store.store_genome("b", "v1", GenomeSpec::new(), None).await.unwrap();
    store.store_genome("a", "v2", GenomeSpec::new(), None).await.unwrap();

    let mut details = Map::new();
    details.insert("note".to_string(), json!("manual"));
    let recorded = store
        .record_evolution("a", EvolutionEventType::Evolve, details)
        .await
        .unwrap();

    let recent = store.get_evolution_history(None, None).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].event_id, recorded.event_id);

    let for_a = store.get_evolution_history(Some("a"), Some(10)).await.unwrap();
    let types: Vec<_> = for_a.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![EvolutionEventType::Evolve, EvolutionEventType::Evolve, EvolutionEventType::Create]
    );
    assert_eq!(for_a[1].details["version"], json!(2));
}
