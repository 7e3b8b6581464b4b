//! Similarity clustering over injected vectors: three near-identical
//! memories form one cluster, the dissimilar one stays out.

use jaybrain_e2e_tests::{basis_vector, near_vector, test_env};
use jaybrain_core::RememberInput;

#[test]
fn find_clusters_groups_similar_memories() {
    let (store, _config, _dir) = test_env();

    let contents = [
        "Python is great for ML",
        "Python works well for machine learning",
        "Python excels at ML tasks",
        "SQL databases use tables",
    ];
    let mut ids = Vec::new();
    for content in contents {
        let memory = store
            .remember(RememberInput {
                content: content.into(),
                ..Default::default()
            })
            .unwrap();
        ids.push(memory.id);
    }

    // Synthetic embeddings: pairwise cosine of the first three >= 0.95
    store.put_memory_embedding(&ids[0], &basis_vector(0)).unwrap();
    store.put_memory_embedding(&ids[1], &near_vector(0, 1)).unwrap();
    store.put_memory_embedding(&ids[2], &near_vector(0, 2)).unwrap();
    store.put_memory_embedding(&ids[3], &basis_vector(7)).unwrap();

    let clusters = store.find_clusters(0.95).unwrap();
    assert_eq!(clusters.len(), 1, "exactly one cluster expected");
    let cluster_ids: Vec<&str> = clusters[0].iter().map(|m| m.id.as_str()).collect();
    assert_eq!(cluster_ids.len(), 3);
    for id in &ids[..3] {
        assert!(cluster_ids.contains(&id.as_str()));
    }
    assert!(!cluster_ids.contains(&ids[3].as_str()));
}

#[test]
fn consolidation_archives_cluster_members() {
    let (store, _config, _dir) = test_env();

    let keep = store
        .remember(RememberInput {
            content: "canonical phrasing".into(),
            importance: Some(0.9),
            ..Default::default()
        })
        .unwrap();
    let duplicate = store
        .remember(RememberInput {
            content: "near duplicate phrasing".into(),
            importance: Some(0.3),
            ..Default::default()
        })
        .unwrap();
    store.put_memory_embedding(&keep.id, &basis_vector(0)).unwrap();
    store.put_memory_embedding(&duplicate.id, &near_vector(0, 1)).unwrap();

    let report = store.consolidate(0.9, false).unwrap();
    assert_eq!(report.archived_count, 1);
    assert_eq!(report.merges[0].kept_id, keep.id);

    // Archive(m) then get_memory(m.id) is None; the archive row keeps the content
    assert!(store.get_memory(&duplicate.id).unwrap().is_none());
    let conn_check = store.recall(jaybrain_core::RecallInput {
        query: "near duplicate phrasing".into(),
        include_archived: true,
        ..Default::default()
    });
    let hits = conn_check.unwrap();
    assert!(hits.iter().any(|h| h.archived && h.memory.id == duplicate.id));
    assert_eq!(
        hits.iter()
            .find(|h| h.memory.id == duplicate.id)
            .unwrap()
            .memory
            .content,
        "near duplicate phrasing"
    );
}
