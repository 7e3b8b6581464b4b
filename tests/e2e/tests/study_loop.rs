//! Study loop: subject → weighted objectives → linked concepts → reviews →
//! readiness and queue ordering.

use jaybrain_e2e_tests::test_env;
use jaybrain_core::{ConceptInput, ReviewInput};

#[test]
fn study_loop_end_to_end() {
    let (store, _config, _dir) = test_env();

    let subject = store
        .forge_add_subject("Security Cert", None, 0.80, "practice deck")
        .unwrap();
    let obj1 = store
        .forge_add_objective(&subject.id, "1.1", "Threats", "Domain 1", 0.60)
        .unwrap();
    let obj2 = store
        .forge_add_objective(&subject.id, "2.1", "Architecture", "Domain 2", 0.40)
        .unwrap();

    let mut concepts = Vec::new();
    for (term, objective) in [("phishing", &obj1), ("smishing", &obj1), ("zero trust", &obj2)] {
        let concept = store
            .forge_add_concept(ConceptInput {
                term: term.into(),
                definition: format!("definition of {term}"),
                subject_id: Some(subject.id.clone()),
                objective_ids: vec![objective.id.clone()],
                ..Default::default()
            })
            .unwrap();
        concepts.push(concept);
    }

    // One confident correct review on each
    for concept in &concepts {
        let recorded = store
            .forge_record_review(ReviewInput {
                concept_id: concept.id.clone(),
                outcome: "understood".into(),
                confidence: 5,
                was_correct: Some(true),
                notes: None,
                time_spent_seconds: Some(30),
            })
            .unwrap();
        assert!(
            (recorded.concept.mastery_level - 0.20).abs() < 1e-9,
            "mastery should be exactly the correct_confident delta"
        );
    }

    let readiness = store.forge_readiness(&subject.id).unwrap();
    assert_eq!(readiness.total_concepts, 3);
    assert_eq!(readiness.reviewed_concepts, 3);
    assert!((readiness.coverage - 1.0).abs() < 1e-9);
    assert!((readiness.avg_mastery - 0.20).abs() < 1e-9);

    // Equal mastery everywhere: the 0.60-weight objective leads the queue
    let queue = store.forge_interleaved_queue(&subject.id, 10).unwrap();
    assert_eq!(queue.len(), 3);
    assert_eq!(queue[0].objective_code, "1.1");
    assert!((queue[0].exam_weight - 0.60).abs() < 1e-9);

    // Streak recorded today
    let stats = store.forge_stats().unwrap();
    assert_eq!(stats.reviews_today, 3);
    assert_eq!(stats.current_streak, 1);
}
