//! Queue ordering: pushing into the middle shifts positions; popping
//! reindexes to stay contiguous.

use jaybrain_e2e_tests::test_env;
use jaybrain_core::{QueueResult, TaskCreate};

#[test]
fn push_at_head_then_pop() {
    let (store, _config, _dir) = test_env();

    let t1 = store
        .task_create(TaskCreate {
            title: "T1".into(),
            ..Default::default()
        })
        .unwrap();
    let t2 = store
        .task_create(TaskCreate {
            title: "T2".into(),
            ..Default::default()
        })
        .unwrap();
    let t3 = store
        .task_create(TaskCreate {
            title: "T3".into(),
            ..Default::default()
        })
        .unwrap();

    store.queue_push(&t1.id, None).unwrap();
    store.queue_push(&t2.id, None).unwrap();

    // T3 at position 1 shifts T1 -> 2, T2 -> 3
    let QueueResult::Queued { task } = store.queue_push(&t3.id, Some(1)).unwrap() else {
        panic!("expected queued");
    };
    assert_eq!(task.queue_position, Some(1));

    let queue = store.queue_view().unwrap();
    let ordered: Vec<(&str, i64)> = queue
        .iter()
        .map(|t| (t.title.as_str(), t.queue_position.unwrap()))
        .collect();
    assert_eq!(ordered, vec![("T3", 1), ("T1", 2), ("T2", 3)]);

    // Pop returns T3 and the queue closes up to T1=1, T2=2
    let QueueResult::Popped { task, next_task } = store.queue_pop().unwrap() else {
        panic!("expected popped");
    };
    assert_eq!(task.id, t3.id);
    assert_eq!(next_task.unwrap().id, t1.id);

    let queue = store.queue_view().unwrap();
    let ordered: Vec<(&str, i64)> = queue
        .iter()
        .map(|t| (t.title.as_str(), t.queue_position.unwrap()))
        .collect();
    assert_eq!(ordered, vec![("T1", 1), ("T2", 2)]);
}

#[test]
fn done_tasks_never_hold_queue_positions() {
    let (store, _config, _dir) = test_env();
    let t1 = store
        .task_create(TaskCreate {
            title: "T1".into(),
            ..Default::default()
        })
        .unwrap();
    let t2 = store
        .task_create(TaskCreate {
            title: "T2".into(),
            ..Default::default()
        })
        .unwrap();
    store.queue_push(&t1.id, None).unwrap();
    store.queue_push(&t2.id, None).unwrap();

    store
        .task_update(
            &t1.id,
            jaybrain_core::TaskUpdate {
                status: Some("done".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let queue = store.queue_view().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, t2.id);
    assert_eq!(queue[0].queue_position, Some(1));

    // A done task cannot be re-queued
    assert!(store.queue_push(&t1.id, None).is_err());
}
