//! Queue lifecycle tests over the in-memory SQLite store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scrape_queue::clock::Clock;
use scrape_queue::model::{ActionKind, ActionRecord, ItemId, QueueState};
use scrape_queue::storage::Storage;
use scrape_queue::store::Store;
use scrape_queue::{DequeueResult, Error, PollPolicy, WorkQueue};

fn queue_over(store: Arc<Storage>, poll: PollPolicy) -> WorkQueue<Storage> {
    WorkQueue::new(store, Arc::new(Clock::new()), poll)
}

fn test_queue() -> WorkQueue<Storage> {
    let store = Arc::new(Storage::in_memory().unwrap());
    queue_over(store, PollPolicy::fixed(3, Duration::from_millis(5)))
}

fn kinds(actions: &[ActionRecord]) -> Vec<ActionKind> {
    actions.iter().map(|a| a.kind).collect()
}

#[tokio::test]
async fn enqueue_then_dequeue_marks_in_progress() {
    let queue = test_queue();
    assert!(queue.enqueue("https://example.com/a").await.unwrap());

    let id = queue.dequeue().await.unwrap().found().unwrap();
    assert_eq!(id.as_str(), "https://example.com/a");

    let entry = queue.entry(&id).await.unwrap().unwrap();
    assert_eq!(entry.state, QueueState::InProgress);
}

#[tokio::test]
async fn duplicate_enqueue_is_rejected() {
    let queue = test_queue();
    let id = ItemId::from("dup");

    assert!(queue.enqueue(id.clone()).await.unwrap());
    assert!(!queue.enqueue(id.clone()).await.unwrap());

    let counts = queue.state_counts().await.unwrap();
    assert_eq!(counts.total(), 1);

    // Only the first enqueue is audited
    let history = queue.audit().history(&id).await.unwrap();
    assert_eq!(kinds(&history), vec![ActionKind::Enqueued]);
}

#[tokio::test]
async fn duplicate_enqueue_rejected_while_in_progress() {
    let queue = test_queue();
    queue.enqueue("busy").await.unwrap();
    queue.dequeue().await.unwrap().found().unwrap();

    assert!(!queue.enqueue("busy").await.unwrap());
    let counts = queue.state_counts().await.unwrap();
    assert_eq!((counts.waiting, counts.in_progress), (0, 1));
}

#[tokio::test]
async fn empty_dequeue_mutates_nothing() {
    let queue = test_queue();
    let before = queue.totals().await.unwrap();

    let result = queue.dequeue().await.unwrap();
    assert_eq!(result, DequeueResult::Empty);
    assert!(matches!(result.found(), Err(Error::EmptyQueue)));

    let after = queue.totals().await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn dequeue_skips_in_progress_entries() {
    let queue = test_queue();
    queue.enqueue("only").await.unwrap();
    queue.dequeue().await.unwrap().found().unwrap();

    assert!(queue.dequeue().await.unwrap().is_empty());
}

#[tokio::test]
async fn dequeue_is_fifo() {
    let queue = test_queue();
    for id in ["first", "second", "third"] {
        queue.enqueue(id).await.unwrap();
    }

    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(queue.dequeue().await.unwrap().found().unwrap().0);
    }
    assert_eq!(order, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn dequeue_waits_for_late_enqueue() {
    let store = Arc::new(Storage::in_memory().unwrap());
    let queue = Arc::new(queue_over(
        store,
        PollPolicy::fixed(20, Duration::from_millis(10)),
    ));

    let consumer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.dequeue().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    queue.enqueue("late").await.unwrap();

    let id = consumer.await.unwrap().unwrap().found().unwrap();
    assert_eq!(id.as_str(), "late");
}

#[tokio::test]
async fn finish_removes_entry_once() {
    let queue = test_queue();
    let id = ItemId::from("done");
    queue.enqueue(id.clone()).await.unwrap();

    assert!(queue.finish(id.clone()).await.unwrap());
    assert!(!queue.is_enqueued(&id).await.unwrap());

    // Second finish removes nothing but is still recorded
    assert!(!queue.finish(id.clone()).await.unwrap());
    let history = queue.audit().history(&id).await.unwrap();
    assert_eq!(
        kinds(&history),
        vec![
            ActionKind::Enqueued,
            ActionKind::Finished,
            ActionKind::Finished
        ]
    );
}

#[tokio::test]
async fn finish_unknown_id_is_recorded_without_error() {
    let queue = test_queue();
    let id = ItemId::from("never-seen");

    assert!(!queue.finish(id.clone()).await.unwrap());

    let history = queue.audit().history(&id).await.unwrap();
    assert_eq!(kinds(&history), vec![ActionKind::Finished]);
    let totals = queue.totals().await.unwrap();
    assert_eq!((totals.queue, totals.action), (0, 1));
}

#[tokio::test]
async fn finished_id_can_be_enqueued_again() {
    let queue = test_queue();
    queue.enqueue("again").await.unwrap();
    queue.finish("again").await.unwrap();

    assert!(queue.enqueue("again").await.unwrap());
    let entry = queue.entry(&ItemId::from("again")).await.unwrap().unwrap();
    assert_eq!(entry.state, QueueState::Waiting);
}

#[tokio::test]
async fn full_lifecycle_is_audited_in_order() {
    let queue = test_queue();
    let id = ItemId::from("u1");

    assert!(queue.enqueue(id.clone()).await.unwrap());
    assert!(!queue.enqueue(id.clone()).await.unwrap());
    assert_eq!(queue.dequeue().await.unwrap(), DequeueResult::Found(id.clone()));
    assert!(queue.dequeue().await.unwrap().is_empty());
    assert!(queue.finish(id.clone()).await.unwrap());

    let history = queue.audit().history(&id).await.unwrap();
    assert_eq!(
        kinds(&history),
        vec![
            ActionKind::Enqueued,
            ActionKind::Started,
            ActionKind::Finished
        ]
    );
    assert!(history.windows(2).all(|w| w[0].at < w[1].at));

    let totals = queue.totals().await.unwrap();
    assert_eq!((totals.queue, totals.action), (0, 3));
}

#[tokio::test]
async fn enqueue_record_shares_entry_timestamp() {
    let queue = test_queue();
    let id = ItemId::from("stamped");
    queue.enqueue(id.clone()).await.unwrap();

    let entry = queue.entry(&id).await.unwrap().unwrap();
    let history = queue.audit().history(&id).await.unwrap();
    assert_eq!(history[0].at, entry.enqueued_at);
}

#[tokio::test]
async fn global_history_orders_across_items() {
    let queue = test_queue();
    queue.enqueue("a").await.unwrap();
    queue.enqueue("b").await.unwrap();
    queue.dequeue().await.unwrap().found().unwrap();
    queue.finish("a").await.unwrap();

    let all = queue.audit().global_history(None, 100).await.unwrap();
    let seen: Vec<_> = all.iter().map(|a| (a.id.as_str(), a.kind)).collect();
    assert_eq!(
        seen,
        vec![
            ("a", ActionKind::Enqueued),
            ("b", ActionKind::Enqueued),
            ("a", ActionKind::Started),
            ("a", ActionKind::Finished),
        ]
    );

    // Paging after the second record yields the tail
    let tail = queue
        .audit()
        .global_history(Some(&all[1]), 100)
        .await
        .unwrap();
    assert_eq!(tail, all[2..].to_vec());

    let limited = queue.audit().global_history(None, 2).await.unwrap();
    assert_eq!(limited, all[..2].to_vec());
}

#[tokio::test]
async fn replay_walks_every_page() {
    let queue = test_queue();
    let n = scrape_queue::audit::DEFAULT_PAGE as usize + 25;
    for i in 0..n {
        queue.enqueue(format!("item-{i:04}")).await.unwrap();
    }

    let replayed = queue.audit().replay().await.unwrap();
    assert_eq!(replayed.len(), n);
    assert!(replayed.windows(2).all(|w| w[0].at < w[1].at));
}

#[tokio::test]
async fn replay_keeps_records_sharing_a_timestamp() {
    let store = Arc::new(Storage::in_memory().unwrap());
    let queue = queue_over(Arc::clone(&store), PollPolicy::no_wait());

    // As written by several processes within one microsecond
    let at = chrono::Utc::now();
    let n = scrape_queue::audit::DEFAULT_PAGE as usize + 50;
    for i in 0..n {
        let action = ActionRecord {
            id: ItemId::new(format!("peer-{i:04}")),
            at,
            kind: ActionKind::Enqueued,
        };
        assert!(store.append_action(&action).await.unwrap());
    }

    let replayed = queue.audit().replay().await.unwrap();
    assert_eq!(replayed.len(), n);
    let unique: HashSet<_> = replayed.iter().map(|a| a.id.clone()).collect();
    assert_eq!(unique.len(), n);

    let first = queue.audit().global_history(None, 10).await.unwrap();
    let next = queue
        .audit()
        .global_history(first.last(), 10)
        .await
        .unwrap();
    assert_eq!(next[0].id.as_str(), "peer-0010");
}

#[tokio::test]
async fn history_orders_same_instant_by_lifecycle() {
    let store = Arc::new(Storage::in_memory().unwrap());
    let queue = queue_over(Arc::clone(&store), PollPolicy::no_wait());
    let id = ItemId::from("tied");
    let at = chrono::Utc::now();

    for kind in [ActionKind::Finished, ActionKind::Started, ActionKind::Enqueued] {
        let action = ActionRecord {
            id: id.clone(),
            at,
            kind,
        };
        store.append_action(&action).await.unwrap();
    }

    let history = queue.audit().history(&id).await.unwrap();
    assert_eq!(
        kinds(&history),
        vec![
            ActionKind::Enqueued,
            ActionKind::Started,
            ActionKind::Finished
        ]
    );
}

#[tokio::test]
async fn queues_sharing_a_clock_never_share_a_timestamp() {
    let store = Arc::new(Storage::in_memory().unwrap());
    let clock = Arc::new(Clock::new());
    let left = WorkQueue::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        PollPolicy::no_wait(),
    );
    let right = WorkQueue::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        PollPolicy::no_wait(),
    );

    for i in 0..50 {
        left.enqueue(format!("left-{i}")).await.unwrap();
        right.enqueue(format!("right-{i}")).await.unwrap();
    }

    let all = left.audit().replay().await.unwrap();
    assert_eq!(all.len(), 100);
    assert!(all.windows(2).all(|w| w[0].at < w[1].at));
}

#[tokio::test]
async fn empty_dequeue_sleeps_between_attempts() {
    let store = Arc::new(Storage::in_memory().unwrap());
    let queue = queue_over(store, PollPolicy::fixed(3, Duration::from_millis(20)));

    let started = Instant::now();
    assert!(queue.dequeue().await.unwrap().is_empty());

    let budget = queue.poll_policy().total_wait();
    assert_eq!(budget, Duration::from_millis(40));
    assert!(started.elapsed() >= budget);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dequeues_never_share_an_item() {
    let store = Arc::new(Storage::in_memory().unwrap());
    let queue = Arc::new(queue_over(store, PollPolicy::no_wait()));

    let items = 20;
    let consumers = 32;
    for i in 0..items {
        queue.enqueue(format!("job-{i}")).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..consumers {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move { queue.dequeue().await }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        if let DequeueResult::Found(id) = handle.await.unwrap().unwrap() {
            claimed.push(id);
        }
    }

    let unique: HashSet<_> = claimed.iter().cloned().collect();
    assert_eq!(claimed.len(), items.min(consumers));
    assert_eq!(unique.len(), claimed.len());

    let counts = queue.state_counts().await.unwrap();
    assert_eq!((counts.waiting, counts.in_progress), (0, items as u64));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enqueue_of_one_id_admits_one() {
    let store = Arc::new(Storage::in_memory().unwrap());
    let queue = Arc::new(queue_over(store, PollPolicy::no_wait()));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move { queue.enqueue("contested").await }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(queue.totals().await.unwrap().action, 1);
}
