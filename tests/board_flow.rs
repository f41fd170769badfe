//! Board flow through the live wiring: subscription, snapshot cache,
//! manual edit path and the status-change notifier.

use istakip::auth::Identity;
use istakip::board::{self, NewTask, TaskPatch, TaskStatus};
use istakip::notify::{self, NotificationSettings};
use istakip::store::memory::InMemoryRepository;
use istakip::store::{self, SnapshotCache, TaskRepository};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_owned(),
        ..NewTask::default()
    }
}

/// Wait for the cache to reach the expected task count, bounded.
async fn await_cache_len(cache: &SnapshotCache, len: usize) {
    for _ in 0..100 {
        if cache.current().len() == len {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("cache never reached {len} task(s)");
}

#[tokio::test]
async fn sync_cache_follows_repository_writes() {
    let repo = Arc::new(InMemoryRepository::new());
    let cache = SnapshotCache::new();
    let cancel = CancellationToken::new();
    let sync = tokio::spawn(store::sync_cache(
        repo.subscribe(),
        cache.clone(),
        cancel.clone(),
    ));

    let user = Identity::new("saha@ornek.com");
    let id = board::create_task(repo.as_ref(), &cache.current(), new_task("Ahmet Bey"), Some(&user))
        .await
        .unwrap();
    await_cache_len(&cache, 1).await;

    let snapshot = cache.current();
    assert_eq!(snapshot[0].id, id);
    assert_eq!(snapshot[0].order_number, 1);
    assert_eq!(snapshot[0].created_by.as_deref(), Some("saha@ornek.com"));

    board::delete_task(repo.as_ref(), &id).await.unwrap();
    await_cache_len(&cache, 0).await;

    cancel.cancel();
    sync.await.unwrap();
}

#[tokio::test]
async fn create_task_defaults_empty_title() {
    let repo = InMemoryRepository::new();
    board::create_task(&repo, &[], new_task("   "), None)
        .await
        .unwrap();
    let tasks = repo.subscribe().borrow().clone();
    assert_eq!(tasks[0].title, "Yeni Müşteri");
}

#[tokio::test]
async fn subscription_keeps_tasks_ordered_by_number() {
    let repo = InMemoryRepository::new();
    let snapshot = repo.subscribe().borrow().clone();
    board::create_task(&repo, &snapshot, new_task("Birinci"), None)
        .await
        .unwrap();
    let snapshot = repo.subscribe().borrow().clone();
    board::create_task(&repo, &snapshot, new_task("İkinci"), None)
        .await
        .unwrap();

    let tasks = repo.subscribe().borrow().clone();
    assert_eq!(tasks[0].order_number, 1);
    assert_eq!(tasks[1].order_number, 2);
}

#[tokio::test]
async fn update_task_stamps_the_editor() {
    let repo = InMemoryRepository::new();
    let id = board::create_task(&repo, &[], new_task("Ahmet Bey"), None)
        .await
        .unwrap();

    let user = Identity::new("ofis@ornek.com");
    let patch = TaskPatch {
        status: Some(TaskStatus::DepositPaid),
        ..TaskPatch::default()
    };
    board::update_task(&repo, &id, patch, Some(&user))
        .await
        .unwrap();

    let tasks = repo.subscribe().borrow().clone();
    assert_eq!(tasks[0].status, TaskStatus::DepositPaid);
    assert_eq!(tasks[0].last_updated_by.as_deref(), Some("ofis@ornek.com"));
}

#[tokio::test]
async fn notifier_reports_configured_stage_arrivals() {
    let repo = Arc::new(InMemoryRepository::new());
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let settings = NotificationSettings {
        notifications: HashMap::from([(
            TaskStatus::GasOpened,
            vec!["servis@ornek.com".to_owned()],
        )]),
    };

    let id = board::create_task(repo.as_ref(), &[], new_task("Ahmet Bey"), None)
        .await
        .unwrap();

    let notifier = tokio::spawn(notify::run_notifier(
        repo.subscribe(),
        settings,
        tx,
        cancel.clone(),
    ));
    // Let the notifier take its baseline snapshot before moving anything.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A move into an unconfigured stage stays silent.
    let patch = TaskPatch {
        status: Some(TaskStatus::CheckCompleted),
        ..TaskPatch::default()
    };
    repo.update(&id, patch).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let patch = TaskPatch {
        status: Some(TaskStatus::GasOpened),
        ..TaskPatch::default()
    };
    repo.update(&id, patch).await.unwrap();

    let notification = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("notifier timed out")
        .expect("notifier channel closed");
    assert_eq!(
        notification.message,
        "Ahmet Bey işi \"Gaz Açıldı\" aşamasına geldi."
    );
    assert_eq!(notification.recipients, vec!["servis@ornek.com".to_owned()]);

    cancel.cancel();
    notifier.await.unwrap();
    assert!(rx.recv().await.is_none());
}
