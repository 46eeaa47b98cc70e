mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    FailingStore, MessageSubscribeRejectingStore, collector, memory_service, service_over, settings,
    settle,
};
use stich_application::realtime::{GenerationScript, MessageCallback, ProgressCallback};
use stich_application::GenerationOutcome;
use stich_core::config::MessageDelivery;
use stich_core::store::DocumentStore;
use stich_core::generation::{
    GeneratedFile, GenerationSession, GenerationStatus, StreamMessage, StreamMessageType, StreamPayload,
};
use stich_core::config::GenerationSettings;
use stich_infrastructure::InMemoryDocumentStore;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_full_run_walks_the_progress_script() {
    let (_store, service) = memory_service();
    let (progress, on_progress) = collector::<GenerationSession>();
    let (messages, on_message) = collector::<StreamMessage>();

    let outcome = service
        .stream_generation(
            "gen_full",
            "user-42",
            Some(Arc::new(on_progress) as ProgressCallback),
            Some(Arc::new(on_message) as MessageCallback),
        )
        .await
        .unwrap();
    settle().await;

    let names: Vec<String> = match &outcome {
        GenerationOutcome::Completed { files } => files.iter().map(|f| f.name.clone()).collect(),
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(names, vec!["package.json", "index.html"]);

    let records = progress.lock().unwrap().clone();
    let values: Vec<u8> = records.iter().map(|s| s.progress).collect();
    assert_eq!(values, vec![0, 10, 30, 50, 70, 80, 100]);

    let statuses: Vec<GenerationStatus> = records.iter().map(|s| s.status).collect();
    assert!(statuses.windows(2).all(|w| w[0].rank() <= w[1].rank()));
    assert_eq!(statuses.last(), Some(&GenerationStatus::Completed));
    assert!(records.iter().all(|s| s.user_id == "user-42"));

    let messages = messages.lock().unwrap().clone();
    let types: Vec<StreamMessageType> = messages.iter().map(StreamMessage::message_type).collect();
    assert_eq!(
        types,
        vec![
            StreamMessageType::Progress,
            StreamMessageType::Progress,
            StreamMessageType::File,
            StreamMessageType::File,
            StreamMessageType::Progress,
            StreamMessageType::Complete,
        ]
    );
    match &messages[5].payload {
        StreamPayload::Complete { files } => assert_eq!(files.len(), 2),
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_script_failure_becomes_error_record() {
    let service = service_over(
        Arc::new(FailingStore::new()),
        settings(MessageDelivery::Latest),
    );

    let outcome = service
        .stream_generation("gen_fail", "user-42", None, None)
        .await
        .unwrap();

    let expected = "Store error: write rejected".to_string();
    assert_eq!(
        outcome,
        GenerationOutcome::Failed {
            message: expected.clone()
        }
    );

    let record = service
        .get_generation_status("gen_fail")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, GenerationStatus::Error);
    assert_eq!(record.progress, 0);
    assert_eq!(record.current_step, "Generation failed");
    assert_eq!(record.error, Some(expected.clone()));

    let log = service.message_log().list("gen_fail").await.unwrap();
    let (_, last) = log.last().unwrap();
    assert_eq!(last.payload, StreamPayload::Error { message: expected });
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_halts_between_phases() {
    let (_store, service) = memory_service();
    let cancel = CancellationToken::new();

    let runner = {
        let service = service.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            service
                .stream_generation_with_cancel("gen_cancel", "user-42", None, None, cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(1500)).await;
    cancel.cancel();
    let outcome = runner.await.unwrap().unwrap();
    assert_eq!(outcome, GenerationOutcome::Cancelled);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let record = service
        .get_generation_status("gen_cancel")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, GenerationStatus::Analyzing);
    assert_eq!(record.progress, 10);
}

#[tokio::test(start_paused = true)]
async fn test_update_carries_owner_and_files() {
    let (_store, service) = memory_service();
    service
        .start_generation_session("gen_update", "user-42")
        .await
        .unwrap();
    let created = service
        .get_generation_status("gen_update")
        .await
        .unwrap()
        .unwrap();

    let file = GeneratedFile::new("main.rs", "/src/main.rs", "fn main() {}", "rust");
    service
        .update_progress(
            "gen_update",
            GenerationStatus::Generating,
            50,
            "Generated main.rs",
            Some(vec![file.clone()]),
        )
        .await
        .unwrap();
    service
        .update_progress(
            "gen_update",
            GenerationStatus::Reviewing,
            80,
            "Reviewing generated code...",
            None,
        )
        .await
        .unwrap();

    let record = service
        .get_generation_status("gen_update")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.user_id, "user-42");
    assert_eq!(record.created_at, created.created_at);
    assert_eq!(record.files, vec![file]);
    assert_eq!(record.status, GenerationStatus::Reviewing);
    assert_eq!(record.progress, 80);
}

#[tokio::test(start_paused = true)]
async fn test_updates_are_not_checked_for_monotonicity() {
    let (_store, service) = memory_service();
    service
        .start_generation_session("gen_back", "user-42")
        .await
        .unwrap();
    service
        .update_progress("gen_back", GenerationStatus::Reviewing, 80, "late", None)
        .await
        .unwrap();
    service
        .update_progress("gen_back", GenerationStatus::Analyzing, 10, "early", None)
        .await
        .unwrap();

    let record = service.get_generation_status("gen_back").await.unwrap().unwrap();
    assert_eq!(record.status, GenerationStatus::Analyzing);
    assert_eq!(record.progress, 10);
}

#[tokio::test(start_paused = true)]
async fn test_missing_session_reads_as_none() {
    let (_store, service) = memory_service();
    assert_eq!(service.get_generation_status("gen_missing").await.unwrap(), None);

    service.cleanup_session("gen_missing").await;
    assert_eq!(service.get_generation_status("gen_missing").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_latest_delivery_skips_intermediate_messages() {
    let (_store, service) = memory_service();
    let (seen, on_message) = collector::<StreamMessage>();
    service
        .subscribe_to_messages("gen_latest", on_message)
        .await
        .unwrap();
    settle().await;

    for i in 0..3 {
        service
            .send_message("gen_latest", StreamMessage::error(format!("m{i}")))
            .await
            .unwrap();
    }
    settle().await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].payload,
        StreamPayload::Error {
            message: "m2".to_string()
        }
    );
    assert_eq!(service.message_log().list("gen_latest").await.unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_every_delivery_pushes_each_message_in_order() {
    let store = InMemoryDocumentStore::new();
    let service = service_over(Arc::new(store), settings(MessageDelivery::Every));
    let (seen, on_message) = collector::<StreamMessage>();
    service
        .subscribe_to_messages("gen_every", on_message)
        .await
        .unwrap();
    settle().await;

    for i in 0..3 {
        service
            .send_message("gen_every", StreamMessage::error(format!("m{i}")))
            .await
            .unwrap();
    }
    settle().await;

    let seen: Vec<StreamPayload> = seen.lock().unwrap().iter().map(|m| m.payload.clone()).collect();
    let expected: Vec<StreamPayload> = (0..3)
        .map(|i| StreamPayload::Error {
            message: format!("m{i}"),
        })
        .collect();
    assert_eq!(seen, expected);
}

#[tokio::test(start_paused = true)]
async fn test_resubscribe_keeps_previous_listener_until_released() {
    let (store, service) = memory_service();
    service
        .start_generation_session("gen_twice", "user-42")
        .await
        .unwrap();

    let (first_seen, first) = collector::<GenerationSession>();
    let (second_seen, second) = collector::<GenerationSession>();
    let first_handle = service.subscribe_to_generation("gen_twice", first).await.unwrap();
    let second_handle = service.subscribe_to_generation("gen_twice", second).await.unwrap();
    settle().await;

    assert_eq!(service.tracked_subscription_count().await, 2);
    service
        .update_progress("gen_twice", GenerationStatus::Analyzing, 10, "step", None)
        .await
        .unwrap();
    settle().await;
    assert_eq!(first_seen.lock().unwrap().len(), 2);
    assert_eq!(second_seen.lock().unwrap().len(), 2);

    service.unsubscribe("gen_twice").await;
    assert!(!first_handle.is_active());
    assert!(!second_handle.is_active());
    assert_eq!(service.tracked_subscription_count().await, 0);

    settle().await;
    assert_eq!(store.active_listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_all_releases_every_session() {
    let (store, service) = memory_service();
    let mut handles = Vec::new();
    for id in ["gen_a", "gen_b"] {
        handles.push(service.subscribe_to_generation(id, |_| {}).await.unwrap());
        handles.push(service.subscribe_to_messages(id, |_| {}).await.unwrap());
    }
    assert_eq!(service.tracked_subscription_count().await, 4);

    service.disconnect_all().await;
    assert!(handles.iter().all(|h| !h.is_active()));
    assert_eq!(service.tracked_subscription_count().await, 0);

    settle().await;
    assert_eq!(store.active_listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_observers_released_after_grace_period() {
    let (store, service) = memory_service();
    let (_, on_progress) = collector::<GenerationSession>();

    service
        .stream_generation(
            "gen_grace",
            "user-42",
            Some(Arc::new(on_progress) as ProgressCallback),
            None,
        )
        .await
        .unwrap();
    assert_eq!(service.tracked_subscription_count().await, 1);

    let grace = service.settings().teardown_grace();
    tokio::time::sleep(grace + Duration::from_millis(100)).await;
    assert_eq!(service.tracked_subscription_count().await, 0);
    assert_eq!(store.active_listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_script_keeps_file_progress_below_review() {
    let files: Vec<GeneratedFile> = ["a.rs", "b.rs", "c.rs"]
        .iter()
        .map(|name| GeneratedFile::new(*name, format!("/src/{name}"), "", "rust"))
        .collect();
    let script = GenerationScript::new(
        Duration::from_millis(200),
        Duration::from_millis(100),
        files.clone(),
    );
    let service = Arc::new(stich_application::RealtimeService::with_script(
        Arc::new(InMemoryDocumentStore::new()),
        GenerationSettings::default(),
        script,
    ));
    let (progress, on_progress) = collector::<GenerationSession>();

    let outcome = service
        .stream_generation(
            "gen_custom",
            "user-42",
            Some(Arc::new(on_progress) as ProgressCallback),
            None,
        )
        .await
        .unwrap();
    settle().await;

    assert_eq!(outcome, GenerationOutcome::Completed { files });
    let values: Vec<u8> = progress.lock().unwrap().iter().map(|s| s.progress).collect();
    assert_eq!(values, vec![0, 10, 30, 50, 70, 79, 80, 100]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_observer_attach_releases_earlier_observers() {
    let store = MessageSubscribeRejectingStore::new();
    let backing = store.inner.clone();
    let service = service_over(Arc::new(store), settings(MessageDelivery::Latest));
    let (_, on_progress) = collector::<GenerationSession>();
    let (_, on_message) = collector::<StreamMessage>();

    let result = service
        .stream_generation(
            "gen_attach",
            "user-42",
            Some(Arc::new(on_progress) as ProgressCallback),
            Some(Arc::new(on_message) as MessageCallback),
        )
        .await;
    assert!(result.unwrap_err().is_store());
    assert_eq!(service.tracked_subscription_count().await, 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(service.tracked_subscription_count().await, 0);
    assert_eq!(backing.active_listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_release_forgets_only_given_handles() {
    let (store, service) = memory_service();
    let kept = service.subscribe_to_generation("gen_keep", |_| {}).await.unwrap();
    let dropped = service.subscribe_to_generation("gen_drop", |_| {}).await.unwrap();

    service.release(std::slice::from_ref(&dropped));
    assert!(!dropped.is_active());
    assert!(kept.is_active());
    assert_eq!(service.tracked_subscription_count().await, 1);

    settle().await;
    assert_eq!(store.active_listener_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handles_disposed_directly_are_pruned() {
    let (_store, service) = memory_service();
    for i in 0..5 {
        let handle = service
            .subscribe_to_messages(&format!("gen_{i}"), |_| {})
            .await
            .unwrap();
        handle.unsubscribe();
    }
    service.subscribe_to_messages("gen_live", |_| {}).await.unwrap();

    assert_eq!(service.tracked_subscription_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_list_skips_undecodable_entries() {
    let (store, service) = memory_service();
    store
        .set(
            "messages/gen_list/0000000000000-000000",
            serde_json::json!({"type": "bogus"}),
        )
        .await
        .unwrap();
    service
        .send_message("gen_list", StreamMessage::error("kept"))
        .await
        .unwrap();

    let entries = service.message_log().list("gen_list").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].1.payload,
        StreamPayload::Error {
            message: "kept".to_string()
        }
    );
}
