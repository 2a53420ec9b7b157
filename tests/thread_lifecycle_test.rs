// ABOUTME: Integration tests for the thread lifecycle service
// ABOUTME: Covers external-first creation, ownership checks, and delete ordering against a scripted assistant
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{create_test_resources, create_thread, MockAssistant};
use serde_json::json;
use skincare_assistant::{errors::ErrorCode, models::NewThread};

#[tokio::test]
async fn test_create_and_retrieve_thread() {
    let assistant = MockAssistant::new();
    let resources = create_test_resources(assistant.clone()).await;

    let thread = resources
        .threads
        .create_thread(
            "user-a",
            &NewThread {
                name: Some("Evening routine".to_owned()),
                description: None,
                metadata: Some(json!({"source": "mobile"})),
            },
        )
        .await
        .unwrap();

    assert_eq!(thread.owner_id, "user-a");
    assert_eq!(assistant.calls().created_threads, vec![thread.external_thread_id.clone()]);

    let details = resources.threads.retrieve_thread(&thread.id).await.unwrap();
    assert_eq!(details.thread.id, thread.id);
    assert_eq!(details.thread.name.as_deref(), Some("Evening routine"));
    assert_eq!(details.thread.metadata["source"], "mobile");
    assert_eq!(details.remote.id, thread.external_thread_id);
}

#[tokio::test]
async fn test_external_create_failure_writes_nothing() {
    let assistant = MockAssistant::new();
    assistant.set_fail_create_thread(true);
    let resources = create_test_resources(assistant.clone()).await;

    let err = resources
        .threads
        .create_thread("user-a", &NewThread::default())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::UpstreamFailure);
    assert!(resources
        .threads
        .list_threads("user-a", 20, 0)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_non_object_metadata_is_rejected() {
    let assistant = MockAssistant::new();
    let resources = create_test_resources(assistant.clone()).await;

    let err = resources
        .threads
        .create_thread(
            "user-a",
            &NewThread {
                metadata: Some(json!(["not", "an", "object"])),
                ..NewThread::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::InvalidInput);
    assert!(assistant.calls().created_threads.is_empty());
}

#[tokio::test]
async fn test_is_owner() {
    let resources = create_test_resources(MockAssistant::new()).await;
    let thread = create_thread(&resources, "user-a").await;

    assert!(resources.threads.is_owner(&thread.id, "user-a").await.unwrap());
    assert!(!resources.threads.is_owner(&thread.id, "user-b").await.unwrap());

    let unknown = uuid::Uuid::new_v4().to_string();
    let err = resources
        .threads
        .is_owner(&unknown, "user-a")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ThreadNotFound);
}

#[tokio::test]
async fn test_malformed_thread_id_is_rejected() {
    let resources = create_test_resources(MockAssistant::new()).await;

    let err = resources
        .threads
        .retrieve_thread("thread_123")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidThreadId);

    let err = resources
        .threads
        .delete_thread("not a uuid", "user-a")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidThreadId);
}

#[tokio::test]
async fn test_failed_external_delete_keeps_local_record() {
    let assistant = MockAssistant::new();
    let resources = create_test_resources(assistant.clone()).await;
    let thread = create_thread(&resources, "user-a").await;

    assistant.set_fail_delete(true);
    let err = resources
        .threads
        .delete_thread(&thread.id, "user-a")
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::UpstreamFailure);
    assert!(resources.threads.is_owner(&thread.id, "user-a").await.unwrap());
}

#[tokio::test]
async fn test_delete_removes_both_sides() {
    let assistant = MockAssistant::new();
    let resources = create_test_resources(assistant.clone()).await;
    let thread = create_thread(&resources, "user-a").await;

    resources
        .threads
        .delete_thread(&thread.id, "user-a")
        .await
        .unwrap();

    assert_eq!(assistant.calls().deleted_threads, vec![thread.external_thread_id]);
    let err = resources
        .threads
        .retrieve_thread(&thread.id)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ThreadNotFound);
}

#[tokio::test]
async fn test_non_owner_cannot_delete() {
    let assistant = MockAssistant::new();
    let resources = create_test_resources(assistant.clone()).await;
    let thread = create_thread(&resources, "user-a").await;

    let err = resources
        .threads
        .delete_thread(&thread.id, "user-b")
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::ThreadPermissionDenied);
    assert!(assistant.calls().deleted_threads.is_empty());
    assert!(resources.threads.retrieve_thread(&thread.id).await.is_ok());
}

#[tokio::test]
async fn test_vanished_external_thread_is_not_found() {
    let assistant = MockAssistant::new();
    let resources = create_test_resources(assistant.clone()).await;
    let thread = create_thread(&resources, "user-a").await;

    assistant.vanish_thread(&thread.external_thread_id);
    let err = resources
        .threads
        .retrieve_thread(&thread.id)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ThreadNotFound);
}

#[tokio::test]
async fn test_delete_succeeds_when_external_thread_is_gone() {
    let assistant = MockAssistant::new();
    let resources = create_test_resources(assistant.clone()).await;
    let thread = create_thread(&resources, "user-a").await;
    assistant.vanish_thread(&thread.external_thread_id);

    resources
        .threads
        .delete_thread(&thread.id, "user-a")
        .await
        .unwrap();

    let err = resources
        .threads
        .is_owner(&thread.id, "user-a")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ThreadNotFound);
}

#[tokio::test]
async fn test_list_is_scoped_to_owner() {
    let resources = create_test_resources(MockAssistant::new()).await;
    create_thread(&resources, "user-a").await;
    create_thread(&resources, "user-a").await;
    create_thread(&resources, "user-b").await;

    let threads = resources.threads.list_threads("user-a", 20, 0).await.unwrap();
    assert_eq!(threads.len(), 2);
    assert!(threads.iter().all(|t| t.owner_id == "user-a"));

    let page = resources.threads.list_threads("user-a", 1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn test_name_is_only_set_once() {
    let resources = create_test_resources(MockAssistant::new()).await;
    let thread = create_thread(&resources, "user-a").await;

    assert!(resources
        .threads
        .set_name_if_unset(&thread.id, "Dry skin")
        .await
        .unwrap());
    assert!(!resources
        .threads
        .set_name_if_unset(&thread.id, "Oily skin")
        .await
        .unwrap());

    let details = resources.threads.retrieve_thread(&thread.id).await.unwrap();
    assert_eq!(details.thread.name.as_deref(), Some("Dry skin"));
}
