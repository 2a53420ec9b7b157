// ABOUTME: Integration tests for file cross-reference reconciliation
// ABOUTME: Verifies idempotent linking by external file id and registration of local uploads
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::create_test_database;
use skincare_assistant::{
    database::Database,
    errors::ErrorCode,
    models::{ContentPart, MessageContent, NewThread, Sender},
    services::FileReconciler,
};

/// Store with one thread holding two messages
async fn setup() -> (Database, FileReconciler, String, String) {
    let database = create_test_database().await;
    let thread = database
        .threads()
        .create_thread("thread_ext_1", "user-a", &NewThread::default())
        .await
        .unwrap();

    let first = database
        .messages()
        .insert_message(
            &thread.id,
            Sender::User,
            &MessageContent::Text("first".to_owned()),
            Some("msg_1"),
            true,
        )
        .await
        .unwrap();
    let second = database
        .messages()
        .insert_message(
            &thread.id,
            Sender::User,
            &MessageContent::Text("second".to_owned()),
            Some("msg_2"),
            true,
        )
        .await
        .unwrap();

    let files = FileReconciler::new(database.attachments());
    (database, files, first.id, second.id)
}

#[tokio::test]
async fn test_link_or_create_is_idempotent() {
    let (database, files, message_id, _) = setup().await;

    let first = files.link_or_create("file_abc", &message_id).await.unwrap();
    let again = files.link_or_create("file_abc", &message_id).await.unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(again.message_id.as_deref(), Some(message_id.as_str()));
    assert_eq!(
        database
            .attachments()
            .count_for_external_id("file_abc")
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_linking_keeps_local_file_details() {
    let (_database, files, message_id, _) = setup().await;

    let attached = files
        .attach_local_file("local_photo_1", "file_abc", "user-a")
        .await
        .unwrap();
    assert_eq!(attached.message_id, None);

    let linked = files.link_or_create("file_abc", &message_id).await.unwrap();
    assert_eq!(linked.id, attached.id);
    assert_eq!(linked.local_file_id.as_deref(), Some("local_photo_1"));
    assert_eq!(linked.owner_id.as_deref(), Some("user-a"));
    assert_eq!(linked.message_id.as_deref(), Some(message_id.as_str()));
}

#[tokio::test]
async fn test_registration_by_another_user_is_rejected() {
    let (_database, files, message_id, _) = setup().await;
    files
        .attach_local_file("local-a", "file-x", "user-a")
        .await
        .unwrap();

    let err = files
        .attach_local_file("local-b", "file-x", "user-b")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FilePermissionDenied);

    let stored = files.get_by_external_id("file-x").await.unwrap().unwrap();
    assert_eq!(stored.owner_id.as_deref(), Some("user-a"));
    assert_eq!(stored.local_file_id.as_deref(), Some("local-a"));

    // The owner can still update, and a bare reference can be claimed
    let updated = files
        .attach_local_file("local-a2", "file-x", "user-a")
        .await
        .unwrap();
    assert_eq!(updated.local_file_id.as_deref(), Some("local-a2"));

    files.link_or_create("file-bare", &message_id).await.unwrap();
    let claimed = files
        .attach_local_file("local-b", "file-bare", "user-b")
        .await
        .unwrap();
    assert_eq!(claimed.owner_id.as_deref(), Some("user-b"));
    assert_eq!(claimed.message_id.as_deref(), Some(message_id.as_str()));
}

#[tokio::test]
async fn test_relinking_moves_reference_to_latest_message() {
    let (_database, files, first, second) = setup().await;

    files.link_or_create("file_abc", &first).await.unwrap();
    files.link_or_create("file_abc", &second).await.unwrap();

    assert!(files.find_by_message(&first).await.unwrap().is_empty());
    let on_second = files.find_by_message(&second).await.unwrap();
    assert_eq!(on_second.len(), 1);
    assert_eq!(on_second[0].external_file_id, "file_abc");
}

#[tokio::test]
async fn test_blank_ids_are_rejected() {
    let (_database, files, message_id, _) = setup().await;

    let err = files.link_or_create("  ", &message_id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    let err = files
        .attach_local_file("", "file_abc", "user-a")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    assert!(files.get_by_external_id("file_abc").await.unwrap().is_none());
}

#[tokio::test]
async fn test_link_message_attachments_links_every_image_part() {
    let (_database, files, message_id, _) = setup().await;
    let content = MessageContent::Parts(vec![
        ContentPart::Text {
            text: "What do you think of these spots?".to_owned(),
        },
        ContentPart::ImageFile {
            file_id: "file_left".to_owned(),
            detail: None,
        },
        ContentPart::ImageFile {
            file_id: "file_right".to_owned(),
            detail: Some("high".to_owned()),
        },
    ]);

    let linked = files.link_message_attachments(&message_id, &content).await;
    assert_eq!(linked.len(), 2);

    let mut stored: Vec<String> = files
        .find_by_message(&message_id)
        .await
        .unwrap()
        .into_iter()
        .map(|reference| reference.external_file_id)
        .collect();
    stored.sort();
    assert_eq!(stored, vec!["file_left", "file_right"]);
}

#[tokio::test]
async fn test_plain_text_links_nothing() {
    let (_database, files, message_id, _) = setup().await;
    let linked = files
        .link_message_attachments(&message_id, &MessageContent::Text("hello".to_owned()))
        .await;
    assert!(linked.is_empty());
}

#[tokio::test]
async fn test_find_by_thread_groups_references_per_message() {
    let (database, files, first, second) = setup().await;
    files.link_or_create("file_a", &first).await.unwrap();
    files.link_or_create("file_b", &second).await.unwrap();
    files.link_or_create("file_c", &second).await.unwrap();
    files
        .attach_local_file("local_unlinked", "file_loose", "user-a")
        .await
        .unwrap();

    let thread_id = database
        .messages()
        .get_message(&first)
        .await
        .unwrap()
        .unwrap()
        .thread_id;
    let grouped = files.find_by_thread(&thread_id).await.unwrap();

    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped[&first].len(), 1);
    let on_second: Vec<&str> = grouped[&second]
        .iter()
        .map(|reference| reference.external_file_id.as_str())
        .collect();
    assert_eq!(on_second.len(), 2);
    assert!(on_second.contains(&"file_b") && on_second.contains(&"file_c"));
}
