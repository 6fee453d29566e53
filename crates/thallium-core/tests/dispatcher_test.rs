// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dispatch cycle tests: claim, job correlation, handlers and cleanup.

mod common;

use std::sync::atomic::Ordering;

use chrono::Utc;
use serde_json::json;
use thallium_core::config::ExpiryTimeouts;
use thallium_core::persistence::{MessageScope, MessageStore, NewMessage};
use thallium_core::{RpcAction, RpcService};
use thallium_protocol::{InboundEntry, generate_guid};

use common::*;

#[tokio::test]
async fn test_sign_request_reports_progress_in_order() {
    let store = memory_store().await;
    let recorder = Recorder::new();
    let ctx = open_context(store.clone(), "session-a", recorder.collaborators()).await;

    let document_guid = generate_guid();
    ctx.bus()
        .submit(&envelope(&[InboundEntry::new(
            "sign-request",
            Some(json!({"id": 42, "guid": document_guid})),
        )]))
        .await
        .unwrap();

    let report = ctx.perform_actions().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.failed.is_empty());
    assert_eq!(recorder.calls(), vec!["load:42", "sign:42"]);

    let replies = decode_poll(&ctx.bus().poll().await.unwrap());
    let progress: Vec<_> = replies
        .iter()
        .map(|e| (e.command.as_str(), e.body.clone(), e.value.as_deref()))
        .collect();
    assert_eq!(
        progress,
        vec![
            ("sign-reply", json!("Preparing"), Some("10%")),
            ("sign-reply", json!("Loading document"), Some("20%")),
            ("sign-reply", json!("Done"), Some("100%")),
        ]
    );

    assert_eq!(message_count(&store, MessageScope::Inbound).await, 0);
    assert_eq!(message_count(&store, MessageScope::Outbound).await, 0);
    assert_eq!(job_count(&store).await, 0);
    assert!(!ctx.jobs().has_current_job());
}

#[tokio::test]
async fn test_handler_failure_is_recorded_and_message_removed() {
    let store = memory_store().await;
    let recorder = Recorder::new();
    recorder.fail_signing();
    let ctx = open_context(store.clone(), "session-a", recorder.collaborators()).await;

    ctx.bus()
        .submit(&envelope(&[InboundEntry::new(
            "sign-request",
            Some(json!({"id": 7, "guid": generate_guid()})),
        )]))
        .await
        .unwrap();

    let report = ctx.perform_actions().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].command, "sign-request");
    assert_eq!(report.failed[0].error.error_code(), "HANDLER_ERROR");
    assert!(report.failed[0].error.to_string().contains("certificate expired"));

    // Progress sent before the failure is still delivered
    let replies = decode_poll(&ctx.bus().poll().await.unwrap());
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[1].value.as_deref(), Some("20%"));

    assert_eq!(message_count(&store, MessageScope::Inbound).await, 0);
    assert_eq!(job_count(&store).await, 0);

    // No retry on the next cycle
    assert!(ctx.perform_actions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replies_follow_the_job_session() {
    let store = memory_store().await;
    let recorder = Recorder::new();

    let submitter = open_context(store.clone(), "session-a", recorder.collaborators()).await;
    submitter
        .bus()
        .submit(&envelope(&[InboundEntry::new("mailimport-request", None)]))
        .await
        .unwrap();

    // Another session's request drains the queue
    let other = open_context(store.clone(), "session-b", recorder.collaborators()).await;
    assert_eq!(other.perform_actions().await.unwrap().processed, 1);
    assert_eq!(recorder.calls(), vec!["mail"]);

    assert!(decode_poll(&other.bus().poll().await.unwrap()).is_empty());

    let replies = decode_poll(&submitter.bus().poll().await.unwrap());
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].command, "mailimport-reply");
    assert_eq!(replies[0].value.as_deref(), Some("100%"));
}

#[tokio::test]
async fn test_scan_receives_filtered_body() {
    let store = memory_store().await;
    let recorder = Recorder::new();
    let ctx = open_context(store.clone(), "session-a", recorder.collaborators()).await;

    ctx.bus()
        .submit(&envelope(&[InboundEntry::new(
            "scan-request",
            Some(json!({"page": 1, "nested": {"x": 1}})),
        )]))
        .await
        .unwrap();

    let report = ctx.perform_actions().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(recorder.calls(), vec![r#"scan:{"page":1}"#]);

    // Scanning sends nothing back
    assert!(decode_poll(&ctx.bus().poll().await.unwrap()).is_empty());
}

#[tokio::test]
async fn test_malformed_row_is_a_protocol_error() {
    let store = memory_store().await;
    let recorder = Recorder::new();

    // Written around the bus, as a buggy producer would
    store
        .insert_message(&NewMessage {
            guid: generate_guid(),
            session_id: "session-a".to_string(),
            scope: MessageScope::Inbound,
            command: "format-disk".to_string(),
            body: "null".to_string(),
            value: None,
            submit_time: Utc::now(),
        })
        .await
        .unwrap();

    let ctx = open_context(store.clone(), "session-a", recorder.collaborators()).await;
    let report = ctx.perform_actions().await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].error.error_code(), "PROTOCOL_ERROR");
    assert!(recorder.calls().is_empty());
    assert_eq!(message_count(&store, MessageScope::Inbound).await, 0);
    assert_eq!(job_count(&store).await, 0);
}

#[tokio::test]
async fn test_messages_are_handled_in_submission_order() {
    let store = memory_store().await;
    let recorder = Recorder::new();
    let ctx = open_context(store.clone(), "session-a", recorder.collaborators()).await;

    ctx.bus()
        .submit(&envelope(&[
            InboundEntry::new("scan-request", Some(json!("first"))),
            InboundEntry::new("mailimport-request", None),
            InboundEntry::new("scan-request", Some(json!("last"))),
        ]))
        .await
        .unwrap();

    let report = ctx.perform_actions().await.unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(
        recorder.calls(),
        vec![r#"scan:"first""#, "mail", r#"scan:"last""#]
    );
}

#[tokio::test]
async fn test_lost_claim_is_skipped() {
    let store = memory_store().await;
    let flaky = FlakyStore::new(store.clone());
    let recorder = Recorder::new();
    let ctx = open_context(flaky.clone(), "session-a", recorder.collaborators()).await;

    ctx.bus()
        .submit(&envelope(&[InboundEntry::new("mailimport-request", None)]))
        .await
        .unwrap();

    flaky.steal_claims.store(true, Ordering::SeqCst);
    let report = ctx.perform_actions().await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.attempted(), 0);
    assert!(recorder.calls().is_empty());

    // The winner owns the row now
    assert_eq!(message_count(&store, MessageScope::Inbound).await, 1);
    assert!(
        store
            .list_unclaimed_messages(MessageScope::Inbound)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_claim_store_failure_aborts_cycle() {
    let store = memory_store().await;
    let flaky = FlakyStore::new(store.clone());
    let recorder = Recorder::new();
    let ctx = open_context(flaky.clone(), "session-a", recorder.collaborators()).await;

    ctx.bus()
        .submit(&envelope(&[InboundEntry::new("mailimport-request", None)]))
        .await
        .unwrap();

    flaky.fail_claims.store(true, Ordering::SeqCst);
    let err = ctx.perform_actions().await.unwrap_err();
    assert_eq!(err.error_code(), "PERSISTENCE_ERROR");
    assert!(recorder.calls().is_empty());

    // Still pending for the next cycle
    flaky.fail_claims.store(false, Ordering::SeqCst);
    assert_eq!(ctx.perform_actions().await.unwrap().processed, 1);
    assert_eq!(recorder.calls(), vec!["mail"]);
}

#[tokio::test]
async fn test_claim_failure_does_not_fail_rpc_actions() {
    let store = memory_store().await;
    let flaky = FlakyStore::new(store.clone());
    let recorder = Recorder::new();

    let other = open_context(flaky.clone(), "session-a", recorder.collaborators()).await;
    other
        .bus()
        .submit(&envelope(&[InboundEntry::new("mailimport-request", None)]))
        .await
        .unwrap();
    other
        .bus()
        .send_message_to_client("scan-reply", json!("Done"), None, Some("session-b"))
        .await
        .unwrap();

    flaky.fail_claims.store(true, Ordering::SeqCst);
    let service = RpcService::new(
        flaky.clone(),
        recorder.collaborators(),
        ExpiryTimeouts::default(),
    );

    let submitted = service
        .execute(
            Some("session-b".to_string()),
            RpcAction::SubmitMessages(envelope(&[InboundEntry::new("scan-request", None)])),
        )
        .await
        .unwrap();
    assert_eq!(submitted, "ok");

    let replies = service
        .execute(Some("session-b".to_string()), RpcAction::RetrieveMessages)
        .await
        .unwrap();
    assert_eq!(decode_poll(&replies).len(), 1);
    assert!(recorder.calls().is_empty());
    assert_eq!(message_count(&store, MessageScope::Inbound).await, 2);
}

#[tokio::test]
async fn test_suppressed_cycle_runs_handlers_without_replies() {
    let store = memory_store().await;
    let recorder = Recorder::new();
    let ctx = open_context(store.clone(), "session-a", recorder.collaborators()).await;

    ctx.bus()
        .submit(&envelope(&[InboundEntry::new("mailimport-request", None)]))
        .await
        .unwrap();

    ctx.bus().set_suppress_outbound(true);
    let report = ctx.perform_actions().await.unwrap();
    ctx.bus().set_suppress_outbound(false);

    assert_eq!(report.processed, 1);
    assert!(report.failed.is_empty());
    assert_eq!(recorder.calls(), vec!["mail"]);
    assert_eq!(message_count(&store, MessageScope::Outbound).await, 0);
    assert_eq!(job_count(&store).await, 0);
}
