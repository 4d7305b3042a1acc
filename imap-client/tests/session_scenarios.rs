//! Cross-module scenarios that a single unit test can't exercise in
//! isolation: acquiring the mailbox lock through a real `Connection`,
//! then feeding a throttled FETCH failure through retry classification,
//! then pumping fetched chunks through the download pipeline (§8
//! scenarios 4-6).

use imap_client::classify::command_failed;
use imap_client::download::{Pipeline, TransferEncoding};
use imap_client::ops::fetch::retry_decision;
use imap_client::ops::{lock, mailbox};
use imap_client::session::{ConnectOptions, Connection};
use imap_types::core::{Node, ResponseTag, Tag};
use imap_types::error::CommandStatus;
use imap_types::response::Response;
use imap_types::state::ConnectionState;

#[test]
fn acquiring_the_lock_then_selecting_avoids_a_redundant_select_on_handoff() {
    let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
    conn.state = ConnectionState::Authenticated;

    let rx1 = lock::acquire(&mut conn, "INBOX", false);
    let (needs_select, handle1) = rx1.try_recv().unwrap().unwrap();
    assert!(needs_select);
    mailbox::select_or_examine(&mut conn, "INBOX", false).unwrap();
    conn.state = ConnectionState::Selected;

    // A second caller wants the same mailbox/read-only pair back after the
    // first releases: no fresh SELECT should be required.
    handle1.release();
    conn.lock_queue.pump();
    let rx2 = lock::acquire(&mut conn, "INBOX", false);
    let (needs_select2, _handle2) = rx2.try_recv().unwrap().unwrap();
    assert!(!needs_select2);
}

#[test]
fn a_throttled_fetch_failure_is_retried_and_eventually_exhausts_its_budget() {
    let response = Response {
        tag: ResponseTag::Tagged(Tag("A1".to_string())),
        command: "NO".to_string(),
        attributes: vec![Node::atom(
            "Request is throttled. Suggested Backoff Time: 10 milliseconds",
        )],
    };
    let err = command_failed(&response, CommandStatus::No, "FETCH 1:10 (FLAGS)").unwrap_err();

    let mut attempt = 0;
    let mut retried = 0;
    while let Some(delay) = retry_decision(&err, attempt) {
        assert!(delay.as_millis() >= 10);
        retried += 1;
        attempt += 1;
    }
    assert_eq!(retried, imap_client::ops::MAX_FETCH_RETRIES as usize);
}

#[test]
fn downloaded_chunks_are_base64_decoded_and_cut_off_at_the_byte_limit() {
    let mut pipeline = Pipeline::new(TransferEncoding::Base64, Some(5));
    let encoded = base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        b"hello there",
    );
    let out = pipeline.write(encoded.as_bytes()).unwrap();
    assert_eq!(out, b"hello");
    assert!(pipeline.is_exhausted());
}
