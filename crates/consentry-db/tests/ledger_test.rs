//! Integration tests for the tracking ledger repositories.
//!
//! These require a running PostgreSQL instance (see
//! `consentry_db::test_fixtures`) and are ignored by default.
//! Run with: `cargo test -p consentry-db -- --ignored`

use consentry_core::{ErrorKind, NewPage, TicketKind, TICKET_STATUS_CREATE_FAILED};
use consentry_db::test_fixtures::TestDatabase;
use consentry_db::{PgAttachmentRepository, PgTicketRepository};
use uuid::Uuid;

#[tokio::test]
#[ignore]
async fn insert_if_absent_is_at_most_once() {
    let test_db = TestDatabase::new().await;
    let repo = PgAttachmentRepository::new(test_db.pool.clone());

    let source_uid = Uuid::new_v4();
    let (first, inserted) = repo
        .insert_if_absent(source_uid, "consent-forms", "a_b.pdf")
        .await
        .unwrap();
    assert!(inserted);

    let (second, inserted_again) = repo
        .insert_if_absent(source_uid, "consent-forms", "a_b.pdf")
        .await
        .unwrap();
    assert!(!inserted_again);
    assert_eq!(first.id, second.id);

    let uids = repo.tracked_source_uids().await.unwrap();
    assert_eq!(uids.iter().filter(|u| **u == source_uid).count(), 1);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn record_outcome_persists_pages_and_errors_together() {
    let test_db = TestDatabase::new().await;
    let repo = PgAttachmentRepository::new(test_db.pool.clone());

    let (tracked, _) = repo
        .insert_if_absent(Uuid::new_v4(), "consent-forms", "a_b.pdf")
        .await
        .unwrap();

    let patient = Uuid::new_v4();
    let referral = Uuid::new_v4();
    let pages = vec![
        NewPage {
            page_number: 1,
            path: "/store/x_1.png".to_string(),
            blank: false,
        },
        NewPage {
            page_number: 2,
            path: "/store/x_2.png".to_string(),
            blank: true,
        },
    ];
    repo.record_outcome(
        tracked.id,
        Some((patient, referral)),
        &pages,
        &[ErrorKind::LinkingToParticipant],
    )
    .await
    .unwrap();

    let stored_pages = repo.pages_for(tracked.id).await.unwrap();
    assert_eq!(stored_pages.len(), 2);
    assert_eq!(stored_pages[0].page_number, 1);
    assert!(!stored_pages[0].blank);
    assert!(stored_pages[1].blank);

    let errors = repo.errors_for(tracked.id).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::LinkingToParticipant);

    let reloaded = repo.get(tracked.id).await.unwrap();
    assert_eq!(reloaded.patient_uid, Some(patient));
    assert_eq!(reloaded.referral_uid, Some(referral));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn ticket_create_failure_is_retryable() {
    let test_db = TestDatabase::new().await;
    let repo = PgTicketRepository::new(test_db.pool.clone());

    let ticket = repo.insert(TicketKind::Fault).await.unwrap();
    assert!(ticket.external_key.is_none());

    repo.mark_create_failed(ticket.id).await.unwrap();
    let failed = repo.create_failed().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, ticket.id);
    assert_eq!(failed[0].status, TICKET_STATUS_CREATE_FAILED);

    repo.set_external_key(ticket.id, "CONSENT-42").await.unwrap();
    assert!(repo.create_failed().await.unwrap().is_empty());

    let keys = repo.known_external_keys().await.unwrap();
    assert_eq!(keys, vec!["CONSENT-42".to_string()]);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn fault_ticket_links_to_error_rows() {
    let test_db = TestDatabase::new().await;
    let attachments = PgAttachmentRepository::new(test_db.pool.clone());
    let tickets = PgTicketRepository::new(test_db.pool.clone());

    let (tracked, _) = attachments
        .insert_if_absent(Uuid::new_v4(), "consent-forms", "bad-key")
        .await
        .unwrap();
    attachments
        .record_outcome(tracked.id, None, &[], &[ErrorKind::MalformedLocator])
        .await
        .unwrap();

    let ticket = tickets.insert(TicketKind::Fault).await.unwrap();
    attachments.set_ticket(tracked.id, ticket.id).await.unwrap();
    attachments
        .link_errors_to_ticket(tracked.id, ticket.id)
        .await
        .unwrap();

    let errors = attachments.errors_for(tracked.id).await.unwrap();
    assert_eq!(errors[0].ticket_id, Some(ticket.id));

    test_db.cleanup().await;
}
