//! End-to-end tests of the attachment job over in-memory collaborators

use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use async_trait::async_trait;
use reliquary_core::models::{
    AccessLevel, AccessTerms, AttachFilesToWorkPayload, AttachFilesToWorkResult, PermissionGrant,
    Priority, Task, TaskStatus, TaskType, Visibility,
};
use reliquary_core::{ErrorMetadata, OrphanPolicy, TaskError};
use reliquary_worker::test_helpers::{
    attributes, create_test_work, AttachHarness, RecordingCallback,
};
use reliquary_worker::{
    enqueue_attach_files, AttachError, AttachmentWorkerContext, TaskHandlerContext, TaskSubmitter,
};

fn batch(uploads: &[&reliquary_core::models::UploadedFile]) -> Vec<Value> {
    uploads.iter().map(|u| u.batch_item()).collect()
}

#[tokio::test]
async fn valid_batch_appends_new_file_sets_in_input_order() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner@example.org");
    let mut work = create_test_work("owner@example.org", Vec::new());
    let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());
    work.ordered_member_ids = vec![m1, m2];
    let work = harness.add_work(work);

    let first = harness.stage_upload(&owner, "a.pdf", b"aaa");
    let second = harness.stage_upload(&owner, "b.pdf", b"bbbb");
    let third = harness.stage_upload(&owner, "c.pdf", b"c");

    let outcome = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &batch(&[&first, &second, &third]), &Map::new())
        .await
        .unwrap();

    assert_eq!(outcome.file_sets.len(), 3);
    assert_eq!(harness.file_sets.count(), 3);
    let ids = outcome.file_set_ids();
    let mut expected = vec![m1, m2];
    expected.extend(ids.iter().copied());
    assert_eq!(harness.work(work.id).ordered_member_ids, expected);
    assert_eq!(outcome.ordered_member_ids, expected);

    let labels: Vec<_> = outcome
        .file_sets
        .iter()
        .map(|fs| fs.label.clone().unwrap())
        .collect();
    assert_eq!(labels, vec!["a.pdf", "b.pdf", "c.pdf"]);

    for (upload, file_set) in [&first, &second, &third].iter().zip(&outcome.file_sets) {
        let stored = harness.uploads.get_stored(upload.id).unwrap();
        assert_eq!(stored.file_set_id, Some(file_set.id));
        assert_eq!(stored.storage_key, upload.storage_key);
        let key = file_set.content_key.clone().unwrap();
        assert_eq!(harness.storage.get_file(&key), harness.storage.get_file(&upload.storage_key));
        assert_eq!(file_set.file_size, Some(upload.file_size));
        assert!(file_set.is_attached());
        assert_eq!(file_set.depositor, "owner@example.org");
    }
}

#[tokio::test]
async fn any_invalid_element_aborts_before_side_effects() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let good = harness.stage_upload(&owner, "a.pdf", b"a");

    let cases: Vec<(Value, &str)> = vec![
        (json!(42), "number"),
        (json!({"id": good.id}), "object"),
        (json!(null), "null"),
        (json!("not-a-uuid"), "malformed id"),
        (json!(Uuid::new_v4().to_string()), "unregistered upload"),
    ];

    for (bad, kind) in cases {
        let items = vec![good.batch_item(), bad];
        let err = harness
            .job(OrphanPolicy::Retain)
            .perform(&work, &items, &Map::new())
            .await
            .unwrap_err();
        match err {
            AttachError::InvalidUpload { position, found } => {
                assert_eq!(position, 1);
                assert_eq!(found, kind);
            }
            other => panic!("expected InvalidUpload, got {other:?}"),
        }
    }

    assert_eq!(harness.file_sets.count(), 0);
    assert_eq!(harness.works.commit_count(), 0);
    assert!(harness.callback.calls().is_empty());
    assert_eq!(harness.uploads.get_stored(good.id).unwrap().file_set_id, None);
}

#[tokio::test]
async fn malformed_id_is_named_in_the_message() {
    let harness = AttachHarness::new();
    harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));

    let err = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &[json!("not-a-uuid")], &Map::new())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Batch element 0: uploaded file required, but malformed id received"
    );
}

#[tokio::test]
async fn empty_batch_still_commits_once_and_fires_callback() {
    let harness = AttachHarness::new();
    harness.add_user("owner");
    let mut work = create_test_work("owner", Vec::new());
    let existing = vec![Uuid::new_v4(), Uuid::new_v4()];
    work.ordered_member_ids = existing.clone();
    let work = harness.add_work(work);

    let outcome = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &[], &Map::new())
        .await
        .unwrap();

    assert!(outcome.file_sets.is_empty());
    assert_eq!(outcome.ordered_member_ids, existing);
    assert_eq!(harness.works.commit_count(), 1);
    assert_eq!(harness.work(work.id).ordered_member_ids, existing);
    assert_eq!(harness.file_sets.count(), 0);

    let calls = harness.callback.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].user_key, "owner");
    assert!(calls[0].file_set_ids.is_empty());
}

#[tokio::test]
async fn proxy_deposit_credits_the_represented_user() {
    let harness = AttachHarness::new();
    harness.add_user("owner");
    let proxy = harness.add_user("proxyUser");
    let mut work = create_test_work("owner", Vec::new());
    work.on_behalf_of = Some("proxyUser".to_string());
    let work = harness.add_work(work);
    let upload = harness.stage_upload(&proxy, "thesis.pdf", b"thesis");

    let outcome = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &[upload.batch_item()], &Map::new())
        .await
        .unwrap();

    assert_eq!(outcome.file_sets[0].depositor, "proxyUser");
    assert_eq!(harness.callback.calls()[0].user_key, "proxyUser");
}

#[tokio::test]
async fn blank_proxy_falls_back_to_depositor() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let mut work = create_test_work("owner", Vec::new());
    work.on_behalf_of = Some(String::new());
    let work = harness.add_work(work);
    let upload = harness.stage_upload(&owner, "a.pdf", b"a");

    let outcome = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &[upload.batch_item()], &Map::new())
        .await
        .unwrap();
    assert_eq!(outcome.file_sets[0].depositor, "owner");
}

#[tokio::test]
async fn missing_depositor_is_reported_before_creation() {
    let harness = AttachHarness::new();
    let stranger = reliquary_core::models::User::new("someone-else");
    let work = harness.add_work(create_test_work("ghost", Vec::new()));
    let upload = harness.stage_upload(&stranger, "a.pdf", b"a");

    let err = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &[upload.batch_item()], &Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AttachError::DepositorNotFound(ref key) if key == "ghost"));
    assert!(err.is_recoverable());
    assert_eq!(harness.file_sets.count(), 0);
}

#[tokio::test]
async fn only_whitelisted_visibility_attributes_apply() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let upload = harness.stage_upload(&owner, "a.pdf", b"a");

    let attrs = attributes(json!({
        "visibility": "open",
        "title": "ignored",
        "lease_expiration_date": "2999-01-01"
    }));
    let outcome = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &[upload.batch_item()], &attrs)
        .await
        .unwrap();

    let file_set = &outcome.file_sets[0];
    assert_eq!(file_set.access, Some(AccessTerms::plain(Visibility::Open)));
    assert_eq!(file_set.label.as_deref(), Some("a.pdf"));
}

#[tokio::test]
async fn embargo_terms_are_applied_with_defaults() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let upload = harness.stage_upload(&owner, "a.pdf", b"a");

    let attrs = attributes(json!({
        "visibility": "embargo",
        "embargo_release_date": "2999-06-30"
    }));
    let outcome = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &[upload.batch_item()], &attrs)
        .await
        .unwrap();

    let access = outcome.file_sets[0].access.clone().unwrap();
    assert_eq!(access.visibility, Visibility::Restricted);
    let embargo = access.embargo.unwrap();
    assert_eq!(embargo.visibility_after, Visibility::Open);
    assert_eq!(embargo.release_date.to_string(), "2999-06-30");
}

#[tokio::test]
async fn invalid_visibility_metadata_fails_without_side_effects() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let upload = harness.stage_upload(&owner, "a.pdf", b"a");

    for attrs in [
        json!({"visibility": "secret"}),
        json!({"visibility": "lease", "lease_expiration_date": "2001-01-01"}),
        json!({"visibility": "embargo", "embargo_release_date": "30/06/2999"}),
        json!({"visibility": "embargo"}),
    ] {
        let err = harness
            .job(OrphanPolicy::Retain)
            .perform(&work, &[upload.batch_item()], &attributes(attrs))
            .await
            .unwrap_err();
        assert!(matches!(err, AttachError::InvalidMetadata(_)), "{err:?}");
        assert!(!err.is_recoverable());
    }
    assert_eq!(harness.file_sets.count(), 0);
}

#[tokio::test]
async fn work_permissions_are_copied_to_every_file_set() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let grants = vec![PermissionGrant::person("a", AccessLevel::Edit)];
    let work = harness.add_work(create_test_work("owner", grants.clone()));
    let first = harness.stage_upload(&owner, "a.pdf", b"a");
    let second = harness.stage_upload(&owner, "b.pdf", b"b");

    let outcome = harness
        .job(OrphanPolicy::Retain)
        .perform(
            &work,
            &batch(&[&first, &second]),
            &attributes(json!({"visibility": "open"})),
        )
        .await
        .unwrap();

    for file_set in &outcome.file_sets {
        assert_eq!(file_set.permissions, grants);
        assert_eq!(harness.file_sets.get_stored(file_set.id).unwrap().permissions, grants);
    }
}

#[tokio::test]
async fn empty_work_gets_members_and_one_callback() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let first = harness.stage_upload(&owner, "a.pdf", b"a");
    let second = harness.stage_upload(&owner, "b.pdf", b"b");

    let outcome = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &batch(&[&first, &second]), &Map::new())
        .await
        .unwrap();

    let stored = harness.work(work.id);
    assert_eq!(stored.ordered_member_ids, outcome.file_set_ids());
    assert_eq!(stored.ordered_member_ids.len(), 2);
    assert_eq!(stored.representative_id, Some(outcome.file_sets[0].id));
    assert_eq!(stored.thumbnail_id, Some(outcome.file_sets[0].id));
    assert_eq!(harness.works.commit_count(), 1);

    let calls = harness.callback.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].user_key, "owner");
    assert_eq!(calls[0].work_id, work.id);
    assert_eq!(calls[0].file_set_ids, outcome.file_set_ids());
}

#[tokio::test]
async fn inherits_work_visibility_when_none_requested() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let mut work = create_test_work("owner", Vec::new());
    work.visibility = Visibility::Authenticated;
    let work = harness.add_work(work);
    let upload = harness.stage_upload(&owner, "a.pdf", b"a");

    let outcome = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &[upload.batch_item()], &Map::new())
        .await
        .unwrap();
    assert_eq!(
        outcome.file_sets[0].access,
        Some(AccessTerms::plain(Visibility::Authenticated))
    );
}

#[tokio::test]
async fn performing_twice_duplicates_file_sets() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let first = harness.stage_upload(&owner, "a.pdf", b"a");
    let second = harness.stage_upload(&owner, "b.pdf", b"b");
    let items = batch(&[&first, &second]);
    let job = harness.job(OrphanPolicy::Retain);

    let run_one = job.perform(&work, &items, &Map::new()).await.unwrap();
    let reloaded = harness.work(work.id);
    let run_two = job.perform(&reloaded, &items, &Map::new()).await.unwrap();

    assert_eq!(harness.file_sets.count(), 4);
    let mut expected = run_one.file_set_ids();
    expected.extend(run_two.file_set_ids());
    assert_eq!(harness.work(work.id).ordered_member_ids, expected);
    assert_eq!(harness.callback.calls().len(), 2);
    assert_eq!(
        harness.uploads.get_stored(first.id).unwrap().file_set_id,
        Some(run_two.file_sets[0].id)
    );
}

#[tokio::test]
async fn concurrent_jobs_on_same_work_keep_both_batches() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let a = harness.stage_upload(&owner, "a.pdf", b"a");
    let b = harness.stage_upload(&owner, "b.pdf", b"b");
    let job = harness.job(OrphanPolicy::Retain);

    // Both jobs loaded the work before either committed.
    let snapshot = harness.work(work.id);
    let first = job.perform(&snapshot, &[a.batch_item()], &Map::new()).await.unwrap();
    let second = job.perform(&snapshot, &[b.batch_item()], &Map::new()).await.unwrap();

    let mut expected = first.file_set_ids();
    expected.extend(second.file_set_ids());
    assert_eq!(harness.work(work.id).ordered_member_ids, expected);
    assert_eq!(second.ordered_member_ids, expected);
}

#[tokio::test]
async fn partial_failure_retains_orphans_by_default() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let existing = Uuid::new_v4();
    let mut work = create_test_work("owner", Vec::new());
    work.ordered_member_ids = vec![existing];
    let work = harness.add_work(work);
    let first = harness.stage_upload(&owner, "a.pdf", b"a");
    let second = harness.stage_upload(&owner, "b.pdf", b"b");
    let third = harness.stage_upload(&owner, "c.pdf", b"c");
    harness.file_sets.fail_inserts_after(1);

    let err = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &batch(&[&first, &second, &third]), &Map::new())
        .await
        .unwrap_err();

    let (position, upload_id, orphaned) = match &err {
        AttachError::ChildCreation {
            position,
            upload_id,
            orphaned,
            source,
        } => {
            assert!(matches!(**source, AttachError::Persistence(_)));
            (*position, *upload_id, orphaned.clone())
        }
        other => panic!("expected ChildCreation, got {other:?}"),
    };
    assert_eq!(position, 1);
    assert_eq!(upload_id, second.id);
    assert_eq!(orphaned.len(), 1);
    assert!(!err.is_recoverable());

    let orphan = harness.file_sets.get_stored(orphaned[0]).unwrap();
    assert_eq!(orphan.work_id, work.id);
    assert!(orphan.is_attached());
    let stored = harness.work(work.id);
    assert_eq!(stored.ordered_member_ids, vec![existing]);
    assert_eq!(harness.works.commit_count(), 0);
    assert!(harness.callback.calls().is_empty());
    assert_eq!(
        harness.uploads.get_stored(first.id).unwrap().file_set_id,
        Some(orphan.id)
    );
    assert_eq!(harness.uploads.get_stored(third.id).unwrap().file_set_id, None);
}

#[tokio::test]
async fn partial_failure_can_remove_orphans() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let first = harness.stage_upload(&owner, "a.pdf", b"a");
    let second = harness.stage_upload(&owner, "b.pdf", b"b");
    let job = harness.job(OrphanPolicy::Remove);
    let outcome_first = job
        .perform(&work, &[first.batch_item()], &Map::new())
        .await
        .unwrap();
    let reloaded = harness.work(work.id);
    // The next file set is persisted and bound, then attaching it fails.
    harness.file_sets.fail_attach(true);

    let err = job
        .perform(&reloaded, &batch(&[&second, &first]), &Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AttachError::ChildCreation { position: 0, .. }));
    assert!(err.orphaned().is_empty());
    assert!(err.is_recoverable());

    // Only the first run's file set survives.
    assert_eq!(harness.file_sets.count(), 1);
    let kept = &outcome_first.file_sets[0];
    assert!(harness.file_sets.get_stored(kept.id).is_some());
    assert_eq!(
        harness.storage.keys_with_prefix("file_sets/"),
        vec![kept.content_key.clone().unwrap()]
    );
    assert_eq!(harness.work(work.id).ordered_member_ids, vec![kept.id]);
    assert_eq!(harness.work(work.id).representative_id, Some(kept.id));
    assert_eq!(harness.uploads.get_stored(second.id).unwrap().file_set_id, None);
}

#[tokio::test]
async fn removal_deletes_copied_content_that_was_never_bound() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let upload = harness.stage_upload(&owner, "a.pdf", b"a");
    // The copy lands, then sizing it fails before the content is bound.
    harness.storage.fail_content_length(true);

    let err = harness
        .job(OrphanPolicy::Remove)
        .perform(&work, &[upload.batch_item()], &Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AttachError::ChildCreation { position: 0, .. }));
    assert!(err.orphaned().is_empty());
    assert!(err.is_recoverable());
    assert_eq!(harness.file_sets.count(), 0);
    assert!(harness.storage.keys_with_prefix("file_sets/").is_empty());
    assert!(harness.storage.has_file(&upload.storage_key));
}

#[tokio::test]
async fn removal_clears_back_references_and_representative() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let first = harness.stage_upload(&owner, "a.pdf", b"a");
    let second = harness.stage_upload(&owner, "b.pdf", b"b");
    harness.storage.remove_file(&second.storage_key);

    let err = harness
        .job(OrphanPolicy::Remove)
        .perform(&work, &batch(&[&first, &second]), &Map::new())
        .await
        .unwrap_err();

    match &err {
        AttachError::ChildCreation {
            position, source, ..
        } => {
            assert_eq!(*position, 1);
            assert!(matches!(**source, AttachError::Storage(_)));
        }
        other => panic!("expected ChildCreation, got {other:?}"),
    }
    assert!(err.orphaned().is_empty());
    // The cause is a missing object, so a retry cannot help.
    assert!(!err.is_recoverable());

    assert_eq!(harness.file_sets.count(), 0);
    assert!(harness.storage.keys_with_prefix("file_sets/").is_empty());
    assert!(harness.storage.has_file(&first.storage_key));
    assert_eq!(harness.uploads.get_stored(first.id).unwrap().file_set_id, None);
    let stored = harness.work(work.id);
    assert_eq!(stored.representative_id, None);
    assert_eq!(stored.thumbnail_id, None);
    assert!(stored.ordered_member_ids.is_empty());
}

#[tokio::test]
async fn failed_cleanup_reports_remaining_orphans() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let first = harness.stage_upload(&owner, "a.pdf", b"a");
    let second = harness.stage_upload(&owner, "b.pdf", b"b");
    harness.file_sets.fail_inserts_after(1);
    harness.file_sets.fail_delete(true);

    let err = harness
        .job(OrphanPolicy::Remove)
        .perform(&work, &batch(&[&first, &second]), &Map::new())
        .await
        .unwrap_err();

    assert_eq!(err.orphaned().len(), 1);
    assert!(!err.is_recoverable());
    assert_eq!(harness.file_sets.count(), 1);
}

#[tokio::test]
async fn commit_failure_applies_orphan_policy() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let first = harness.stage_upload(&owner, "a.pdf", b"a");
    let second = harness.stage_upload(&owner, "b.pdf", b"b");
    harness.works.fail_commits(true);

    let retained = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &batch(&[&first, &second]), &Map::new())
        .await
        .unwrap_err();
    assert!(matches!(retained, AttachError::Commit { .. }));
    assert_eq!(retained.orphaned().len(), 2);
    assert!(!retained.is_recoverable());
    assert!(harness.callback.calls().is_empty());

    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let upload = harness.stage_upload(&owner, "a.pdf", b"a");
    harness.works.fail_commits(true);

    let removed = harness
        .job(OrphanPolicy::Remove)
        .perform(&work, &[upload.batch_item()], &Map::new())
        .await
        .unwrap_err();
    assert!(matches!(removed, AttachError::Commit { .. }));
    assert!(removed.orphaned().is_empty());
    assert!(removed.is_recoverable());
    assert_eq!(harness.file_sets.count(), 0);
}

#[tokio::test]
async fn callback_failure_is_unrecoverable_after_commit() {
    let harness = AttachHarness::new().with_callback(RecordingCallback::failing());
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let upload = harness.stage_upload(&owner, "a.pdf", b"a");

    let err = harness
        .job(OrphanPolicy::Retain)
        .perform(&work, &[upload.batch_item()], &Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AttachError::Callback(_)));
    assert!(!err.is_recoverable());
    assert_eq!(harness.work(work.id).ordered_member_ids.len(), 1);
    assert_eq!(harness.callback.calls().len(), 1);
}

#[tokio::test]
async fn activity_stream_records_one_event_per_job() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let first = harness.stage_upload(&owner, "a.pdf", b"a");
    let second = harness.stage_upload(&owner, "b.pdf", b"b");

    let outcome = harness
        .job_with_activity_stream(OrphanPolicy::Retain)
        .perform(&work, &batch(&[&first, &second]), &Map::new())
        .await
        .unwrap();

    let events = harness.activity.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].work_id, work.id);
    assert_eq!(events[0].user_id, owner.id);
    assert_eq!(events[0].file_set_ids, outcome.file_set_ids());
}

#[tokio::test]
async fn run_loads_work_before_performing() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let upload = harness.stage_upload(&owner, "a.pdf", b"a");
    let job = harness.job(OrphanPolicy::Retain);

    let missing = AttachFilesToWorkPayload::new(Uuid::new_v4(), &[upload.id], Map::new());
    let err = job.run(&missing).await.unwrap_err();
    assert!(matches!(err, AttachError::WorkNotFound(_)));
    assert_eq!(harness.file_sets.count(), 0);

    let payload = AttachFilesToWorkPayload::new(work.id, &[upload.id], Map::new());
    let outcome = job.run(&payload).await.unwrap();
    assert_eq!(outcome.file_sets.len(), 1);
}

#[tokio::test]
async fn run_attaches_large_batches_in_full() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let ids: Vec<Uuid> = (0..1001)
        .map(|i| harness.stage_upload(&owner, &format!("page-{}.pdf", i), b"p").id)
        .collect();

    let payload = AttachFilesToWorkPayload::new(work.id, &ids, Map::new());
    let outcome = harness.job(OrphanPolicy::Retain).run(&payload).await.unwrap();

    assert_eq!(outcome.file_sets.len(), 1001);
    assert_eq!(harness.file_sets.count(), 1001);
    assert_eq!(harness.work(work.id).ordered_member_ids, outcome.file_set_ids());
}

fn task_for(payload: Value) -> Task {
    let now = chrono::Utc::now();
    Task {
        id: Uuid::new_v4(),
        queue: "ingest".to_string(),
        task_type: TaskType::AttachFilesToWork,
        status: TaskStatus::Running,
        priority: Priority::Normal.as_i32(),
        payload,
        result: None,
        scheduled_at: now,
        started_at: Some(now),
        completed_at: None,
        retry_count: 0,
        max_retries: 3,
        timeout_seconds: Some(3600),
        created_at: now,
        updated_at: now,
    }
}

fn unrecoverable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<TaskError>()
        .map(|te| !te.is_recoverable())
        .unwrap_or(false)
}

#[tokio::test]
async fn dispatch_returns_result_json() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let first = harness.stage_upload(&owner, "a.pdf", b"a");
    let second = harness.stage_upload(&owner, "b.pdf", b"b");
    let context = Arc::new(AttachmentWorkerContext::new(harness.job(OrphanPolicy::Retain)));

    let payload = AttachFilesToWorkPayload::new(work.id, &[first.id, second.id], Map::new());
    let task = task_for(Task::payload_from(&payload).unwrap());
    let value = context.dispatch_task(&task).await.unwrap();

    let result: AttachFilesToWorkResult = serde_json::from_value(value).unwrap();
    assert_eq!(result.work_id, work.id);
    assert_eq!(result.file_set_ids.len(), 2);
    assert_eq!(result.ordered_member_count, 2);
    assert_eq!(harness.work(work.id).ordered_member_ids, result.file_set_ids);
}

#[tokio::test]
async fn dispatch_classifies_failures() {
    let harness = AttachHarness::new();
    let owner = harness.add_user("owner");
    let work = harness.add_work(create_test_work("owner", Vec::new()));
    let upload = harness.stage_upload(&owner, "a.pdf", b"a");
    let context = Arc::new(AttachmentWorkerContext::new(harness.job(OrphanPolicy::Retain)));

    let malformed = task_for(json!({"work_id": "nope"}));
    let err = context.clone().dispatch_task(&malformed).await.unwrap_err();
    assert!(unrecoverable(&err));

    let bad_batch = task_for(json!({"work_id": work.id, "uploaded_files": [7]}));
    let err = context.clone().dispatch_task(&bad_batch).await.unwrap_err();
    assert!(unrecoverable(&err));
    assert!(err.to_string().contains("uploaded file required, but number received"));

    harness.works.fail_commits(true);
    let payload = AttachFilesToWorkPayload::new(work.id, &[upload.id], Map::new());
    let err = context
        .clone()
        .dispatch_task(&task_for(Task::payload_from(&payload).unwrap()))
        .await
        .unwrap_err();
    assert!(unrecoverable(&err), "retained orphans must not be retried");

    let ghost_work = harness.add_work(create_test_work("ghost", Vec::new()));
    let payload = AttachFilesToWorkPayload::new(ghost_work.id, &[upload.id], Map::new());
    let err = context
        .dispatch_task(&task_for(Task::payload_from(&payload).unwrap()))
        .await
        .unwrap_err();
    assert!(!unrecoverable(&err));
}

#[derive(Default)]
struct RecordingSubmitter {
    submitted: Mutex<Vec<(String, TaskType, Value, Priority)>>,
}

#[async_trait]
impl TaskSubmitter for RecordingSubmitter {
    async fn submit_task(
        &self,
        queue_name: &str,
        task_type: TaskType,
        payload: Value,
        priority: Priority,
        _scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> anyhow::Result<Uuid> {
        self.submitted
            .lock()
            .unwrap()
            .push((queue_name.to_string(), task_type, payload, priority));
        Ok(Uuid::new_v4())
    }
}

#[tokio::test]
async fn enqueue_targets_the_named_queue() {
    let submitter = RecordingSubmitter::default();
    let work_id = Uuid::new_v4();
    let upload_id = Uuid::new_v4();
    let payload = AttachFilesToWorkPayload::new(
        work_id,
        &[upload_id],
        attributes(json!({"visibility": "open"})),
    );

    enqueue_attach_files(&submitter, "bulk_ingest", &payload)
        .await
        .unwrap();

    let submitted = submitter.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    let (queue, task_type, value, priority) = &submitted[0];
    assert_eq!(queue, "bulk_ingest");
    assert_eq!(*task_type, TaskType::AttachFilesToWork);
    assert_eq!(*priority, Priority::Normal);
    let decoded: AttachFilesToWorkPayload = serde_json::from_value(value.clone()).unwrap();
    assert_eq!(decoded, payload);
}

#[tokio::test]
async fn enqueue_rejects_blank_queue() {
    let submitter = RecordingSubmitter::default();
    let payload = AttachFilesToWorkPayload::new(Uuid::new_v4(), &[Uuid::new_v4()], Map::new());
    assert!(enqueue_attach_files(&submitter, "  ", &payload).await.is_err());
    assert!(submitter.submitted.lock().unwrap().is_empty());
}
