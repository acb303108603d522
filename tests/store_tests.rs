//! Credential store behaviour against memory-backed blob stores.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FaultyBlobStore;
use credvault::blob::BlobStore;
use credvault::keyspace::{self, TenantId};
use credvault::{
    Credential, CredentialDraft, CredentialField, CredentialStore, ErrorKind, StoreSettings,
};
use uuid::Uuid;

fn tenant(raw: &str) -> TenantId {
    TenantId::parse(raw).unwrap()
}

fn draft(service: &str, username: &str) -> CredentialDraft {
    CredentialDraft {
        service: service.to_string(),
        username: username.to_string(),
        password: "correct horse battery staple".to_string(),
        description: Some(format!("{service} login")),
        metadata: Some([("team".to_string(), "platform".to_string())].into()),
    }
}

fn store_over(blobs: &FaultyBlobStore, settings: StoreSettings) -> CredentialStore {
    CredentialStore::new(Arc::new(blobs.clone()), settings)
}

fn default_store() -> (CredentialStore, FaultyBlobStore) {
    let blobs = FaultyBlobStore::new();
    (store_over(&blobs, StoreSettings::default()), blobs)
}

#[tokio::test]
async fn test_create_then_get_returns_same_record() {
    let (store, _) = default_store();
    let alice = tenant("alice");

    let created = store.create(&alice, draft("github", "octocat")).await.unwrap();
    let fetched = store.get(&alice, created.id).await.unwrap();

    assert_eq!(fetched, created);
    assert_eq!(fetched.service, "github");
    assert_eq!(fetched.metadata.unwrap()["team"], "platform");
}

#[tokio::test]
async fn test_other_tenant_cannot_read_record() {
    let (store, _) = default_store();
    let alice = tenant("alice");
    let mallory = tenant("mallory");

    let created = store.create(&alice, draft("github", "octocat")).await.unwrap();

    let err = store.get(&mallory, created.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(store.list(&mallory).await.unwrap().is_empty());

    let err = store
        .update_field(&mallory, created.id, CredentialField::Password, "pwned".into())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(store.get(&alice, created.id).await.unwrap(), created);
}

#[tokio::test]
async fn test_tenant_prefix_does_not_leak_into_longer_tenant() {
    let (store, _) = default_store();
    let short = tenant("ab");
    let long = tenant("abc");

    let mine = store.create(&short, draft("github", "short")).await.unwrap();
    store.create(&long, draft("gitlab", "long")).await.unwrap();

    assert_eq!(store.list(&short).await.unwrap(), vec![mine]);
}

#[tokio::test]
async fn test_update_service_changes_only_that_field() {
    let (store, _) = default_store();
    let alice = tenant("alice");
    let before = store.create(&alice, draft("github", "octocat")).await.unwrap();

    let updated = store
        .update_field(&alice, before.id, CredentialField::Service, "gitlab".into())
        .await
        .unwrap();
    let after = store.get(&alice, before.id).await.unwrap();

    assert_eq!(after, updated);
    assert_eq!(after.service, "gitlab");
    assert!(after.updated_at > before.updated_at);
    assert_eq!(
        Credential {
            service: before.service.clone(),
            updated_at: before.updated_at,
            ..after.clone()
        },
        before
    );
}

#[tokio::test]
async fn test_rejected_update_leaves_object_bytes_unchanged() {
    let (store, blobs) = default_store();
    let alice = tenant("alice");
    let created = store.create(&alice, draft("github", "octocat")).await.unwrap();
    let key = keyspace::record_key(&alice, created.id);
    let original = blobs.inner.get(&key).await.unwrap();

    let err = store
        .update_field(
            &alice,
            created.id,
            CredentialField::Service,
            "a-service-name-that-is-too-long".into(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    assert!(!err.is_retryable());
    assert_eq!(blobs.inner.get(&key).await.unwrap(), original);
}

#[tokio::test]
async fn test_validation_runs_before_any_read() {
    let (store, _) = default_store();

    // The record does not exist; an invalid value must still be reported as invalid
    let err = store
        .update_field(&tenant("alice"), Uuid::new_v4(), CredentialField::Username, String::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
}

#[tokio::test]
async fn test_list_returns_exactly_created_records() {
    let (store, _) = default_store();
    let alice = tenant("alice");
    assert!(store.list(&alice).await.unwrap().is_empty());

    let a = store.create(&alice, draft("github", "a")).await.unwrap();
    let b = store.create(&alice, draft("gitlab", "b")).await.unwrap();
    store.create(&tenant("bob"), draft("github", "c")).await.unwrap();

    let mut listed: Vec<Uuid> = store
        .list(&alice)
        .await
        .unwrap()
        .into_iter()
        .map(|credential| credential.id)
        .collect();
    listed.sort();
    let mut expected = vec![a.id, b.id];
    expected.sort();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn test_concurrent_updates_last_write_wins() {
    let (store, _) = default_store();
    let alice = tenant("alice");

    for _ in 0..20 {
        let created = store.create(&alice, draft("github", "original")).await.unwrap();

        let first = store.update_field(&alice, created.id, CredentialField::Username, "x".into());
        let second = store.update_field(&alice, created.id, CredentialField::Username, "y".into());
        let (first, second) = tokio::join!(first, second);
        first.unwrap();
        second.unwrap();

        let stored = store.get(&alice, created.id).await.unwrap();
        assert!(
            stored.username == "x" || stored.username == "y",
            "unexpected username {}",
            stored.username
        );
        assert_eq!(stored.password, created.password);
        assert_eq!(stored.created_at, created.created_at);
    }
}

#[tokio::test]
async fn test_concurrent_updates_across_tasks() {
    let (store, _) = default_store();
    let alice = tenant("alice");
    let created = store.create(&alice, draft("github", "original")).await.unwrap();

    let handles: Vec<_> = ["x", "y"]
        .into_iter()
        .map(|value| {
            let store = store.clone();
            let alice = alice.clone();
            tokio::spawn(async move {
                store
                    .update_field(&alice, created.id, CredentialField::Username, value.into())
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = store.get(&alice, created.id).await.unwrap();
    assert!(["x", "y"].contains(&stored.username.as_str()));
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let (store, _) = default_store();
    let alice = tenant("alice");
    let created = store.create(&alice, draft("github", "octocat")).await.unwrap();

    store.delete(&alice, created.id).await.unwrap();

    let err = store.get(&alice, created.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    // Deleting again is not an error
    store.delete(&alice, created.id).await.unwrap();
}

#[tokio::test]
async fn test_failed_write_is_retryable_storage_failure() {
    let (store, blobs) = default_store();
    blobs.fail_puts(true);

    let err = store
        .create(&tenant("alice"), draft("github", "octocat"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert!(err.is_retryable());
    assert!(blobs.inner.is_empty().await);
}

#[tokio::test]
async fn test_listing_failure_is_aggregate_read_failure() {
    let (store, blobs) = default_store();
    let alice = tenant("alice");
    store.create(&alice, draft("github", "octocat")).await.unwrap();
    blobs.fail_lists(true);

    let err = store.list(&alice).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AggregateReadFailure);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_member_fetch_failure_aborts_aggregate() {
    let (store, blobs) = default_store();
    let alice = tenant("alice");
    store.create(&alice, draft("github", "a")).await.unwrap();
    let broken = store.create(&alice, draft("gitlab", "b")).await.unwrap();
    blobs.fail_get(&keyspace::record_key(&alice, broken.id));

    let err = store.list(&alice).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AggregateReadFailure);
}

#[tokio::test]
async fn test_record_deleted_during_listing_is_skipped() {
    let (store, blobs) = default_store();
    let alice = tenant("alice");
    let kept = store.create(&alice, draft("github", "a")).await.unwrap();
    blobs.add_phantom_key(&keyspace::record_key(&alice, Uuid::new_v4()));

    assert_eq!(store.list(&alice).await.unwrap(), vec![kept]);
}

#[tokio::test]
async fn test_slow_aggregate_read_times_out() {
    let blobs = FaultyBlobStore::new();
    let store = store_over(
        &blobs,
        StoreSettings {
            list_timeout: Duration::from_millis(50),
            fetch_concurrency: 2,
        },
    );
    let alice = tenant("alice");
    for service in ["github", "gitlab", "bitbucket"] {
        store.create(&alice, draft(service, "octocat")).await.unwrap();
    }
    blobs.delay_gets(Duration::from_millis(500));

    let err = store.list(&alice).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_list_with_bounded_concurrency_fetches_everything() {
    let blobs = FaultyBlobStore::new();
    let store = store_over(
        &blobs,
        StoreSettings {
            list_timeout: Duration::from_secs(5),
            fetch_concurrency: 1,
        },
    );
    let alice = tenant("alice");
    for i in 0..12 {
        store
            .create(&alice, draft("github", &format!("user-{i}")))
            .await
            .unwrap();
    }

    let listed = store.list(&alice).await.unwrap();
    assert_eq!(listed.len(), 12);
    assert!(listed.windows(2).all(|pair| pair[0].created_at <= pair[1].created_at));
}

#[tokio::test]
async fn test_purge_removes_every_record_of_tenant() {
    let (store, blobs) = default_store();
    let alice = tenant("alice");
    let bob = tenant("bob");
    store.create(&alice, draft("github", "a")).await.unwrap();
    store.create(&alice, draft("gitlab", "b")).await.unwrap();
    let bobs = store.create(&bob, draft("github", "c")).await.unwrap();

    assert_eq!(store.purge(&alice).await.unwrap(), 2);

    assert!(store.list(&alice).await.unwrap().is_empty());
    assert_eq!(store.list(&bob).await.unwrap(), vec![bobs]);
    assert_eq!(blobs.inner.len().await, 1);
}
