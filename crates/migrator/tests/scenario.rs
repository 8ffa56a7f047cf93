use chatcrypt::{is_envelope, Codec, CryptoConfig};
use chatstore::{MemoryStore, MessageRow, Row, RowId, Store, MESSAGES_TABLE, MINDFULNESS_TABLE, PROFILES_TABLE};
use migrator::{FieldMigration, MessageMigration, MigrationError, DEFAULT_STATUS_SAMPLE};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn codec() -> Codec {
    Codec::new(CryptoConfig::new("migration-secret").unwrap())
}

fn row(v: Value) -> Row {
    v.as_object().cloned().unwrap_or_default()
}

async fn seeded(codec: &Codec) -> MemoryStore {
    let store = MemoryStore::new();
    let already = codec.encrypt_for_conversation("earlier", "u5", "u6").unwrap();
    store
        .seed(
            MESSAGES_TABLE,
            vec![
                row(json!({"id": "m1", "sender_id": "u1", "receiver_id": "u2", "message": "hi", "created_at": "2024-01-01T00:00:00Z"})),
                row(json!({"id": "m2", "sender_id": "u5", "receiver_id": "u6", "message": already, "created_at": "2024-01-02T00:00:00Z"})),
                row(json!({"id": "m3", "sender_id": "u3", "receiver_id": "u4", "message": "bye", "created_at": "2024-01-03T00:00:00Z"})),
            ],
        )
        .await;
    store
}

async fn message(store: &MemoryStore, id: &str) -> MessageRow {
    let rows = store.rows(MESSAGES_TABLE).await;
    let raw = rows
        .iter()
        .find(|r| RowId::of(r) == Some(RowId::new(id)))
        .unwrap();
    MessageRow::from_row(raw).unwrap()
}

#[tokio::test]
async fn three_row_scenario_is_idempotent() {
    let codec = codec();
    let store = seeded(&codec).await;
    let cancel = CancellationToken::new();
    let migration = MessageMigration::default();

    let first = migration.run(&store, &codec, &cancel).await.unwrap();
    assert_eq!(first.migrated_count, 2);
    assert_eq!(first.skipped_count, 1);
    assert_eq!(first.total_messages, 3);
    assert!(first.failures.is_empty());
    assert!(!first.cancelled);

    let second = migration.run(&store, &codec, &cancel).await.unwrap();
    assert_eq!(second.migrated_count, 0);
    assert_eq!(second.skipped_count, 3);
    assert_eq!(second.total_messages, 3);

    let m1 = message(&store, "m1").await;
    assert!(is_envelope(&m1.message));
    assert_eq!(codec.decrypt_for_conversation(&m1.message, "u1", "u2").unwrap(), "hi");
    assert_eq!(codec.decrypt_for_conversation(&m1.message, "u2", "u1").unwrap(), "hi");

    let m2 = message(&store, "m2").await;
    assert_eq!(codec.decrypt_for_conversation(&m2.message, "u5", "u6").unwrap(), "earlier");

    let m3 = message(&store, "m3").await;
    assert_eq!(codec.decrypt_for_conversation(&m3.message, "u4", "u3").unwrap(), "bye");
}

#[tokio::test]
async fn failed_write_is_isolated_and_retried_later() {
    let codec = codec();
    let store = seeded(&codec).await;
    let cancel = CancellationToken::new();
    let migration = MessageMigration::default();

    store.break_writes(RowId::new("m1")).await;
    let first = migration.run(&store, &codec, &cancel).await.unwrap();
    assert_eq!(first.migrated_count, 1);
    assert_eq!(first.skipped_count, 1);
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.failures[0].id, "m1");
    assert_eq!(message(&store, "m1").await.message, "hi");

    store.heal().await;
    let second = migration.run(&store, &codec, &cancel).await.unwrap();
    assert_eq!(second.migrated_count, 1);
    assert_eq!(second.skipped_count, 2);
    assert!(second.failures.is_empty());
    let m1 = message(&store, "m1").await;
    assert_eq!(codec.decrypt_for_conversation(&m1.message, "u1", "u2").unwrap(), "hi");
}

#[tokio::test]
async fn fetch_failure_aborts_the_run() {
    let codec = codec();
    let store = seeded(&codec).await;
    store.break_reads(MESSAGES_TABLE).await;

    let err = MessageMigration::default()
        .run(&store, &codec, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Fetch(_)));
    assert_eq!(message(&store, "m1").await.message, "hi");
}

#[tokio::test]
async fn cancelled_run_returns_partial_counts() {
    let codec = codec();
    let store = seeded(&codec).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = MessageMigration::default()
        .run(&store, &codec, &cancel)
        .await
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.migrated_count, 0);
    assert_eq!(report.total_messages, 3);
    assert_eq!(message(&store, "m1").await.message, "hi");
}

#[tokio::test]
async fn malformed_and_empty_rows_are_reported_not_fatal() {
    let codec = codec();
    let store = MemoryStore::new();
    store
        .seed(
            MESSAGES_TABLE,
            vec![
                row(json!({"id": 1, "receiver_id": "u2", "message": "no sender", "created_at": "1"})),
                row(json!({"id": 2, "sender_id": "u1", "receiver_id": "u2", "message": "", "created_at": "2"})),
                row(json!({"id": 3, "sender_id": "u1", "receiver_id": "u2", "message": "fine", "created_at": "3"})),
            ],
        )
        .await;

    let report = MessageMigration::default()
        .run(&store, &codec, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.migrated_count, 1);
    let ids: Vec<&str> = report.failures.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn status_samples_without_writing() {
    let codec = codec();
    let store = seeded(&codec).await;
    let migration = MessageMigration::default();

    let before = store.rows(MESSAGES_TABLE).await;
    let status = migration.status(&store, DEFAULT_STATUS_SAMPLE).await.unwrap();
    assert!(status.needs_migration);
    assert_eq!(status.unencrypted_count, 2);
    assert_eq!(status.encrypted_count, 1);
    assert_eq!(status.malformed_count, 0);
    assert_eq!(status.total_sampled, 3);
    assert_eq!(store.rows(MESSAGES_TABLE).await, before);

    let limited = migration.status(&store, 1).await.unwrap();
    assert_eq!(limited.total_sampled, 1);

    migration
        .run(&store, &codec, &CancellationToken::new())
        .await
        .unwrap();
    let after = migration.status(&store, DEFAULT_STATUS_SAMPLE).await.unwrap();
    assert!(!after.needs_migration);
    assert_eq!(after.encrypted_count, 3);
}

#[tokio::test]
async fn status_does_not_count_malformed_rows_as_encrypted() {
    let store = MemoryStore::new();
    store
        .seed(
            MESSAGES_TABLE,
            vec![
                row(json!({"id": 1, "sender_id": "u1", "receiver_id": "u2", "message": null, "created_at": "1"})),
                row(json!({"id": 2, "sender_id": "u1", "receiver_id": "u2", "message": 42, "created_at": "2"})),
                row(json!({"id": 3, "sender_id": "u1", "receiver_id": "u2", "created_at": "3"})),
                row(json!({"id": 4, "sender_id": "u1", "receiver_id": "u2", "message": "aa:bb:cc", "created_at": "4"})),
            ],
        )
        .await;

    let status = MessageMigration::default()
        .status(&store, DEFAULT_STATUS_SAMPLE)
        .await
        .unwrap();
    assert!(!status.needs_migration);
    assert_eq!(status.encrypted_count, 1);
    assert_eq!(status.malformed_count, 3);
    assert_eq!(status.unencrypted_count, 0);
    assert_eq!(status.total_sampled, 4);
}

#[tokio::test]
async fn two_colon_plaintext_is_skipped() {
    let codec = codec();
    let store = MemoryStore::new();
    store
        .seed(
            MESSAGES_TABLE,
            vec![row(json!({"id": 1, "sender_id": "u1", "receiver_id": "u2", "message": "note: see: later"}))],
        )
        .await;
    let report = MessageMigration::default()
        .run(&store, &codec, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.skipped_count, 1);
    assert_eq!(report.migrated_count, 0);
}

#[tokio::test]
async fn profile_fields_are_encrypted_per_user() {
    let codec = codec();
    let store = MemoryStore::new();
    store
        .seed(
            PROFILES_TABLE,
            vec![
                row(json!({"id": "u1", "dob": "1990-01-01", "location": "Lisbon", "gender": null})),
                row(json!({"id": "u2", "dob": "", "location": null, "gender": null})),
            ],
        )
        .await;

    let migration = FieldMigration::profiles();
    let cancel = CancellationToken::new();
    let report = migration.run(&store, &codec, &cancel).await.unwrap();
    assert_eq!(report.migrated_count, 1);
    assert_eq!(report.skipped_count, 1);
    assert_eq!(report.total_rows, 2);

    let rows = store.rows(PROFILES_TABLE).await;
    let dob = rows[0]["dob"].as_str().unwrap();
    assert!(is_envelope(dob));
    assert_eq!(codec.decrypt_profile_field(dob, "u1").unwrap(), "1990-01-01");
    assert!(codec.decrypt_profile_field(dob, "u2").is_err());
    assert_eq!(rows[0]["gender"], Value::Null);

    let again = migration.run(&store, &codec, &cancel).await.unwrap();
    assert_eq!(again.migrated_count, 0);
    assert_eq!(again.skipped_count, 2);
}

#[tokio::test]
async fn mindfulness_entries_use_owner_key() {
    let codec = codec();
    let store = MemoryStore::new();
    store
        .seed(
            MINDFULNESS_TABLE,
            vec![
                row(json!({"id": 10, "user_id": "u7", "content": "grateful for tea"})),
                row(json!({"id": 11, "content": "orphan"})),
            ],
        )
        .await;

    let report = FieldMigration::mindfulness_entries()
        .run(&store, &codec, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.migrated_count, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].id, "11");

    let entries = store.fetch_all(MINDFULNESS_TABLE, None).await.unwrap();
    let content = entries[0]["content"].as_str().unwrap();
    assert_eq!(codec.decrypt_profile_field(content, "u7").unwrap(), "grateful for tea");
}

#[tokio::test]
async fn field_migration_walks_rows_in_ascending_order() {
    let codec = codec();
    let store = MemoryStore::new();
    store
        .seed(
            MINDFULNESS_TABLE,
            vec![
                row(json!({"id": 1, "content": "third", "created_at": "2024-03-01"})),
                row(json!({"id": 2, "content": "first", "created_at": "2024-01-01"})),
                row(json!({"id": 3, "content": "second", "created_at": "2024-02-01"})),
            ],
        )
        .await;

    let migration = FieldMigration::mindfulness_entries();
    assert_eq!(migration.order_column, "created_at");
    let report = migration
        .run(&store, &codec, &CancellationToken::new())
        .await
        .unwrap();
    let ids: Vec<&str> = report.failures.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "3", "1"]);
    assert_eq!(FieldMigration::profiles().order_column, "id");
}
