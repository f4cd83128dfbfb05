//! End-to-end tests for the access-log batch ingestor: scan, parse,
//! validate, apply, and archive/error routing against a real temp store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use docloader::config::IngestSettings;
use docloader::ingest::{AccessLogIngestor, StoreSink};
use docloader::models::Document;
use docloader::repository::{DocumentStore, SqliteStore};
use tempfile::TempDir;

struct Fixture {
    root: TempDir,
    store: Arc<SqliteStore>,
    ingestor: AccessLogIngestor,
}

impl Fixture {
    fn input(&self) -> PathBuf {
        self.root.path().join("input")
    }

    fn archive(&self) -> PathBuf {
        self.root.path().join("archive")
    }

    fn error(&self) -> PathBuf {
        self.root.path().join("error")
    }

    fn write_batch(&self, file_name: &str, xml: &str) {
        std::fs::create_dir_all(self.input()).unwrap();
        std::fs::write(self.input().join(file_name), xml).unwrap();
    }
}

async fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(&root.path().join("test.db")).unwrap());
    store.init_schema().await.unwrap();

    // Known documents referenced by the batches under test.
    for id in [5, 7] {
        seed_document(store.as_ref(), id).await;
    }

    let settings = IngestSettings {
        input_dir: root.path().join("input"),
        archive_dir: root.path().join("archive"),
        error_dir: root.path().join("error"),
        file_pattern: "access_*.xml".to_string(),
    };
    let sink = Arc::new(StoreSink::new(store.clone()));
    let ingestor = AccessLogIngestor::new(&settings, sink);

    Fixture {
        root,
        store,
        ingestor,
    }
}

async fn seed_document(store: &SqliteStore, id: i32) {
    store
        .insert_document(Document {
            id,
            file_name: format!("doc-{}.pdf", id),
            summary: String::new(),
            uploaded_at: NaiveDate::from_ymd_opt(2024, 4, 30)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            file_path: format!("uploads/doc-{}.pdf", id),
        })
        .await
        .unwrap();
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn exists(dir: &Path, name: &str) -> bool {
    dir.join(name).exists()
}

#[tokio::test]
async fn valid_batch_is_archived_and_counts_stored() {
    let fx = fixture().await;
    fx.write_batch(
        "access_2024-05-01.xml",
        r#"<dailyAccesses batchDate="2024-05-01">
            <entry documentId="5" accessCount="10"/>
            <entry documentId="7" accessCount="3"/>
        </dailyAccesses>"#,
    );

    let report = fx.ingestor.run_once().await.unwrap();
    assert_eq!(report.archived, 1);
    assert_eq!(report.errored, 0);

    assert!(exists(&fx.archive(), "access_2024-05-01.xml"));
    assert!(!exists(&fx.input(), "access_2024-05-01.xml"));

    let row = fx
        .store
        .get_daily_access(5, date(2024, 5, 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.access_count, 10);
    let row = fx
        .store
        .get_daily_access(7, date(2024, 5, 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.access_count, 3);
}

#[tokio::test]
async fn unknown_document_fails_whole_file_without_partial_writes() {
    let fx = fixture().await;
    // documentId 999 is unknown; the valid entry for 5 must not land either.
    fx.write_batch(
        "access_2024-05-01.xml",
        r#"<dailyAccesses batchDate="2024-05-01">
            <entry documentId="5" accessCount="10"/>
            <entry documentId="999" accessCount="3"/>
        </dailyAccesses>"#,
    );

    let report = fx.ingestor.run_once().await.unwrap();
    assert_eq!(report.archived, 0);
    assert_eq!(report.errored, 1);

    assert!(exists(&fx.error(), "access_2024-05-01.xml"));
    assert!(!exists(&fx.archive(), "access_2024-05-01.xml"));

    assert!(fx
        .store
        .get_daily_access(5, date(2024, 5, 1))
        .await
        .unwrap()
        .is_none());
    assert!(fx
        .store
        .get_daily_access(999, date(2024, 5, 1))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn same_batch_with_valid_id_instead_is_archived() {
    let fx = fixture().await;
    // The unknown 999 replaced by known id 7: both rows land.
    fx.write_batch(
        "access_2024-05-01.xml",
        r#"<dailyAccesses batchDate="2024-05-01">
            <entry documentId="5" accessCount="10"/>
            <entry documentId="7" accessCount="3"/>
        </dailyAccesses>"#,
    );

    fx.ingestor.run_once().await.unwrap();

    assert!(exists(&fx.archive(), "access_2024-05-01.xml"));
    let counts = (
        fx.store
            .get_daily_access(5, date(2024, 5, 1))
            .await
            .unwrap()
            .unwrap()
            .access_count,
        fx.store
            .get_daily_access(7, date(2024, 5, 1))
            .await
            .unwrap()
            .unwrap()
            .access_count,
    );
    assert_eq!(counts, (10, 3));
}

#[tokio::test]
async fn reprocessing_a_key_overwrites_the_count() {
    let fx = fixture().await;
    fx.write_batch(
        "access_a.xml",
        r#"<dailyAccesses batchDate="2024-05-01">
            <entry documentId="5" accessCount="10"/>
        </dailyAccesses>"#,
    );
    fx.ingestor.run_once().await.unwrap();

    // Same (document, date) key again with a different count.
    fx.write_batch(
        "access_a.xml",
        r#"<dailyAccesses batchDate="2024-05-01">
            <entry documentId="5" accessCount="12"/>
        </dailyAccesses>"#,
    );
    let report = fx.ingestor.run_once().await.unwrap();
    assert_eq!(report.archived, 1);

    // Last write wins, no summation, and the archive move replaced the
    // earlier file of the same name.
    let row = fx
        .store
        .get_daily_access(5, date(2024, 5, 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.access_count, 12);
    assert!(exists(&fx.archive(), "access_a.xml"));
}

#[tokio::test]
async fn malformed_files_are_errored_and_run_continues() {
    let fx = fixture().await;
    fx.write_batch(
        "access_01_missing_attr.xml",
        r#"<dailyAccesses batchDate="2024-05-01">
            <entry documentId="5"/>
        </dailyAccesses>"#,
    );
    fx.write_batch(
        "access_02_negative.xml",
        r#"<dailyAccesses batchDate="2024-05-01">
            <entry documentId="5" accessCount="-4"/>
        </dailyAccesses>"#,
    );
    fx.write_batch(
        "access_03_bad_date.xml",
        r#"<dailyAccesses batchDate="May 1st">
            <entry documentId="5" accessCount="4"/>
        </dailyAccesses>"#,
    );
    fx.write_batch(
        "access_04_valid.xml",
        r#"<dailyAccesses batchDate="2024-05-02">
            <entry documentId="7" accessCount="6"/>
        </dailyAccesses>"#,
    );

    let report = fx.ingestor.run_once().await.unwrap();
    assert_eq!(report.errored, 3);
    assert_eq!(report.archived, 1);

    assert!(exists(&fx.error(), "access_01_missing_attr.xml"));
    assert!(exists(&fx.error(), "access_02_negative.xml"));
    assert!(exists(&fx.error(), "access_03_bad_date.xml"));
    assert!(exists(&fx.archive(), "access_04_valid.xml"));

    let row = fx
        .store
        .get_daily_access(7, date(2024, 5, 2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.access_count, 6);
}

#[tokio::test]
async fn files_not_matching_the_pattern_are_left_alone() {
    let fx = fixture().await;
    fx.write_batch(
        "notes.txt",
        "not a batch file",
    );

    let report = fx.ingestor.run_once().await.unwrap();
    assert_eq!(report.archived, 0);
    assert_eq!(report.errored, 0);
    assert!(exists(&fx.input(), "notes.txt"));
}
