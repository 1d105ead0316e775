use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::time::Duration;

use super::run::{StageOptions, execute_stages};
use super::*;
use crate::api::testing::serve_once;
use crate::api::{ApiError, Catalog, DocumentSource, HttpDocumentSource};
use crate::layout::OutputLayout;
use crate::model::{AnnotatedSentenceRow, DownloadOutcome, ManifestoRecord};
use crate::util::parse_csv;

const BASE: &str = "https://manifesto-project.wzb.eu";

enum FakeBody {
    Bytes(Vec<u8>),
    Status(u16),
    BrokenAfter(Vec<u8>),
}

#[derive(Default)]
struct CountingSource {
    bodies: HashMap<String, FakeBody>,
    calls: RefCell<Vec<String>>,
}

impl CountingSource {
    fn with(mut self, url: &str, body: FakeBody) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

struct BrokenReader {
    head: Cursor<Vec<u8>>,
}

impl Read for BrokenReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.head.read(buf)?;
        if count == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        Ok(count)
    }
}

impl DocumentSource for CountingSource {
    fn open(&self, url: &str) -> Result<Box<dyn Read + '_>, ApiError> {
        self.calls.borrow_mut().push(url.to_string());
        match self.bodies.get(url) {
            Some(FakeBody::Bytes(bytes)) => Ok(Box::new(Cursor::new(bytes.clone()))),
            Some(FakeBody::BrokenAfter(bytes)) => Ok(Box::new(BrokenReader {
                head: Cursor::new(bytes.clone()),
            })),
            Some(FakeBody::Status(status)) => Err(ApiError::Server {
                status: *status,
                body: "Not Found".to_string(),
            }),
            None => Err(ApiError::Server {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

#[derive(Default)]
struct FakeCatalog {
    records: Vec<ManifestoRecord>,
    rows: Vec<AnnotatedSentenceRow>,
    metadata_calls: Cell<usize>,
    corpus_calls: Cell<usize>,
}

impl Catalog for FakeCatalog {
    fn metadata(&self, parties: &[u32]) -> Result<Vec<ManifestoRecord>, ApiError> {
        self.metadata_calls.set(self.metadata_calls.get() + 1);
        Ok(self
            .records
            .iter()
            .filter(|record| record.party.is_some_and(|party| parties.contains(&party)))
            .cloned()
            .collect())
    }

    fn corpus(&self, records: &[ManifestoRecord]) -> Result<Vec<AnnotatedSentenceRow>, ApiError> {
        self.corpus_calls.set(self.corpus_calls.get() + 1);
        let ids: Vec<&str> = records.iter().filter_map(ManifestoRecord::id).collect();
        Ok(self
            .rows
            .iter()
            .filter(|row| ids.contains(&row.manifesto_id.as_str()))
            .cloned()
            .collect())
    }
}

struct FailingCatalog;

impl Catalog for FailingCatalog {
    fn metadata(&self, _parties: &[u32]) -> Result<Vec<ManifestoRecord>, ApiError> {
        Err(ApiError::Unauthorized { status: 401 })
    }

    fn corpus(&self, _records: &[ManifestoRecord]) -> Result<Vec<AnnotatedSentenceRow>, ApiError> {
        Err(ApiError::Unauthorized { status: 401 })
    }
}

fn record(id: Option<&str>, party: u32, url: Option<&str>) -> ManifestoRecord {
    ManifestoRecord {
        manifesto_id: id.map(ToOwned::to_owned),
        party: Some(party),
        date: Some(201912),
        url_original: url.map(ToOwned::to_owned),
        ..ManifestoRecord::default()
    }
}

fn sentence(id: &str, pos: usize, text: &str) -> AnnotatedSentenceRow {
    AnnotatedSentenceRow {
        manifesto_id: id.to_string(),
        pos,
        columns: vec![
            ("text".to_string(), text.to_string()),
            ("cmp_code".to_string(), "503".to_string()),
        ],
    }
}

fn options() -> StageOptions<'static> {
    StageOptions {
        base_origin: BASE,
        skip_pdfs: false,
        skip_csvs: false,
    }
}

fn prepared_layout(root: &Path) -> OutputLayout {
    let layout = OutputLayout::new(root, None, None);
    layout.prepare().unwrap();
    layout
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    parse_csv(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn records_without_url_or_id_are_never_attempted() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let records = vec![
        record(Some("51320_2019"), 51320, Some("https://example.org/labour.pdf")),
        record(Some("51620_2019"), 51620, Some("")),
        record(Some("51421_2019"), 51421, None),
        record(None, 51421, Some("https://example.org/orphan.pdf")),
    ];
    let source = CountingSource::default().with(
        "https://example.org/labour.pdf",
        FakeBody::Bytes(b"%PDF-1.4 labour".to_vec()),
    );

    let summary = download_documents(&source, &records, &layout, BASE);

    assert_eq!(*source.calls.borrow(), vec!["https://example.org/labour.pdf"]);
    assert!(layout.pdf_path("51320_2019").exists());
    assert!(!layout.pdf_path("51620_2019").exists());
    assert!(!layout.pdf_path("51421_2019").exists());

    let counts = summary.counts();
    assert_eq!(counts.downloaded, 1);
    assert_eq!(counts.ineligible, 3);
    assert_eq!(counts.failed, 0);
    assert_eq!(
        summary.entries[3].outcome,
        DownloadOutcome::Ineligible {
            reason: "missing manifesto_id".to_string()
        }
    );
}

#[test]
fn existing_pdf_is_skipped_without_network_call() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    fs::write(layout.pdf_path("51320_2019"), b"truncated").unwrap();

    let records = vec![record(Some("51320_2019"), 51320, Some("/down/51320_2019.pdf"))];
    let source = CountingSource::default();

    let summary = download_documents(&source, &records, &layout, BASE);

    assert_eq!(source.call_count(), 0);
    assert_eq!(summary.counts().already_present, 1);
    assert_eq!(fs::read(layout.pdf_path("51320_2019")).unwrap(), b"truncated");
}

#[test]
fn relative_urls_are_requested_against_base_origin() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let records = vec![record(Some("51320_2019"), 51320, Some("/doc/x.pdf"))];
    let source = CountingSource::default().with(
        "https://manifesto-project.wzb.eu/doc/x.pdf",
        FakeBody::Bytes(b"%PDF".to_vec()),
    );

    let summary = download_documents(&source, &records, &layout, BASE);

    assert_eq!(
        *source.calls.borrow(),
        vec!["https://manifesto-project.wzb.eu/doc/x.pdf"]
    );
    match &summary.entries[0].outcome {
        DownloadOutcome::Downloaded { bytes, sha256, .. } => {
            assert_eq!(*bytes, 4);
            assert_eq!(sha256.len(), 64);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn not_found_is_recorded_and_next_record_still_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let records = vec![
        record(Some("51320_2015"), 51320, Some("https://example.org/missing.pdf")),
        record(Some("51620_2015"), 51620, Some("https://example.org/tories.pdf")),
    ];
    let source = CountingSource::default()
        .with("https://example.org/missing.pdf", FakeBody::Status(404))
        .with(
            "https://example.org/tories.pdf",
            FakeBody::Bytes(b"%PDF tories".to_vec()),
        );

    let summary = download_documents(&source, &records, &layout, BASE);

    assert_eq!(source.call_count(), 2);
    assert!(!layout.pdf_path("51320_2015").exists());
    assert!(layout.pdf_path("51620_2015").exists());
    match &summary.entries[0].outcome {
        DownloadOutcome::Failed { error, .. } => assert!(error.contains("404")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(summary.counts().failed, 1);
    assert_eq!(summary.counts().downloaded, 1);
}

#[test]
fn interrupted_stream_leaves_partial_file_that_later_runs_keep() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let records = vec![record(Some("51421_2017"), 51421, Some("https://example.org/libdem.pdf"))];
    let source = CountingSource::default().with(
        "https://example.org/libdem.pdf",
        FakeBody::BrokenAfter(b"%PDF-partial".to_vec()),
    );

    let first = download_documents(&source, &records, &layout, BASE);
    assert_eq!(first.counts().failed, 1);
    assert!(layout.pdf_path("51421_2017").exists());

    let second = download_documents(&source, &records, &layout, BASE);
    assert_eq!(second.counts().already_present, 1);
    assert_eq!(source.call_count(), 1);
}

#[test]
fn manifesto_ids_that_escape_the_pdf_folder_are_ineligible() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let records = vec![
        record(Some("../escaped"), 51320, Some("https://example.org/a.pdf")),
        record(Some("/tmp/absolute"), 51320, Some("https://example.org/b.pdf")),
    ];
    let source = CountingSource::default()
        .with("https://example.org/a.pdf", FakeBody::Bytes(b"%PDF".to_vec()))
        .with("https://example.org/b.pdf", FakeBody::Bytes(b"%PDF".to_vec()));

    let summary = download_documents(&source, &records, &layout, BASE);

    assert_eq!(source.call_count(), 0);
    assert_eq!(summary.counts().ineligible, 2);
    assert_eq!(
        summary.entries[0].outcome,
        DownloadOutcome::Ineligible {
            reason: "unsafe manifesto_id".to_string()
        }
    );
    assert!(!dir.path().join("escaped.pdf").exists());
}

#[test]
fn http_not_found_leaves_no_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let origin = serve_once("404 Not Found", "not found".to_string());
    let records = vec![record(Some("51320_2015"), 51320, Some("/down/51320_2015.pdf"))];
    let source = HttpDocumentSource::new(Some(Duration::from_secs(5))).unwrap();

    let summary = download_documents(&source, &records, &layout, &origin);

    match &summary.entries[0].outcome {
        DownloadOutcome::Failed { url, error, .. } => {
            assert_eq!(url, &format!("{origin}/down/51320_2015.pdf"));
            assert!(error.contains("404"), "{error}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!layout.pdf_path("51320_2015").exists());
}

#[test]
fn http_success_streams_body_into_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let origin = serve_once("200 OK", "%PDF-1.7 body".to_string());
    let records = vec![record(Some("51620_2015"), 51620, Some("/down/51620_2015.pdf"))];
    let source = HttpDocumentSource::new(Some(Duration::from_secs(5))).unwrap();

    let summary = download_documents(&source, &records, &layout, &origin);

    assert_eq!(summary.counts().downloaded, 1);
    assert_eq!(fs::read(layout.pdf_path("51620_2015")).unwrap(), b"%PDF-1.7 body");
}

#[test]
fn unsafe_manifesto_ids_are_skipped_by_export() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let catalog = FakeCatalog {
        records: vec![
            record(Some("51320_2019"), 51320, None),
            record(Some("../escaped"), 51320, None),
        ],
        rows: vec![
            sentence("51320_2019", 1, "Kept."),
            sentence("../escaped", 1, "Dropped."),
        ],
        ..FakeCatalog::default()
    };

    let exported = export_corpus(&catalog, &catalog.records, &layout).unwrap();

    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].manifesto_id, "51320_2019");
    assert!(!dir.path().join("escaped.csv").exists());
}

#[test]
fn corpus_is_split_into_one_csv_per_manifesto() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let mut rows: Vec<AnnotatedSentenceRow> = (1..=6)
        .map(|pos| sentence("51320_2019", pos, &format!("Labour sentence {pos}")))
        .collect();
    rows.extend((1..=4).map(|pos| sentence("51620_2019", pos, &format!("Tory sentence {pos}"))));
    let catalog = FakeCatalog {
        records: vec![
            record(Some("51320_2019"), 51320, None),
            record(Some("51620_2019"), 51620, None),
        ],
        rows,
        ..FakeCatalog::default()
    };

    let exported = export_corpus(&catalog, &catalog.records, &layout).unwrap();

    assert_eq!(exported.len(), 2);
    assert_eq!(exported[0].row_count, 6);
    assert_eq!(exported[1].row_count, 4);

    let labour = read_rows(&layout.csv_path("51320_2019"));
    let tories = read_rows(&layout.csv_path("51620_2019"));
    assert_eq!(labour.len(), 7);
    assert_eq!(tories.len(), 5);

    assert_eq!(&labour[0][..4], &["text", "cmp_code", "pos", "manifesto_id"]);
    assert_eq!(labour[6][0], "Labour sentence 6");
    assert_eq!(labour[6][2], "6");
    assert_eq!(labour[6][3], "51320_2019");
    assert!(labour.iter().all(|row| row.len() == labour[0].len()));
}

#[test]
fn csv_cells_with_delimiters_survive_export() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let catalog = FakeCatalog {
        records: vec![record(Some("51320_2019"), 51320, None)],
        rows: vec![sentence("51320_2019", 1, "Fair, \"green\"\nand growing")],
        ..FakeCatalog::default()
    };

    export_corpus(&catalog, &catalog.records, &layout).unwrap();

    let rows = read_rows(&layout.csv_path("51320_2019"));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][0], "Fair, \"green\"\nand growing");
}

#[test]
fn partitions_keep_first_appearance_order() {
    let rows = vec![
        sentence("b", 1, "b1"),
        sentence("a", 1, "a1"),
        sentence("b", 2, "b2"),
    ];
    let partitions = partition_by_manifesto(&rows);
    let ids: Vec<&str> = partitions.iter().map(|p| p.manifesto_id).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert_eq!(partitions[0].rows.len(), 2);
}

#[test]
fn second_run_downloads_nothing_but_rewrites_csvs() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let catalog = FakeCatalog {
        records: vec![record(Some("51320_2019"), 51320, Some("https://example.org/labour.pdf"))],
        rows: vec![sentence("51320_2019", 1, "Invest in the NHS.")],
        ..FakeCatalog::default()
    };
    let source = CountingSource::default().with(
        "https://example.org/labour.pdf",
        FakeBody::Bytes(b"%PDF".to_vec()),
    );

    let first = execute_stages(&catalog, &source, &layout, &catalog.records, &options());
    assert_eq!(first.downloads.as_ref().unwrap().counts().downloaded, 1);
    assert_eq!(first.exports.unwrap().len(), 1);

    let csv_path = layout.csv_path("51320_2019");
    let written = fs::read_to_string(&csv_path).unwrap();
    fs::write(&csv_path, "stale").unwrap();

    let second = execute_stages(&catalog, &source, &layout, &catalog.records, &options());
    assert_eq!(source.call_count(), 1);
    assert_eq!(second.downloads.as_ref().unwrap().counts().already_present, 1);
    assert_eq!(second.exports.unwrap().len(), 1);
    assert_eq!(catalog.corpus_calls.get(), 2);
    assert_eq!(fs::read_to_string(&csv_path).unwrap(), written);
}

#[test]
fn skip_flags_disable_each_stage() {
    let dir = tempfile::tempdir().unwrap();
    let layout = prepared_layout(dir.path());
    let catalog = FakeCatalog {
        records: vec![record(Some("51320_2019"), 51320, Some("https://example.org/labour.pdf"))],
        rows: vec![sentence("51320_2019", 1, "text")],
        ..FakeCatalog::default()
    };
    let source = CountingSource::default();
    let options = StageOptions {
        base_origin: BASE,
        skip_pdfs: true,
        skip_csvs: true,
    };

    let results = execute_stages(&catalog, &source, &layout, &catalog.records, &options);

    assert!(results.downloads.is_none());
    assert!(results.exports.unwrap().is_empty());
    assert_eq!(source.call_count(), 0);
    assert_eq!(catalog.corpus_calls.get(), 0);
}

#[test]
fn csv_write_failure_is_reported_after_downloads_complete() {
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("not-a-dir");
    fs::write(&blocked, "occupied").unwrap();
    let layout = OutputLayout::new(dir.path(), None, Some(blocked));
    fs::create_dir_all(&layout.pdf_dir).unwrap();

    let catalog = FakeCatalog {
        records: vec![record(Some("51320_2019"), 51320, Some("https://example.org/labour.pdf"))],
        rows: vec![sentence("51320_2019", 1, "text")],
        ..FakeCatalog::default()
    };
    let source = CountingSource::default().with(
        "https://example.org/labour.pdf",
        FakeBody::Bytes(b"%PDF".to_vec()),
    );

    let results = execute_stages(&catalog, &source, &layout, &catalog.records, &options());

    assert_eq!(results.downloads.unwrap().counts().downloaded, 1);
    let err = results.exports.unwrap_err();
    assert!(format!("{err:#}").contains("51320_2019"));
}

#[test]
fn metadata_failure_is_fatal() {
    let err = fetch_metadata(&FailingCatalog, &[51320]).unwrap_err();
    assert!(format!("{err:#}").contains("API key rejected"));
}

#[test]
fn metadata_requests_deduplicated_parties() {
    let catalog = FakeCatalog {
        records: vec![
            record(Some("51320_2019"), 51320, None),
            record(Some("51110_2019"), 51110, None),
        ],
        ..FakeCatalog::default()
    };

    let records = fetch_metadata(&catalog, &[51320, 51320, 51620]).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(catalog.metadata_calls.get(), 1);
    assert!(fetch_metadata(&catalog, &[]).is_err());
}
