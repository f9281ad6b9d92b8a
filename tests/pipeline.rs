//! End-to-end pipeline tests: file bytes in, session state out, with a
//! scripted oracle standing in for the LLM.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use salesboard::error::{IngestError, OracleError, ParseError};
use salesboard::ingest::{Ingestor, Upload};
use salesboard::models::{Dataset, UploadDomain};
use salesboard::normalize::Normalizer;
use salesboard::oracle::{AnalysisRequest, NormalizeRequest, Oracle, RulesOracle};
use salesboard::session::{SessionState, SharedSession};

// ─── Test oracle ────────────────────────────────────────────────────

/// Replies to normalization calls from a queue, in order.
struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    fn new(replies: Vec<Result<Value, OracleError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(|v| v.to_string()))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn normalize(&self, _request: &NormalizeRequest) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("[]".to_string()))
    }

    async fn analyze_view(&self, _request: &AnalysisRequest) -> Result<String, OracleError> {
        Ok("analysis".to_string())
    }
}

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
}

fn pipeline(oracle: Arc<dyn Oracle>) -> (Ingestor, SharedSession) {
    let session = SessionState::shared();
    let ingestor = Ingestor::new(session.clone(), Normalizer::new(oracle, 50)).with_clock(first_day);
    (ingestor, session)
}

fn csv_upload(domain: UploadDomain, body: &str) -> Upload {
    Upload::new(domain, "upload.csv", body.as_bytes().to_vec())
}

// ─── XLSX fixture ───────────────────────────────────────────────────

/// Minimal single-sheet workbook with shared strings for text cells.
fn build_xlsx(rows: &[Vec<Value>]) -> Vec<u8> {
    let mut strings: Vec<String> = Vec::new();
    let mut sheet_rows = String::new();
    for (r, row) in rows.iter().enumerate() {
        sheet_rows.push_str(&format!("<row r=\"{}\">", r + 1));
        for (c, cell) in row.iter().enumerate() {
            let col = (b'A' + c as u8) as char;
            let cell_ref = format!("{}{}", col, r + 1);
            match cell {
                Value::String(s) => {
                    let idx = strings.len();
                    strings.push(s.clone());
                    sheet_rows.push_str(&format!("<c r=\"{}\" t=\"s\"><v>{}</v></c>", cell_ref, idx));
                }
                Value::Number(n) => {
                    sheet_rows.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", cell_ref, n));
                }
                _ => {}
            }
        }
        sheet_rows.push_str("</row>");
    }

    let shared: String = strings
        .iter()
        .map(|s| format!("<si><t>{}</t></si>", s))
        .collect();

    let files = [
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Data" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
        ),
        (
            "xl/sharedStrings.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{}</sst>"#,
                shared
            ),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
                sheet_rows
            ),
        ),
    ];

    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in files {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn xlsx_upload_goes_through_rules_oracle() {
    let (ingestor, session) = pipeline(Arc::new(RulesOracle));
    let bytes = build_xlsx(&[
        vec![json!("월"), json!("목표"), json!("실적")],
        vec![json!("2월"), json!(1000), json!(1100)],
        vec![json!("1월"), json!(900), json!(850)],
    ]);

    let outcome = ingestor
        .ingest(Upload::new(UploadDomain::Sales, "targets.xlsx", bytes))
        .await
        .unwrap();
    assert_eq!(outcome.total, 2);

    let s = session.lock().await;
    let sales = s.dataset(UploadDomain::Sales).unwrap().as_sales().unwrap();
    // First upload keeps the incoming order.
    assert_eq!(sales[0].month, "2월");
    assert_eq!(sales[1].actual, 850.0);
}

#[tokio::test]
async fn reupload_overwrites_and_sorts_sales() {
    let oracle = ScriptedOracle::new(vec![
        Ok(json!([
            {"month": "3월", "target": 100, "actual": 90},
            {"month": "1월", "target": 100, "actual": 90},
        ])),
        Ok(json!([
            {"month": "1월", "target": 100, "actual": 120},
            {"month": "2월", "target": 100, "actual": 80},
            {"month": "10월", "target": 100, "actual": 70},
        ])),
    ]);
    let (ingestor, session) = pipeline(oracle);

    ingestor
        .ingest(csv_upload(UploadDomain::Sales, "a,b\n1,2\n"))
        .await
        .unwrap();
    let outcome = ingestor
        .ingest(csv_upload(UploadDomain::Sales, "a,b\n1,2\n"))
        .await
        .unwrap();
    assert_eq!(outcome.received, 3);
    assert_eq!(outcome.total, 4);

    let s = session.lock().await;
    let ds = s.dataset(UploadDomain::Sales).unwrap();
    assert_eq!(ds.keys(), vec!["10월", "1월", "2월", "3월"]);
    let jan = ds.as_sales().unwrap().iter().find(|r| r.month == "1월").unwrap();
    assert_eq!(jan.actual, 120.0);
    assert_eq!(s.telemetry(UploadDomain::Sales).upload_count, 2);
}

#[tokio::test]
async fn review_merge_keeps_insertion_order() {
    let oracle = ScriptedOracle::new(vec![
        Ok(json!([{"name": "A", "value": 1}, {"name": "B", "value": 2}])),
        Ok(json!([{"name": "B", "value": 20}, {"name": "C", "value": 3}])),
    ]);
    let (ingestor, session) = pipeline(oracle);
    for _ in 0..2 {
        ingestor
            .ingest(csv_upload(UploadDomain::Review, "x\n1\n"))
            .await
            .unwrap();
    }
    let s = session.lock().await;
    assert_eq!(
        s.dataset(UploadDomain::Review).cloned().unwrap(),
        Dataset::Review(vec![
            salesboard::models::ReviewRecord { name: "A".into(), value: 1.0 },
            salesboard::models::ReviewRecord { name: "B".into(), value: 20.0 },
            salesboard::models::ReviewRecord { name: "C".into(), value: 3.0 },
        ])
    );
}

#[tokio::test]
async fn identical_reupload_changes_nothing_but_counts() {
    let batch = json!([
        {"subject": "Price", "ownBrandScore": 80, "competitorAScore": 70},
        {"subject": "Design", "ownBrandScore": 90, "competitorAScore": 60, "competitorBScore": 75},
    ]);
    let oracle = ScriptedOracle::new(vec![Ok(batch.clone()), Ok(batch)]);
    let (ingestor, session) = pipeline(oracle);

    ingestor
        .ingest(csv_upload(UploadDomain::Competitor, "x\n1\n"))
        .await
        .unwrap();
    let after_first = session
        .lock()
        .await
        .dataset(UploadDomain::Competitor)
        .cloned()
        .unwrap();
    ingestor
        .ingest(csv_upload(UploadDomain::Competitor, "x\n1\n"))
        .await
        .unwrap();

    let s = session.lock().await;
    assert_eq!(s.dataset(UploadDomain::Competitor), Some(&after_first));
    assert_eq!(s.telemetry(UploadDomain::Competitor).upload_count, 2);
}

#[tokio::test]
async fn failures_leave_state_untouched() {
    let oracle = ScriptedOracle::new(vec![
        Ok(json!([{"week": "W1", "sales": 10, "inventory": 5}])),
        Ok(json!([])),
        Err(OracleError::Unavailable("timeout".into())),
        Ok(json!("not an array")),
        Ok(json!([{"week": "W2", "sales": "lots", "inventory": 5}])),
    ]);
    let (ingestor, session) = pipeline(oracle.clone());

    ingestor
        .ingest(csv_upload(UploadDomain::Product, "x\n1\n"))
        .await
        .unwrap();
    let baseline = session.lock().await.snapshot();

    let empty = ingestor
        .ingest(csv_upload(UploadDomain::Product, "x\n1\n"))
        .await
        .unwrap_err();
    assert_eq!(empty, IngestError::NoValidData(UploadDomain::Product));

    let down = ingestor
        .ingest(csv_upload(UploadDomain::Product, "x\n1\n"))
        .await
        .unwrap_err();
    assert!(matches!(down, IngestError::Oracle(OracleError::Unavailable(_))));

    let shape = ingestor
        .ingest(csv_upload(UploadDomain::Product, "x\n1\n"))
        .await
        .unwrap_err();
    assert!(matches!(shape, IngestError::Oracle(OracleError::MalformedResponse(_))));

    let invalid = ingestor
        .ingest(csv_upload(UploadDomain::Product, "x\n1\n"))
        .await
        .unwrap_err();
    assert!(matches!(
        invalid,
        IngestError::Oracle(OracleError::InvalidRecord { index: 0, .. })
    ));

    let bad_json = ingestor
        .ingest(Upload::new(UploadDomain::Product, "p.json", b"{\"a\": 1}".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(bad_json, IngestError::Parse(ParseError::InvalidShape(_))));

    let s = session.lock().await;
    let after = s.snapshot();
    assert_eq!(after.telemetry, baseline.telemetry);
    assert_eq!(after.first_ingestion_date, baseline.first_ingestion_date);
    assert_eq!(s.dataset(UploadDomain::Product).unwrap().keys(), vec!["W1"]);
    assert!(s.last_error().unwrap().starts_with("invalid JSON shape"));
    assert_eq!(oracle.calls(), 5);
}

#[tokio::test]
async fn first_ingestion_date_is_set_once() {
    let oracle = ScriptedOracle::new(vec![
        Err(OracleError::Unavailable("down".into())),
        Ok(json!([{"name": "Fit", "value": 1}])),
        Ok(json!([{"month": "1월", "target": 1, "actual": 1}])),
    ]);
    let session = SessionState::shared();
    let normalizer = Normalizer::new(oracle, 50);

    let early = Ingestor::new(session.clone(), normalizer.clone()).with_clock(first_day);
    early
        .ingest(csv_upload(UploadDomain::Review, "x\n1\n"))
        .await
        .unwrap_err();
    assert_eq!(session.lock().await.meta().first_ingestion_date, None);

    early
        .ingest(csv_upload(UploadDomain::Review, "x\n1\n"))
        .await
        .unwrap();

    let later = Ingestor::new(session.clone(), normalizer)
        .with_clock(|| NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    later
        .ingest(csv_upload(UploadDomain::Sales, "x\n1\n"))
        .await
        .unwrap();

    let snapshot = session.lock().await.snapshot();
    assert_eq!(snapshot.first_ingestion_date, Some(first_day()));
    assert_eq!(
        serde_json::to_value(&snapshot).unwrap()["first_ingestion_date"],
        "2025-04-01"
    );
}

#[tokio::test]
async fn unsupported_format_skips_oracle() {
    let oracle = ScriptedOracle::new(vec![]);
    let (ingestor, session) = pipeline(oracle.clone());
    let err = ingestor
        .ingest(Upload::new(UploadDomain::Sales, "data.txt", b"month,target\n".to_vec()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "unsupported_format");
    assert_eq!(oracle.calls(), 0);
    assert!(session.lock().await.last_error().is_some());
}

#[tokio::test]
async fn long_file_is_extrapolated_past_the_sample() {
    let mut csv = String::from("Week,Sold Qty,Stock\n");
    for i in 1..=120 {
        csv.push_str(&format!("W{:03},\"{},000\",{}\n", i, i, i * 2));
    }
    let (ingestor, session) = pipeline(Arc::new(RulesOracle));

    let outcome = ingestor
        .ingest(csv_upload(UploadDomain::Product, &csv))
        .await
        .unwrap();
    assert_eq!(outcome.parsed_rows, 120);
    assert_eq!(outcome.sampled, 50);
    assert_eq!(outcome.extrapolated, 70);
    assert_eq!(outcome.dropped, 0);

    let s = session.lock().await;
    let products = s.dataset(UploadDomain::Product).unwrap().as_product().unwrap();
    assert_eq!(products.len(), 120);
    let last = products.iter().find(|p| p.week == "W120").unwrap();
    assert_eq!(last.sales, 120_000.0);
    assert_eq!(last.inventory, 240.0);
}
