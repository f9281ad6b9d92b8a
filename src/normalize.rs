//! Schema normalizer: raw rows in, validated domain records out.
//!
//! Only a bounded prefix of the raw rows (the sample) goes to the oracle.
//! When the input is longer than the sample, the normalizer tries to recover
//! the column mapping the oracle applied by lining its output up with the
//! sample row by row, then applies that mapping locally to the remaining
//! rows. If no complete mapping can be recovered the tail is dropped and a
//! warning is logged.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::OracleError;
use crate::models::{Dataset, RawRecord, UploadDomain};
use crate::oracle::{strip_code_fences, NormalizeRequest, Oracle};
use crate::schema::{self, clean_number, clean_text, normalize_header, FieldKind, FieldSpec};

/// Oracle client that turns raw rows into a typed [`Dataset`].
#[derive(Clone)]
pub struct Normalizer {
    oracle: Arc<dyn Oracle>,
    sample_limit: usize,
}

/// What [`Normalizer::normalize`] did besides producing records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizeStats {
    pub sampled: usize,
    /// Rows beyond the sample converted with the inferred mapping.
    pub extrapolated: usize,
    /// Rows beyond the sample that were not converted.
    pub dropped: usize,
}

impl Normalizer {
    pub fn new(oracle: Arc<dyn Oracle>, sample_limit: usize) -> Self {
        Self {
            oracle,
            sample_limit: sample_limit.max(1),
        }
    }

    pub fn oracle(&self) -> &Arc<dyn Oracle> {
        &self.oracle
    }

    pub async fn normalize(
        &self,
        records: &[RawRecord],
        domain: UploadDomain,
    ) -> Result<Dataset, OracleError> {
        self.normalize_with_stats(records, domain)
            .await
            .map(|(dataset, _)| dataset)
    }

    /// One oracle call, no retry. An empty result is returned as an empty
    /// dataset; the caller decides whether that is an error.
    pub async fn normalize_with_stats(
        &self,
        records: &[RawRecord],
        domain: UploadDomain,
    ) -> Result<(Dataset, NormalizeStats), OracleError> {
        let split = records.len().min(self.sample_limit);
        let (sample, tail) = records.split_at(split);

        let request = NormalizeRequest::new(domain, sample.to_vec());
        let text = self.oracle.normalize(&request).await?;
        let values = parse_array(&text)?;

        let mut stats = NormalizeStats {
            sampled: sample.len(),
            ..NormalizeStats::default()
        };

        let mut extra = Vec::new();
        if !tail.is_empty() {
            match ColumnMapping::infer(domain, sample, &values) {
                Some(mapping) => {
                    let (converted, skipped) = mapping.apply(tail);
                    stats.extrapolated = converted.len();
                    stats.dropped = skipped;
                    extra = converted;
                    if skipped > 0 {
                        tracing::warn!(
                            domain = %domain,
                            skipped,
                            "rows beyond the sample did not fit the inferred mapping"
                        );
                    }
                }
                None => {
                    stats.dropped = tail.len();
                    tracing::warn!(
                        domain = %domain,
                        dropped = tail.len(),
                        sample_limit = self.sample_limit,
                        "could not infer a column mapping from the oracle output; rows beyond the sample were dropped"
                    );
                }
            }
        }

        let mut dataset = schema::parse_records(domain, values)?;
        if !extra.is_empty() {
            let tail_dataset = schema::parse_records(domain, extra)?;
            dataset.extend(tail_dataset);
        }
        Ok((dataset, stats))
    }
}

/// Parse oracle text as a JSON array, tolerating a Markdown code fence.
fn parse_array(text: &str) -> Result<Vec<Value>, OracleError> {
    let body = strip_code_fences(text);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|e| OracleError::MalformedResponse(format!("not valid JSON: {}", e)))?;
    match value {
        Value::Array(items) => Ok(items),
        other => Err(OracleError::MalformedResponse(format!(
            "expected a JSON array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Which raw column feeds each target field.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    domain: UploadDomain,
    columns: Vec<(&'static FieldSpec, String)>,
}

impl ColumnMapping {
    /// Map fields to columns by header name, using each field's synonyms.
    /// Exact matches win over substring matches; a column is used at most once.
    pub fn from_headers(domain: UploadDomain, rows: &[RawRecord]) -> Self {
        let mut headers: Vec<&String> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !headers.contains(&key) {
                    headers.push(key);
                }
            }
        }
        let folded: Vec<(String, &String)> =
            headers.iter().map(|h| (normalize_header(h), *h)).collect();

        let mut columns: Vec<(&'static FieldSpec, String)> = Vec::new();
        let mut taken: Vec<&String> = Vec::new();
        for spec in schema::fields(domain) {
            let exact = folded.iter().find(|(h, raw)| {
                !taken.contains(raw)
                    && (*h == normalize_header(spec.name) || spec.synonyms.contains(&h.as_str()))
            });
            let partial = || {
                folded.iter().find(|(h, raw)| {
                    !taken.contains(raw)
                        && spec
                            .synonyms
                            .iter()
                            .any(|s| s.chars().count() >= 2 && h.contains(s))
                })
            };
            if let Some((_, raw)) = exact.or_else(partial) {
                taken.push(*raw);
                columns.push((spec, (*raw).clone()));
            }
        }
        Self { domain, columns }
    }

    /// Recover the mapping the oracle applied to `sample`, given its output.
    ///
    /// Requires one output object per sample row. A field maps to a column
    /// when the column's cleaned value equals the output value on every row.
    /// Returns `None` unless every required field is mapped.
    pub fn infer(domain: UploadDomain, sample: &[RawRecord], output: &[Value]) -> Option<Self> {
        if sample.is_empty() || sample.len() != output.len() {
            return None;
        }
        let objects: Vec<&Map<String, Value>> =
            output.iter().map(|v| v.as_object()).collect::<Option<Vec<_>>>()?;

        let mut candidates: Vec<&String> = Vec::new();
        for key in sample.iter().flat_map(|row| row.keys()) {
            if !candidates.contains(&key) {
                candidates.push(key);
            }
        }

        let mut columns = Vec::new();
        let mut taken: Vec<&String> = Vec::new();
        for spec in schema::fields(domain) {
            let matching: Vec<&String> = candidates
                .iter()
                .copied()
                .filter(|column| !taken.contains(column))
                .filter(|column| {
                    sample.iter().zip(&objects).all(|(row, out)| {
                        let expected = out.get(spec.name);
                        let raw = row.get(column.as_str());
                        match (expected, raw) {
                            (None | Some(Value::Null), None | Some(Value::Null)) => !spec.required,
                            (Some(expected), Some(raw)) => cell_matches(spec.kind, raw, expected),
                            _ => false,
                        }
                    })
                })
                .collect();
            // Ties (identical values in the sample) go to the column whose header names the field.
            let found = matching
                .iter()
                .find(|column| header_names(spec, column))
                .or_else(|| matching.first())
                .copied();
            match found {
                Some(column) => {
                    taken.push(column);
                    columns.push((spec, column.clone()));
                }
                None if spec.required => return None,
                None => {}
            }
        }
        Some(Self { domain, columns })
    }

    pub fn domain(&self) -> UploadDomain {
        self.domain
    }

    /// Column feeding `field`, if mapped.
    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(spec, _)| spec.name == field)
            .map(|(_, column)| column.as_str())
    }

    pub fn is_complete(&self) -> bool {
        schema::fields(self.domain)
            .iter()
            .filter(|f| f.required)
            .all(|f| self.column_for(f.name).is_some())
    }

    /// Convert one raw row. `None` when a required field is missing or does
    /// not coerce.
    pub fn apply_row(&self, row: &RawRecord) -> Option<Value> {
        let mut out = Map::new();
        for (spec, column) in &self.columns {
            let cell = row.get(column.as_str()).unwrap_or(&Value::Null);
            let value = match spec.kind {
                FieldKind::Text => clean_text(cell).map(Value::String),
                FieldKind::Number => clean_number(cell)
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number),
            };
            match value {
                Some(v) => {
                    out.insert(spec.name.to_string(), v);
                }
                None if spec.required => return None,
                None => {}
            }
        }
        if out.is_empty() {
            return None;
        }
        Some(Value::Object(out))
    }

    /// Convert rows, returning the converted objects and the skipped count.
    pub fn apply(&self, rows: &[RawRecord]) -> (Vec<Value>, usize) {
        let mut converted = Vec::with_capacity(rows.len());
        let mut skipped = 0;
        for row in rows {
            match self.apply_row(row) {
                Some(value) => converted.push(value),
                None => skipped += 1,
            }
        }
        (converted, skipped)
    }
}

fn header_names(spec: &FieldSpec, header: &str) -> bool {
    let folded = normalize_header(header);
    folded == normalize_header(spec.name) || spec.synonyms.contains(&folded.as_str())
}

fn cell_matches(kind: FieldKind, raw: &Value, expected: &Value) -> bool {
    match kind {
        FieldKind::Number => match (clean_number(raw), expected.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() <= 1e-9 * a.abs().max(1.0),
            _ => false,
        },
        FieldKind::Text => match (clean_text(raw), expected.as_str()) {
            (Some(a), Some(b)) => a == b.trim(),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::AnalysisRequest;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies with fixed text and remembers the sample sizes it was sent.
    struct Canned {
        reply: Result<String, OracleError>,
        seen: Mutex<Vec<usize>>,
    }

    impl Canned {
        fn new(reply: Result<&str, OracleError>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Oracle for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn normalize(&self, request: &NormalizeRequest) -> Result<String, OracleError> {
            self.seen.lock().unwrap().push(request.sample.len());
            self.reply.clone()
        }
        async fn analyze_view(&self, _request: &AnalysisRequest) -> Result<String, OracleError> {
            Ok(String::new())
        }
    }

    fn row(pairs: &[(&str, Value)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn sales_rows(n: usize) -> Vec<RawRecord> {
        (1..=n)
            .map(|i| {
                row(&[
                    ("기간", json!(format!("M{:03}", i))),
                    ("목표(원)", json!(format!("{},000", i))),
                    ("실적", json!(i * 900)),
                ])
            })
            .collect()
    }

    fn sales_reply(rows: &[RawRecord]) -> String {
        let out: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "month": r["기간"],
                    "target": clean_number(&r["목표(원)"]).unwrap(),
                    "actual": r["실적"],
                })
            })
            .collect();
        serde_json::to_string(&out).unwrap()
    }

    #[tokio::test]
    async fn accepts_fenced_json_array() {
        let oracle = Canned::new(Ok("```json\n[{\"name\":\"Price\",\"value\":3}]\n```"));
        let normalizer = Normalizer::new(oracle, 50);
        let ds = normalizer
            .normalize(&[row(&[("k", json!("Price"))])], UploadDomain::Review)
            .await
            .unwrap();
        assert_eq!(ds.keys(), vec!["Price"]);
    }

    #[tokio::test]
    async fn non_json_text_is_malformed() {
        let normalizer = Normalizer::new(Canned::new(Ok("Sorry, I cannot help")), 50);
        let err = normalizer
            .normalize(&[row(&[("a", json!(1))])], UploadDomain::Sales)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn object_instead_of_array_is_malformed() {
        let normalizer = Normalizer::new(Canned::new(Ok("{\"month\":\"1월\"}")), 50);
        let err = normalizer
            .normalize(&[row(&[("a", json!(1))])], UploadDomain::Sales)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn empty_array_is_an_empty_dataset() {
        let normalizer = Normalizer::new(Canned::new(Ok("[]")), 50);
        let ds = normalizer
            .normalize(&[row(&[("a", json!(1))])], UploadDomain::Product)
            .await
            .unwrap();
        assert!(ds.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_passes_through() {
        let normalizer = Normalizer::new(
            Canned::new(Err(OracleError::Unavailable("connection refused".into()))),
            50,
        );
        let err = normalizer
            .normalize(&[row(&[("a", json!(1))])], UploadDomain::Sales)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }

    #[tokio::test]
    async fn sample_is_capped_and_tail_extrapolated() {
        let rows = sales_rows(60);
        let oracle = Canned::new(Ok(&sales_reply(&rows[..50])));
        let normalizer = Normalizer::new(oracle.clone(), 50);

        let (ds, stats) = normalizer
            .normalize_with_stats(&rows, UploadDomain::Sales)
            .await
            .unwrap();

        assert_eq!(*oracle.seen.lock().unwrap(), vec![50]);
        assert_eq!(ds.len(), 60);
        assert_eq!(
            stats,
            NormalizeStats {
                sampled: 50,
                extrapolated: 10,
                dropped: 0
            }
        );
        let last = &ds.as_sales().unwrap()[59];
        assert_eq!(last.month, "M060");
        assert_eq!(last.target, 60_000.0);
        assert_eq!(last.actual, 54_000.0);
    }

    #[tokio::test]
    async fn tail_dropped_when_mapping_cannot_be_inferred() {
        let rows = sales_rows(55);
        // One record for fifty sample rows: counts do not line up.
        let oracle = Canned::new(Ok("[{\"month\":\"total\",\"target\":1,\"actual\":2}]"));
        let normalizer = Normalizer::new(oracle, 50);

        let (ds, stats) = normalizer
            .normalize_with_stats(&rows, UploadDomain::Sales)
            .await
            .unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(stats.dropped, 5);
        assert_eq!(stats.extrapolated, 0);
    }

    #[test]
    fn from_headers_uses_synonyms() {
        let rows = vec![row(&[
            ("Week", json!("W1")),
            ("판매량", json!(10)),
            ("재고 수량", json!(4)),
        ])];
        let mapping = ColumnMapping::from_headers(UploadDomain::Product, &rows);
        assert!(mapping.is_complete());
        assert_eq!(mapping.column_for("week"), Some("Week"));
        assert_eq!(mapping.column_for("inventory"), Some("재고 수량"));
        assert_eq!(
            mapping.apply_row(&rows[0]),
            Some(json!({"week": "W1", "sales": 10.0, "inventory": 4.0}))
        );
    }

    #[test]
    fn apply_skips_rows_missing_required_values() {
        let rows = vec![
            row(&[("name", json!("Fit")), ("count", json!("12"))]),
            row(&[("name", json!("Color")), ("count", json!("n/a"))]),
        ];
        let mapping = ColumnMapping::from_headers(UploadDomain::Review, &rows);
        let (converted, skipped) = mapping.apply(&rows);
        assert_eq!(converted, vec![json!({"name": "Fit", "value": 12.0})]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn infer_never_maps_one_column_to_two_fields() {
        let sample: Vec<RawRecord> = (1..=3)
            .map(|i| {
                row(&[
                    ("월", json!(format!("{}월", i))),
                    ("실적", json!(100)),
                    ("목표", json!(100)),
                ])
            })
            .collect();
        let output: Vec<Value> = (1..=3)
            .map(|i| json!({"month": format!("{}월", i), "target": 100, "actual": 100}))
            .collect();
        let mapping = ColumnMapping::infer(UploadDomain::Sales, &sample, &output).unwrap();
        assert_eq!(mapping.column_for("target"), Some("목표"));
        assert_eq!(mapping.column_for("actual"), Some("실적"));

        let single: Vec<RawRecord> = (1..=3)
            .map(|i| row(&[("월", json!(format!("{}월", i))), ("금액", json!(100))]))
            .collect();
        assert!(ColumnMapping::infer(UploadDomain::Sales, &single, &output).is_none());
    }

    #[test]
    fn infer_leaves_optional_field_unmapped() {
        let sample = vec![row(&[
            ("항목", json!("Price")),
            ("당사", json!("80")),
            ("A사", json!(70)),
        ])];
        let output = vec![json!({"subject": "Price", "ownBrandScore": 80, "competitorAScore": 70})];
        let mapping = ColumnMapping::infer(UploadDomain::Competitor, &sample, &output).unwrap();
        assert_eq!(mapping.column_for("ownBrandScore"), Some("당사"));
        assert_eq!(mapping.column_for("competitorBScore"), None);
    }
}
