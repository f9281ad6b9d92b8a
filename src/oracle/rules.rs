//! Deterministic offline oracle.
//!
//! Normalization maps columns by header synonyms (see [`ColumnMapping::from_headers`]);
//! analysis is a computed summary of the dataset. Useful without network
//! access and as a predictable stand-in during development.

use async_trait::async_trait;
use serde_json::Value;

use super::{AnalysisRequest, NormalizeRequest, Oracle};
use crate::error::OracleError;
use crate::models::Dataset;
use crate::normalize::ColumnMapping;
use crate::schema;

pub struct RulesOracle;

#[async_trait]
impl Oracle for RulesOracle {
    fn name(&self) -> &str {
        "rules"
    }

    async fn normalize(&self, request: &NormalizeRequest) -> Result<String, OracleError> {
        let mapping = ColumnMapping::from_headers(request.domain, &request.sample);
        if !mapping.is_complete() {
            return Ok("[]".to_string());
        }
        let (records, _) = mapping.apply(&request.sample);
        serde_json::to_string(&records).map_err(|e| OracleError::MalformedResponse(e.to_string()))
    }

    async fn analyze_view(&self, request: &AnalysisRequest) -> Result<String, OracleError> {
        let values = match &request.data {
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        };
        let dataset = schema::parse_records(request.domain, values)?;
        Ok(summarize(&dataset))
    }
}

fn summarize(dataset: &Dataset) -> String {
    if dataset.is_empty() {
        return String::new();
    }
    let mut lines = Vec::new();
    match dataset {
        Dataset::Sales(records) => {
            let target: f64 = records.iter().map(|r| r.target).sum();
            let actual: f64 = records.iter().map(|r| r.actual).sum();
            lines.push(format!(
                "- Total actual {} against target {}",
                amount(actual),
                amount(target)
            ));
            if target > 0.0 {
                lines.push(format!("- Attainment {:.1}%", actual / target * 100.0));
            }
            if let Some(best) = records.iter().max_by(|a, b| a.actual.total_cmp(&b.actual)) {
                lines.push(format!("- Best period: {} ({})", best.month, amount(best.actual)));
            }
            let missed = records.iter().filter(|r| r.actual < r.target).count();
            lines.push(format!("- {} of {} periods below target", missed, records.len()));
        }
        Dataset::Competitor(records) => {
            let ahead: Vec<&str> = records
                .iter()
                .filter(|r| r.own_brand_score > r.competitor_a_score)
                .map(|r| r.subject.as_str())
                .collect();
            lines.push(format!(
                "- Ahead of competitor A on {} of {} subjects",
                ahead.len(),
                records.len()
            ));
            if let Some(gap) = records.iter().min_by(|a, b| {
                (a.own_brand_score - a.competitor_a_score)
                    .total_cmp(&(b.own_brand_score - b.competitor_a_score))
            }) {
                lines.push(format!(
                    "- Weakest subject: {} ({} vs {})",
                    gap.subject,
                    amount(gap.own_brand_score),
                    amount(gap.competitor_a_score)
                ));
            }
        }
        Dataset::Product(records) => {
            let sold: f64 = records.iter().map(|r| r.sales).sum();
            let stock: f64 = records.iter().map(|r| r.inventory).sum();
            lines.push(format!(
                "- Sold {} with {} in inventory",
                amount(sold),
                amount(stock)
            ));
            if let Some(best) = records.iter().max_by(|a, b| a.sales.total_cmp(&b.sales)) {
                lines.push(format!("- Best seller: {} ({})", best.week, amount(best.sales)));
            }
            if let Some(slow) = records
                .iter()
                .filter(|r| r.sales > 0.0)
                .max_by(|a, b| (a.inventory / a.sales).total_cmp(&(b.inventory / b.sales)))
            {
                lines.push(format!(
                    "- Slowest mover: {} ({:.1} weeks of cover)",
                    slow.week,
                    slow.inventory / slow.sales
                ));
            }
        }
        Dataset::Review(records) => {
            let total: f64 = records.iter().map(|r| r.value).sum();
            lines.push(format!("- {} mentions across {} topics", amount(total), records.len()));
            let mut ranked: Vec<_> = records.iter().collect();
            ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
            let top: Vec<String> = ranked
                .iter()
                .take(3)
                .map(|r| format!("{} ({})", r.name, amount(r.value)))
                .collect();
            lines.push(format!("- Top topics: {}", top.join(", ")));
        }
    }
    lines.join("\n")
}

/// Whole numbers with thousands separators, otherwise one decimal.
fn amount(value: f64) -> String {
    if value.fract() != 0.0 {
        return format!("{:.1}", value);
    }
    let digits = format!("{}", value.abs() as u64);
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0.0 {
        format!("-{}", out)
    } else {
        out
    }
}
