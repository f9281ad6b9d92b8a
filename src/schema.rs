//! Target schemas per upload domain and validation of oracle output.
//!
//! The oracle is asked to map arbitrary spreadsheet columns onto one of four
//! fixed record shapes. Nothing it returns is trusted: [`parse_records`]
//! checks field presence, non-empty keys and numeric types before anything
//! reaches the merge engine. Numbers must arrive as JSON numbers; a string
//! such as `"1,200"` surviving normalization is a validation failure, not
//! something to coerce here.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::OracleError;
use crate::models::{
    CompetitorRecord, Dataset, Keyed, ProductRecord, ReviewRecord, SalesRecord, UploadDomain,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
}

/// One field of a target record shape.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Meaning given to the oracle, with examples.
    pub description: &'static str,
    /// Header spellings the rule-based mapper recognizes (lowercase, no spaces).
    pub synonyms: &'static [&'static str],
}

const SALES_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "month",
        kind: FieldKind::Text,
        required: true,
        description: "string (e.g., '1월' or '2025-01')",
        synonyms: &["month", "월", "기간", "날짜", "년월", "date", "period", "yearmonth"],
    },
    FieldSpec {
        name: "target",
        kind: FieldKind::Number,
        required: true,
        description: "number (amount)",
        synonyms: &["target", "목표", "목표매출", "goal", "plan", "계획", "budget"],
    },
    FieldSpec {
        name: "actual",
        kind: FieldKind::Number,
        required: true,
        description: "number (amount)",
        synonyms: &["actual", "실적", "매출", "실매출", "revenue", "sales", "amount", "result"],
    },
];

const COMPETITOR_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "subject",
        kind: FieldKind::Text,
        required: true,
        description: "string (category name)",
        synonyms: &["subject", "category", "항목", "카테고리", "지표", "구분", "metric"],
    },
    FieldSpec {
        name: "ownBrandScore",
        kind: FieldKind::Number,
        required: true,
        description: "number (our brand's score or amount)",
        synonyms: &["ownbrandscore", "ownbrand", "fnf", "f&f", "당사", "자사", "our", "brand"],
    },
    FieldSpec {
        name: "competitorAScore",
        kind: FieldKind::Number,
        required: true,
        description: "number (competitor A score or amount)",
        synonyms: &["competitorascore", "competitora", "compa", "경쟁사a", "a사"],
    },
    FieldSpec {
        name: "competitorBScore",
        kind: FieldKind::Number,
        required: false,
        description: "number (competitor B score or amount, optional)",
        synonyms: &["competitorbscore", "competitorb", "compb", "경쟁사b", "b사"],
    },
];

const PRODUCT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "week",
        kind: FieldKind::Text,
        required: true,
        description: "string (e.g., 'W1', '1주차')",
        synonyms: &["week", "주차", "주", "wk", "period"],
    },
    FieldSpec {
        name: "sales",
        kind: FieldKind::Number,
        required: true,
        description: "number (quantity)",
        synonyms: &["sales", "판매량", "판매", "sold", "qty", "quantity"],
    },
    FieldSpec {
        name: "inventory",
        kind: FieldKind::Number,
        required: true,
        description: "number (quantity)",
        synonyms: &["inventory", "재고", "재고량", "stock", "onhand"],
    },
];

const REVIEW_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "name",
        kind: FieldKind::Text,
        required: true,
        description: "string (category or sentiment)",
        synonyms: &["name", "키워드", "항목", "분류", "감정", "keyword", "category", "sentiment"],
    },
    FieldSpec {
        name: "value",
        kind: FieldKind::Number,
        required: true,
        description: "number (count)",
        synonyms: &["value", "건수", "횟수", "빈도", "count", "cnt", "mentions"],
    },
];

/// Field specs of a domain's target record, key field first.
pub fn fields(domain: UploadDomain) -> &'static [FieldSpec] {
    match domain {
        UploadDomain::Sales => SALES_FIELDS,
        UploadDomain::Competitor => COMPETITOR_FIELDS,
        UploadDomain::Product => PRODUCT_FIELDS,
        UploadDomain::Review => REVIEW_FIELDS,
    }
}

/// The fixed target-schema text sent to the oracle for a domain.
pub fn describe(domain: UploadDomain) -> String {
    let body = fields(domain)
        .iter()
        .map(|f| format!("    \"{}\": \"{}\"", f.name, f.description))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("[\n  {{\n{}\n  }}\n]", body)
}

/// Validate oracle output and build a typed dataset.
///
/// An empty array yields an empty dataset; deciding what that means is the
/// orchestrator's job.
pub fn parse_records(domain: UploadDomain, values: Vec<Value>) -> Result<Dataset, OracleError> {
    Ok(match domain {
        UploadDomain::Sales => Dataset::Sales(typed::<SalesRecord>(values, |r| r.numbers())?),
        UploadDomain::Competitor => {
            Dataset::Competitor(typed::<CompetitorRecord>(values, |r| r.numbers())?)
        }
        UploadDomain::Product => {
            Dataset::Product(typed::<ProductRecord>(values, |r| r.numbers())?)
        }
        UploadDomain::Review => Dataset::Review(typed::<ReviewRecord>(values, |r| r.numbers())?),
    })
}

fn typed<T>(
    values: Vec<Value>,
    numbers: impl Fn(&T) -> Vec<(&'static str, f64)>,
) -> Result<Vec<T>, OracleError>
where
    T: DeserializeOwned + Keyed,
{
    let mut out = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        if !value.is_object() {
            return Err(OracleError::InvalidRecord {
                index,
                reason: "expected a JSON object".to_string(),
            });
        }
        let record: T = serde_json::from_value(value).map_err(|e| OracleError::InvalidRecord {
            index,
            reason: e.to_string(),
        })?;
        if record.key().trim().is_empty() {
            return Err(OracleError::InvalidRecord {
                index,
                reason: "key field is empty".to_string(),
            });
        }
        if let Some((field, _)) = numbers(&record).into_iter().find(|(_, v)| !v.is_finite()) {
            return Err(OracleError::InvalidRecord {
                index,
                reason: format!("field `{}` is not a finite number", field),
            });
        }
        out.push(record);
    }
    Ok(out)
}

/// Numeric reading of a raw cell: strips currency symbols, thousands
/// separators, units and whitespace. `"₩1,200,000"` → `1200000.0`.
pub fn clean_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            let negative = trimmed.starts_with('-')
                || (trimmed.starts_with('(') && trimmed.ends_with(')'));
            let digits: String = trimmed
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if digits.is_empty() || digits.chars().filter(|c| *c == '.').count() > 1 {
                return None;
            }
            let stripped_ok = trimmed.chars().all(|c| {
                c.is_ascii_digit()
                    || c.is_whitespace()
                    || matches!(c, '.' | ',' | '-' | '+' | '(' | ')' | '$' | '₩' | '€' | '£' | '¥' | '%')
                    || matches!(c, '원' | '개' | '건' | '점')
            });
            if !stripped_ok {
                return None;
            }
            let parsed: f64 = digits.parse().ok()?;
            Some(if negative { -parsed } else { parsed })
        }
        _ => None,
    }
}

/// Text reading of a raw cell. Whole numbers render without a fraction.
pub fn clean_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Lowercased header with whitespace, `_` and `-` removed.
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}
