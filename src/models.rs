//! Core data types used throughout the ingestion pipeline.
//!
//! Raw tabular rows come out of [`crate::parse`], typed records come out of
//! [`crate::normalize`], and [`Dataset`] is what the session keeps per domain.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One loosely-typed row: column label to scalar (string, number, bool or null).
pub type RawRecord = Map<String, Value>;

/// The four upload targets. Determines target schema, merge key and dataset slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadDomain {
    Sales,
    Competitor,
    Product,
    Review,
}

impl UploadDomain {
    pub const ALL: [UploadDomain; 4] = [
        UploadDomain::Sales,
        UploadDomain::Competitor,
        UploadDomain::Product,
        UploadDomain::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadDomain::Sales => "sales",
            UploadDomain::Competitor => "competitor",
            UploadDomain::Product => "product",
            UploadDomain::Review => "review",
        }
    }

    /// Name of the natural key field records of this domain are merged by.
    pub fn key_field(&self) -> &'static str {
        match self {
            UploadDomain::Sales => "month",
            UploadDomain::Competitor => "subject",
            UploadDomain::Product => "week",
            UploadDomain::Review => "name",
        }
    }

    /// Human-readable label used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            UploadDomain::Sales => "sales/target",
            UploadDomain::Competitor => "competitor",
            UploadDomain::Product => "product sales/inventory",
            UploadDomain::Review => "customer review",
        }
    }
}

impl fmt::Display for UploadDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sales" => Ok(UploadDomain::Sales),
            "competitor" => Ok(UploadDomain::Competitor),
            "product" => Ok(UploadDomain::Product),
            "review" | "customer" => Ok(UploadDomain::Review),
            other => Err(format!(
                "unknown domain '{}'. Must be sales, competitor, product or review.",
                other
            )),
        }
    }
}

/// A record that can be merged by a natural string key.
pub trait Keyed {
    fn key(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub month: String,
    pub target: f64,
    pub actual: f64,
}

/// Competitor scores per subject. The legacy column names `FnF`, `CompA`
/// and `CompB` are accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorRecord {
    pub subject: String,
    #[serde(alias = "FnF")]
    pub own_brand_score: f64,
    #[serde(alias = "CompA")]
    pub competitor_a_score: f64,
    #[serde(alias = "CompB", default, skip_serializing_if = "Option::is_none")]
    pub competitor_b_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub week: String,
    pub sales: f64,
    pub inventory: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub name: String,
    pub value: f64,
}

impl Keyed for SalesRecord {
    fn key(&self) -> &str {
        &self.month
    }
}

impl Keyed for CompetitorRecord {
    fn key(&self) -> &str {
        &self.subject
    }
}

impl Keyed for ProductRecord {
    fn key(&self) -> &str {
        &self.week
    }
}

impl Keyed for ReviewRecord {
    fn key(&self) -> &str {
        &self.name
    }
}

impl SalesRecord {
    pub fn numbers(&self) -> Vec<(&'static str, f64)> {
        vec![("target", self.target), ("actual", self.actual)]
    }
}

impl CompetitorRecord {
    pub fn numbers(&self) -> Vec<(&'static str, f64)> {
        let mut out = vec![
            ("ownBrandScore", self.own_brand_score),
            ("competitorAScore", self.competitor_a_score),
        ];
        if let Some(b) = self.competitor_b_score {
            out.push(("competitorBScore", b));
        }
        out
    }
}

impl ProductRecord {
    pub fn numbers(&self) -> Vec<(&'static str, f64)> {
        vec![("sales", self.sales), ("inventory", self.inventory)]
    }
}

impl ReviewRecord {
    pub fn numbers(&self) -> Vec<(&'static str, f64)> {
        vec![("value", self.value)]
    }
}

/// An ordered collection of normalized records for one domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "domain", content = "records", rename_all = "lowercase")]
pub enum Dataset {
    Sales(Vec<SalesRecord>),
    Competitor(Vec<CompetitorRecord>),
    Product(Vec<ProductRecord>),
    Review(Vec<ReviewRecord>),
}

impl Dataset {
    pub fn domain(&self) -> UploadDomain {
        match self {
            Dataset::Sales(_) => UploadDomain::Sales,
            Dataset::Competitor(_) => UploadDomain::Competitor,
            Dataset::Product(_) => UploadDomain::Product,
            Dataset::Review(_) => UploadDomain::Review,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Dataset::Sales(r) => r.len(),
            Dataset::Competitor(r) => r.len(),
            Dataset::Product(r) => r.len(),
            Dataset::Review(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in dataset order.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Dataset::Sales(r) => r.iter().map(|x| x.key()).collect(),
            Dataset::Competitor(r) => r.iter().map(|x| x.key()).collect(),
            Dataset::Product(r) => r.iter().map(|x| x.key()).collect(),
            Dataset::Review(r) => r.iter().map(|x| x.key()).collect(),
        }
    }

    /// Appends records of the same domain. Records of another domain are ignored.
    pub fn extend(&mut self, other: Dataset) {
        match (self, other) {
            (Dataset::Sales(a), Dataset::Sales(b)) => a.extend(b),
            (Dataset::Competitor(a), Dataset::Competitor(b)) => a.extend(b),
            (Dataset::Product(a), Dataset::Product(b)) => a.extend(b),
            (Dataset::Review(a), Dataset::Review(b)) => a.extend(b),
            _ => {}
        }
    }

    /// The records alone as a JSON array (what the oracle sees for analysis).
    pub fn records_json(&self) -> Value {
        let value = match self {
            Dataset::Sales(r) => serde_json::to_value(r),
            Dataset::Competitor(r) => serde_json::to_value(r),
            Dataset::Product(r) => serde_json::to_value(r),
            Dataset::Review(r) => serde_json::to_value(r),
        };
        value.unwrap_or(Value::Array(Vec::new()))
    }

    pub fn as_sales(&self) -> Option<&[SalesRecord]> {
        match self {
            Dataset::Sales(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_competitor(&self) -> Option<&[CompetitorRecord]> {
        match self {
            Dataset::Competitor(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_product(&self) -> Option<&[ProductRecord]> {
        match self {
            Dataset::Product(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_review(&self) -> Option<&[ReviewRecord]> {
        match self {
            Dataset::Review(r) => Some(r),
            _ => None,
        }
    }
}

/// Dashboard views. Only four of them are backed by a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewId {
    #[default]
    Flagship,
    Market,
    SalesReview,
    Category,
    Channel,
    Voc,
    Profit,
}

impl ViewId {
    pub const ALL: [ViewId; 7] = [
        ViewId::Flagship,
        ViewId::Market,
        ViewId::SalesReview,
        ViewId::Category,
        ViewId::Channel,
        ViewId::Voc,
        ViewId::Profit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewId::Flagship => "flagship",
            ViewId::Market => "market",
            ViewId::SalesReview => "sales_review",
            ViewId::Category => "category",
            ViewId::Channel => "channel",
            ViewId::Voc => "voc",
            ViewId::Profit => "profit",
        }
    }

    /// The dataset this view renders and analyzes, if any.
    pub fn backing_domain(&self) -> Option<UploadDomain> {
        match self {
            ViewId::Flagship => Some(UploadDomain::Sales),
            ViewId::Market => Some(UploadDomain::Competitor),
            ViewId::Category => Some(UploadDomain::Product),
            ViewId::Voc => Some(UploadDomain::Review),
            ViewId::SalesReview | ViewId::Channel | ViewId::Profit => None,
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ViewId::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| format!("unknown view '{}'", s))
    }
}
