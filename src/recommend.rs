//! Next-upload suggestion for the active view.

use serde::Serialize;

use crate::models::{UploadDomain, ViewId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub domain: UploadDomain,
    pub title: &'static str,
    pub reason: &'static str,
}

/// Suggest the dataset that would most improve `view`, given which domains
/// already have data. `None` when nothing essential is missing.
pub fn recommend(view: ViewId, present: impl Fn(UploadDomain) -> bool) -> Option<Recommendation> {
    let pick = |domain, title, reason| Recommendation {
        domain,
        title,
        reason,
    };
    match view {
        ViewId::Flagship if !present(UploadDomain::Sales) => Some(pick(
            UploadDomain::Sales,
            "Sales data is required",
            "Target attainment and growth trends can only be analyzed with sales/target data.",
        )),
        ViewId::Flagship if !present(UploadDomain::Product) => Some(pick(
            UploadDomain::Product,
            "Add product data",
            "Sales swings can be traced to specific best and worst sellers and their inventory.",
        )),
        ViewId::Market if !present(UploadDomain::Competitor) => Some(pick(
            UploadDomain::Competitor,
            "Upload competitor data",
            "Shows where the brand is positioned in the market and the share gap to competitors.",
        )),
        ViewId::Market if !present(UploadDomain::Review) => Some(pick(
            UploadDomain::Review,
            "Add customer reviews",
            "Customer reviews explain why the brand's reputation trails its competitors.",
        )),
        ViewId::Category if !present(UploadDomain::Product) => Some(pick(
            UploadDomain::Product,
            "No product/inventory data yet",
            "Weekly sell-through and stock depletion predict which products will sell out.",
        )),
        ViewId::Category if !present(UploadDomain::Sales) => Some(pick(
            UploadDomain::Sales,
            "Connect overall sales data",
            "Measures how much each product contributes to the overall sales target.",
        )),
        ViewId::Voc if !present(UploadDomain::Review) => Some(pick(
            UploadDomain::Review,
            "Customer review data is required",
            "Text mining extracts customer sentiment and the main keywords.",
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flagship_asks_for_sales_then_product() {
        let none = |_: UploadDomain| false;
        assert_eq!(
            recommend(ViewId::Flagship, none).map(|r| r.domain),
            Some(UploadDomain::Sales)
        );
        let sales_only = |d: UploadDomain| d == UploadDomain::Sales;
        assert_eq!(
            recommend(ViewId::Flagship, sales_only).map(|r| r.domain),
            Some(UploadDomain::Product)
        );
        assert_eq!(recommend(ViewId::Flagship, |_| true), None);
    }

    #[test]
    fn market_and_category_fall_back_to_second_choice() {
        let has = |d: UploadDomain| d == UploadDomain::Competitor;
        assert_eq!(
            recommend(ViewId::Market, has).map(|r| r.domain),
            Some(UploadDomain::Review)
        );
        let has = |d: UploadDomain| d == UploadDomain::Product;
        assert_eq!(
            recommend(ViewId::Category, has).map(|r| r.domain),
            Some(UploadDomain::Sales)
        );
    }

    #[test]
    fn voc_only_needs_reviews_and_other_views_need_nothing() {
        assert_eq!(
            recommend(ViewId::Voc, |_| false).map(|r| r.domain),
            Some(UploadDomain::Review)
        );
        assert_eq!(recommend(ViewId::Voc, |d| d == UploadDomain::Review), None);
        assert_eq!(recommend(ViewId::Channel, |_| false), None);
        assert_eq!(recommend(ViewId::Profit, |_| false), None);
    }
}
