//! Holdings JSON to flat columns

use crate::types::HoldingsData;
use std::collections::BTreeMap;

/// Holdings counts as `{key}_{symbol}` columns, e.g. `totalHoldingCount_QGE`
pub fn flatten_holdings(data: &HoldingsData) -> BTreeMap<String, String> {
    let mut columns = BTreeMap::new();
    for h in &data.holdings {
        let symbol = &h.institution_symbol;
        columns.insert(
            format!("totalHoldingCount_{}", symbol),
            h.total_holding_count.to_string(),
        );
        columns.insert(
            format!("totalSharedPrintCount_{}", symbol),
            h.total_shared_print_count.to_string(),
        );
        columns.insert(
            format!("totalEditions_{}", symbol),
            h.total_editions.to_string(),
        );
    }
    columns
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstitutionHoldings;

    #[test]
    fn every_count_gets_a_column_per_symbol() {
        let data = HoldingsData {
            ocn: "1".into(),
            holdings: ["QGE", "WURST"]
                .iter()
                .map(|s| InstitutionHoldings {
                    institution_symbol: s.to_string(),
                    total_holding_count: 5,
                    total_shared_print_count: 1,
                    total_editions: 9,
                })
                .collect(),
        };
        let columns = flatten_holdings(&data);

        assert_eq!(columns.len(), 6);
        assert_eq!(columns["totalHoldingCount_QGE"], "5");
        assert_eq!(columns["totalSharedPrintCount_WURST"], "1");
        assert_eq!(columns["totalEditions_WURST"], "9");
    }

    #[test]
    fn no_holdings_no_columns() {
        let data = HoldingsData {
            ocn: "1".into(),
            holdings: Vec::new(),
        };
        assert!(flatten_holdings(&data).is_empty());
    }
}
