//! Return data access port trait.

use crate::domain::error::PortoptError;
use crate::domain::returns::ReturnRecord;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// First date, last date and observation count of one asset.
pub type DataRange = (NaiveDate, NaiveDate, usize);

pub trait ReturnSource {
    /// Long-format daily returns, optionally limited to `[start, end]`.
    fn fetch_returns(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<ReturnRecord>, PortoptError>;

    fn list_assets(&self) -> Result<Vec<String>, PortoptError>;

    /// Ranges of every asset, gathered in one pass over the source.
    fn data_ranges(&self) -> Result<BTreeMap<String, DataRange>, PortoptError>;

    fn get_data_range(&self, asset: &str) -> Result<Option<DataRange>, PortoptError> {
        Ok(self.data_ranges()?.remove(asset))
    }
}

/// Fold records into per-asset ranges.
pub fn collect_ranges<'a>(
    records: impl IntoIterator<Item = &'a ReturnRecord>,
) -> BTreeMap<String, DataRange> {
    let mut ranges: BTreeMap<String, DataRange> = BTreeMap::new();
    for r in records {
        ranges
            .entry(r.asset.clone())
            .and_modify(|(min, max, count)| {
                *min = (*min).min(r.date);
                *max = (*max).max(r.date);
                *count += 1;
            })
            .or_insert((r.date, r.date, 1));
    }
    ranges
}
