use crate::models::{
    MonthlyAmountBreakdown, MonthlyMembership, MonthlyProgramBreakdown, MonthlyRevenue,
};
use std::collections::BTreeMap;

/// A monthly series entry that can be zero-filled for months missing from
/// the source data.
pub trait MonthSlot {
    fn month(&self) -> &str;
    fn empty(month: String) -> Self;
}

impl MonthSlot for MonthlyRevenue {
    fn month(&self) -> &str {
        &self.month
    }

    fn empty(month: String) -> Self {
        Self {
            month,
            revenue: 0.0,
            count: 0,
        }
    }
}

impl MonthSlot for MonthlyAmountBreakdown {
    fn month(&self) -> &str {
        &self.month
    }

    fn empty(month: String) -> Self {
        Self {
            month,
            amounts: BTreeMap::new(),
            total: 0.0,
        }
    }
}

impl MonthSlot for MonthlyMembership {
    fn month(&self) -> &str {
        &self.month
    }

    fn empty(month: String) -> Self {
        Self {
            month,
            membership_count: 0,
            new_memberships: 0,
            canceled_memberships: 0,
        }
    }
}

impl MonthSlot for MonthlyProgramBreakdown {
    fn month(&self) -> &str {
        &self.month
    }

    fn empty(month: String) -> Self {
        Self {
            month,
            programs: BTreeMap::new(),
            total: 0,
        }
    }
}

/// Parses a "YYYY-MM" key. Used both for validation at the API boundary and
/// for walking ranges.
pub fn parse_month(raw: &str) -> Option<(i32, u32)> {
    let (year, month) = raw.split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((year, month))
}

/// Every month key from `start` to `end` inclusive; empty when the range is
/// inverted or either bound is malformed.
pub fn month_range(start: &str, end: &str) -> Vec<String> {
    let (Some((mut year, mut month)), Some((end_year, end_month))) =
        (parse_month(start), parse_month(end))
    else {
        return Vec::new();
    };

    let mut out = Vec::new();
    while year < end_year || (year == end_year && month <= end_month) {
        out.push(format!("{year:04}-{month:02}"));
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    out
}

/// Clips a sorted series to [start, end] and fills the months absent from
/// the data with zeroed entries, so the output has exactly one entry per
/// month of the range.
pub fn fill_range<T: MonthSlot + Clone>(data: &[T], start: &str, end: &str) -> Vec<T> {
    let by_month: BTreeMap<&str, &T> = data
        .iter()
        .filter(|d| d.month() >= start && d.month() <= end)
        .map(|d| (d.month(), d))
        .collect();

    month_range(start, end)
        .into_iter()
        .map(|month| match by_month.get(month.as_str()) {
            Some(existing) => (*existing).clone(),
            None => T::empty(month),
        })
        .collect()
}
