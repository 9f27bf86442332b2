use serde::Serialize;
use std::collections::BTreeMap;

/// One payment row from the payments export. Money fields are parsed with
/// `$`, `,` and quote characters already stripped.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub invoice_number: String,
    pub invoice_due_date: String,
    pub transaction_at: String,
    pub transaction_amount: f64,
    pub payment_amount: f64,
    pub currency: String,
    pub payer_home_location: String,
}

/// One membership row. The boolean flags come from optional "Yes"/blank
/// columns; when a column is missing from the export variant the loader
/// fills in a documented fallback instead.
#[derive(Debug, Clone)]
pub struct MemberRecord {
    pub client: String,
    pub plan_name: String,
    pub start_date: String,
    pub end_date: String,
    pub used_for_first_visit: bool,
    pub membership: bool,
    pub canceled: bool,
    pub client_first_plan: bool,
    pub client_first_membership: bool,
    pub client_home_location: String,
    pub client_id: String,
    pub plan_id: String,
}

/// Revenue total for one month ("YYYY-MM").
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    pub month: String,
    pub revenue: f64,
    pub count: u64,
}

/// Revenue for one month split by rounded-whole-dollar transaction size.
/// `total` always equals the sum of the `amounts` values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAmountBreakdown {
    pub month: String,
    pub amounts: BTreeMap<String, f64>,
    pub total: f64,
}

/// Cumulative active-membership snapshot for one month, plus the month-local
/// start/cancel tallies that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyMembership {
    pub month: String,
    pub membership_count: u64,
    pub new_memberships: u64,
    pub canceled_memberships: u64,
}

/// Cumulative active counts for one month, keyed by plan name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyProgramBreakdown {
    pub month: String,
    pub programs: BTreeMap<String, u64>,
    pub total: u64,
}

/// Response envelope: the same series computed over every record and over
/// each studio location's subset.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSeries<T> {
    pub all_data: Vec<T>,
    pub los_gatos_data: Vec<T>,
    pub pleasanton_data: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct BreakdownResponse {
    pub breakdown: Vec<MonthlyAmountBreakdown>,
}
