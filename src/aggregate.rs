use crate::models::{
    LocationSeries, MemberRecord, MonthlyAmountBreakdown, MonthlyMembership,
    MonthlyProgramBreakdown, MonthlyRevenue, PaymentRecord,
};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// Records dated in this year are known-bad legacy data and excluded from
/// every aggregation.
const LEGACY_YEAR: i32 = 2021;

pub const LOS_GATOS: &str = "Los Gatos";
pub const PLEASANTON: &str = "Pleasanton";

/// Month key ("YYYY-MM") from a payment timestamp like
/// "2023-01-15 10:30:00". Missing or short timestamps yield None, as do
/// legacy-year months.
fn payment_month(transaction_at: &str) -> Option<&str> {
    let date_part = transaction_at.split(' ').next()?;
    let month = date_part.get(0..7)?;
    if month.starts_with("2021") {
        return None;
    }
    Some(month)
}

/// Member dates appear either ISO ("2023-01-10") or US-style ("1/10/2023"),
/// sometimes with a trailing time component.
fn member_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.split(' ').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%m/%d/%Y"))
        .ok()
}

fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

pub fn monthly_revenue(payments: &[PaymentRecord]) -> Vec<MonthlyRevenue> {
    let mut months: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    for payment in payments {
        let Some(month) = payment_month(&payment.transaction_at) else {
            continue;
        };
        let entry = months.entry(month.to_string()).or_default();
        entry.0 += payment.payment_amount;
        entry.1 += 1;
    }

    months
        .into_iter()
        .map(|(month, (revenue, count))| MonthlyRevenue {
            month,
            revenue,
            count,
        })
        .collect()
}

/// Same payment set as [`monthly_revenue`], but per month the revenue is
/// split by rounded-whole-dollar transaction size.
pub fn monthly_amount_breakdown(payments: &[PaymentRecord]) -> Vec<MonthlyAmountBreakdown> {
    let mut months: BTreeMap<String, (BTreeMap<String, f64>, f64)> = BTreeMap::new();
    for payment in payments {
        let Some(month) = payment_month(&payment.transaction_at) else {
            continue;
        };
        let bucket = format!("{}", payment.payment_amount.round() as i64);
        let entry = months.entry(month.to_string()).or_default();
        *entry.0.entry(bucket).or_default() += payment.payment_amount;
        entry.1 += payment.payment_amount;
    }

    months
        .into_iter()
        .map(|(month, (amounts, total))| MonthlyAmountBreakdown {
            month,
            amounts,
            total,
        })
        .collect()
}

enum EventKind {
    Start,
    End,
}

struct MembershipEvent {
    month: String,
    kind: EventKind,
    plan_name: String,
}

/// Start/end events for every membership row with usable dates. Starts in
/// the legacy year are dropped outright; end events must fall strictly
/// after it.
fn membership_events(members: &[MemberRecord]) -> Vec<MembershipEvent> {
    let mut events = Vec::new();
    for member in members {
        if !member.membership || member.start_date.is_empty() {
            continue;
        }
        let Some(start) = member_date(&member.start_date) else {
            continue;
        };
        if start.year() == LEGACY_YEAR {
            continue;
        }
        events.push(MembershipEvent {
            month: month_key(start),
            kind: EventKind::Start,
            plan_name: member.plan_name.clone(),
        });

        if member.canceled && !member.end_date.is_empty() {
            if let Some(end) = member_date(&member.end_date) {
                if end.year() > LEGACY_YEAR {
                    events.push(MembershipEvent {
                        month: month_key(end),
                        kind: EventKind::End,
                        plan_name: member.plan_name.clone(),
                    });
                }
            }
        }
    }
    events
}

/// Cumulative active-member counts per month. Two passes: tally starts and
/// cancels per month, then scan the months in order carrying a running
/// active count, floored at zero.
pub fn monthly_memberships(members: &[MemberRecord]) -> Vec<MonthlyMembership> {
    let mut tallies: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for event in membership_events(members) {
        let entry = tallies.entry(event.month).or_default();
        match event.kind {
            EventKind::Start => entry.0 += 1,
            EventKind::End => entry.1 += 1,
        }
    }

    let mut active: i64 = 0;
    tallies
        .into_iter()
        .map(|(month, (new, canceled))| {
            active = (active + new as i64 - canceled as i64).max(0);
            MonthlyMembership {
                month,
                membership_count: active as u64,
                new_memberships: new,
                canceled_memberships: canceled,
            }
        })
        .collect()
}

/// Same event fold as [`monthly_memberships`], with the running count kept
/// per plan name. Each month snapshot lists the programs with at least one
/// active member; total matches the scalar aggregator for the same rows.
pub fn monthly_program_breakdown(members: &[MemberRecord]) -> Vec<MonthlyProgramBreakdown> {
    let mut tallies: BTreeMap<String, BTreeMap<String, (u64, u64)>> = BTreeMap::new();
    for event in membership_events(members) {
        let entry = tallies
            .entry(event.month)
            .or_default()
            .entry(event.plan_name)
            .or_default();
        match event.kind {
            EventKind::Start => entry.0 += 1,
            EventKind::End => entry.1 += 1,
        }
    }

    let mut active: BTreeMap<String, i64> = BTreeMap::new();
    let mut out = Vec::new();
    for (month, programs) in tallies {
        for (program, (new, canceled)) in programs {
            let count = active.entry(program).or_default();
            *count = (*count + new as i64 - canceled as i64).max(0);
        }

        let snapshot: BTreeMap<String, u64> = active
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(program, count)| (program.clone(), *count as u64))
            .collect();
        let total = snapshot.values().sum();
        out.push(MonthlyProgramBreakdown {
            month,
            programs: snapshot,
            total,
        });
    }
    out
}

fn located<T: Clone>(records: &[T], needle: &str, location: fn(&T) -> &str) -> Vec<T> {
    records
        .iter()
        .filter(|r| location(r).contains(needle))
        .cloned()
        .collect()
}

fn location_series<R, T>(
    records: &[R],
    location: fn(&R) -> &str,
    aggregate: impl Fn(&[R]) -> Vec<T>,
) -> LocationSeries<T>
where
    R: Clone,
{
    LocationSeries {
        all_data: aggregate(records),
        los_gatos_data: aggregate(&located(records, LOS_GATOS, location)),
        pleasanton_data: aggregate(&located(records, PLEASANTON, location)),
    }
}

pub fn revenue_by_location(payments: &[PaymentRecord]) -> LocationSeries<MonthlyRevenue> {
    location_series(payments, |p| &p.payer_home_location, monthly_revenue)
}

pub fn amount_breakdown_by_location(
    payments: &[PaymentRecord],
) -> LocationSeries<MonthlyAmountBreakdown> {
    location_series(payments, |p| &p.payer_home_location, monthly_amount_breakdown)
}

pub fn memberships_by_location(members: &[MemberRecord]) -> LocationSeries<MonthlyMembership> {
    location_series(members, |m| &m.client_home_location, monthly_memberships)
}

pub fn program_breakdown_by_location(
    members: &[MemberRecord],
) -> LocationSeries<MonthlyProgramBreakdown> {
    location_series(members, |m| &m.client_home_location, monthly_program_breakdown)
}
