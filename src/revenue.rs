//! Completed-booking revenue for the admin dashboard.
//!
//! Buckets are calendar based and nested: `today` is the current day, `week`
//! is the Monday-to-Sunday week containing today clipped to the current
//! month, `month` is the current calendar month. The clip keeps
//! `today <= week <= month` on the first days of a month.

use chrono::{Datelike, Duration, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::auth::{require_role, Principal};
use crate::error::AppError;
use crate::models::{CompletedRevenue, Role};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueStats {
    pub today: Decimal,
    pub week: Decimal,
    pub month: Decimal,
    pub total_completed: i64,
}

pub fn month_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = today.with_day(1).unwrap_or(today);
    let last = first
        .checked_add_months(Months::new(1))
        .map(|next| next - Duration::days(1))
        .unwrap_or(today);
    (first, last)
}

pub fn week_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let sunday = monday + Duration::days(6);
    let (first, last) = month_window(today);
    (monday.max(first), sunday.min(last))
}

pub fn aggregate(rows: &[CompletedRevenue], today: NaiveDate, total_completed: i64) -> RevenueStats {
    let (week_start, week_end) = week_window(today);
    let (month_start, month_end) = month_window(today);

    let mut stats = RevenueStats {
        today: Decimal::ZERO,
        week: Decimal::ZERO,
        month: Decimal::ZERO,
        total_completed,
    };
    for row in rows {
        let price = row.final_price.unwrap_or(Decimal::ZERO);
        let date = row.booking_date;
        if date == today {
            stats.today += price;
        }
        if date >= week_start && date <= week_end {
            stats.week += price;
        }
        if date >= month_start && date <= month_end {
            stats.month += price;
        }
    }
    stats
}

pub async fn revenue_stats(
    store: &dyn Store,
    principal: &Principal,
    today: NaiveDate,
) -> Result<RevenueStats, AppError> {
    require_role(principal, Role::Admin)?;

    let (from, to) = month_window(today);
    let rows = store.completed_revenue(from, to).await?;
    let total = store.count_completed().await?;
    Ok(aggregate(&rows, today, total))
}
