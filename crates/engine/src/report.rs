use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use tracing::{info, warn};

use common::{Error, Notifier, Result, TradeStore, TradingMode};

/// A reporting window in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPeriod {
    Day(NaiveDate),
    /// The calendar month starting on this date's month.
    Month(NaiveDate),
}

impl ReportPeriod {
    pub fn month_of(date: NaiveDate) -> Self {
        // Day 1 always exists.
        Self::Month(date.with_day(1).unwrap_or(date))
    }

    pub fn label(&self) -> String {
        match self {
            Self::Day(date) => date.format("%Y-%m-%d").to_string(),
            Self::Month(date) => date.format("%Y-%m").to_string(),
        }
    }

    /// `[from, to)` covering the period.
    pub fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let (start, end) = match self {
            Self::Day(date) => (Some(*date), date.checked_add_days(Days::new(1))),
            Self::Month(date) => {
                let start = date.with_day(1);
                (start, start.and_then(|d| d.checked_add_months(Months::new(1))))
            }
        };
        match (start.and_then(midnight), end.and_then(midnight)) {
            (Some(from), Some(to)) => Ok((from, to)),
            _ => Err(Error::Other(format!("no calendar bounds for {}", self.label()))),
        }
    }
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|t| Utc.from_utc_datetime(&t))
}

/// Render closed-trade results of `mode` for `period`.
///
/// ```text
/// ==========2024-05-10==========
/// lost | 1 positions | -4.00 EUR
/// won | 2 positions | 15.00 EUR
/// TOTAL | 3 positions | 11.00 EUR
/// ```
pub async fn summary(
    store: &dyn TradeStore,
    mode: TradingMode,
    period: ReportPeriod,
    counter: &str,
) -> Result<String> {
    let (from, to) = period.bounds()?;
    let rows = store.results_between(mode, from, to).await?;

    let mut lines = vec![format!("=========={}==========", period.label())];
    let (mut count, mut net) = (0, 0.0);
    for row in &rows {
        lines.push(format!(
            "{} | {} positions | {:.2} {counter}",
            row.status, row.count, row.net_result
        ));
        count += row.count;
        net += row.net_result;
    }
    lines.push(format!("TOTAL | {count} positions | {net:.2} {counter}"));
    Ok(lines.join("\n"))
}

/// Reports due at `now`, evaluated once per minute:
/// - the current day at each of `report_hours`
/// - the previous day at 08:00
/// - the running month every Monday at 08:30
/// - the previous month on the 1st at 09:00
pub fn due_reports(now: DateTime<Utc>, report_hours: &[u32]) -> Vec<ReportPeriod> {
    let today = now.date_naive();
    let (hour, minute) = (now.hour(), now.minute());
    let mut due = Vec::new();

    if minute == 0 && report_hours.contains(&hour) {
        due.push(ReportPeriod::Day(today));
    }
    if (hour, minute) == (8, 0) {
        if let Some(yesterday) = today.pred_opt() {
            due.push(ReportPeriod::Day(yesterday));
        }
    }
    if (hour, minute) == (8, 30) && today.weekday() == Weekday::Mon {
        due.push(ReportPeriod::month_of(today));
    }
    if (hour, minute) == (9, 0) && today.day() == 1 {
        if let Some(last_month) = today.checked_sub_months(Months::new(1)) {
            due.push(ReportPeriod::month_of(last_month));
        }
    }
    due
}

/// Send scheduled summaries forever. Call from `tokio::spawn`.
pub async fn run_schedule(
    store: Arc<dyn TradeStore>,
    notifier: Arc<dyn Notifier>,
    mode: TradingMode,
    counter: String,
    report_hours: Vec<u32>,
) {
    info!(?report_hours, "Report schedule started");
    let mut ticker = tokio::time::interval(Duration::from_secs(20));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_minute = None;

    loop {
        ticker.tick().await;
        let now = Utc::now();
        let minute = now.with_second(0).and_then(|t| t.with_nanosecond(0));
        if minute == last_minute {
            continue;
        }
        last_minute = minute;

        for period in due_reports(now, &report_hours) {
            match summary(store.as_ref(), mode, period, &counter).await {
                Ok(text) => notifier.notify(&text).await,
                Err(e) => warn!(period = %period.label(), error = %e, "Report failed"),
            }
        }
    }
}
