//! Incremental filter engine
//!
//! Filters a page of records by the `since`/`until` window of a read and
//! decides whether pagination should continue.
//!
//! A filter either completes with a [`FilteredPage`] or is interrupted
//! (cancellation, unparsable timestamp) with an [`InterruptedFilter`] that
//! still carries the records accepted before the interruption.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::error::ConnectorError;
use crate::locator::{JsonPath, NextPageFunc};
use crate::operation::{ReadParams, Record};

/// Ordering of records within and across pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOrder {
    #[default]
    Unordered,
    /// Oldest first.
    Chronological,
    /// Newest first.
    Reverse,
}

/// Inclusive/exclusive policy of the `since`/`until` comparisons.
///
/// Both bounds are inclusive by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeBoundary {
    exclude_since: bool,
    exclude_until: bool,
}

impl TimeBoundary {
    pub fn inclusive() -> Self {
        Self::default()
    }

    pub fn exclude_since(mut self) -> Self {
        self.exclude_since = true;
        self
    }

    pub fn exclude_until(mut self) -> Self {
        self.exclude_until = true;
        self
    }

    /// Whether `t` falls in the window of `params`.
    pub fn contains(&self, params: &ReadParams, t: DateTime<Utc>) -> bool {
        let after_since = match params.since {
            None => true,
            Some(since) if self.exclude_since => t > since,
            Some(since) => t >= since,
        };
        let before_until = match params.until {
            None => true,
            Some(until) if self.exclude_until => t < until,
            Some(until) => t <= until,
        };
        after_since && before_until
    }
}

/// Encoding of record timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// RFC 3339 strings; a bare `YYYY-MM-DD` date is read as midnight UTC.
    #[default]
    Rfc3339,
    /// Unix seconds, as a JSON number or numeric string.
    UnixSeconds,
    /// Unix milliseconds, as a JSON number or numeric string.
    UnixMillis,
    /// A `chrono` format string; values without an offset are taken as UTC.
    Layout(String),
}

impl TimestampFormat {
    pub fn parse(&self, value: &Value) -> Option<DateTime<Utc>> {
        match self {
            TimestampFormat::Rfc3339 => {
                let s = value.as_str()?;
                DateTime::parse_from_rfc3339(s)
                    .map(|t| t.with_timezone(&Utc))
                    .ok()
                    .or_else(|| {
                        NaiveDate::parse_from_str(s, "%Y-%m-%d")
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                            .map(|t| Utc.from_utc_datetime(&t))
                    })
            }
            TimestampFormat::UnixSeconds => {
                let secs = numeric(value)?;
                DateTime::<Utc>::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
            }
            TimestampFormat::UnixMillis => {
                let millis = numeric(value)? as i64;
                DateTime::<Utc>::from_timestamp(
                    millis.div_euclid(1000),
                    (millis.rem_euclid(1000) * 1_000_000) as u32,
                )
            }
            TimestampFormat::Layout(layout) => {
                let s = value.as_str()?;
                DateTime::parse_from_str(s, layout)
                    .map(|t| t.with_timezone(&Utc))
                    .ok()
                    .or_else(|| {
                        NaiveDateTime::parse_from_str(s, layout)
                            .ok()
                            .map(|t| Utc.from_utc_datetime(&t))
                    })
                    .or_else(|| {
                        NaiveDate::parse_from_str(s, layout)
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                            .map(|t| Utc.from_utc_datetime(&t))
                    })
            }
        }
    }

    /// Render `t` in this format (used for `since`/`until` query parameters).
    pub fn format(&self, t: &DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Rfc3339 => crate::datautils::format_rfc3339(t),
            TimestampFormat::UnixSeconds => t.timestamp().to_string(),
            TimestampFormat::UnixMillis => t.timestamp_millis().to_string(),
            TimestampFormat::Layout(layout) => t.format(layout).to_string(),
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Records kept by a filter and the token of the next page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredPage {
    pub records: Vec<Record>,
    /// Empty when pagination should stop.
    pub next_page: String,
}

impl FilteredPage {
    pub fn done(records: Vec<Record>) -> Self {
        Self {
            records,
            next_page: String::new(),
        }
    }
}

/// A filter that stopped before finishing the page.
#[derive(Debug)]
pub struct InterruptedFilter {
    /// Records accepted before the interruption.
    pub records: Vec<Record>,
    pub error: ConnectorError,
}

impl fmt::Display for InterruptedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "filter interrupted after {} records: {}",
            self.records.len(),
            self.error
        )
    }
}

impl std::error::Error for InterruptedFilter {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<InterruptedFilter> for ConnectorError {
    fn from(interrupted: InterruptedFilter) -> Self {
        interrupted.error
    }
}

/// Outcome of a filter over one page.
pub type FilterResult = Result<FilteredPage, InterruptedFilter>;

/// Filters one page: `(ctx, params, records, body) -> page`.
pub type FilterFunc =
    Arc<dyn Fn(&Context, &ReadParams, Vec<Record>, &Value) -> FilterResult + Send + Sync>;

/// Keep every record and follow the provider's pagination.
pub fn pass_through(next_page: NextPageFunc) -> FilterFunc {
    Arc::new(
        move |ctx: &Context, _params: &ReadParams, records: Vec<Record>, body: &Value| -> FilterResult {
            if records.is_empty() {
                return Ok(FilteredPage::default());
            }
            if let Err(error) = ctx.check() {
                return Err(InterruptedFilter { records, error });
            }
            match next_page(body) {
                Ok(next_page) => Ok(FilteredPage { records, next_page }),
                Err(error) => Err(InterruptedFilter { records, error }),
            }
        },
    )
}

fn record_time(
    record: &Record,
    key: &JsonPath,
    format: &TimestampFormat,
) -> Result<DateTime<Utc>, ConnectorError> {
    let invalid = |value: String| ConnectorError::InvalidTimestamp {
        field: key.display(),
        value,
    };
    let value = key
        .lookup_record(record)
        .ok_or_else(|| invalid("<missing>".to_string()))?;
    format
        .parse(value)
        .ok_or_else(|| invalid(value.to_string()))
}

/// Build a time-window filter.
///
/// Records are kept iff `boundary` contains their timestamp. Whether more
/// pages may hold in-window records depends on `order`: any kept record for
/// [`TimeOrder::Unordered`], a kept last record for
/// [`TimeOrder::Chronological`], a kept first record for
/// [`TimeOrder::Reverse`]. Otherwise pagination stops without consulting
/// `next_page`.
pub fn make_time_filter_func(
    order: TimeOrder,
    boundary: TimeBoundary,
    timestamp_key: impl Into<String>,
    format: TimestampFormat,
    next_page: NextPageFunc,
) -> FilterFunc {
    let key = JsonPath::dotted(&timestamp_key.into());
    Arc::new(
        move |ctx: &Context, params: &ReadParams, records: Vec<Record>, body: &Value| -> FilterResult {
            if records.is_empty() {
                return Ok(FilteredPage::default());
            }

            let last = records.len() - 1;
            let mut kept = Vec::with_capacity(records.len());
            let mut has_more = false;
            for (index, record) in records.into_iter().enumerate() {
                if let Err(error) = ctx.check() {
                    return Err(InterruptedFilter { records: kept, error });
                }
                let t = match record_time(&record, &key, &format) {
                    Ok(t) => t,
                    Err(error) => return Err(InterruptedFilter { records: kept, error }),
                };
                if !boundary.contains(params, t) {
                    continue;
                }
                has_more |= match order {
                    TimeOrder::Unordered => true,
                    TimeOrder::Chronological => index == last,
                    TimeOrder::Reverse => index == 0,
                };
                kept.push(record);
            }

            if !has_more {
                debug!(kept = kept.len(), "Time filter ended pagination");
                return Ok(FilteredPage::done(kept));
            }
            match next_page(body) {
                Ok(next_page) => Ok(FilteredPage {
                    records: kept,
                    next_page,
                }),
                Err(error) => Err(InterruptedFilter { records: kept, error }),
            }
        },
    )
}

/// Filter for newest-first streams.
///
/// Records are collected while their timestamp is after `since`; the first
/// stale record ends the scan. The next page is surfaced only when the last
/// record of the page was still fresh.
pub fn filter_sorted_records(
    ctx: &Context,
    params: &ReadParams,
    records: Vec<Record>,
    body: &Value,
    timestamp_key: &str,
    format: &TimestampFormat,
    next_page: &NextPageFunc,
) -> FilterResult {
    if records.is_empty() {
        return Ok(FilteredPage::default());
    }
    let key = JsonPath::dotted(timestamp_key);
    let total = records.len();
    let mut kept = Vec::with_capacity(total);
    for record in records {
        if let Err(error) = ctx.check() {
            return Err(InterruptedFilter { records: kept, error });
        }
        let fresh = match params.since {
            None => true,
            Some(since) => match record_time(&record, &key, format) {
                Ok(t) => t > since,
                Err(error) => return Err(InterruptedFilter { records: kept, error }),
            },
        };
        if !fresh {
            return Ok(FilteredPage::done(kept));
        }
        kept.push(record);
    }

    // Every record, including the last, was fresh.
    debug_assert_eq!(kept.len(), total);
    match next_page(body) {
        Ok(next_page) => Ok(FilteredPage {
            records: kept,
            next_page,
        }),
        Err(error) => Err(InterruptedFilter { records: kept, error }),
    }
}

/// [`filter_sorted_records`] as a [`FilterFunc`].
pub fn make_sorted_filter_func(
    timestamp_key: impl Into<String>,
    format: TimestampFormat,
    next_page: NextPageFunc,
) -> FilterFunc {
    let key = timestamp_key.into();
    Arc::new(
        move |ctx: &Context, params: &ReadParams, records: Vec<Record>, body: &Value| -> FilterResult {
            filter_sorted_records(ctx, params, records, body, &key, &format, &next_page)
        },
    )
}
