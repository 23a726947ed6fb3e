//! Rebalance schedule generation.
//!
//! Nominal dates are generated at a monthly cadence and snapped forward to the
//! first trading date at or after each one. The first and last trading dates
//! are always part of the schedule.

use crate::domain::error::PortoptError;
use chrono::{Datelike, Months, NaiveDate};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceFrequency {
    Monthly,
    Quarterly,
    Yearly,
    EveryNMonths(u32),
    None,
}

impl RebalanceFrequency {
    /// Cadence in months, `None` for buy-and-hold.
    pub fn months(&self) -> Option<u32> {
        match self {
            RebalanceFrequency::Monthly => Some(1),
            RebalanceFrequency::Quarterly => Some(3),
            RebalanceFrequency::Yearly => Some(12),
            RebalanceFrequency::EveryNMonths(n) => Some(*n),
            RebalanceFrequency::None => None,
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceFrequency::Monthly => f.write_str("monthly"),
            RebalanceFrequency::Quarterly => f.write_str("quarterly"),
            RebalanceFrequency::Yearly => f.write_str("yearly"),
            RebalanceFrequency::EveryNMonths(n) => write!(f, "{n}m"),
            RebalanceFrequency::None => f.write_str("none"),
        }
    }
}

impl FromStr for RebalanceFrequency {
    type Err = PortoptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let freq = match normalized.as_str() {
            "monthly" | "month" | "m" => RebalanceFrequency::Monthly,
            "quarterly" | "quarter" | "q" => RebalanceFrequency::Quarterly,
            "yearly" | "annual" | "annually" | "y" => RebalanceFrequency::Yearly,
            "none" | "never" | "buy_and_hold" => RebalanceFrequency::None,
            other => {
                let n = other
                    .strip_suffix('m')
                    .and_then(|n| n.trim().parse::<u32>().ok())
                    .ok_or_else(|| {
                        PortoptError::invalid_config(
                            "backtest",
                            "rebalance",
                            format!("unknown frequency '{}'", s.trim()),
                        )
                    })?;
                if n == 0 {
                    return Err(PortoptError::invalid_config(
                        "backtest",
                        "rebalance",
                        "interval must be at least one month",
                    ));
                }
                RebalanceFrequency::EveryNMonths(n)
            }
        };
        Ok(freq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleAnchor {
    /// Cadence counted from the first trading date.
    #[default]
    FirstTradingDate,
    /// Cadence aligned to calendar period starts (month, quarter, year).
    CalendarPeriodStart,
}

impl FromStr for ScheduleAnchor {
    type Err = PortoptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first_trading_date" | "first" | "start" => Ok(ScheduleAnchor::FirstTradingDate),
            "calendar" | "calendar_period_start" | "period_start" => {
                Ok(ScheduleAnchor::CalendarPeriodStart)
            }
            other => Err(PortoptError::invalid_config(
                "backtest",
                "anchor",
                format!("unknown anchor '{other}'"),
            )),
        }
    }
}

/// Strictly increasing trading dates on which weights are reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceSchedule {
    dates: Vec<NaiveDate>,
}

impl RebalanceSchedule {
    /// Explicit schedule; dates are sorted and deduplicated.
    pub fn from_dates(mut dates: Vec<NaiveDate>) -> Self {
        dates.sort_unstable();
        dates.dedup();
        Self { dates }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Dates strictly between the first and the last.
    pub fn interior(&self) -> &[NaiveDate] {
        if self.dates.len() <= 2 {
            &[]
        } else {
            &self.dates[1..self.dates.len() - 1]
        }
    }
}

/// First day of the first calendar period of `months` length starting on or
/// after `date`. Periods that divide the year are aligned to January.
fn calendar_start(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    let month_start = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
    let mut candidate = if month_start == date {
        month_start
    } else {
        month_start.checked_add_months(Months::new(1))?
    };
    if 12 % months == 0 {
        while candidate.month0() % months != 0 {
            candidate = candidate.checked_add_months(Months::new(1))?;
        }
    }
    Some(candidate)
}

/// Build the rebalance schedule over sorted, unique `trading_dates`.
pub fn build_schedule(
    trading_dates: &[NaiveDate],
    frequency: RebalanceFrequency,
    anchor: ScheduleAnchor,
) -> Result<RebalanceSchedule, PortoptError> {
    let (Some(&first), Some(&last)) = (trading_dates.first(), trading_dates.last()) else {
        return Err(PortoptError::EmptySchedule);
    };

    let mut dates = vec![first];
    if let Some(months) = frequency.months() {
        if months == 0 {
            return Err(PortoptError::invalid_config(
                "backtest",
                "rebalance",
                "interval must be at least one month",
            ));
        }
        let origin = match anchor {
            ScheduleAnchor::FirstTradingDate => Some(first),
            ScheduleAnchor::CalendarPeriodStart => calendar_start(first, months),
        };
        if let Some(origin) = origin {
            // offsets are taken from the origin so month-end clamping does not drift
            let nominal = (0u32..)
                .map_while(|k| k.checked_mul(months))
                .map_while(|offset| origin.checked_add_months(Months::new(offset)))
                .take_while(|d| *d <= last);
            for date in nominal {
                let idx = trading_dates.partition_point(|d| *d < date);
                if let Some(&snapped) = trading_dates.get(idx) {
                    if dates.last().is_some_and(|prev| *prev < snapped) {
                        dates.push(snapped);
                    }
                }
            }
        }
    }
    if dates.last().is_some_and(|prev| *prev < last) {
        dates.push(last);
    }

    Ok(RebalanceSchedule { dates })
}
