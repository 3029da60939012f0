use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{fmt, str::FromStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Day-count basis used to accrue interest over a broken (non-monthly) period.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DayCount {
    /// actual days / 365
    #[default]
    Actual365Fixed,
    /// actual days / 366 when the accrual starts in a leap year, else / 365
    ActualLeapYear,
    /// 30/360
    Thirty360,
}

impl DayCount {
    pub fn days_between(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        match self {
            DayCount::Actual365Fixed | DayCount::ActualLeapYear => {
                to.signed_duration_since(from).num_days()
            }
            DayCount::Thirty360 => {
                let d1 = i64::from(from.day().min(30));
                let d2 = i64::from(to.day().min(30));
                let years = i64::from(to.year() - from.year());
                let months = i64::from(to.month()) - i64::from(from.month());
                (360 * years + 30 * months + (d2 - d1)).max(0)
            }
        }
    }

    pub fn year_basis(&self, from: NaiveDate) -> Decimal {
        match self {
            DayCount::Actual365Fixed => dec!(365),
            DayCount::ActualLeapYear if is_leap_year(from.year()) => dec!(366),
            DayCount::ActualLeapYear => dec!(365),
            DayCount::Thirty360 => dec!(360),
        }
    }

    /// Fraction of a year between `from` and `to` under this convention.
    pub fn year_fraction(&self, from: NaiveDate, to: NaiveDate) -> Decimal {
        Decimal::from(self.days_between(from, to)) / self.year_basis(from)
    }
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

impl fmt::Display for DayCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DayCount::Actual365Fixed => "actual_365",
            DayCount::ActualLeapYear => "actual_actual",
            DayCount::Thirty360 => "30_360",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for DayCount {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "actual_365" => Ok(DayCount::Actual365Fixed),
            "actual_actual" => Ok(DayCount::ActualLeapYear),
            "30_360" => Ok(DayCount::Thirty360),
            other => Err(ScheduleError::invalid(
                "day_count",
                format!(
                    "unknown convention '{}', expected actual_365, actual_actual or 30_360",
                    other
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DayCount;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use test_log::test;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_actual_days() {
        let from = date(2024, 6, 1);
        let to = date(2024, 6, 15);
        assert_eq!(DayCount::Actual365Fixed.days_between(from, to), 14);
        assert_eq!(
            DayCount::Actual365Fixed.year_fraction(from, to),
            dec!(14) / dec!(365)
        );
        assert_eq!(
            DayCount::ActualLeapYear.year_fraction(from, to),
            dec!(14) / dec!(366)
        );
        assert_eq!(
            DayCount::ActualLeapYear.year_fraction(date(2023, 6, 1), date(2023, 6, 15)),
            dec!(14) / dec!(365)
        );
    }

    #[test]
    fn test_thirty_360() {
        // 31st is treated as the 30th
        assert_eq!(
            DayCount::Thirty360.days_between(date(2024, 1, 31), date(2024, 2, 28)),
            28
        );
        assert_eq!(
            DayCount::Thirty360.days_between(date(2024, 6, 1), date(2024, 7, 1)),
            30
        );
        assert_eq!(
            DayCount::Thirty360.days_between(date(2023, 12, 15), date(2024, 1, 15)),
            30
        );
        assert_eq!(
            DayCount::Thirty360.year_fraction(date(2024, 6, 1), date(2024, 6, 16)),
            dec!(15) / dec!(360)
        );
        assert_eq!(
            DayCount::Thirty360.year_fraction(date(2024, 6, 1), date(2024, 6, 1)),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_parse_convention() {
        assert_eq!("actual_365".parse::<DayCount>(), Ok(DayCount::Actual365Fixed));
        assert_eq!("ACTUAL_ACTUAL".parse::<DayCount>(), Ok(DayCount::ActualLeapYear));
        assert_eq!(" 30_360 ".parse::<DayCount>(), Ok(DayCount::Thirty360));
        assert!("act/360".parse::<DayCount>().is_err());
        assert_eq!(DayCount::Thirty360.to_string(), "30_360");
        assert_eq!(DayCount::default(), DayCount::Actual365Fixed);
    }
}
