use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

use crate::{ServiceError, ServiceResult};

/// Reporting window of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPeriod {
    Day(NaiveDate),
    /// Stored as the first day of the month.
    Month(NaiveDate),
}

impl ReportPeriod {
    pub fn month_of(day: NaiveDate) -> ServiceResult<Self> {
        day.with_day(1)
            .map(ReportPeriod::Month)
            .ok_or_else(|| ServiceError::Validation(format!("Mês inválido: {}", day)))
    }

    /// Inclusive UTC bounds: first instant through the last whole second.
    pub fn bounds(&self) -> ServiceResult<(DateTime<Utc>, DateTime<Utc>)> {
        let (first, last) = match *self {
            ReportPeriod::Day(day) => (day, day),
            ReportPeriod::Month(first) => {
                let last = first
                    .checked_add_months(Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .ok_or_else(|| ServiceError::Validation(format!("Mês inválido: {}", first)))?;
                (first, last)
            }
        };

        let start = first.and_hms_opt(0, 0, 0);
        let end = last.and_hms_opt(23, 59, 59);
        match (start, end) {
            (Some(start), Some(end)) => Ok((start.and_utc(), end.and_utc())),
            _ => Err(ServiceError::Validation("Período inválido".to_string())),
        }
    }

    /// Period text shown in the report header.
    pub fn describe(&self) -> String {
        match self {
            ReportPeriod::Day(day) => day.format("%d/%m/%Y").to_string(),
            ReportPeriod::Month(first) => format!("{}/{}", first.month(), first.year()),
        }
    }

    /// Compact form used in download names.
    pub fn file_tag(&self) -> String {
        match self {
            ReportPeriod::Day(day) => day.format("%d-%m-%Y").to_string(),
            ReportPeriod::Month(first) => first.format("%m-%Y").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_bounds() {
        let (start, end) = ReportPeriod::Day(date(2024, 5, 10)).bounds().unwrap();
        assert_eq!(start.to_rfc3339(), "2024-05-10T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-05-10T23:59:59+00:00");
    }

    #[test]
    fn test_month_bounds_cover_last_day() {
        let period = ReportPeriod::month_of(date(2024, 2, 17)).unwrap();
        assert_eq!(period, ReportPeriod::Month(date(2024, 2, 1)));

        let (start, end) = period.bounds().unwrap();
        assert_eq!(start.date_naive(), date(2024, 2, 1));
        assert_eq!(end.date_naive(), date(2024, 2, 29));
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 59));

        let (_, end) = ReportPeriod::month_of(date(2023, 12, 5)).unwrap().bounds().unwrap();
        assert_eq!(end.date_naive(), date(2023, 12, 31));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(ReportPeriod::Day(date(2024, 5, 3)).describe(), "03/05/2024");
        assert_eq!(ReportPeriod::Month(date(2024, 5, 1)).describe(), "5/2024");
        assert_eq!(ReportPeriod::Month(date(2024, 5, 1)).file_tag(), "05-2024");
    }
}
