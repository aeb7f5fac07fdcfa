//! UTC 时间窗口工具
//!
//! 所有汇总窗口都是左闭右开 `[start, end)`。

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::errors::{PromoGuardError, Result};

/// 截断到整点
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// `[hour, hour + 1h)`
pub fn hour_window(hour_start: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = truncate_to_hour(hour_start);
    (start, start + Duration::hours(1))
}

/// `[date 00:00, date+1 00:00)` UTC
pub fn day_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// 上一个完整小时的起点
pub fn previous_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_hour(now) - Duration::hours(1)
}

/// 前一天（UTC）
pub fn previous_day(now: DateTime<Utc>) -> NaiveDate {
    (now - Duration::days(1)).date_naive()
}

/// 解析命令行传入的小时：RFC3339 或 `YYYY-MM-DDTHH`
pub fn parse_hour(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(truncate_to_hour(dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&format!("{}:00", input), "%Y-%m-%dT%H:%M")
        .map(|dt| dt.and_utc())
        .map_err(|e| PromoGuardError::date_parse(format!("Invalid hour '{}': {}", input, e)))
}

/// 解析 `YYYY-MM-DD`
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hour_window_is_half_open_hour() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 1, 13, 47, 12).unwrap();
        let (start, end) = hour_window(ts);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 10, 1, 13, 0, 0).unwrap());
        assert_eq!(end - start, Duration::hours(1));
    }

    #[test]
    fn test_day_window_covers_full_utc_day() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        let (start, end) = day_window(date);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_previous_hour_and_day() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 0, 5, 0).unwrap();
        assert_eq!(
            previous_hour(now),
            Utc.with_ymd_and_hms(2026, 9, 30, 23, 0, 0).unwrap()
        );
        assert_eq!(previous_day(now), NaiveDate::from_ymd_opt(2026, 9, 30).unwrap());
    }

    #[test]
    fn test_parse_hour_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 1, 13, 0, 0).unwrap();
        assert_eq!(parse_hour("2026-10-01T13").unwrap(), expected);
        assert_eq!(parse_hour("2026-10-01T13:42:00Z").unwrap(), expected);
        assert!(parse_hour("yesterday").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2026-10-01").unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
        );
        assert!(matches!(
            parse_date("01/10/2026"),
            Err(PromoGuardError::DateParse(_))
        ));
    }
}
