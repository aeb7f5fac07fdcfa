//! 任务触发时间（UTC）

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};

use crate::utils::truncate_to_hour;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// 固定间隔
    Every(std::time::Duration),
    /// 每小时第 `minute` 分钟
    Hourly { minute: u32 },
    Daily { hour: u32, minute: u32 },
    /// `weekday`：1 = 周一 … 7 = 周日
    Weekly { weekday: u32, hour: u32, minute: u32 },
}

impl Schedule {
    /// 严格晚于 `now` 的下一次触发时间
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Schedule::Every(interval) => {
                now + Duration::from_std(interval).unwrap_or_else(|_| Duration::seconds(1))
            }
            Schedule::Hourly { minute } => {
                let candidate = truncate_to_hour(now) + Duration::minutes(minute.min(59) as i64);
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::hours(1)
                }
            }
            Schedule::Daily { hour, minute } => {
                let candidate = at_time(now, 0, hour, minute);
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(1)
                }
            }
            Schedule::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let target = weekday.clamp(1, 7);
                let today = now.weekday().number_from_monday();
                let days_ahead = (target + 7 - today) % 7;
                let candidate = at_time(now, days_ahead as i64, hour, minute);
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::weeks(1)
                }
            }
        }
    }
}

fn at_time(now: DateTime<Utc>, days_ahead: i64, hour: u32, minute: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or(NaiveTime::MIN);
    let date = now.date_naive() + Duration::days(days_ahead);
    Utc.from_utc_datetime(&date.and_time(time))
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Every(interval) => write!(f, "every {}s", interval.as_secs()),
            Schedule::Hourly { minute } => write!(f, "hourly at :{:02}", minute),
            Schedule::Daily { hour, minute } => write!(f, "daily at {:02}:{:02} UTC", hour, minute),
            Schedule::Weekly {
                weekday,
                hour,
                minute,
            } => write!(
                f,
                "weekly on day {} at {:02}:{:02} UTC",
                weekday, hour, minute
            ),
        }
    }
}
