pub mod time;

pub use time::{
    day_window, hour_window, parse_date, parse_hour, previous_day, previous_hour, truncate_to_hour,
};

/// 持久化到实体上的失败原因最大长度（字符）
pub const MAX_REASON_LEN: usize = 255;

/// 按字符截断失败原因，避免在多字节字符中间截断
pub fn truncate_reason(msg: &str) -> String {
    if msg.chars().count() <= MAX_REASON_LEN {
        return msg.to_string();
    }
    msg.chars().take(MAX_REASON_LEN).collect()
}

/// 金额与分数统一保留两位小数
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_reason_keeps_short_messages() {
        assert_eq!(truncate_reason("token expired"), "token expired");
        assert_eq!(truncate_reason(""), "");
    }

    #[test]
    fn test_truncate_reason_is_char_safe() {
        let long = "错".repeat(300);
        let truncated = truncate_reason(&long);
        assert_eq!(truncated.chars().count(), MAX_REASON_LEN);

        let ascii = "x".repeat(1000);
        assert_eq!(truncate_reason(&ascii).len(), MAX_REASON_LEN);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(0.004), 0.0);
        assert_eq!(round2(123.456), 123.46);
        assert_eq!(round2(-0.125_1), -0.13);
    }
}
