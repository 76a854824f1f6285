//! 时间工具

use std::time::Duration;

/// 格式化秒数为 MM:SS
pub fn format_mmss(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let mm = (seconds / 60.0) as u32;
    let ss = (seconds % 60.0) as u32;
    format!("{:02}:{:02}", mm, ss)
}

/// 格式化秒数为 MM:SS.mmm
pub fn format_mmss_ms(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let mm = (seconds / 60.0) as u32;
    let ss = (seconds % 60.0) as u32;
    let ms = ((seconds % 1.0) * 1000.0) as u32;
    format!("{:02}:{:02}.{:03}", mm, ss, ms)
}

/// 秒 → `Duration`, 负数和非有限值按 0 处理
pub fn secs(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mmss() {
        assert_eq!(format_mmss(0.0), "00:00");
        assert_eq!(format_mmss(65.5), "01:05");
        assert_eq!(format_mmss(3661.0), "61:01");
        assert_eq!(format_mmss(-3.0), "00:00");
    }

    #[test]
    fn test_format_mmss_ms() {
        assert_eq!(format_mmss_ms(65.25), "01:05.250");
    }

    #[test]
    fn test_secs() {
        assert_eq!(secs(1.5), Duration::from_millis(1500));
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
    }
}
