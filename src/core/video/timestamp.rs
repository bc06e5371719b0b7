use std::time::Duration;

use super::error::DetectionError;

/// 低于此帧率视为配置错误（每 1000 秒一帧）
pub const MIN_FRAME_RATE: f64 = 0.001;

/// 帧号 → 视频内时间偏移
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampConverter {
    frame_rate: f64,
}

impl TimestampConverter {
    pub fn new(frame_rate: f64) -> Result<Self, DetectionError> {
        if !frame_rate.is_finite() || frame_rate < MIN_FRAME_RATE {
            return Err(DetectionError::Configuration(format!(
                "frame rate must be at least {}, got {}",
                MIN_FRAME_RATE, frame_rate
            )));
        }
        Ok(Self { frame_rate })
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn to_duration(&self, frame_index: u64) -> Duration {
        // 超出 Duration 范围时取上限
        Duration::try_from_secs_f64(frame_index as f64 / self.frame_rate).unwrap_or(Duration::MAX)
    }

    /// Number of frames covering `seconds`, rounded up.
    pub fn frames_for_secs(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.frame_rate).ceil() as u64
    }
}

/// `HH:MM:SS`，不足一秒的部分截断
pub fn format_hms(timestamp: Duration) -> String {
    let total = timestamp.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_to_duration() {
        let clock = TimestampConverter::new(30.0).unwrap();
        assert_eq!(clock.to_duration(0), Duration::ZERO);
        assert_eq!(clock.to_duration(450), Duration::from_secs(15));
        assert_eq!(format_hms(clock.to_duration(450)), "00:00:15");
    }

    #[test]
    fn test_fractional_frame_rate() {
        let clock = TimestampConverter::new(12.5).unwrap();
        let ts = clock.to_duration(1250);
        assert_eq!(ts.as_secs(), 100);
        assert_eq!(format_hms(ts), "00:01:40");
        assert_eq!(clock.to_duration(5), Duration::from_millis(400));
    }

    #[test]
    fn test_format_hms_hours() {
        assert_eq!(format_hms(Duration::from_secs(3 * 3600 + 25 * 60 + 7)), "03:25:07");
        assert_eq!(format_hms(Duration::from_millis(59_999)), "00:00:59");
    }

    #[test]
    fn test_rejects_non_positive_frame_rate() {
        assert!(TimestampConverter::new(0.0).is_err());
        assert!(TimestampConverter::new(-25.0).is_err());
        assert!(TimestampConverter::new(f64::NAN).is_err());
        assert!(matches!(
            TimestampConverter::new(1e-300),
            Err(DetectionError::Configuration(_))
        ));
        assert!(TimestampConverter::new(MIN_FRAME_RATE).is_ok());
    }

    #[test]
    fn test_duration_saturates_instead_of_overflowing() {
        let clock = TimestampConverter::new(MIN_FRAME_RATE).unwrap();
        assert_eq!(clock.to_duration(u64::MAX), Duration::MAX);
        assert_eq!(clock.to_duration(1), Duration::from_secs(1000));
    }

    #[test]
    fn test_frames_for_secs() {
        let clock = TimestampConverter::new(30.0).unwrap();
        assert_eq!(clock.frames_for_secs(1.0), 30);
        assert_eq!(clock.frames_for_secs(0.0), 0);
        assert_eq!(clock.frames_for_secs(0.5), 15);
    }
}
