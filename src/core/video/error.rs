use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Incompatible frame {frame_number}: {reason}")]
    IncompatibleFrame { frame_number: u64, reason: String },
    #[error("Failed to persist frame {frame_number}: {reason}")]
    Persistence { frame_number: u64, reason: String },
    #[error("Frame source error: {0}")]
    Source(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DetectionError {
    pub fn incompatible(frame_number: u64, reason: impl Into<String>) -> Self {
        DetectionError::IncompatibleFrame {
            frame_number,
            reason: reason.into(),
        }
    }

    /// 单帧级错误：跳过该帧继续处理，不终止会话
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DetectionError::IncompatibleFrame { .. } | DetectionError::Persistence { .. }
        )
    }
}
