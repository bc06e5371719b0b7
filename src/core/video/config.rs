use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::DetectionError;

/// 检测配置 - 会话启动前统一校验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// SSIM 低于该值视为场景切换 (0-1)，越低越不敏感
    pub scene_threshold: f64,
    /// 平均像素差（占满量程比例）高于该值视为界面交互
    pub interaction_threshold: f64,
    /// 场景检测每 N 帧采样一次
    pub frame_sample_stride: u32,
    /// 场景事件之间的最小间隔（采样帧数）
    pub scene_debounce_frames: u32,
    /// 交互事件之间的最小间隔（交互分析帧数）
    pub interaction_debounce_frames: u32,
    /// 交互检测采样间隔，None 时按帧率取约每秒 10 帧
    pub interaction_sample_stride: Option<u32>,
    /// 区域掩码的单像素差阈值
    pub interaction_pixel_delta: u8,
    /// 场景切换后这段时间内的交互不上报（秒）
    pub interaction_scene_guard_secs: f64,
    /// 分析分辨率：最长边不超过该值
    pub analysis_max_dimension: u32,
    /// 每处理 N 帧打印一次进度，0 表示关闭
    pub progress_log_interval: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            scene_threshold: 0.3,
            interaction_threshold: 0.1,
            frame_sample_stride: 1,
            scene_debounce_frames: 60,
            interaction_debounce_frames: 5,
            interaction_sample_stride: None,
            interaction_pixel_delta: 25,
            interaction_scene_guard_secs: 1.0,
            analysis_max_dimension: 320,
            progress_log_interval: 100,
        }
    }
}

impl DetectionConfig {
    /// Screen recordings change slowly; sampling every 5th frame is enough.
    pub fn for_screen_recording() -> Self {
        Self {
            frame_sample_stride: 5,
            scene_debounce_frames: 12,
            ..Default::default()
        }
    }

    pub fn for_fast_preview() -> Self {
        Self {
            frame_sample_stride: 15,
            scene_debounce_frames: 4,
            interaction_debounce_frames: 3,
            analysis_max_dimension: 160,
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, DetectionError> {
        let config: DetectionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DetectionError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), DetectionError> {
        if !self.scene_threshold.is_finite() || !(0.0..=1.0).contains(&self.scene_threshold) {
            return Err(DetectionError::Configuration(format!(
                "scene_threshold must be within [0, 1], got {}",
                self.scene_threshold
            )));
        }
        if !self.interaction_threshold.is_finite() || self.interaction_threshold < 0.0 {
            return Err(DetectionError::Configuration(format!(
                "interaction_threshold must be >= 0, got {}",
                self.interaction_threshold
            )));
        }
        if self.frame_sample_stride == 0 {
            return Err(DetectionError::Configuration(
                "frame_sample_stride must be a positive integer".to_string(),
            ));
        }
        if self.interaction_sample_stride == Some(0) {
            return Err(DetectionError::Configuration(
                "interaction_sample_stride must be a positive integer".to_string(),
            ));
        }
        if !self.interaction_scene_guard_secs.is_finite() || self.interaction_scene_guard_secs < 0.0
        {
            return Err(DetectionError::Configuration(format!(
                "interaction_scene_guard_secs must be >= 0, got {}",
                self.interaction_scene_guard_secs
            )));
        }
        if self.analysis_max_dimension < 8 {
            return Err(DetectionError::Configuration(format!(
                "analysis_max_dimension must be at least 8, got {}",
                self.analysis_max_dimension
            )));
        }
        Ok(())
    }

    /// 交互检测的实际采样间隔
    pub fn effective_interaction_stride(&self, frame_rate: f64) -> u32 {
        match self.interaction_sample_stride {
            Some(stride) => stride,
            None => ((frame_rate / 10.0).floor() as u32).max(1),
        }
    }
}
