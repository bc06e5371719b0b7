use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use super::error::DetectionError;
use super::timestamp::format_hms;

/// 场景切换事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneChangeEvent {
    /// 从 1 开始，连续递增
    pub sequence_number: u32,
    pub frame_index: u64,
    pub timestamp: Duration,
    pub similarity: f64,
    /// 落盘的关键帧路径，落盘失败或未配置落盘时为 None
    pub stored_frame: Option<PathBuf>,
}

/// Changed area in source-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 界面交互事件（点击、局部刷新）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionEvent {
    pub sequence_number: u32,
    pub frame_index: u64,
    pub timestamp: Duration,
    /// 平均像素差，占满量程的比例
    pub magnitude: f64,
    pub region: Option<Region>,
}

/// 一个视频的检测结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionReport {
    pub scenes: Vec<SceneChangeEvent>,
    pub interactions: Vec<InteractionEvent>,
    pub total_frames: u64,
    pub frames_processed: u64,
    pub skipped_frames: u64,
    pub persistence_failures: u64,
    pub cancelled: bool,
}

impl DetectionReport {
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty() && self.interactions.is_empty()
    }

    pub fn to_json(&self) -> Result<String, DetectionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 文本清单：序号、帧号、HH:MM:SS、相似度/强度
    pub fn to_listing(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "Scene changes ({})", self.scenes.len());
        for scene in &self.scenes {
            let _ = write!(
                out,
                "  #{:<4} frame {:>8}  {}  similarity {:.3}",
                scene.sequence_number,
                scene.frame_index,
                format_hms(scene.timestamp),
                scene.similarity
            );
            if let Some(path) = &scene.stored_frame {
                let _ = write!(out, "  {}", path.display());
            }
            out.push('\n');
        }

        let _ = writeln!(out, "UI interactions ({})", self.interactions.len());
        for interaction in &self.interactions {
            let _ = write!(
                out,
                "  #{:<4} frame {:>8}  {}  intensity {:.3}",
                interaction.sequence_number,
                interaction.frame_index,
                format_hms(interaction.timestamp),
                interaction.magnitude
            );
            if let Some(region) = interaction.region {
                let _ = write!(
                    out,
                    "  region {},{} {}x{}",
                    region.x, region.y, region.width, region.height
                );
            }
            out.push('\n');
        }

        out
    }
}
