use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use super::error::DetectionError;
use super::frame::Frame;
use super::timestamp::TimestampConverter;

/// 顺序读取的帧来源，由调用方持有
pub trait FrameSource {
    fn frame_count(&self) -> u64;

    fn frame_rate(&self) -> f64;

    /// 按播放顺序解码下一帧，读完返回 None
    fn next_frame(&mut self) -> Option<Result<Frame, DetectionError>>;

    /// Advances past the next frame without decoding it when possible.
    fn skip_frame(&mut self) -> bool {
        self.next_frame().is_some()
    }
}

/// 已解码帧的内存来源
pub struct InMemorySource {
    frames: VecDeque<Frame>,
    total: u64,
    frame_rate: f64,
}

impl InMemorySource {
    pub fn new(frames: Vec<Frame>, frame_rate: f64) -> Self {
        let total = frames.len() as u64;
        Self {
            frames: frames.into(),
            total,
            frame_rate,
        }
    }
}

impl FrameSource for InMemorySource {
    fn frame_count(&self) -> u64 {
        self.total
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn next_frame(&mut self) -> Option<Result<Frame, DetectionError>> {
        self.frames.pop_front().map(Ok)
    }

    fn skip_frame(&mut self) -> bool {
        self.frames.pop_front().is_some()
    }
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// 目录中按文件名排序的图片序列（如 ffmpeg 导出的 frame_00001.png）
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    clock: TimestampConverter,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, frame_rate: f64) -> Result<Self, DetectionError> {
        let clock = TimestampConverter::new(frame_rate)?;
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(DetectionError::Source(format!(
                "frame directory not found: {}",
                dir.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                paths.push(path);
            }
        }
        paths.sort();

        info!(
            "📂 Image sequence {}: {} frames at {:.2} fps",
            dir.display(),
            paths.len(),
            frame_rate
        );
        Ok(Self {
            paths,
            cursor: 0,
            clock,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn frame_count(&self) -> u64 {
        self.paths.len() as u64
    }

    fn frame_rate(&self) -> f64 {
        self.clock.frame_rate()
    }

    fn next_frame(&mut self) -> Option<Result<Frame, DetectionError>> {
        let path = self.paths.get(self.cursor)?;
        let frame_number = self.cursor as u64;
        self.cursor += 1;

        let timestamp_ms = self.clock.to_duration(frame_number).as_millis() as u64;
        let decoded = image::open(path)
            .map(|img| Frame::from_rgba_image(img.to_rgba8(), timestamp_ms, frame_number))
            .map_err(|err| {
                DetectionError::incompatible(frame_number, format!("{}: {}", path.display(), err))
            });
        Some(decoded)
    }

    fn skip_frame(&mut self) -> bool {
        if self.cursor < self.paths.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }
}
