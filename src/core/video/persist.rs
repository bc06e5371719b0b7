//! 关键帧落盘

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageOutputFormat};
use log::debug;

use super::error::DetectionError;
use super::event::SceneChangeEvent;
use super::frame::Frame;
use super::timestamp::format_hms;

/// 场景事件对应的帧写入存储，返回引用路径
pub trait FramePersister: Send + Sync {
    fn persist(&self, frame: &Frame, event: &SceneChangeEvent) -> Result<PathBuf, DetectionError>;
}

/// 写 JPEG 到指定目录：`scene_0001_00-01-05.jpg`
pub struct JpegDirectoryPersister {
    output_dir: PathBuf,
    quality: u8,
}

impl JpegDirectoryPersister {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, DetectionError> {
        Self::with_quality(output_dir, 90)
    }

    pub fn with_quality(output_dir: impl AsRef<Path>, quality: u8) -> Result<Self, DetectionError> {
        if !(1..=100).contains(&quality) {
            return Err(DetectionError::Configuration(format!(
                "jpeg quality must be within 1..=100, got {}",
                quality
            )));
        }
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            quality,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn file_name(event: &SceneChangeEvent) -> String {
        format!(
            "scene_{:04}_{}.jpg",
            event.sequence_number,
            format_hms(event.timestamp).replace(':', "-")
        )
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, DetectionError> {
        let rgb = frame.to_rgb_image()?;
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(rgb).write_to(&mut buffer, ImageOutputFormat::Jpeg(self.quality))?;
        Ok(buffer.into_inner())
    }
}

impl FramePersister for JpegDirectoryPersister {
    fn persist(&self, frame: &Frame, event: &SceneChangeEvent) -> Result<PathBuf, DetectionError> {
        let to_persistence_error = |reason: String| DetectionError::Persistence {
            frame_number: event.frame_index,
            reason,
        };

        let jpeg = self
            .encode(frame)
            .map_err(|err| to_persistence_error(err.to_string()))?;
        let path = self.output_dir.join(Self::file_name(event));
        fs::write(&path, &jpeg)
            .map_err(|err| to_persistence_error(format!("{}: {}", path.display(), err)))?;

        debug!("💾 Saved scene frame {} ({} bytes)", path.display(), jpeg.len());
        Ok(path)
    }
}
