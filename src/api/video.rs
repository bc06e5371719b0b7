//! 视频场景切换 / 界面交互检测

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

use crate::core::video::{
    DetectionConfig, DetectionError, DetectionReport, DetectionSession, FramePersister,
    FrameSource, ImageSequenceSource, JpegDirectoryPersister,
};

/// 视频事件检测器，每次检测使用独立会话
///
/// ```no_run
/// use scene_events::core::video::DetectionConfig;
/// use scene_events::VideoEventDetector;
///
/// let detector = VideoEventDetector::create(DetectionConfig::for_screen_recording())?;
/// let report = detector.detect_image_sequence("frames/", 30.0, Some("scenes/".as_ref()))?;
/// println!("{}", report.to_listing());
/// # Ok::<(), scene_events::DetectionError>(())
/// ```
pub struct VideoEventDetector {
    config: DetectionConfig,
    cancel: Arc<AtomicBool>,
}

impl VideoEventDetector {
    pub fn create(config: DetectionConfig) -> Result<Self, DetectionError> {
        config.validate()?;
        info!(
            "🎬 VideoEventDetector: created (scene threshold {}, stride {}, interaction threshold {})",
            config.scene_threshold, config.frame_sample_stride, config.interaction_threshold
        );
        Ok(Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 从 JSON 配置文件创建，缺省字段取默认值
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, DetectionError> {
        Self::create(DetectionConfig::from_json_file(path)?)
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// 请求中止正在进行的检测，已检测到的事件会保留在报告里
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn detect(
        &self,
        source: &mut dyn FrameSource,
        persister: Option<&dyn FramePersister>,
    ) -> Result<DetectionReport, DetectionError> {
        let session = self.open_session(source)?;
        Ok(session.run(source, persister, Some(&self.cancel)))
    }

    pub fn detect_with_progress<F>(
        &self,
        source: &mut dyn FrameSource,
        persister: Option<&dyn FramePersister>,
        on_progress: F,
    ) -> Result<DetectionReport, DetectionError>
    where
        F: FnMut(f64) + Send + 'static,
    {
        let mut session = self.open_session(source)?;
        session.set_progress_callback(on_progress);
        Ok(session.run(source, persister, Some(&self.cancel)))
    }

    /// 检测目录中的图片序列；给定 `frames_out` 时把场景帧写成 JPEG
    pub fn detect_image_sequence(
        &self,
        dir: impl AsRef<Path>,
        frame_rate: f64,
        frames_out: Option<&Path>,
    ) -> Result<DetectionReport, DetectionError> {
        let mut source = ImageSequenceSource::open(dir, frame_rate)?;
        let persister = frames_out.map(JpegDirectoryPersister::new).transpose()?;
        self.detect(
            &mut source,
            persister.as_ref().map(|p| p as &dyn FramePersister),
        )
    }

    fn open_session(&self, source: &dyn FrameSource) -> Result<DetectionSession, DetectionError> {
        self.cancel.store(false, Ordering::Relaxed);
        DetectionSession::for_source(&self.config, source)
    }
}

impl Drop for VideoEventDetector {
    fn drop(&mut self) {
        info!("🗑️ VideoEventDetector: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::{Frame, InMemorySource, PixelFormat};
    use image::{Rgb, RgbImage};

    fn frames(fills: &[u8]) -> Vec<Frame> {
        fills
            .iter()
            .enumerate()
            .map(|(i, &fill)| {
                Frame::new(24, 24, PixelFormat::Gray8, vec![fill; 24 * 24], 0, i as u64)
            })
            .collect()
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let config = DetectionConfig {
            scene_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            VideoEventDetector::create(config),
            Err(DetectionError::Configuration(_))
        ));
    }

    #[test]
    fn test_detect_is_repeatable() {
        let config = DetectionConfig {
            scene_debounce_frames: 0,
            ..Default::default()
        };
        let detector = VideoEventDetector::create(config).unwrap();
        let fills = [0u8, 0, 255, 255, 0, 0];

        let first = detector
            .detect(&mut InMemorySource::new(frames(&fills), 30.0), None)
            .unwrap();
        let second = detector
            .detect(&mut InMemorySource::new(frames(&fills), 30.0), None)
            .unwrap();

        let indices: Vec<u64> = first.scenes.iter().map(|s| s.frame_index).collect();
        assert_eq!(indices, vec![2, 4]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_source_frame_rate() {
        let detector = VideoEventDetector::create(DetectionConfig::default()).unwrap();
        let result = detector.detect(&mut InMemorySource::new(frames(&[1, 2]), -1.0), None);
        assert!(matches!(result, Err(DetectionError::Configuration(_))));
    }

    #[test]
    fn test_cancel_from_progress_callback() {
        let config = DetectionConfig {
            scene_threshold: 0.5,
            scene_debounce_frames: 0,
            ..Default::default()
        };
        let detector = VideoEventDetector::create(config).unwrap();
        let fills: Vec<u8> = (0..40).map(|i| if i % 2 == 0 { 0 } else { 255 }).collect();

        let handle = detector.cancel_handle();
        let report = detector
            .detect_with_progress(
                &mut InMemorySource::new(frames(&fills), 30.0),
                None,
                move |progress| {
                    if progress >= 0.5 {
                        handle.store(true, Ordering::Relaxed);
                    }
                },
            )
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.frames_processed, 20);
        assert_eq!(report.scenes.len(), 19);

        // 下一次检测不受上次取消影响
        let report = detector
            .detect(&mut InMemorySource::new(frames(&fills), 30.0), None)
            .unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.scenes.len(), 39);
    }

    #[test]
    fn test_detect_image_sequence_stores_scene_frames() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for (i, value) in [10u8, 10, 240].iter().enumerate() {
            RgbImage::from_pixel(32, 32, Rgb([*value, *value, *value]))
                .save(input.path().join(format!("frame_{:05}.png", i + 1)))
                .unwrap();
        }

        let detector = VideoEventDetector::create(DetectionConfig::default()).unwrap();
        let report = detector
            .detect_image_sequence(input.path(), 1.0, Some(output.path()))
            .unwrap();

        assert_eq!(report.scenes.len(), 1);
        let scene = &report.scenes[0];
        assert_eq!(scene.frame_index, 2);
        let stored = scene.stored_frame.as_ref().expect("stored frame");
        assert!(stored.ends_with("scene_0001_00-00-02.jpg"));
        assert!(stored.exists());
        assert!(report.to_listing().contains("scene_0001_00-00-02.jpg"));
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detector.json");
        std::fs::write(&path, r#"{ "scene_threshold": 0.25, "frame_sample_stride": 3 }"#).unwrap();

        let detector = VideoEventDetector::from_config_file(&path).unwrap();
        assert_eq!(detector.config().scene_threshold, 0.25);
        assert_eq!(detector.config().frame_sample_stride, 3);
        assert_eq!(
            detector.config().scene_debounce_frames,
            DetectionConfig::default().scene_debounce_frames
        );
    }
}
