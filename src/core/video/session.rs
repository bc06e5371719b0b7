use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};

use super::config::DetectionConfig;
use super::error::DetectionError;
use super::event::{DetectionReport, InteractionEvent, SceneChangeEvent};
use super::frame::Frame;
use super::interaction_detector::{InteractionDetector, InteractionSettings};
use super::persist::FramePersister;
use super::sampler::FrameSampler;
use super::scene_detector::SceneChangeDetector;
use super::similarity::{SimilarityScorer, SsimScorer};
use super::source::FrameSource;
use super::timestamp::TimestampConverter;

type ProgressCallback = Box<dyn FnMut(f64) + Send>;

/// 单个视频的检测会话。
///
/// 两个检测器各自保存上一帧与去抖状态，会话随视频结束而丢弃，
/// 不会有状态泄漏到下一个视频。
pub struct DetectionSession {
    clock: TimestampConverter,
    total_frames: u64,
    progress_log_interval: u64,
    scene_sampler: FrameSampler,
    interaction_sampler: FrameSampler,
    scene: SceneChangeDetector,
    interaction: InteractionDetector,
    /// 交互候选，等场景检测覆盖其前后保护窗口后再确认
    pending_interactions: VecDeque<InteractionEvent>,
    /// 最近一次交给场景检测的采样帧号
    scene_horizon: Option<u64>,
    scene_guard_frames: u64,
    frames_processed: u64,
    skipped_frames: u64,
    persistence_failures: u64,
    scenes: Vec<SceneChangeEvent>,
    interactions: Vec<InteractionEvent>,
    cancelled: bool,
    progress_callback: Option<ProgressCallback>,
}

impl DetectionSession {
    pub fn new(
        config: &DetectionConfig,
        frame_rate: f64,
        total_frames: u64,
    ) -> Result<Self, DetectionError> {
        Self::with_scorer(config, frame_rate, total_frames, Box::new(SsimScorer::new()))
    }

    pub fn for_source(
        config: &DetectionConfig,
        source: &dyn FrameSource,
    ) -> Result<Self, DetectionError> {
        Self::new(config, source.frame_rate(), source.frame_count())
    }

    pub fn with_scorer(
        config: &DetectionConfig,
        frame_rate: f64,
        total_frames: u64,
        scorer: Box<dyn SimilarityScorer>,
    ) -> Result<Self, DetectionError> {
        config.validate()?;
        let clock = TimestampConverter::new(frame_rate)?;
        let scene_sampler = FrameSampler::new(config.frame_sample_stride)?;
        let interaction_sampler =
            FrameSampler::new(config.effective_interaction_stride(frame_rate))?;

        let scene = SceneChangeDetector::with_scorer(
            scorer,
            config.scene_threshold,
            config.scene_debounce_frames,
            config.analysis_max_dimension,
        );
        let scene_guard_frames = clock.frames_for_secs(config.interaction_scene_guard_secs).max(1);
        let interaction = InteractionDetector::new(InteractionSettings {
            threshold: config.interaction_threshold,
            pixel_delta: config.interaction_pixel_delta,
            debounce_frames: config.interaction_debounce_frames,
            max_dimension: config.analysis_max_dimension,
            scene_guard_frames,
        });

        info!(
            "Video info: {} frames, {:.2} FPS, {:.2} seconds (scene stride {}, interaction stride {}, scorer {})",
            total_frames,
            frame_rate,
            clock.to_duration(total_frames).as_secs_f64(),
            scene_sampler.stride(),
            interaction_sampler.stride(),
            scene.scorer_name()
        );

        Ok(Self {
            clock,
            total_frames,
            progress_log_interval: config.progress_log_interval,
            scene_sampler,
            interaction_sampler,
            scene,
            interaction,
            pending_interactions: VecDeque::new(),
            scene_horizon: None,
            scene_guard_frames,
            frames_processed: 0,
            skipped_frames: 0,
            persistence_failures: 0,
            scenes: Vec::new(),
            interactions: Vec::new(),
            cancelled: false,
            progress_callback: None,
        })
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
    }

    /// Whether either detector samples the frame at `frame_index`.
    pub fn wants_frame(&self, frame_index: u64) -> bool {
        self.scene_sampler.is_sampled(frame_index)
            || self.interaction_sampler.is_sampled(frame_index)
    }

    /// 流式接口：按帧号把帧交给需要它的检测器
    pub fn process_frame(&mut self, frame: &Frame, persister: Option<&dyn FramePersister>) {
        let scene_due = self.scene_sampler.is_sampled(frame.frame_number);
        let interaction_due = self.interaction_sampler.is_sampled(frame.frame_number);
        self.observe(frame, scene_due, interaction_due, persister);
    }

    /// 未解码直接跳过的帧，只推进进度
    pub fn skip_frame(&mut self) {
        self.advance();
    }

    /// 解码失败的帧
    pub fn record_unreadable(&mut self, err: DetectionError) {
        self.note_skipped(&err);
        self.advance();
    }

    pub fn progress(&self) -> f64 {
        if self.total_frames == 0 {
            return 1.0;
        }
        (self.frames_processed as f64 / self.total_frames as f64).min(1.0)
    }

    pub fn scenes(&self) -> &[SceneChangeEvent] {
        &self.scenes
    }

    /// Confirmed interactions. Candidates still inside an unsettled scene
    /// guard window are not listed until a later frame or `finish()`.
    pub fn interactions(&self) -> &[InteractionEvent] {
        &self.interactions
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Drives `source` to exhaustion (or cancellation) and returns whatever
    /// was detected. Only frames some detector samples are decoded.
    pub fn run(
        mut self,
        source: &mut dyn FrameSource,
        persister: Option<&dyn FramePersister>,
        cancel: Option<&AtomicBool>,
    ) -> DetectionReport {
        if self.total_frames == 0 {
            info!("Video has no frames, nothing to detect");
            return self.finish();
        }

        let mut scene_indices = self.scene_sampler.indices(self.total_frames).peekable();
        let mut interaction_indices = self
            .interaction_sampler
            .indices(self.total_frames)
            .peekable();

        for index in 0..self.total_frames {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                warn!(
                    "Detection cancelled at frame {}/{}",
                    index, self.total_frames
                );
                self.cancelled = true;
                break;
            }

            let scene_due = scene_indices.next_if_eq(&index).is_some();
            let interaction_due = interaction_indices.next_if_eq(&index).is_some();

            if !scene_due && !interaction_due {
                if !source.skip_frame() {
                    break;
                }
                self.advance();
                continue;
            }

            match source.next_frame() {
                None => break,
                Some(Ok(frame)) => self.observe(&frame, scene_due, interaction_due, persister),
                Some(Err(err)) if err.is_recoverable() => self.record_unreadable(err),
                Some(Err(err)) => {
                    error!("❌ Frame source failed at frame {}: {}", index, err);
                    break;
                }
            }
        }

        if !self.cancelled && self.frames_processed < self.total_frames {
            warn!(
                "Frame source ended early: {}/{} frames",
                self.frames_processed, self.total_frames
            );
        }

        self.finish()
    }

    pub fn finish(mut self) -> DetectionReport {
        // 不会再有场景事件，剩余候选直接按已知场景判定
        self.release_interactions(true);
        info!(
            "Scene detection completed: {} scene changes, {} interactions ({} frames, {} skipped)",
            self.scenes.len(),
            self.interactions.len(),
            self.frames_processed,
            self.skipped_frames
        );
        DetectionReport {
            scenes: self.scenes,
            interactions: self.interactions,
            total_frames: self.total_frames,
            frames_processed: self.frames_processed,
            skipped_frames: self.skipped_frames,
            persistence_failures: self.persistence_failures,
            cancelled: self.cancelled,
        }
    }

    fn observe(
        &mut self,
        frame: &Frame,
        scene_due: bool,
        interaction_due: bool,
        persister: Option<&dyn FramePersister>,
    ) {
        let mut skipped = false;

        // 场景检测先行，交互检测据此屏蔽切换帧附近的变化
        if scene_due {
            self.scene_horizon = Some(frame.frame_number);
            match self.scene.observe(frame, &self.clock) {
                Ok(Some(mut event)) => {
                    self.interaction.note_scene_change(event.frame_index);
                    if let Some(persister) = persister {
                        match persister.persist(frame, &event) {
                            Ok(path) => event.stored_frame = Some(path),
                            Err(err) => {
                                warn!("⚠️ Scene {} kept without stored frame: {}", event.sequence_number, err);
                                self.persistence_failures += 1;
                            }
                        }
                    }
                    self.scenes.push(event);
                }
                Ok(None) => {}
                Err(err) => {
                    self.note_skipped(&err);
                    skipped = true;
                }
            }
        }

        if interaction_due {
            match self.interaction.observe(frame, &self.clock) {
                Ok(Some(event)) => self.pending_interactions.push_back(event),
                Ok(None) => {}
                Err(err) if !skipped => self.note_skipped(&err),
                Err(_) => {}
            }
        }

        self.release_interactions(false);
        self.advance();
    }

    /// 场景采样比交互采样稀疏时，切换可能先被交互检测看到。
    /// 候选要等场景检测越过 `index + guard - 1` 才能确认，
    /// 与任一场景切换相距不足 guard 帧的候选丢弃。
    fn release_interactions(&mut self, flush: bool) {
        while let Some(candidate) = self.pending_interactions.front() {
            let horizon = candidate
                .frame_index
                .saturating_add(self.scene_guard_frames - 1);
            let settled = flush || self.scene_horizon.is_some_and(|h| h >= horizon);
            if !settled {
                break;
            }
            let Some(mut event) = self.pending_interactions.pop_front() else {
                break;
            };

            if self.near_scene_change(event.frame_index) {
                debug!(
                    "interaction at frame {} dropped, within {} frames of a scene change",
                    event.frame_index, self.scene_guard_frames
                );
                continue;
            }
            event.sequence_number = self.interactions.len() as u32 + 1;
            self.interactions.push(event);
        }
    }

    fn near_scene_change(&self, frame_index: u64) -> bool {
        self.scenes
            .iter()
            .rev()
            .any(|scene| scene.frame_index.abs_diff(frame_index) < self.scene_guard_frames)
    }

    fn note_skipped(&mut self, err: &DetectionError) {
        self.skipped_frames += 1;
        warn!("Skipping frame: {}", err);
    }

    fn advance(&mut self) {
        self.frames_processed += 1;

        if self.progress_log_interval > 0 && self.frames_processed % self.progress_log_interval == 0
        {
            info!(
                "Progress: {:.1}% ({}/{} frames)",
                self.progress() * 100.0,
                self.frames_processed,
                self.total_frames
            );
        }

        let progress = self.progress();
        if let Some(callback) = self.progress_callback.as_mut() {
            callback(progress);
        }
    }
}
