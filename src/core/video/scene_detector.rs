use image::GrayImage;
use log::{debug, info};

use super::error::DetectionError;
use super::event::SceneChangeEvent;
use super::frame::Frame;
use super::similarity::{SimilarityScorer, SsimScorer};
use super::state_machine::{DetectorState, StateAction, StateMachine};
use super::timestamp::{format_hms, TimestampConverter};

/// 场景切换检测：相邻采样帧 SSIM 低于阈值且不在冷却期内时产出事件
pub struct SceneChangeDetector {
    scorer: Box<dyn SimilarityScorer>,
    threshold: f64,
    max_dimension: u32,
    state_machine: StateMachine,
    previous: Option<GrayImage>,
    last_observed: Option<u64>,
    emitted: u32,
}

impl SceneChangeDetector {
    pub fn new(threshold: f64, debounce_frames: u32, max_dimension: u32) -> Self {
        Self::with_scorer(
            Box::new(SsimScorer::new()),
            threshold,
            debounce_frames,
            max_dimension,
        )
    }

    pub fn with_scorer(
        scorer: Box<dyn SimilarityScorer>,
        threshold: f64,
        debounce_frames: u32,
        max_dimension: u32,
    ) -> Self {
        Self {
            scorer,
            threshold,
            max_dimension,
            state_machine: StateMachine::new(debounce_frames),
            previous: None,
            last_observed: None,
            emitted: 0,
        }
    }

    /// Compares `frame` with the previously observed sampled frame.
    ///
    /// An `IncompatibleFrame` error leaves the detector untouched, so the
    /// caller can skip the frame and keep feeding.
    pub fn observe(
        &mut self,
        frame: &Frame,
        clock: &TimestampConverter,
    ) -> Result<Option<SceneChangeEvent>, DetectionError> {
        if let Some(last) = self.last_observed {
            if frame.frame_number <= last {
                return Err(DetectionError::incompatible(
                    frame.frame_number,
                    format!("out of order, previous sampled frame was {}", last),
                ));
            }
        }

        let gray = frame.to_analysis_luma(self.max_dimension)?;
        let similarity = match &self.previous {
            Some(previous) => Some(
                self.scorer
                    .score(previous, &gray)
                    .map_err(|err| match err {
                        DetectionError::IncompatibleFrame { reason, .. } => {
                            DetectionError::incompatible(frame.frame_number, reason)
                        }
                        other => other,
                    })?,
            ),
            None => None,
        };

        self.previous = Some(gray);
        self.last_observed = Some(frame.frame_number);

        let triggered = similarity.is_some_and(|s| s < self.threshold);
        let action = self
            .state_machine
            .process_frame(frame.frame_number, triggered);

        match (action, similarity) {
            (StateAction::Emit, Some(similarity)) => {
                self.emitted += 1;
                let timestamp = clock.to_duration(frame.frame_number);
                info!(
                    "🎬 Scene change detected at {} (frame {}, similarity: {:.3})",
                    format_hms(timestamp),
                    frame.frame_number,
                    similarity
                );
                Ok(Some(SceneChangeEvent {
                    sequence_number: self.emitted,
                    frame_index: frame.frame_number,
                    timestamp,
                    similarity,
                    stored_frame: None,
                }))
            }
            (StateAction::Suppress, Some(similarity)) => {
                debug!(
                    "scene drop at frame {} suppressed by cooldown (similarity: {:.3})",
                    frame.frame_number, similarity
                );
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    pub fn state(&self) -> &DetectorState {
        self.state_machine.current_state()
    }

    pub fn frames_observed(&self) -> u64 {
        self.state_machine.frame_count()
    }

    pub fn last_emitted_frame(&self) -> Option<u64> {
        self.state_machine.last_emitted()
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }
}
