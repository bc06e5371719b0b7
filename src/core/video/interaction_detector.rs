use image::GrayImage;
use log::{debug, trace};

use super::error::DetectionError;
use super::event::{InteractionEvent, Region};
use super::frame::Frame;
use super::similarity::align_pair;
use super::state_machine::{DetectorState, StateAction, StateMachine};
use super::timestamp::TimestampConverter;

/// 连通域小于该像素数时不上报区域
const MIN_REGION_PIXELS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionSettings {
    pub threshold: f64,
    pub pixel_delta: u8,
    pub debounce_frames: u32,
    pub max_dimension: u32,
    /// 场景切换后多少帧内不上报交互
    pub scene_guard_frames: u64,
}

/// 帧差结果：整体强度 + 最大变化连通域（分析分辨率坐标）
#[derive(Debug, Clone, PartialEq)]
struct DiffMeasurement {
    magnitude: f64,
    region: Option<Region>,
    analyzed_size: (u32, u32),
}

/// 界面交互检测：相邻帧平均像素差高于阈值即视为一次交互
pub struct InteractionDetector {
    settings: InteractionSettings,
    state_machine: StateMachine,
    previous: Option<GrayImage>,
    last_observed: Option<u64>,
    last_scene_change: Option<u64>,
    emitted: u32,
}

impl InteractionDetector {
    pub fn new(settings: InteractionSettings) -> Self {
        Self {
            state_machine: StateMachine::new(settings.debounce_frames),
            settings,
            previous: None,
            last_observed: None,
            last_scene_change: None,
            emitted: 0,
        }
    }

    /// Interactions right after a scene boundary are part of the transition.
    pub fn note_scene_change(&mut self, frame_index: u64) {
        self.last_scene_change = Some(frame_index);
    }

    fn near_scene_change(&self, frame_index: u64) -> bool {
        match self.last_scene_change {
            Some(scene) if frame_index >= scene => {
                frame_index - scene < self.settings.scene_guard_frames.max(1)
            }
            _ => false,
        }
    }

    pub fn observe(
        &mut self,
        frame: &Frame,
        clock: &TimestampConverter,
    ) -> Result<Option<InteractionEvent>, DetectionError> {
        if let Some(last) = self.last_observed {
            if frame.frame_number <= last {
                return Err(DetectionError::incompatible(
                    frame.frame_number,
                    format!("out of order, previous analyzed frame was {}", last),
                ));
            }
        }

        let gray = frame.to_analysis_luma(self.settings.max_dimension)?;
        let measurement = self
            .previous
            .as_ref()
            .map(|previous| measure(previous, &gray, self.settings.pixel_delta));

        self.previous = Some(gray);
        self.last_observed = Some(frame.frame_number);

        let near_scene = self.near_scene_change(frame.frame_number);
        let triggered = measurement
            .as_ref()
            .is_some_and(|m| m.magnitude > self.settings.threshold && !near_scene);

        if let Some(m) = &measurement {
            trace!(
                "frame {} diff magnitude {:.4} (near scene: {})",
                frame.frame_number,
                m.magnitude,
                near_scene
            );
        }

        let action = self
            .state_machine
            .process_frame(frame.frame_number, triggered);

        match (action, measurement) {
            (StateAction::Emit, Some(m)) => {
                self.emitted += 1;
                let region = m
                    .region
                    .map(|r| scale_region(r, m.analyzed_size, (frame.width, frame.height)));
                debug!(
                    "🖱️ Interaction at frame {} (intensity: {:.3}, region: {:?})",
                    frame.frame_number, m.magnitude, region
                );
                Ok(Some(InteractionEvent {
                    sequence_number: self.emitted,
                    frame_index: frame.frame_number,
                    timestamp: clock.to_duration(frame.frame_number),
                    magnitude: m.magnitude,
                    region,
                }))
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
}

fn measure(previous: &GrayImage, current: &GrayImage, pixel_delta: u8) -> DiffMeasurement {
    let (a, b) = align_pair(previous, current);
    let (w, h) = a.dimensions();

    let mut sum = 0u64;
    let mut mask = Vec::with_capacity(w as usize * h as usize);
    for (pa, pb) in a.as_raw().iter().zip(b.as_raw().iter()) {
        let diff = pa.abs_diff(*pb);
        sum += diff as u64;
        mask.push(diff > pixel_delta);
    }

    let pixels = (w as u64 * h as u64).max(1);
    DiffMeasurement {
        magnitude: sum as f64 / (pixels as f64 * 255.0),
        region: largest_component(&mask, w as usize, h as usize),
        analyzed_size: (w, h),
    }
}

/// 4 邻域最大连通域的外接矩形
fn largest_component(mask: &[bool], width: usize, height: usize) -> Option<Region> {
    let mut visited = vec![false; mask.len()];
    let mut stack = Vec::new();
    let mut best: Option<(usize, Region)> = None;

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }

        visited[start] = true;
        stack.push(start);
        let mut count = 0usize;
        let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
        let (mut max_x, mut max_y) = (0usize, 0usize);

        while let Some(idx) = stack.pop() {
            count += 1;
            let (x, y) = (idx % width, idx / width);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            let mut visit = |n: usize| {
                if mask[n] && !visited[n] {
                    visited[n] = true;
                    stack.push(n);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < width {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - width);
            }
            if y + 1 < height {
                visit(idx + width);
            }
        }

        // 面积相同时保留先扫描到的连通域
        if best.as_ref().map_or(true, |(size, _)| count > *size) {
            best = Some((
                count,
                Region {
                    x: min_x as u32,
                    y: min_y as u32,
                    width: (max_x - min_x + 1) as u32,
                    height: (max_y - min_y + 1) as u32,
                },
            ));
        }
    }

    best.filter(|(count, _)| *count >= MIN_REGION_PIXELS)
        .map(|(_, region)| region)
}

fn scale_region(region: Region, analyzed: (u32, u32), source: (u32, u32)) -> Region {
    let scale = |v: u32, from: u32, to: u32| (v as u64 * to as u64 / from.max(1) as u64) as u32;
    let scale_up = |v: u32, from: u32, to: u32| {
        ((v as u64 * to as u64).div_ceil(from.max(1) as u64)).min(to as u64) as u32
    };

    let x0 = scale(region.x, analyzed.0, source.0);
    let y0 = scale(region.y, analyzed.1, source.1);
    let x1 = scale_up(region.x + region.width, analyzed.0, source.0);
    let y1 = scale_up(region.y + region.height, analyzed.1, source.1);

    Region {
        x: x0,
        y: y0,
        width: x1.saturating_sub(x0).max(1),
        height: y1.saturating_sub(y0).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::frame::PixelFormat;

    fn settings() -> InteractionSettings {
        InteractionSettings {
            threshold: 0.01,
            pixel_delta: 25,
            debounce_frames: 0,
            max_dimension: 320,
            scene_guard_frames: 0,
        }
    }

    fn frame_with_box(
        width: u32,
        height: u32,
        frame_number: u64,
        rect: Option<(u32, u32, u32, u32)>,
    ) -> Frame {
        let mut data = vec![40u8; (width * height) as usize];
        if let Some((bx, by, bw, bh)) = rect {
            for y in by..by + bh {
                for x in bx..bx + bw {
                    data[(y * width + x) as usize] = 240;
                }
            }
        }
        Frame::new(width, height, PixelFormat::Gray8, data, 0, frame_number)
    }

    fn clock() -> TimestampConverter {
        TimestampConverter::new(10.0).unwrap()
    }

    #[test]
    fn test_static_frames_produce_nothing() {
        let mut detector = InteractionDetector::new(settings());
        for i in 0..10 {
            let event = detector
                .observe(&frame_with_box(64, 64, i, None), &clock())
                .unwrap();
            assert!(event.is_none());
        }
        assert_eq!(detector.frames_observed(), 10);
    }

    #[test]
    fn test_local_change_reports_region() {
        let mut detector = InteractionDetector::new(settings());
        detector
            .observe(&frame_with_box(64, 64, 0, None), &clock())
            .unwrap();
        let event = detector
            .observe(&frame_with_box(64, 64, 1, Some((10, 20, 12, 8))), &clock())
            .unwrap()
            .expect("interaction");

        assert_eq!(event.sequence_number, 1);
        assert_eq!(event.frame_index, 1);
        let expected = (12.0 * 8.0 * 200.0) / (64.0 * 64.0 * 255.0);
        assert!((event.magnitude - expected).abs() < 1e-9);
        assert_eq!(
            event.region,
            Some(Region {
                x: 10,
                y: 20,
                width: 12,
                height: 8
            })
        );
    }

    #[test]
    fn test_region_scaled_to_source_coordinates() {
        let config = InteractionSettings {
            max_dimension: 64,
            ..settings()
        };
        let mut detector = InteractionDetector::new(config);
        detector
            .observe(&frame_with_box(128, 128, 0, None), &clock())
            .unwrap();
        let event = detector
            .observe(
                &frame_with_box(128, 128, 1, Some((32, 64, 32, 32))),
                &clock(),
            )
            .unwrap()
            .expect("interaction");

        let region = event.region.expect("region");
        // 缩放滤波会让边缘略微外扩
        assert!(region.x <= 32 && region.x >= 28, "{:?}", region);
        assert!(region.y <= 64 && region.y >= 60, "{:?}", region);
        assert!(region.width >= 32 && region.width <= 40, "{:?}", region);
        assert!(region.height >= 32 && region.height <= 40, "{:?}", region);
    }

    #[test]
    fn test_below_threshold_is_ignored() {
        let config = InteractionSettings {
            threshold: 0.05,
            ..settings()
        };
        let mut detector = InteractionDetector::new(config);
        detector
            .observe(&frame_with_box(64, 64, 0, None), &clock())
            .unwrap();
        // 2x2 像素变化，强度远低于 0.05
        let event = detector
            .observe(&frame_with_box(64, 64, 1, Some((5, 5, 2, 2))), &clock())
            .unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn test_sustained_motion_spaced_by_debounce() {
        let config = InteractionSettings {
            debounce_frames: 3,
            ..settings()
        };
        let mut detector = InteractionDetector::new(config);
        let mut events = Vec::new();
        for i in 0..10u64 {
            // 每帧方块移动，模拟拖拽
            let rect = Some((i as u32 * 5, 10, 6, 6));
            if let Some(event) = detector
                .observe(&frame_with_box(64, 64, i, rect), &clock())
                .unwrap()
            {
                events.push(event.frame_index);
            }
        }
        assert_eq!(events, vec![1, 4, 7]);
    }

    #[test]
    fn test_scene_guard_suppresses_interaction() {
        let config = InteractionSettings {
            scene_guard_frames: 3,
            ..settings()
        };
        let mut detector = InteractionDetector::new(config);
        detector
            .observe(&frame_with_box(64, 64, 0, None), &clock())
            .unwrap();
        detector.note_scene_change(1);
        let event = detector
            .observe(&frame_with_box(64, 64, 1, Some((0, 0, 30, 30))), &clock())
            .unwrap();
        assert!(event.is_none());
        let event = detector
            .observe(&frame_with_box(64, 64, 3, None), &clock())
            .unwrap();
        assert!(event.is_none());
        let event = detector
            .observe(&frame_with_box(64, 64, 4, Some((0, 0, 30, 30))), &clock())
            .unwrap();
        assert_eq!(event.map(|e| e.frame_index), Some(4));
    }

    #[test]
    fn test_tiny_change_has_no_region() {
        let mut detector = InteractionDetector::new(InteractionSettings {
            threshold: 0.0,
            ..settings()
        });
        detector
            .observe(&frame_with_box(32, 32, 0, None), &clock())
            .unwrap();
        let event = detector
            .observe(&frame_with_box(32, 32, 1, Some((3, 3, 1, 2))), &clock())
            .unwrap()
            .expect("interaction");
        assert_eq!(event.region, None);
    }

    #[test]
    fn test_largest_component_wins() {
        let (w, h) = (10, 10);
        let mut mask = vec![false; w * h];
        // 小块 2x2
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            mask[y * w + x] = true;
        }
        // 大块 3x3
        for y in 5..8 {
            for x in 5..8 {
                mask[y * w + x] = true;
            }
        }
        assert_eq!(
            largest_component(&mask, w, h),
            Some(Region {
                x: 5,
                y: 5,
                width: 3,
                height: 3
            })
        );
    }
}
