use std::borrow::Cow;

use image::imageops::{self, FilterType};
use image::GrayImage;
use rayon::prelude::*;

use super::error::DetectionError;
use super::frame::Frame;

const WINDOW_SIZE: u32 = 7;
const DATA_RANGE: f64 = 255.0;
const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// 结构相似度评分器，返回 [0, 1]，1.0 表示结构完全一致
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, previous: &GrayImage, current: &GrayImage) -> Result<f64, DetectionError>;

    /// Normalizes both frames to luma before scoring.
    fn score_frames(&self, previous: &Frame, current: &Frame) -> Result<f64, DetectionError> {
        let a = previous.to_luma()?;
        let b = current.to_luma()?;
        self.score(&a, &b).map_err(|err| match err {
            DetectionError::IncompatibleFrame { reason, .. } => {
                DetectionError::incompatible(current.frame_number, reason)
            }
            other => other,
        })
    }

    fn name(&self) -> &str {
        "unnamed"
    }
}

/// 尺寸不一致时把两帧都缩小到公共尺寸 `(min(w), min(h))`，任何一轴都不放大。
/// 目标尺寸与参数顺序无关。
pub fn align_pair<'a>(
    a: &'a GrayImage,
    b: &'a GrayImage,
) -> (Cow<'a, GrayImage>, Cow<'a, GrayImage>) {
    let target = (a.width().min(b.width()), a.height().min(b.height()));
    (shrink_to(a, target), shrink_to(b, target))
}

fn shrink_to(img: &GrayImage, (width, height): (u32, u32)) -> Cow<'_, GrayImage> {
    if img.dimensions() == (width, height) {
        Cow::Borrowed(img)
    } else {
        Cow::Owned(imageops::resize(img, width, height, FilterType::Triangle))
    }
}

/// 基于滑动窗口统计量的 SSIM
#[derive(Debug, Clone)]
pub struct SsimScorer {
    window: u32,
}

impl SsimScorer {
    pub fn new() -> Self {
        Self {
            window: WINDOW_SIZE,
        }
    }

    pub fn with_window(window: u32) -> Self {
        Self {
            window: window.max(1),
        }
    }

    fn mean_ssim(&self, x: &GrayImage, y: &GrayImage) -> f64 {
        let (w, h) = x.dimensions();
        let win = self.window.min(w).min(h) as usize;
        let tables = IntegralTables::build(x, y);

        let n = (win * win) as f64;
        let cov_norm = if win * win > 1 { n / (n - 1.0) } else { 1.0 };
        let c1 = (K1 * DATA_RANGE).powi(2);
        let c2 = (K2 * DATA_RANGE).powi(2);

        let cols = w as usize - win + 1;
        let rows = h as usize - win + 1;

        // 按行并行，行内与行间求和顺序固定，结果可复现
        let row_sums: Vec<f64> = (0..rows)
            .into_par_iter()
            .map(|wy| {
                let mut row_sum = 0.0;
                for wx in 0..cols {
                    let s = tables.window(wx, wy, win);
                    let ux = s.x as f64 / n;
                    let uy = s.y as f64 / n;
                    let uxx = s.xx as f64 / n;
                    let uyy = s.yy as f64 / n;
                    let uxy = s.xy as f64 / n;

                    let vx = cov_norm * (uxx - ux * ux);
                    let vy = cov_norm * (uyy - uy * uy);
                    let vxy = cov_norm * (uxy - ux * uy);

                    let numerator = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
                    let denominator = (ux * ux + uy * uy + c1) * (vx + vy + c2);
                    row_sum += numerator / denominator;
                }
                row_sum
            })
            .collect();

        let total: f64 = row_sums.iter().sum();
        total / (rows * cols) as f64
    }
}

impl Default for SsimScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityScorer for SsimScorer {
    fn score(&self, previous: &GrayImage, current: &GrayImage) -> Result<f64, DetectionError> {
        for img in [previous, current] {
            let (w, h) = img.dimensions();
            if w == 0 || h == 0 {
                return Err(DetectionError::incompatible(
                    0,
                    format!("cannot score zero-area image {}x{}", w, h),
                ));
            }
        }

        let (a, b) = align_pair(previous, current);
        if a.as_raw() == b.as_raw() {
            return Ok(1.0);
        }

        let score = self.mean_ssim(&a, &b);
        if !score.is_finite() {
            return Err(DetectionError::incompatible(0, "similarity is not finite"));
        }
        Ok(score.clamp(0.0, 1.0))
    }

    fn name(&self) -> &str {
        "ssim"
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowSums {
    x: u64,
    y: u64,
    xx: u64,
    yy: u64,
    xy: u64,
}

/// 求和面积表（积分图），整数精确累加
struct IntegralTables {
    stride: usize,
    x: Vec<u64>,
    y: Vec<u64>,
    xx: Vec<u64>,
    yy: Vec<u64>,
    xy: Vec<u64>,
}

impl IntegralTables {
    fn build(a: &GrayImage, b: &GrayImage) -> Self {
        let (w, h) = a.dimensions();
        let (w, h) = (w as usize, h as usize);
        let stride = w + 1;
        let len = stride * (h + 1);
        let mut tables = Self {
            stride,
            x: vec![0; len],
            y: vec![0; len],
            xx: vec![0; len],
            yy: vec![0; len],
            xy: vec![0; len],
        };

        let pa = a.as_raw();
        let pb = b.as_raw();
        for row in 0..h {
            let mut acc = WindowSums {
                x: 0,
                y: 0,
                xx: 0,
                yy: 0,
                xy: 0,
            };
            for col in 0..w {
                let va = pa[row * w + col] as u64;
                let vb = pb[row * w + col] as u64;
                acc.x += va;
                acc.y += vb;
                acc.xx += va * va;
                acc.yy += vb * vb;
                acc.xy += va * vb;

                let above = row * stride + col + 1;
                let idx = (row + 1) * stride + col + 1;
                tables.x[idx] = tables.x[above] + acc.x;
                tables.y[idx] = tables.y[above] + acc.y;
                tables.xx[idx] = tables.xx[above] + acc.xx;
                tables.yy[idx] = tables.yy[above] + acc.yy;
                tables.xy[idx] = tables.xy[above] + acc.xy;
            }
        }
        tables
    }

    fn window(&self, x: usize, y: usize, size: usize) -> WindowSums {
        let top_left = y * self.stride + x;
        let top_right = y * self.stride + x + size;
        let bottom_left = (y + size) * self.stride + x;
        let bottom_right = (y + size) * self.stride + x + size;
        let sum = |t: &[u64]| (t[bottom_right] + t[top_left]) - (t[top_right] + t[bottom_left]);

        WindowSums {
            x: sum(&self.x),
            y: sum(&self.y),
            xx: sum(&self.xx),
            yy: sum(&self.yy),
            xy: sum(&self.xy),
        }
    }
}
