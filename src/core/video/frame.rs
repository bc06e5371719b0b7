use std::time::Duration;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use super::error::DetectionError;

/// 像素布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Rgba8,
    /// I420：Y 平面后接 U、V 平面（各为半宽半高）
    Yuv420,
}

impl PixelFormat {
    fn expected_len(self, width: usize, height: usize) -> usize {
        match self {
            PixelFormat::Gray8 => width * height,
            PixelFormat::Rgb8 => width * height * 3,
            PixelFormat::Rgba8 => width * height * 4,
            PixelFormat::Yuv420 => {
                let chroma = ((width + 1) / 2) * ((height + 1) / 2);
                width * height + chroma * 2
            }
        }
    }
}

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            format,
            data,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    pub fn from_rgba_image(image: RgbaImage, timestamp_ms: u64, frame_number: u64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(
            width,
            height,
            PixelFormat::Rgba8,
            image.into_raw(),
            timestamp_ms,
            frame_number,
        )
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn check_layout(&self) -> Result<(), DetectionError> {
        if self.width == 0 || self.height == 0 {
            return Err(DetectionError::incompatible(
                self.frame_number,
                format!("zero-area frame {}x{}", self.width, self.height),
            ));
        }
        let expected = self
            .format
            .expected_len(self.width as usize, self.height as usize);
        if self.data.len() < expected {
            return Err(DetectionError::incompatible(
                self.frame_number,
                format!(
                    "{:?} buffer holds {} bytes, {}x{} needs {}",
                    self.format,
                    self.data.len(),
                    self.width,
                    self.height,
                    expected
                ),
            ));
        }
        Ok(())
    }

    fn corrupt(&self) -> DetectionError {
        DetectionError::incompatible(self.frame_number, "pixel buffer could not be wrapped")
    }

    /// 转灰度（单通道亮度）
    pub fn to_luma(&self) -> Result<GrayImage, DetectionError> {
        self.check_layout()?;
        let (w, h) = (self.width, self.height);
        let gray = match self.format {
            PixelFormat::Gray8 => {
                GrayImage::from_raw(w, h, self.data[..self.pixel_count()].to_vec())
            }
            // Y 平面即亮度，无需色彩转换
            PixelFormat::Yuv420 => {
                GrayImage::from_raw(w, h, self.data[..self.pixel_count()].to_vec())
            }
            PixelFormat::Rgb8 => RgbImage::from_raw(w, h, self.data[..self.pixel_count() * 3].to_vec())
                .map(|img| DynamicImage::ImageRgb8(img).to_luma8()),
            PixelFormat::Rgba8 => {
                RgbaImage::from_raw(w, h, self.data[..self.pixel_count() * 4].to_vec())
                    .map(|img| DynamicImage::ImageRgba8(img).to_luma8())
            }
        };
        gray.ok_or_else(|| self.corrupt())
    }

    /// 转灰度并按比例缩小到最长边不超过 `max_dim`，不放大
    pub fn to_analysis_luma(&self, max_dim: u32) -> Result<GrayImage, DetectionError> {
        let gray = self.to_luma()?;
        Ok(downscale_to_fit(gray, max_dim))
    }

    /// 彩色图像，用于落盘
    pub fn to_rgb_image(&self) -> Result<RgbImage, DetectionError> {
        self.check_layout()?;
        let (w, h) = (self.width, self.height);
        let rgb = match self.format {
            PixelFormat::Gray8 => GrayImage::from_raw(w, h, self.data[..self.pixel_count()].to_vec())
                .map(|img| DynamicImage::ImageLuma8(img).to_rgb8()),
            PixelFormat::Rgb8 => RgbImage::from_raw(w, h, self.data[..self.pixel_count() * 3].to_vec()),
            PixelFormat::Rgba8 => {
                RgbaImage::from_raw(w, h, self.data[..self.pixel_count() * 4].to_vec())
                    .map(|img| DynamicImage::ImageRgba8(img).to_rgb8())
            }
            PixelFormat::Yuv420 => Some(self.yuv420_to_rgb()),
        };
        rgb.ok_or_else(|| self.corrupt())
    }

    fn yuv420_to_rgb(&self) -> RgbImage {
        let w = self.width as usize;
        let h = self.height as usize;
        let chroma_w = (w + 1) / 2;
        let chroma_len = chroma_w * ((h + 1) / 2);
        let (y_plane, rest) = self.data.split_at(w * h);
        let (u_plane, v_plane) = rest.split_at(chroma_len);

        let mut rgb = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                let uv_idx = (y / 2) * chroma_w + x / 2;
                let y_val = y_plane[y * w + x] as f32;
                let u_val = u_plane[uv_idx] as f32 - 128.0;
                let v_val = v_plane[uv_idx] as f32 - 128.0;

                rgb.push((y_val + 1.402 * v_val).clamp(0.0, 255.0) as u8);
                rgb.push((y_val - 0.344136 * u_val - 0.714136 * v_val).clamp(0.0, 255.0) as u8);
                rgb.push((y_val + 1.772 * u_val).clamp(0.0, 255.0) as u8);
            }
        }

        RgbImage::from_vec(self.width, self.height, rgb)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

pub(crate) fn downscale_to_fit(gray: GrayImage, max_dim: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let longest = w.max(h);
    if longest <= max_dim {
        return gray;
    }
    let (new_w, new_h) = if w >= h {
        (max_dim, ((h as u64 * max_dim as u64) / w as u64).max(1) as u32)
    } else {
        (((w as u64 * max_dim as u64) / h as u64).max(1) as u32, max_dim)
    };
    imageops::resize(&gray, new_w, new_h, FilterType::Triangle)
}
