use super::error::DetectionError;

/// 抽帧策略：每 `stride` 帧取一帧，总是包含第 0 帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSampler {
    stride: u32,
}

impl FrameSampler {
    pub fn new(stride: u32) -> Result<Self, DetectionError> {
        if stride == 0 {
            return Err(DetectionError::Configuration(
                "sample stride must be a positive integer".to_string(),
            ));
        }
        Ok(Self { stride })
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn is_sampled(&self, frame_index: u64) -> bool {
        frame_index % self.stride as u64 == 0
    }

    /// Lazily yields `0, stride, 2*stride, ...` below `total_frames`.
    pub fn indices(&self, total_frames: u64) -> SampledIndices {
        SampledIndices {
            next: 0,
            stride: self.stride as u64,
            total_frames,
        }
    }

    pub fn sampled_count(&self, total_frames: u64) -> u64 {
        total_frames.div_ceil(self.stride as u64)
    }
}

#[derive(Debug, Clone)]
pub struct SampledIndices {
    next: u64,
    stride: u64,
    total_frames: u64,
}

impl Iterator for SampledIndices {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next >= self.total_frames {
            return None;
        }
        let current = self.next;
        self.next = self.next.saturating_add(self.stride);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.next >= self.total_frames {
            0
        } else {
            ((self.total_frames - self.next).div_ceil(self.stride)) as usize
        };
        (remaining, Some(remaining))
    }
}
