//! Focus-quality scoring of a single frame.
//!
//! Pipeline: ROI crop, luminance conversion, optional Gaussian denoise, then an
//! edge metric. Scores are non-negative and only comparable between frames
//! scored with the same configuration.

use focus_traits::Frame;
use image::{GrayImage, imageops};

use crate::config::{Roi, SharpnessCfg, SharpnessMetric};
use crate::error::FocusError;

/// Smallest ROI side the 3x3 kernels can produce a response for.
pub const MIN_ROI_SIDE: u32 = 3;

/// Pixel rectangle `(x, y, width, height)`.
pub type RoiRect = (u32, u32, u32, u32);

/// Build a frame from a packed RGB buffer; `None` when the buffer does not
/// match the dimensions.
pub fn frame_from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Frame> {
    let expected = (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(3)?;
    if data.len() != expected {
        return None;
    }
    Frame::from_raw(width, height, data)
}

#[derive(Debug, Clone)]
pub struct SharpnessEstimator {
    cfg: SharpnessCfg,
}

impl SharpnessEstimator {
    pub fn new(cfg: SharpnessCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &SharpnessCfg {
        &self.cfg
    }

    /// Rectangle scored for a `width` x `height` frame, or `None` if it is too small.
    pub fn roi_rect(&self, width: u32, height: u32) -> Option<RoiRect> {
        let rect = match self.cfg.roi {
            Roi::Full => (0, 0, width, height),
            Roi::Central(fraction) => {
                let f = if fraction.is_finite() {
                    fraction.clamp(0.0, 1.0)
                } else {
                    1.0
                };
                let w = ((width as f32) * f).round() as u32;
                let h = ((height as f32) * f).round() as u32;
                ((width - w.min(width)) / 2, (height - h.min(height)) / 2, w, h)
            }
            Roi::Rect {
                x,
                y,
                width: w,
                height: h,
            } => {
                let x = x.min(width);
                let y = y.min(height);
                (x, y, w.min(width - x), h.min(height - y))
            }
        };
        (rect.2 >= MIN_ROI_SIDE && rect.3 >= MIN_ROI_SIDE).then_some(rect)
    }

    /// Cheap structural check; does not touch pixel data.
    pub fn validate(&self, frame: &Frame) -> Result<RoiRect, FocusError> {
        let (w, h) = frame.dimensions();
        self.roi_rect(w, h).ok_or_else(|| {
            FocusError::InvalidFrame(format!(
                "{w}x{h} frame leaves less than {MIN_ROI_SIDE}x{MIN_ROI_SIDE} pixels to score"
            ))
        })
    }

    /// Score one frame; higher is sharper.
    pub fn score(&self, frame: &Frame) -> Result<f64, FocusError> {
        let (x, y, w, h) = self.validate(frame)?;
        let roi = imageops::crop_imm(frame, x, y, w, h).to_image();
        let mut luma: GrayImage = imageops::grayscale(&roi);
        if self.cfg.blur_sigma > 0.0 {
            luma = imageops::blur(&luma, self.cfg.blur_sigma);
        }
        let score = self.score_luma(&luma);
        tracing::trace!(score, roi_w = w, roi_h = h, "sharpness");
        Ok(score)
    }

    /// Apply the configured metric to an already prepared luminance image.
    pub fn score_luma(&self, luma: &GrayImage) -> f64 {
        let (w, h) = luma.dimensions();
        let (w, h) = (w as usize, h as usize);
        if w < MIN_ROI_SIDE as usize || h < MIN_ROI_SIDE as usize {
            return 0.0;
        }
        match self.cfg.metric {
            SharpnessMetric::LaplacianVariance => laplacian_variance(luma.as_raw(), w, h),
            SharpnessMetric::Tenengrad => {
                tenengrad(luma.as_raw(), w, h, f64::from(self.cfg.edge_floor.max(0.0)))
            }
        }
    }
}

/// Population variance of the 4-neighbour Laplacian over interior pixels.
fn laplacian_variance(px: &[u8], w: usize, h: usize) -> f64 {
    let at = |x: usize, y: usize| i32::from(px[y * w + x]);
    let mut n = 0u64;
    let mut mean = 0.0f64;
    let mut m2 = 0.0f64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let lap = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4 * at(x, y);
            let v = f64::from(lap);
            n += 1;
            let delta = v - mean;
            mean += delta / n as f64;
            m2 += delta * (v - mean);
        }
    }
    if n == 0 { 0.0 } else { (m2 / n as f64).max(0.0) }
}

/// Mean Sobel gradient magnitude over interior pixels; magnitudes below
/// `floor` contribute zero.
fn tenengrad(px: &[u8], w: usize, h: usize, floor: f64) -> f64 {
    let at = |x: usize, y: usize| i32::from(px[y * w + x]);
    let mut n = 0u64;
    let mut sum = 0.0f64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));
            let mag = f64::from(gx * gx + gy * gy).sqrt();
            if mag >= floor {
                sum += mag;
            }
            n += 1;
        }
    }
    if n == 0 { 0.0 } else { sum / n as f64 }
}
