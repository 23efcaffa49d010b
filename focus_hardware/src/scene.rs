//! Synthetic camera looking at a textured target through the simulated lens.
//!
//! Each frame is a blend of a sharp block texture and a heavily blurred copy
//! of it; the blend weight falls off with the distance between the lens and
//! the in-focus position, so sharpness peaks at exactly one lens position.

use std::time::Duration;

use focus_traits::{Frame, FrameSource};
use image::{GrayImage, Luma, Rgb, imageops};

use crate::SimulatedLens;

#[derive(Debug, Clone)]
pub struct SceneCfg {
    pub width: u32,
    pub height: u32,
    /// Lens position at which the scene is in focus.
    pub peak: i32,
    /// Defocus distance at which texture contrast has halved.
    pub depth_of_field: f64,
    /// Peak amplitude of per-pixel sensor noise.
    pub noise: u8,
    pub seed: u32,
    /// Stop producing frames after this many (camera stall).
    pub stall_after: Option<u64>,
}

impl Default for SceneCfg {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            peak: 643,
            depth_of_field: 120.0,
            noise: 2,
            seed: 0x5EED_F0C5,
            stall_after: None,
        }
    }
}

/// Side of one texture block in pixels.
const BLOCK: u32 = 4;
/// Blur applied to the texture for the fully defocused image.
const DEFOCUS_SIGMA: f32 = 3.0;

#[inline]
fn xorshift(state: &mut u32) -> u32 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *state = x;
    x
}

pub struct SyntheticScene {
    lens: SimulatedLens,
    cfg: SceneCfg,
    sharp: GrayImage,
    soft: GrayImage,
    rng: u32,
    frames: u64,
}

impl SyntheticScene {
    pub fn new(lens: SimulatedLens, cfg: SceneCfg) -> Self {
        let seed = cfg.seed.max(1);
        let sharp = GrayImage::from_fn(cfg.width, cfg.height, |x, y| {
            // Hash the block coordinates so the texture is stable per seed.
            let mut h = (seed
                ^ (x / BLOCK).wrapping_mul(0x9E37_79B1)
                ^ (y / BLOCK).wrapping_mul(0x85EB_CA77))
                .max(1);
            let v = xorshift(&mut h) % 176;
            Luma([40 + v as u8])
        });
        let soft = imageops::blur(&sharp, DEFOCUS_SIGMA);
        Self {
            lens,
            rng: seed,
            cfg,
            sharp,
            soft,
            frames: 0,
        }
    }

    pub fn lens(&self) -> &SimulatedLens {
        &self.lens
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Texture contrast in (0, 1] at lens position `position`.
    pub fn contrast_at(&self, position: i32) -> f64 {
        let d = f64::from(position - self.cfg.peak) / self.cfg.depth_of_field;
        1.0 / (1.0 + d * d)
    }

    /// Render the view at the lens' current physical position.
    pub fn render(&mut self) -> Frame {
        let c = self.contrast_at(self.lens.physical());
        let noise = i32::from(self.cfg.noise);
        let span = (2 * noise + 1) as u32;
        let mut rng = self.rng;
        let frame = Frame::from_fn(self.cfg.width, self.cfg.height, |x, y| {
            let s = f64::from(self.sharp.get_pixel(x, y)[0]);
            let b = f64::from(self.soft.get_pixel(x, y)[0]);
            let n = if noise > 0 {
                (xorshift(&mut rng) % span) as i32 - noise
            } else {
                0
            };
            let v = (b + (s - b) * c).round() as i32 + n;
            let v = v.clamp(0, 255) as u8;
            Rgb([v, v, v])
        });
        self.rng = rng;
        frame
    }
}

impl FrameSource for SyntheticScene {
    fn next_frame(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Frame>, Box<dyn std::error::Error + Send + Sync>> {
        if self.cfg.stall_after.is_some_and(|n| self.frames >= n) {
            // A stalled camera waits out the timeout and delivers nothing.
            std::thread::sleep(timeout);
            return Ok(None);
        }
        self.lens.tick();
        self.frames += 1;
        Ok(Some(self.render()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimLensCfg;

    fn scene(peak: i32) -> SyntheticScene {
        let lens = SimulatedLens::new(SimLensCfg {
            latency_frames: 0,
            ..SimLensCfg::default()
        });
        SyntheticScene::new(
            lens,
            SceneCfg {
                peak,
                noise: 0,
                ..SceneCfg::default()
            },
        )
    }

    fn spread(frame: &Frame) -> u8 {
        let (lo, hi) = frame
            .pixels()
            .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        hi - lo
    }

    #[test]
    fn contrast_peaks_at_focus() {
        let s = scene(500);
        assert_eq!(s.contrast_at(500), 1.0);
        assert!((s.contrast_at(620) - 0.5).abs() < 1e-12);
        assert!(s.contrast_at(450) > s.contrast_at(400));
        assert!(s.contrast_at(550) > s.contrast_at(600));
    }

    #[test]
    fn in_focus_frame_has_more_contrast() {
        let mut s = scene(500);
        s.lens().command(500).unwrap();
        let focused = s.render();
        s.lens().command(1100).unwrap();
        let defocused = s.render();
        assert!(spread(&focused) > spread(&defocused));
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut a = scene(300);
        let mut b = scene(300);
        assert_eq!(a.render(), b.render());
    }

    #[test]
    fn stalls_after_configured_frames() {
        let lens = SimulatedLens::new(SimLensCfg::default());
        let mut s = SyntheticScene::new(
            lens,
            SceneCfg {
                stall_after: Some(1),
                ..SceneCfg::default()
            },
        );
        let t = Duration::from_millis(1);
        assert!(s.next_frame(t).unwrap().is_some());
        assert!(s.next_frame(t).unwrap().is_none());
        assert_eq!(s.frames(), 1);
    }
}
