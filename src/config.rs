// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Encoder configuration, fixed for the lifetime of an [`crate::encoder::Encoder`].

use crate::error::EncoderError;
use crate::Resolution;

/// H.264 profile. Only `Main` is emitted by the header builder by
/// default; the others are accepted here so capability
/// validation can reject combinations the device doesn't support.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Profile {
    Main,
    High,
    High10,
}

impl Profile {
    pub fn idc(&self) -> u8 {
        match self {
            Profile::Main => 77,
            Profile::High => 100,
            Profile::High10 => 110,
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Profile::High | Profile::High10)
    }
}

/// H.264 level. Fixed at 4.2 for this encoder; kept as a type so a
/// future adaptive-level feature (explicitly out of scope here) has
/// somewhere to live without changing this type's shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Level(pub u8);

impl Level {
    pub const L4_2: Level = Level(42);
}

/// Constant-QP rate control, the only rate-control mode implemented
/// (no rate control beyond constant-QP).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConstantQp {
    pub i_frame_qp: u32,
    pub p_frame_qp: u32,
    pub b_frame_qp: u32,
}

impl Default for ConstantQp {
    fn default() -> Self {
        ConstantQp { i_frame_qp: 30, p_frame_qp: 30, b_frame_qp: 30 }
    }
}

/// Rational framerate, `num / den`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Fps {
    pub num: u32,
    pub den: u32,
}

/// Immutable encoder configuration.
#[derive(Clone, Debug)]
pub struct EncoderConfig {
    pub resolution: Resolution,
    pub fps: Fps,
    /// Distance in display order between IDR frames. `0` means infinite
    /// GOP (only the very first frame is IDR).
    pub key_frame_interval: u32,
    /// Number of B-frames between successive reference frames.
    pub b_frames_count: u32,
    /// Upper bound on simultaneously retained references.
    pub max_reference_frame_count: u32,
    pub profile: Profile,
    pub level: Level,
    pub rate_control: ConstantQp,
    /// CABAC (`entropy_coding_mode_flag = 1`) vs CAVLC.
    pub entropy_coding_mode: bool,
    pub direct_8x8_inference: bool,
    pub constrained_intra_pred: bool,
    /// Device-required alignment for the start of slice data within the
    /// output bitstream buffer.
    pub header_alignment: usize,
}

impl EncoderConfig {
    /// Validates the configuration's invariants. Called by
    /// [`crate::encoder::Encoder::new`] before any GPU resource is created.
    pub fn validate(&self) -> Result<(), EncoderError> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(EncoderError::Configuration("width and height must be > 0".into()));
        }
        if self.fps.den == 0 {
            return Err(EncoderError::Configuration("fps denominator must be > 0".into()));
        }
        if self.key_frame_interval > 0
            && self.b_frames_count + 1 > self.key_frame_interval
        {
            return Err(EncoderError::Configuration(format!(
                "bFramesCount + 1 ({}) must be <= keyFrameInterval ({})",
                self.b_frames_count + 1,
                self.key_frame_interval
            )));
        }
        let has_inter = self.b_frames_count > 0 || self.key_frame_interval != 1;
        if has_inter && self.max_reference_frame_count < 1 {
            return Err(EncoderError::Configuration(
                "maxReferenceFrameCount must be >= 1 whenever B > 0 or K != 1".into(),
            ));
        }
        Ok(())
    }

    /// Whether this GOP configuration ever produces inter-predicted
    /// frames (P or B). `K == 1, B == 0` yields an all-IDR stream.
    pub fn gop_has_inter_frames(&self) -> bool {
        self.key_frame_interval != 1
    }

    /// `K_effective` used to size the Exp-Golomb log2 fields in the SPS:
    /// the real `key_frame_interval`, or a fixed sentinel bound when the
    /// GOP is infinite (`key_frame_interval == 0`).
    pub fn k_effective(&self) -> u32 {
        if self.key_frame_interval == 0 {
            32768
        } else {
            self.key_frame_interval
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> EncoderConfig {
        EncoderConfig {
            resolution: Resolution { width: 1280, height: 720 },
            fps: Fps { num: 30, den: 1 },
            key_frame_interval: 30,
            b_frames_count: 2,
            max_reference_frame_count: 2,
            profile: Profile::Main,
            level: Level::L4_2,
            rate_control: ConstantQp::default(),
            entropy_coding_mode: true,
            direct_8x8_inference: true,
            constrained_intra_pred: false,
            header_alignment: 16,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn b_plus_one_exceeding_k_is_rejected() {
        let mut cfg = base_config();
        cfg.key_frame_interval = 2;
        cfg.b_frames_count = 5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_reference_frames_with_inter_gop_is_rejected() {
        let mut cfg = base_config();
        cfg.max_reference_frame_count = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn all_idr_stream_tolerates_zero_references() {
        let mut cfg = base_config();
        cfg.key_frame_interval = 1;
        cfg.b_frames_count = 0;
        cfg.max_reference_frame_count = 0;
        assert!(cfg.validate().is_ok());
        assert!(!cfg.gop_has_inter_frames());
    }

    #[test]
    fn k_effective_sentinel_for_infinite_gop() {
        let mut cfg = base_config();
        cfg.key_frame_interval = 0;
        assert_eq!(cfg.k_effective(), 32768);
    }
}
