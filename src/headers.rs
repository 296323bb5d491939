// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Produces SPS and PPS NAL unit bytes for the current sequence/picture
//! parameter set.

use crate::bitstream::nalu;
use crate::bitstream::BitWriter;
use crate::config::EncoderConfig;

/// Sequence Parameter Set fields this encoder emits. Only the subset
/// the header builder emits is represented; VUI is never present.
#[derive(Clone, Debug)]
pub struct Sps {
    pub profile_idc: u8,
    pub constraint_set3_flag: bool,
    pub level_idc: u8,
    pub seq_parameter_set_id: u8,
    pub log2_max_frame_num_minus4: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub max_num_ref_frames: u32,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub direct_8x8_inference_flag: bool,
    pub frame_cropping: Option<FrameCropping>,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct FrameCropping {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// Picture Parameter Set fields this encoder emits.
#[derive(Clone, Debug)]
pub struct Pps {
    pub pic_parameter_set_id: u8,
    pub seq_parameter_set_id: u8,
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub constrained_intra_pred_flag: bool,
    pub is_high_profile: bool,
    pub transform_8x8_mode_flag: bool,
}

fn ceil_log2(v: u32) -> u32 {
    if v <= 1 {
        0
    } else {
        32 - (v - 1).leading_zeros()
    }
}

/// Derives the `log2_max_frame_num_minus4` and
/// `log2_max_pic_order_cnt_lsb_minus4` SPS fields from `K_effective`,
/// wide enough to hold frame numbers and POC LSBs across one GOP.
fn derive_log2_fields(k_effective: u32) -> (u32, u32) {
    let log_gop = ceil_log2(k_effective.max(1));
    let log2_max_frame_num_minus4 = log_gop.saturating_sub(4);
    let log2_max_pic_order_cnt_lsb_minus4 =
        ceil_log2(2u32.saturating_mul(k_effective)).saturating_sub(4).min(12);
    (log2_max_frame_num_minus4, log2_max_pic_order_cnt_lsb_minus4)
}

/// Computes the SPS frame-cropping rectangle, or `None` when both
/// dimensions are already multiples of 16.
fn derive_cropping(width: u32, height: u32) -> Option<FrameCropping> {
    let mb_w = (width + 15) / 16;
    let mb_h = (height + 15) / 16;
    let pad_w = mb_w * 16 - width;
    let pad_h = mb_h * 16 - height;
    if pad_w == 0 && pad_h == 0 {
        return None;
    }
    Some(FrameCropping { left: 0, right: pad_w / 2, top: 0, bottom: pad_h / 2 })
}

/// Produces the raw RBSP bytes for an SPS, with no emulation prevention
/// applied -- that's `nalu::wrap_rbsp`'s job once this payload is framed
/// into a NAL unit.
fn write_sps_rbsp(sps: &Sps) -> Vec<u8> {
    let mut w = BitWriter::new();

    w.put_bits(8, sps.profile_idc as u32);
    w.put_bits(1, 0); // constraint_set0_flag
    w.put_bits(1, 0); // constraint_set1_flag
    w.put_bits(1, 0); // constraint_set2_flag
    w.put_bits(1, sps.constraint_set3_flag as u32);
    w.put_bits(1, 0); // constraint_set4_flag
    w.put_bits(1, 0); // constraint_set5_flag
    w.put_bits(2, 0); // reserved_zero_2bits
    w.put_bits(8, sps.level_idc as u32);
    w.exp_golomb_ue(sps.seq_parameter_set_id as u32);

    if sps.profile_idc == 100 || sps.profile_idc == 110 {
        w.exp_golomb_ue(1); // chroma_format_idc: 4:2:0
        w.exp_golomb_ue(0); // bit_depth_luma_minus8
        w.exp_golomb_ue(0); // bit_depth_chroma_minus8
        w.put_bits(1, 0); // qpprime_y_zero_transform_bypass_flag
        w.put_bits(1, 0); // seq_scaling_matrix_present_flag
    }

    w.exp_golomb_ue(sps.log2_max_frame_num_minus4);
    w.exp_golomb_ue(0); // pic_order_cnt_type
    w.exp_golomb_ue(sps.log2_max_pic_order_cnt_lsb_minus4);
    w.exp_golomb_ue(sps.max_num_ref_frames);
    w.put_bits(1, 0); // gaps_in_frame_num_value_allowed_flag
    w.exp_golomb_ue(sps.pic_width_in_mbs_minus1);
    w.exp_golomb_ue(sps.pic_height_in_map_units_minus1);
    w.put_bits(1, 1); // frame_mbs_only_flag
    w.put_bits(1, sps.direct_8x8_inference_flag as u32);

    match sps.frame_cropping {
        Some(crop) => {
            w.put_bits(1, 1);
            w.exp_golomb_ue(crop.left);
            w.exp_golomb_ue(crop.right);
            w.exp_golomb_ue(crop.top);
            w.exp_golomb_ue(crop.bottom);
        }
        None => w.put_bits(1, 0),
    }

    w.put_bits(1, 0); // vui_parameters_present_flag
    w.rbsp_trailing();
    w.into_bytes()
}

/// Produces the raw RBSP bytes for a PPS, with no emulation prevention
/// applied -- that's `nalu::wrap_rbsp`'s job once this payload is framed
/// into a NAL unit.
fn write_pps_rbsp(pps: &Pps) -> Vec<u8> {
    let mut w = BitWriter::new();

    w.exp_golomb_ue(pps.pic_parameter_set_id as u32);
    w.exp_golomb_ue(pps.seq_parameter_set_id as u32);
    w.put_bits(1, pps.entropy_coding_mode_flag as u32);
    w.put_bits(1, pps.bottom_field_pic_order_in_frame_present_flag as u32);
    w.exp_golomb_ue(0); // num_slice_groups_minus1 (full-frame, single slice group)
    w.exp_golomb_ue(pps.num_ref_idx_l0_default_active_minus1);
    w.exp_golomb_ue(pps.num_ref_idx_l1_default_active_minus1);
    w.put_bits(1, 0); // weighted_pred_flag
    w.put_bits(2, 0); // weighted_bipred_idc
    w.exp_golomb_se(0); // pic_init_qp_minus26
    w.exp_golomb_se(0); // pic_init_qs_minus26
    w.exp_golomb_se(0); // chroma_qp_index_offset
    w.put_bits(1, 1); // deblocking_filter_control_present_flag
    w.put_bits(1, pps.constrained_intra_pred_flag as u32);
    w.put_bits(1, 0); // redundant_pic_cnt_present_flag

    if pps.is_high_profile {
        w.put_bits(1, pps.transform_8x8_mode_flag as u32);
        w.put_bits(1, 0); // pic_scaling_matrix_present_flag
        w.exp_golomb_se(0); // second_chroma_qp_index_offset
    }

    w.rbsp_trailing();
    w.into_bytes()
}

/// Builds SPS/PPS NAL units for a fixed encoder configuration, tracking
/// the active parameter-set ids across a sequence.
pub struct HeaderBuilder {
    config: EncoderConfig,
    log2_max_frame_num_minus4: u32,
    log2_max_pic_order_cnt_lsb_minus4: u32,
    cropping: Option<FrameCropping>,
    active_sps_id: u8,
    active_pps_id: u8,
    sequence_started: bool,
}

impl HeaderBuilder {
    pub fn new(config: &EncoderConfig) -> Self {
        let (log2_max_frame_num_minus4, log2_max_pic_order_cnt_lsb_minus4) =
            derive_log2_fields(config.k_effective());
        let cropping =
            derive_cropping(config.resolution.width, config.resolution.height);
        HeaderBuilder {
            config: config.clone(),
            log2_max_frame_num_minus4,
            log2_max_pic_order_cnt_lsb_minus4,
            cropping,
            active_sps_id: 0,
            active_pps_id: 0,
            sequence_started: false,
        }
    }

    fn current_sps(&self) -> Sps {
        Sps {
            profile_idc: self.config.profile.idc(),
            constraint_set3_flag: false,
            level_idc: self.config.level.0,
            seq_parameter_set_id: self.active_sps_id,
            log2_max_frame_num_minus4: self.log2_max_frame_num_minus4,
            log2_max_pic_order_cnt_lsb_minus4: self.log2_max_pic_order_cnt_lsb_minus4,
            max_num_ref_frames: self.config.max_reference_frame_count,
            pic_width_in_mbs_minus1: self.config.resolution.mb_width() - 1,
            pic_height_in_map_units_minus1: self.config.resolution.mb_height() - 1,
            direct_8x8_inference_flag: self.config.direct_8x8_inference,
            frame_cropping: self.cropping,
        }
    }

    fn current_pps(&self) -> Pps {
        Pps {
            pic_parameter_set_id: self.active_pps_id,
            seq_parameter_set_id: self.active_sps_id,
            entropy_coding_mode_flag: self.config.entropy_coding_mode,
            bottom_field_pic_order_in_frame_present_flag: false,
            num_ref_idx_l0_default_active_minus1: 0,
            num_ref_idx_l1_default_active_minus1: 0,
            constrained_intra_pred_flag: self.config.constrained_intra_pred,
            is_high_profile: self.config.profile.is_high(),
            transform_8x8_mode_flag: false,
        }
    }

    /// Builds the header bytes for the current frame: an SPS NAL when
    /// this is the first frame (or `force_sps` requests a sequence
    /// change), followed by a PPS NAL, right-padded with zeros up to
    /// `header_alignment` so slice data begins at an aligned offset.
    pub fn build(&mut self, force_sps: bool, header_alignment: usize) -> Vec<u8> {
        let mut out = Vec::new();

        if !self.sequence_started || force_sps {
            if self.sequence_started {
                self.active_sps_id = self.active_sps_id.wrapping_add(1);
            }
            let sps_rbsp = write_sps_rbsp(&self.current_sps());
            out.extend(nalu::wrap_rbsp(&sps_rbsp, nalu::NAL_REF_IDC_REF, nalu::NAL_TYPE_SPS));
            self.sequence_started = true;
        }

        let pps_rbsp = write_pps_rbsp(&self.current_pps());
        out.extend(nalu::wrap_rbsp(&pps_rbsp, nalu::NAL_REF_IDC_REF, nalu::NAL_TYPE_PPS));

        if header_alignment > 1 {
            let padded = out.len().div_ceil(header_alignment) * header_alignment;
            out.resize(padded, 0);
        }
        out
    }
}
