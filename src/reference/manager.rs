// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Maintains the ordered reference-descriptor list the hardware uses to
//! locate reference pictures, and the parallel texture-handle array.

use std::collections::VecDeque;

use crate::device::{GpuDevice, TextureHandle};
use crate::error::{EncoderError, EncoderResult};
use crate::gop::{FrameType, PlannedFrame};
use crate::reference::pool::ReferencePool;

/// One entry of the active reference list: the decoding-time metadata the
/// device needs plus the texture it was reconstructed into.
#[derive(Copy, Clone, Debug)]
pub struct ReferenceDescriptor {
    pub reconstructed_texture_index: u32,
    pub poc_number: u64,
    pub decoding_order_number: u64,
    pub is_long_term_reference: bool,
    pub long_term_picture_idx: u32,
    pub temporal_layer_index: u32,
}

/// Tracks the descriptor list, its parallel texture array, and the
/// reconstructed-picture handle borrowed for the frame in flight.
pub struct ReferenceManager {
    pool: ReferencePool,
    descriptors: VecDeque<ReferenceDescriptor>,
    textures: VecDeque<TextureHandle>,
    current_reconstructed: Option<TextureHandle>,
    is_current_reference: bool,
    current_frame_type: FrameType,
    gop_has_inter_frames: bool,
    max_reference_frame_count: u32,
}

impl ReferenceManager {
    pub fn new(width: u32, height: u32, max_reference_frame_count: u32, gop_has_inter_frames: bool) -> Self {
        ReferenceManager {
            pool: ReferencePool::new(width, height, max_reference_frame_count),
            descriptors: VecDeque::new(),
            textures: VecDeque::new(),
            current_reconstructed: None,
            is_current_reference: false,
            current_frame_type: FrameType::Idr,
            gop_has_inter_frames,
            max_reference_frame_count,
        }
    }

    /// Records the current picture's frame type and reference flag,
    /// resets on IDR, and borrows a reconstructed texture from the pool
    /// when this frame will itself be used as a future reference.
    pub fn prepare_for_frame(&mut self, device: &dyn GpuDevice, frame: &PlannedFrame) -> anyhow::Result<()> {
        self.current_frame_type = frame.frame_type;
        self.is_current_reference = frame.use_as_reference;

        if frame.frame_type == FrameType::Idr {
            self.reset();
        }

        self.current_reconstructed = if frame.use_as_reference {
            Some(self.pool.allocate(device)?)
        } else {
            None
        };
        Ok(())
    }

    pub fn is_current_reference(&self) -> bool {
        self.is_current_reference
    }

    pub fn current_reconstructed(&self) -> Option<TextureHandle> {
        self.current_reconstructed
    }

    /// The texture list the device should bind as reference frames for
    /// the current picture: empty for IDR/I frames or a GOP with no
    /// inter frames, otherwise the full active list (newest first).
    pub fn reference_textures(&self) -> Vec<TextureHandle> {
        if matches!(self.current_frame_type, FrameType::Idr | FrameType::I) || !self.gop_has_inter_frames {
            return Vec::new();
        }
        self.textures.iter().copied().collect()
    }

    /// Replaces each POC in `poc_list` with the index of the descriptor
    /// whose `poc_number` matches it.
    fn map_poc_list_to_indices(&self, poc_list: &[u64]) -> EncoderResult<Vec<u32>> {
        poc_list
            .iter()
            .map(|&poc| {
                self.descriptors
                    .iter()
                    .position(|d| d.poc_number == poc)
                    .map(|idx| idx as u32)
                    .ok_or_else(|| {
                        log::warn!("poc {poc} not found in reference descriptor list");
                        EncoderError::InvalidReference(poc as i64)
                    })
            })
            .collect()
    }

    /// Resolves a planned frame's L0/L1 POC lists into descriptor
    /// indices. L1 is only meaningful for B-frames; it's returned empty
    /// otherwise.
    pub fn resolve_reference_indices(&self, frame: &PlannedFrame) -> EncoderResult<(Vec<u32>, Vec<u32>)> {
        let uses_l0 = matches!(frame.frame_type, FrameType::P | FrameType::B);
        let uses_l1 = frame.frame_type == FrameType::B;

        let l0 = if uses_l0 { self.map_poc_list_to_indices(&frame.ref_list_0)? } else { Vec::new() };
        let l1 = if uses_l1 { self.map_poc_list_to_indices(&frame.ref_list_1)? } else { Vec::new() };
        Ok((l0, l1))
    }

    /// Evicts the oldest descriptor/texture if the list is already at
    /// capacity, then inserts the just-encoded frame's descriptor and
    /// texture at the front and renumbers the rest.
    pub fn update_after_emission(&mut self, frame: &PlannedFrame) {
        if !frame.use_as_reference {
            return;
        }

        if self.descriptors.len() >= self.max_reference_frame_count as usize {
            self.descriptors.pop_back();
            if let Some(oldest) = self.textures.pop_back() {
                self.pool.release(oldest);
            }
        }

        let reconstructed = self.current_reconstructed.expect("reference frame must have a reconstructed texture");
        self.descriptors.push_front(ReferenceDescriptor {
            reconstructed_texture_index: 0,
            poc_number: frame.poc_lsb,
            decoding_order_number: frame.decoding_order,
            is_long_term_reference: false,
            long_term_picture_idx: 0,
            temporal_layer_index: 0,
        });
        self.textures.push_front(reconstructed);

        for (i, descriptor) in self.descriptors.iter_mut().enumerate().skip(1) {
            descriptor.reconstructed_texture_index = i as u32;
        }
    }

    /// Clears the descriptor list and texture array, and returns every
    /// pool texture currently in use back to `free`.
    pub fn reset(&mut self) {
        log::trace!("resetting reference descriptor list ({} entries)", self.descriptors.len());
        self.descriptors.clear();
        self.textures.clear();
        self.current_reconstructed = None;
        self.pool.reclaim_all();
    }

    pub fn descriptor_count(&self) -> usize {
        self.descriptors.len()
    }
}
