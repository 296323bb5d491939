// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The raw-frame interface consumed by the encoder: modeled as a
//! capability-set trait rather than via subclassing.

use std::rc::Rc;

/// An immutable NV12 frame handle: two plane pointers (Y, interleaved
/// UV), their row strides, and the frame's dimensions.
///
/// Ownership is shared with the producer; the encoder retains a
/// reference (via [`RawFrameHandle`]) until upload completes, then
/// drops it.
pub trait RawFrame {
    fn y_plane(&self) -> &[u8];
    fn uv_plane(&self) -> &[u8];
    fn y_stride(&self) -> usize;
    fn uv_stride(&self) -> usize;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// Shared handle to a [`RawFrame`], cheap to clone, matching the
/// producer/encoder shared-ownership model.
pub type RawFrameHandle = Rc<dyn RawFrame>;

/// A `RawFrame` backed by owned, contiguous NV12 byte buffers. Used by
/// tests and by callers that don't have their own frame type.
pub struct OwnedNv12Frame {
    y: Vec<u8>,
    uv: Vec<u8>,
    y_stride: usize,
    uv_stride: usize,
    width: u32,
    height: u32,
}

impl OwnedNv12Frame {
    /// Builds a frame with tightly packed planes (`stride == width` for
    /// Y, `stride == width` for the interleaved UV plane).
    pub fn new(width: u32, height: u32, y: Vec<u8>, uv: Vec<u8>) -> Self {
        assert_eq!(y.len(), (width as usize) * (height as usize));
        assert_eq!(uv.len(), (width as usize) * ((height as usize + 1) / 2));
        OwnedNv12Frame { y, uv, y_stride: width as usize, uv_stride: width as usize, width, height }
    }

    /// A flat-gray frame of the given size, useful for tests and
    /// smoke-testing the pipeline without real video content.
    pub fn solid(width: u32, height: u32, y_value: u8) -> Self {
        let y = vec![y_value; (width as usize) * (height as usize)];
        let uv = vec![128u8; (width as usize) * ((height as usize + 1) / 2)];
        Self::new(width, height, y, uv)
    }
}

impl RawFrame for OwnedNv12Frame {
    fn y_plane(&self) -> &[u8] {
        &self.y
    }

    fn uv_plane(&self) -> &[u8] {
        &self.uv
    }

    fn y_stride(&self) -> usize {
        self.y_stride
    }

    fn uv_stride(&self) -> usize {
        self.uv_stride
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_frame_has_expected_plane_sizes() {
        let frame = OwnedNv12Frame::solid(4, 2, 16);
        assert_eq!(frame.y_plane().len(), 8);
        assert_eq!(frame.uv_plane().len(), 4);
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
    }
}
