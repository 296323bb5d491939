// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Owns the per-frame input texture and upload buffer, and sequences
//! copy-queue uploads ahead of the video-encode queue.

use crate::device::{BufferHandle, GpuDevice, ResourceState, TextureHandle};
use crate::error::{EncoderError, EncoderResult};
use crate::frame::RawFrameHandle;

/// Rough NV12 upload-buffer size for a `width x height` frame: one byte
/// per luma sample plus one byte per two chroma samples.
fn upload_buffer_size(width: u32, height: u32) -> usize {
    (width as usize) * (height as usize) * 3 / 2
}

pub struct FrameResources {
    input_texture: TextureHandle,
    upload_buffer: BufferHandle,
    current_frame: Option<RawFrameHandle>,
    current_copy_value: Option<u64>,
}

impl FrameResources {
    pub fn new(device: &dyn GpuDevice, width: u32, height: u32) -> anyhow::Result<Self> {
        let input_texture = device.create_texture(width, height)?;
        let upload_buffer = device.create_buffer(upload_buffer_size(width, height))?;
        Ok(FrameResources { input_texture, upload_buffer, current_frame: None, current_copy_value: None })
    }

    pub fn input_texture(&self) -> TextureHandle {
        self.input_texture
    }

    /// Binds a raw-frame reference for the next upload. The previous
    /// frame must have been released with [`Self::reset`] first.
    pub fn set_frame(&mut self, raw: RawFrameHandle) -> EncoderResult<()> {
        if self.current_frame.is_some() {
            return Err(EncoderError::ProtocolMisuse("set_frame called before the previous frame was reset"));
        }
        self.current_frame = Some(raw);
        Ok(())
    }

    /// Uploads the bound frame's planes into the input texture, records
    /// the `COPY_DEST -> COMMON` barrier, submits to the copy queue and
    /// signals the copy fence. Returns the signaled value.
    pub fn upload_async(&mut self, device: &dyn GpuDevice) -> anyhow::Result<u64> {
        let frame = self
            .current_frame
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("upload_async called without a bound frame"))?;
        let value = device.upload_frame(self.upload_buffer, self.input_texture, frame)?;
        device.barrier_texture(self.input_texture, ResourceState::CopyDest, ResourceState::Common)?;
        self.current_copy_value = Some(value);
        Ok(value)
    }

    /// Enqueues a GPU-side wait on the video-encode queue for this
    /// frame's copy fence. Does not block the calling thread.
    pub fn gpu_wait(&self, device: &dyn GpuDevice) -> anyhow::Result<()> {
        let value = self.current_copy_value.unwrap_or(0);
        device.gpu_wait_copy_fence(value)
    }

    /// Releases the bound raw-frame reference once the frame has been
    /// fully encoded.
    pub fn reset(&mut self) {
        self.current_frame = None;
        self.current_copy_value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::dummy::DummyDevice;
    use crate::frame::OwnedNv12Frame;
    use std::rc::Rc;

    #[test]
    fn set_frame_twice_without_reset_is_protocol_misuse() {
        let device = DummyDevice::new();
        let mut resources = FrameResources::new(&device, 16, 16).unwrap();
        resources.set_frame(Rc::new(OwnedNv12Frame::solid(16, 16, 1))).unwrap();
        let err = resources.set_frame(Rc::new(OwnedNv12Frame::solid(16, 16, 2))).unwrap_err();
        assert!(matches!(err, EncoderError::ProtocolMisuse(_)));
    }

    #[test]
    fn upload_without_bound_frame_fails() {
        let device = DummyDevice::new();
        let mut resources = FrameResources::new(&device, 16, 16).unwrap();
        assert!(resources.upload_async(&device).is_err());
    }

    #[test]
    fn upload_then_reset_allows_rebinding() {
        let device = DummyDevice::new();
        let mut resources = FrameResources::new(&device, 16, 16).unwrap();
        resources.set_frame(Rc::new(OwnedNv12Frame::solid(16, 16, 1))).unwrap();
        resources.upload_async(&device).unwrap();
        resources.gpu_wait(&device).unwrap();
        resources.reset();
        resources.set_frame(Rc::new(OwnedNv12Frame::solid(16, 16, 2))).unwrap();
    }
}
