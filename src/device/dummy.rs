// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! An in-memory [`GpuDevice`] used by the test suite: textures and
//! buffers are plain byte vectors, fences are free-running counters, and
//! "encoding" a frame appends a synthetic slice NAL rather than
//! invoking real hardware.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::bitstream::nalu;
use crate::config::EncoderConfig;
use crate::device::{BufferHandle, GpuDevice, PictureParams, ResolvedMetadata, ResourceState, TextureHandle};
use crate::error::EncodeErrorFlags;
use crate::frame::RawFrameHandle;

const NAL_TYPE_SLICE_NON_IDR: u32 = 1;
const NAL_TYPE_SLICE_IDR: u32 = 5;

pub struct DummyDevice {
    next_handle: AtomicU64,
    textures: RefCell<HashMap<TextureHandle, Vec<u8>>>,
    buffers: RefCell<HashMap<BufferHandle, Vec<u8>>>,
    copy_fence: AtomicU64,
    encode_fence: AtomicU64,
}

impl DummyDevice {
    pub fn new() -> Self {
        DummyDevice {
            next_handle: AtomicU64::new(1),
            textures: RefCell::new(HashMap::new()),
            buffers: RefCell::new(HashMap::new()),
            copy_fence: AtomicU64::new(0),
            encode_fence: AtomicU64::new(0),
        }
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    /// A minimal well-formed slice NAL standing in for the
    /// hardware-produced bitstream: a start code, header, and a couple
    /// of payload bytes derived from the picture parameters so distinct
    /// frames don't produce byte-identical output.
    fn fake_slice_nal(picture: &PictureParams) -> Vec<u8> {
        let nal_unit_type = if picture.is_idr { NAL_TYPE_SLICE_IDR } else { NAL_TYPE_SLICE_NON_IDR };
        let payload = [(picture.poc_lsb & 0xff) as u8, (picture.decoding_order & 0xff) as u8];
        nalu::wrap_rbsp(&payload, 3, nal_unit_type)
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for DummyDevice {
    fn validate_capabilities(&self, config: &EncoderConfig) -> anyhow::Result<()> {
        if config.resolution.width == 0 || config.resolution.height == 0 {
            anyhow::bail!("dummy device cannot encode a zero-sized resolution");
        }
        Ok(())
    }

    fn create_texture(&self, width: u32, height: u32) -> anyhow::Result<TextureHandle> {
        let handle = TextureHandle(self.next_handle());
        let size = (width as usize) * (height as usize) * 3 / 2;
        self.textures.borrow_mut().insert(handle, vec![0u8; size]);
        Ok(handle)
    }

    fn create_buffer(&self, size: usize) -> anyhow::Result<BufferHandle> {
        let handle = BufferHandle(self.next_handle());
        self.buffers.borrow_mut().insert(handle, vec![0u8; size]);
        Ok(handle)
    }

    fn upload_frame(&self, _upload_buffer: BufferHandle, input_texture: TextureHandle, frame: &RawFrameHandle) -> anyhow::Result<u64> {
        let mut textures = self.textures.borrow_mut();
        let tex = textures
            .get_mut(&input_texture)
            .ok_or_else(|| anyhow::anyhow!("upload_frame: unknown texture {:?}", input_texture))?;
        let y = frame.y_plane();
        let uv = frame.uv_plane();
        let needed = y.len() + uv.len();
        if tex.len() < needed {
            tex.resize(needed, 0);
        }
        tex[..y.len()].copy_from_slice(y);
        tex[y.len()..needed].copy_from_slice(uv);
        Ok(self.copy_fence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn gpu_wait_copy_fence(&self, _value: u64) -> anyhow::Result<()> {
        Ok(())
    }

    fn barrier_texture(&self, _tex: TextureHandle, _from: ResourceState, _to: ResourceState) -> anyhow::Result<()> {
        Ok(())
    }

    fn barrier_buffer(&self, _buf: BufferHandle, _from: ResourceState, _to: ResourceState) -> anyhow::Result<()> {
        Ok(())
    }

    fn write_mapped(&self, buffer: BufferHandle, offset: usize, data: &[u8]) -> anyhow::Result<()> {
        let mut buffers = self.buffers.borrow_mut();
        let buf = buffers
            .get_mut(&buffer)
            .ok_or_else(|| anyhow::anyhow!("write_mapped: unknown buffer {:?}", buffer))?;
        let end = offset + data.len();
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn submit_encode(
        &self,
        _input_texture: TextureHandle,
        _reconstructed: Option<TextureHandle>,
        _reference_textures: &[TextureHandle],
        output_bitstream: BufferHandle,
        metadata: BufferHandle,
        header_bytes: usize,
        picture: &PictureParams,
    ) -> anyhow::Result<()> {
        let slice = Self::fake_slice_nal(picture);
        let mut buffers = self.buffers.borrow_mut();

        let out = buffers
            .get_mut(&output_bitstream)
            .ok_or_else(|| anyhow::anyhow!("submit_encode: unknown bitstream buffer"))?;
        let end = header_bytes + slice.len();
        if out.len() < end {
            out.resize(end, 0);
        }
        out[header_bytes..end].copy_from_slice(&slice);

        let written = (header_bytes + slice.len()) as u32;
        let meta = buffers
            .get_mut(&metadata)
            .ok_or_else(|| anyhow::anyhow!("submit_encode: unknown metadata buffer"))?;
        if meta.len() < 8 {
            meta.resize(8, 0);
        }
        meta[0..4].copy_from_slice(&written.to_le_bytes());
        meta[4..8].copy_from_slice(&EncodeErrorFlags::NONE.0.to_le_bytes());
        Ok(())
    }

    fn submit_resolve_metadata(&self, metadata: BufferHandle, resolved: BufferHandle) -> anyhow::Result<()> {
        let mut buffers = self.buffers.borrow_mut();
        let data = buffers
            .get(&metadata)
            .ok_or_else(|| anyhow::anyhow!("submit_resolve_metadata: unknown metadata buffer"))?
            .clone();
        let resolved_buf = buffers
            .get_mut(&resolved)
            .ok_or_else(|| anyhow::anyhow!("submit_resolve_metadata: unknown resolved buffer"))?;
        if resolved_buf.len() < data.len() {
            resolved_buf.resize(data.len(), 0);
        }
        resolved_buf[..data.len()].copy_from_slice(&data);
        Ok(())
    }

    fn submit_encode_command_list(&self) -> anyhow::Result<u64> {
        Ok(self.encode_fence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn wait_encode_fence(&self, _value: u64, terminate: &AtomicBool) -> bool {
        !terminate.load(Ordering::SeqCst)
    }

    fn read_resolved_metadata(&self, resolved: BufferHandle) -> anyhow::Result<ResolvedMetadata> {
        let buffers = self.buffers.borrow();
        let buf = buffers
            .get(&resolved)
            .ok_or_else(|| anyhow::anyhow!("read_resolved_metadata: unknown buffer"))?;
        let written = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        let flags = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        Ok(ResolvedMetadata { error_flags: EncodeErrorFlags(flags), encoded_bitstream_written_bytes: written })
    }

    fn read_bitstream(&self, buffer: BufferHandle, len: usize) -> anyhow::Result<Vec<u8>> {
        let buffers = self.buffers.borrow();
        let buf = buffers
            .get(&buffer)
            .ok_or_else(|| anyhow::anyhow!("read_bitstream: unknown buffer"))?;
        Ok(buf[..len.min(buf.len())].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::OwnedNv12Frame;
    use std::rc::Rc;

    #[test]
    fn upload_then_read_back_roundtrips_planes() {
        let device = DummyDevice::new();
        let tex = device.create_texture(4, 2).unwrap();
        let frame: RawFrameHandle = Rc::new(OwnedNv12Frame::solid(4, 2, 42));
        let fence = device.upload_frame(BufferHandle(0), tex, &frame).unwrap();
        assert_eq!(fence, 1);
    }

    #[test]
    fn encode_then_resolve_reports_written_bytes() {
        let device = DummyDevice::new();
        let bitstream = device.create_buffer(256).unwrap();
        let metadata = device.create_buffer(8).unwrap();
        let resolved = device.create_buffer(8).unwrap();
        let input = device.create_texture(16, 16).unwrap();

        device.write_mapped(bitstream, 0, &[0xAA; 10]).unwrap();
        let picture = PictureParams {
            is_idr: true,
            poc_lsb: 0,
            idr_pic_id: 0,
            decoding_order: 0,
            ref_list_0: &[],
            ref_list_1: &[],
            use_as_reference: true,
        };
        device.submit_encode(input, None, &[], bitstream, metadata, 10, &picture).unwrap();
        device.submit_resolve_metadata(metadata, resolved).unwrap();
        let meta = device.read_resolved_metadata(resolved).unwrap();
        assert!(meta.error_flags.is_empty());
        assert!(meta.encoded_bitstream_written_bytes > 10);

        let bytes = device.read_bitstream(bitstream, meta.encoded_bitstream_written_bytes).unwrap();
        assert_eq!(&bytes[0..10], &[0xAA; 10]);
        assert_eq!(&bytes[10..14], &[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn wait_encode_fence_returns_false_once_terminated() {
        let device = DummyDevice::new();
        let terminate = AtomicBool::new(false);
        assert!(device.wait_encode_fence(1, &terminate));
        terminate.store(true, Ordering::SeqCst);
        assert!(!device.wait_encode_fence(1, &terminate));
    }
}
