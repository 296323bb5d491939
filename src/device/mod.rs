// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The trait boundary towards the GPU video-encode layer: queues, fences,
//! resource barriers, and the two hardware commands this encoder issues.
//! No concrete backend lives in this crate; [`dummy::DummyDevice`] is an
//! in-memory implementation used by the test suite.

pub mod dummy;

use crate::config::EncoderConfig;
use crate::error::EncodeErrorFlags;
use crate::frame::RawFrameHandle;

/// Opaque handle to a committed GPU texture. Backends are free to choose
/// any representation; the encoder only ever compares and copies these.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Opaque handle to a committed GPU buffer (upload, bitstream, metadata,
/// resolved-metadata).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Resource states a texture or buffer can be transitioned between.
/// Mirrors the small subset of D3D12-style barrier states this pipeline
/// actually uses; not a general resource-state enum.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Common,
    CopyDest,
    EncodeRead,
    EncodeWrite,
}

/// The picture-level parameters the device needs to encode one frame,
/// already resolved to descriptor indices by the reference manager.
pub struct PictureParams<'a> {
    pub is_idr: bool,
    pub poc_lsb: u64,
    pub idr_pic_id: u32,
    pub decoding_order: u64,
    pub ref_list_0: &'a [u32],
    pub ref_list_1: &'a [u32],
    pub use_as_reference: bool,
}

/// Resolved encode-completion metadata, as read back from the device's
/// resolved-metadata buffer.
#[derive(Copy, Clone, Debug, Default)]
pub struct ResolvedMetadata {
    pub error_flags: EncodeErrorFlags,
    pub encoded_bitstream_written_bytes: usize,
}

/// The contract this crate needs from a GPU video-encode device: object
/// creation at construction time, per-frame upload/barrier/encode/resolve
/// sequencing, and fence synchronization. Queried capability support
/// (profile/level/input-format) happens once at construction via
/// [`GpuDevice::validate_capabilities`].
pub trait GpuDevice {
    /// Checks that `config` is something this device can actually encode
    /// (resolution, profile, level, input format). Called once, before any
    /// resource is created.
    fn validate_capabilities(&self, config: &EncoderConfig) -> anyhow::Result<()>;

    fn create_texture(&self, width: u32, height: u32) -> anyhow::Result<TextureHandle>;
    fn create_buffer(&self, size: usize) -> anyhow::Result<BufferHandle>;

    /// Copies the raw frame's planes into the device's upload buffer,
    /// records the copy-queue upload + `COPY_DEST -> COMMON` barrier,
    /// submits, and signals the copy fence at the next counter value.
    /// Returns the signaled value.
    fn upload_frame(&self, upload_buffer: BufferHandle, input_texture: TextureHandle, frame: &RawFrameHandle) -> anyhow::Result<u64>;

    /// Enqueues a GPU-side wait on the video-encode queue for the copy
    /// fence to reach `value`. Never blocks the calling thread.
    fn gpu_wait_copy_fence(&self, value: u64) -> anyhow::Result<()>;

    fn barrier_texture(&self, tex: TextureHandle, from: ResourceState, to: ResourceState) -> anyhow::Result<()>;
    fn barrier_buffer(&self, buf: BufferHandle, from: ResourceState, to: ResourceState) -> anyhow::Result<()>;

    /// Writes `data` into `buffer` at `offset` via a CPU-visible mapped
    /// copy (used to place header bytes ahead of the slice data).
    fn write_mapped(&self, buffer: BufferHandle, offset: usize, data: &[u8]) -> anyhow::Result<()>;

    /// Submits the `EncodeFrame` command.
    #[allow(clippy::too_many_arguments)]
    fn submit_encode(
        &self,
        input_texture: TextureHandle,
        reconstructed: Option<TextureHandle>,
        reference_textures: &[TextureHandle],
        output_bitstream: BufferHandle,
        metadata: BufferHandle,
        header_bytes: usize,
        picture: &PictureParams,
    ) -> anyhow::Result<()>;

    /// Submits `ResolveEncoderOutputMetadata` from `metadata` into
    /// `resolved`.
    fn submit_resolve_metadata(&self, metadata: BufferHandle, resolved: BufferHandle) -> anyhow::Result<()>;

    /// Closes and executes the encode command list, signaling the encode
    /// fence at the next counter value. Returns the signaled value.
    fn submit_encode_command_list(&self) -> anyhow::Result<u64>;

    /// Blocks until the encode fence reaches `value`, or `terminate`
    /// becomes true, whichever happens first. Returns `false` on
    /// termination.
    fn wait_encode_fence(&self, value: u64, terminate: &std::sync::atomic::AtomicBool) -> bool;

    fn read_resolved_metadata(&self, resolved: BufferHandle) -> anyhow::Result<ResolvedMetadata>;

    /// Reads `len` bytes starting at offset 0 of the output bitstream
    /// buffer (header bytes followed by the hardware-produced slice).
    fn read_bitstream(&self, buffer: BufferHandle, len: usize) -> anyhow::Result<Vec<u8>>;
}
