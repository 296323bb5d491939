// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The public encoder API: sequences the GOP planner, reference-frame
//! manager, per-frame GPU resources and header builder into the
//! `pushFrame` / `startEncodingPushedFrame` / `waitForEncodedFrame`
//! protocol.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::EncoderConfig;
use crate::device::{BufferHandle, GpuDevice, PictureParams, ResourceState};
use crate::error::{EncoderError, EncoderResult};
use crate::frame::RawFrameHandle;
use crate::frame_resources::FrameResources;
use crate::gop::{GopPlanner, PlannedFrame};
use crate::headers::HeaderBuilder;
use crate::reference::ReferenceManager;

/// A fully encoded access unit, ready for the caller to append to its
/// output elementary stream.
#[derive(Default)]
pub struct EncodedFrame {
    pub encoded_data: Vec<u8>,
    pub picture_order_count_number: u64,
    pub decoding_order_number: u64,
    pub is_key_frame: bool,
}

/// Lower-bound heuristic for the output bitstream buffer: four bytes
/// per pixel. Exceeded only by very high-QP, highly complex content;
/// growing on overrun is left to a future revision.
fn output_bitstream_size(width: u32, height: u32) -> usize {
    4 * (width as usize) * (height as usize)
}

/// Bookkeeping for the one frame submitted to the device and not yet
/// collected by `waitForEncodedFrame`.
struct InFlight {
    frame: PlannedFrame,
    header_bytes: usize,
    fence_value: u64,
}

/// Drives a GPU video-encode device through the H.264 encode protocol
/// for one configured stream. Created once per output; all device
/// resources are allocated at construction and released on drop.
pub struct Encoder<D: GpuDevice> {
    device: D,
    config: EncoderConfig,
    planner: GopPlanner,
    reference_manager: ReferenceManager,
    frame_resources: FrameResources,
    header_builder: HeaderBuilder,
    output_bitstream: BufferHandle,
    metadata: BufferHandle,
    resolved_metadata: BufferHandle,
    terminate: AtomicBool,
    /// Binary-semaphore-style gate: set once `startEncodingPushedFrame`
    /// submits GPU work, cleared once `waitForEncodedFrame` collects it.
    /// Mirrors the producer/consumer handoff described for this
    /// protocol: the producer thread must not race ahead of a frame the
    /// consumer hasn't read back yet.
    awaiting_wait: bool,
    in_flight: Option<InFlight>,
}

impl<D: GpuDevice> Encoder<D> {
    pub fn new(device: D, config: EncoderConfig) -> EncoderResult<Self> {
        config.validate()?;
        device.validate_capabilities(&config).map_err(EncoderError::Device)?;

        let width = config.resolution.width;
        let height = config.resolution.height;

        let reference_manager =
            ReferenceManager::new(width, height, config.max_reference_frame_count, config.gop_has_inter_frames());
        let frame_resources = FrameResources::new(&device, width, height).map_err(EncoderError::Device)?;
        let header_builder = HeaderBuilder::new(&config);

        let output_bitstream =
            device.create_buffer(output_bitstream_size(width, height)).map_err(EncoderError::Device)?;
        let metadata = device.create_buffer(64).map_err(EncoderError::Device)?;
        let resolved_metadata = device.create_buffer(64).map_err(EncoderError::Device)?;

        let planner = GopPlanner::new(config.key_frame_interval, config.b_frames_count, config.max_reference_frame_count);

        Ok(Encoder {
            device,
            config,
            planner,
            reference_manager,
            frame_resources,
            header_builder,
            output_bitstream,
            metadata,
            resolved_metadata,
            terminate: AtomicBool::new(false),
            awaiting_wait: false,
            in_flight: None,
        })
    }

    /// Submits a raw frame in display order. Must not be called while a
    /// frame is already current in the planner.
    pub fn push_frame(&mut self, raw: RawFrameHandle) -> EncoderResult<()> {
        if self.planner.is_flushed() {
            return Err(EncoderError::ProtocolMisuse("pushFrame called after flush"));
        }
        if self.planner.has_current() {
            return Err(EncoderError::ProtocolMisuse("pushFrame called while a frame is already current"));
        }
        self.planner.push(raw);
        Ok(())
    }

    /// Issues the GPU submission for exactly one frame, if the planner
    /// has one ready. Returns `false` when more input is needed (e.g. a
    /// buffered B-frame still waiting on a future reference).
    pub fn start_encoding_pushed_frame(&mut self) -> EncoderResult<bool> {
        if self.awaiting_wait {
            return Err(EncoderError::ProtocolMisuse(
                "startEncodingPushedFrame called before the previous frame was collected by waitForEncodedFrame",
            ));
        }
        if !self.planner.has_current() {
            return Ok(false);
        }
        let frame = self.planner.take_current().expect("has_current() was true");
        log::trace!(
            "submitting frame display_order={} decoding_order={} type={:?}",
            frame.display_order,
            frame.decoding_order,
            frame.frame_type
        );
        self.submit(frame)?;
        self.awaiting_wait = true;
        Ok(true)
    }

    fn submit(&mut self, frame: PlannedFrame) -> EncoderResult<()> {
        let device = &self.device;

        self.reference_manager.prepare_for_frame(device, &frame).map_err(EncoderError::Device)?;

        self.frame_resources.set_frame(frame.data.clone())?;
        let copy_value = self.frame_resources.upload_async(device).map_err(EncoderError::Device)?;
        let _ = copy_value;
        self.frame_resources.gpu_wait(device).map_err(EncoderError::Device)?;

        let force_sps = false;
        let header = self.header_builder.build(force_sps, self.config.header_alignment);
        let header_bytes = header.len();

        let (ref_list_0, ref_list_1) = self.reference_manager.resolve_reference_indices(&frame)?;
        let reference_textures = self.reference_manager.reference_textures();
        let reconstructed = self.reference_manager.current_reconstructed();

        device
            .barrier_texture(self.frame_resources.input_texture(), ResourceState::Common, ResourceState::EncodeRead)
            .map_err(EncoderError::Device)?;
        device
            .barrier_buffer(self.output_bitstream, ResourceState::Common, ResourceState::EncodeWrite)
            .map_err(EncoderError::Device)?;
        device.barrier_buffer(self.metadata, ResourceState::Common, ResourceState::EncodeWrite).map_err(EncoderError::Device)?;
        for &tex in &reference_textures {
            device.barrier_texture(tex, ResourceState::Common, ResourceState::EncodeRead).map_err(EncoderError::Device)?;
        }
        if let Some(tex) = reconstructed {
            device.barrier_texture(tex, ResourceState::Common, ResourceState::EncodeWrite).map_err(EncoderError::Device)?;
        }

        device.write_mapped(self.output_bitstream, 0, &header).map_err(EncoderError::Device)?;

        let picture = PictureParams {
            is_idr: matches!(frame.frame_type, crate::gop::FrameType::Idr),
            poc_lsb: frame.poc_lsb,
            idr_pic_id: frame.idr_pic_id,
            decoding_order: frame.decoding_order,
            ref_list_0: &ref_list_0,
            ref_list_1: &ref_list_1,
            use_as_reference: frame.use_as_reference,
        };
        device
            .submit_encode(
                self.frame_resources.input_texture(),
                reconstructed,
                &reference_textures,
                self.output_bitstream,
                self.metadata,
                header_bytes,
                &picture,
            )
            .map_err(EncoderError::Device)?;

        device
            .barrier_buffer(self.resolved_metadata, ResourceState::Common, ResourceState::EncodeWrite)
            .map_err(EncoderError::Device)?;
        device.barrier_buffer(self.metadata, ResourceState::EncodeWrite, ResourceState::EncodeRead).map_err(EncoderError::Device)?;
        device
            .barrier_texture(self.frame_resources.input_texture(), ResourceState::EncodeRead, ResourceState::Common)
            .map_err(EncoderError::Device)?;
        device.barrier_buffer(self.output_bitstream, ResourceState::EncodeWrite, ResourceState::Common).map_err(EncoderError::Device)?;

        device.submit_resolve_metadata(self.metadata, self.resolved_metadata).map_err(EncoderError::Device)?;

        for &tex in &reference_textures {
            device.barrier_texture(tex, ResourceState::EncodeRead, ResourceState::Common).map_err(EncoderError::Device)?;
        }
        device.barrier_buffer(self.resolved_metadata, ResourceState::EncodeWrite, ResourceState::Common).map_err(EncoderError::Device)?;

        let fence_value = device.submit_encode_command_list().map_err(EncoderError::Device)?;

        self.in_flight = Some(InFlight { frame, header_bytes, fence_value });
        Ok(())
    }

    /// Blocks until the in-flight frame completes or `terminate` fires.
    /// Returns `false` on termination, with `out` left untouched.
    pub fn wait_for_encoded_frame(&mut self, out: &mut EncodedFrame) -> EncoderResult<bool> {
        let in_flight = self
            .in_flight
            .take()
            .ok_or(EncoderError::ProtocolMisuse("waitForEncodedFrame called with no frame in flight"))?;

        if !self.device.wait_encode_fence(in_flight.fence_value, &self.terminate) {
            self.in_flight = Some(in_flight);
            return Ok(false);
        }

        let metadata = self.device.read_resolved_metadata(self.resolved_metadata).map_err(EncoderError::Device)?;
        if !metadata.error_flags.is_empty() {
            log::error!(
                "encode of frame decoding_order={} failed: {}",
                in_flight.frame.decoding_order,
                metadata.error_flags
            );
            self.awaiting_wait = false;
            self.frame_resources.reset();
            return Err(EncoderError::Encoding(metadata.error_flags));
        }

        let total_len = in_flight.header_bytes + metadata.encoded_bitstream_written_bytes;
        out.encoded_data = self.device.read_bitstream(self.output_bitstream, total_len).map_err(EncoderError::Device)?;
        out.picture_order_count_number = in_flight.frame.display_order;
        out.decoding_order_number = in_flight.frame.decoding_order;
        out.is_key_frame = matches!(in_flight.frame.frame_type, crate::gop::FrameType::Idr);

        self.frame_resources.reset();
        self.reference_manager.update_after_emission(&in_flight.frame);
        self.planner.notify_emitted(&in_flight.frame);
        self.awaiting_wait = false;

        Ok(true)
    }

    /// Converts every remaining buffered B-frame to P; no new pushes
    /// are accepted afterwards.
    pub fn flush(&mut self) {
        self.planner.flush();
    }

    /// Signals termination: an outstanding `waitForEncodedFrame` returns
    /// `false`; no new frames should be pushed afterwards.
    pub fn terminate(&self) {
        log::debug!("terminate requested");
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn is_flushed(&self) -> bool {
        self.planner.is_flushed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConstantQp, Fps, Level, Profile};
    use crate::device::dummy::DummyDevice;
    use crate::frame::OwnedNv12Frame;
    use crate::Resolution;
    use std::rc::Rc;

    fn config() -> EncoderConfig {
        EncoderConfig {
            resolution: Resolution { width: 16, height: 16 },
            fps: Fps { num: 30, den: 1 },
            key_frame_interval: 4,
            b_frames_count: 2,
            max_reference_frame_count: 2,
            profile: Profile::Main,
            level: Level::L4_2,
            rate_control: ConstantQp::default(),
            entropy_coding_mode: true,
            direct_8x8_inference: true,
            constrained_intra_pred: false,
            header_alignment: 1,
        }
    }

    fn frame() -> RawFrameHandle {
        Rc::new(OwnedNv12Frame::solid(16, 16, 0))
    }

    #[test]
    fn encodes_an_ip_stream_end_to_end() {
        let _ = env_logger::try_init();

        let mut encoder = Encoder::new(DummyDevice::new(), EncoderConfig { key_frame_interval: 0, b_frames_count: 0, max_reference_frame_count: 1, ..config() }).unwrap();

        let mut out = EncodedFrame::default();
        for i in 0..3u64 {
            encoder.push_frame(frame()).unwrap();
            assert!(encoder.start_encoding_pushed_frame().unwrap());
            assert!(encoder.wait_for_encoded_frame(&mut out).unwrap());
            assert_eq!(out.decoding_order_number, i);
            assert_eq!(out.is_key_frame, i == 0);
            assert!(!out.encoded_data.is_empty());
        }
    }

    #[test]
    fn encodes_an_all_idr_stream_k1_end_to_end() {
        // K=1, B=0: every frame is IDR (spec.md §8 boundary behavior).
        // `gop_has_inter_frames()` is false here, but every frame still has
        // `use_as_reference = true`, so `update_after_emission` must not
        // panic on a missing reconstructed texture.
        let mut encoder = Encoder::new(
            DummyDevice::new(),
            EncoderConfig { key_frame_interval: 1, b_frames_count: 0, max_reference_frame_count: 0, ..config() },
        )
        .unwrap();

        let mut out = EncodedFrame::default();
        for i in 0..3u64 {
            encoder.push_frame(frame()).unwrap();
            assert!(encoder.start_encoding_pushed_frame().unwrap());
            assert!(encoder.wait_for_encoded_frame(&mut out).unwrap());
            assert_eq!(out.decoding_order_number, i);
            assert!(out.is_key_frame);
            assert!(!out.encoded_data.is_empty());
        }
    }

    #[test]
    fn push_while_current_is_protocol_misuse() {
        let mut encoder = Encoder::new(DummyDevice::new(), config()).unwrap();
        encoder.push_frame(frame()).unwrap();
        let err = encoder.push_frame(frame()).unwrap_err();
        assert!(matches!(err, EncoderError::ProtocolMisuse(_)));
    }

    #[test]
    fn start_encoding_twice_without_wait_is_protocol_misuse() {
        let mut encoder = Encoder::new(DummyDevice::new(), EncoderConfig { key_frame_interval: 1, b_frames_count: 0, max_reference_frame_count: 0, ..config() }).unwrap();
        encoder.push_frame(frame()).unwrap();
        assert!(encoder.start_encoding_pushed_frame().unwrap());
        let err = encoder.start_encoding_pushed_frame().unwrap_err();
        assert!(matches!(err, EncoderError::ProtocolMisuse(_)));
    }

    #[test]
    fn waiting_with_nothing_in_flight_is_protocol_misuse() {
        let mut encoder = Encoder::new(DummyDevice::new(), config()).unwrap();
        let mut out = EncodedFrame::default();
        let err = encoder.wait_for_encoded_frame(&mut out).unwrap_err();
        assert!(matches!(err, EncoderError::ProtocolMisuse(_)));
    }

    #[test]
    fn terminate_makes_wait_return_false() {
        let mut encoder = Encoder::new(DummyDevice::new(), EncoderConfig { key_frame_interval: 1, b_frames_count: 0, max_reference_frame_count: 0, ..config() }).unwrap();
        encoder.push_frame(frame()).unwrap();
        assert!(encoder.start_encoding_pushed_frame().unwrap());
        encoder.terminate();
        let mut out = EncodedFrame::default();
        assert!(!encoder.wait_for_encoded_frame(&mut out).unwrap());
    }
}
