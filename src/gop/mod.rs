// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Computes frame types from `(keyFrameInterval, bFramesCount)`, reorders
//! B-frames, and assigns decoding-order and picture-order numbers.

use std::collections::VecDeque;

use crate::frame::RawFrameHandle;

/// Frame type the planner can produce. `I` is accepted from upstream in
/// the data model but never produced by this planner.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameType {
    Idr,
    I,
    P,
    B,
}

impl FrameType {
    pub fn is_reference_by_default(&self) -> bool {
        matches!(self, FrameType::Idr | FrameType::P)
    }
}

/// A frame that has been classified and is ready to be emitted to the
/// encode engine, flattened into owned fields once it leaves the
/// reorder buffer.
#[derive(Clone)]
pub struct PlannedFrame {
    pub frame_type: FrameType,
    pub display_order: u64,
    pub poc_lsb: u64,
    pub decoding_order: u64,
    pub idr_pic_id: u32,
    pub use_as_reference: bool,
    pub data: RawFrameHandle,
    /// POC values (relative to the last IDR) of forward references.
    pub ref_list_0: Vec<u64>,
    /// POC values (relative to the last IDR) of backward references.
    /// Only non-empty for B-frames.
    pub ref_list_1: Vec<u64>,
}

/// An entry sitting in the reorder buffer, waiting for its future
/// reference to be encoded.
struct BufferedFrame {
    display_order: u64,
    data: RawFrameHandle,
    future_ref_display: u64,
}

/// Pure frame-type classification function.
pub fn classify(display_order: u64, key_frame_interval: u32, b_frames_count: u32) -> FrameType {
    if display_order == 0
        || (key_frame_interval > 0 && display_order % key_frame_interval as u64 == 0)
    {
        return FrameType::Idr;
    }
    let gop_start = if key_frame_interval == 0 {
        0
    } else {
        (display_order / key_frame_interval as u64) * key_frame_interval as u64
    };
    if (display_order - gop_start) % (b_frames_count as u64 + 1) == 0 {
        FrameType::P
    } else {
        FrameType::B
    }
}

/// The display-order number of the next non-B frame at or after `d + 1`
/// within the same GOP.
fn next_reference_display(d: u64, key_frame_interval: u32, b_frames_count: u32) -> u64 {
    let mut candidate = d + 1;
    loop {
        match classify(candidate, key_frame_interval, b_frames_count) {
            FrameType::B => candidate += 1,
            _ => return candidate,
        }
    }
}

/// The next IDR display order, `u64::MAX` standing in for infinity when
/// `key_frame_interval == 0`.
fn next_idr_display(d: u64, key_frame_interval: u32) -> u64 {
    if key_frame_interval == 0 {
        u64::MAX
    } else {
        let k = key_frame_interval as u64;
        ((d / k) + 1) * k
    }
}

/// A frame ready to be submitted to the GPU encode pipeline, with its
/// display-order classification already resolved.
pub struct CurrentFrame {
    pub frame_type: FrameType,
    pub display_order: u64,
    pub data: RawFrameHandle,
    pub use_as_reference: bool,
}

/// Maintains `nextDisplayOrder`, `nextDecodingOrder`, `lastIdrDisplayOrder`,
/// `idrPicId`, `encodedRefList` and `reorderBuffer`.
pub struct GopPlanner {
    key_frame_interval: u32,
    b_frames_count: u32,
    max_reference_frame_count: u32,

    next_display_order: u64,
    next_decoding_order: u64,
    last_idr_display_order: u64,
    idr_pic_id: u32,
    encoded_ref_list: VecDeque<u64>,
    reorder_buffer: VecDeque<BufferedFrame>,

    /// Set once `flush()` has been called: new pushes are rejected.
    flushed: bool,
    /// The frame ready to be handed to the encode engine, if any.
    current: Option<CurrentFrame>,
}

impl GopPlanner {
    pub fn new(key_frame_interval: u32, b_frames_count: u32, max_reference_frame_count: u32) -> Self {
        GopPlanner {
            key_frame_interval,
            b_frames_count,
            max_reference_frame_count,
            next_display_order: 0,
            next_decoding_order: 0,
            last_idr_display_order: 0,
            idr_pic_id: 0,
            encoded_ref_list: VecDeque::new(),
            reorder_buffer: VecDeque::new(),
            flushed: false,
            current: None,
        }
    }

    /// Pushes a raw frame in display order.
    ///
    /// # Panics
    /// Panics if called after [`Self::flush`], or while a current frame is
    /// already pending (the caller must drain it with
    /// [`Self::take_current`] first) -- both are protocol misuse the
    /// public API guards against before reaching this layer.
    pub fn push(&mut self, data: RawFrameHandle) {
        assert!(!self.flushed, "push() called after flush()");
        assert!(self.current.is_none(), "push() called while a frame is already current");

        let display_order = self.next_display_order;
        let mut frame_type = classify(display_order, self.key_frame_interval, self.b_frames_count);

        if frame_type == FrameType::B {
            let next_ref = next_reference_display(display_order, self.key_frame_interval, self.b_frames_count);
            let next_idr = next_idr_display(display_order, self.key_frame_interval);
            if next_ref >= next_idr {
                // No future P left in this GOP: promote to P.
                frame_type = FrameType::P;
            }
        }

        match frame_type {
            FrameType::Idr => {
                assert!(self.reorder_buffer.is_empty(), "reorder buffer must be empty at an IDR boundary");
                log::trace!("IDR boundary at display_order={display_order}");
                self.encoded_ref_list.clear();
                self.last_idr_display_order = display_order;
                if display_order != 0 {
                    self.idr_pic_id = self.idr_pic_id.wrapping_add(1);
                }
                self.current = Some(CurrentFrame {
                    frame_type,
                    display_order,
                    data,
                    use_as_reference: true,
                });
            }
            FrameType::P => {
                self.current = Some(CurrentFrame {
                    frame_type,
                    display_order,
                    data,
                    use_as_reference: true,
                });
            }
            FrameType::B => {
                let future_ref_display =
                    next_reference_display(display_order, self.key_frame_interval, self.b_frames_count);
                self.reorder_buffer.push_back(BufferedFrame { display_order, data, future_ref_display });
            }
            FrameType::I => unreachable!("classify() never produces I"),
        }

        self.next_display_order += 1;
    }

    /// Picks the next frame to emit when no current frame is set. Returns
    /// `true` if a buffered frame became current.
    ///
    /// After [`Self::flush`], buffered entries no longer wait for their
    /// future reference: they are drained unconditionally as P-frames.
    fn pick_from_reorder_buffer(&mut self) -> bool {
        if self.current.is_some() {
            return true;
        }
        let Some(front) = self.reorder_buffer.front() else {
            return false;
        };

        if self.flushed {
            let entry = self.reorder_buffer.pop_front().unwrap();
            self.current = Some(CurrentFrame {
                frame_type: FrameType::P,
                display_order: entry.display_order,
                data: entry.data,
                use_as_reference: true,
            });
            return true;
        }

        let reference_available =
            self.encoded_ref_list.iter().any(|&d| d >= front.future_ref_display);
        if !reference_available {
            return false;
        }
        let entry = self.reorder_buffer.pop_front().unwrap();
        self.current = Some(CurrentFrame {
            frame_type: FrameType::B,
            display_order: entry.display_order,
            data: entry.data,
            use_as_reference: false,
        });
        true
    }

    /// Returns `true` if a frame is ready to be emitted, trying to drain
    /// the reorder buffer first.
    pub fn has_current(&mut self) -> bool {
        self.pick_from_reorder_buffer()
    }

    /// Assigns decoding order, POC and reference lists, and takes
    /// ownership of the current frame for emission.
    pub fn take_current(&mut self) -> Option<PlannedFrame> {
        if !self.pick_from_reorder_buffer() {
            return None;
        }
        let current = self.current.take().unwrap();

        let decoding_order = self.next_decoding_order;
        self.next_decoding_order += 1;
        let poc_lsb = current.display_order - self.last_idr_display_order;

        let (ref_list_0, ref_list_1) = match current.frame_type {
            FrameType::Idr | FrameType::I => (Vec::new(), Vec::new()),
            FrameType::P => {
                let last = *self.encoded_ref_list.back().expect("P-frame requires a reference");
                (vec![last - self.last_idr_display_order], Vec::new())
            }
            FrameType::B => {
                let len = self.encoded_ref_list.len();
                assert!(len >= 2, "B-frame requires two references in encodedRefList");
                let backward = self.encoded_ref_list[len - 1];
                let forward = self.encoded_ref_list[len - 2];
                (
                    vec![forward - self.last_idr_display_order],
                    vec![backward - self.last_idr_display_order],
                )
            }
        };

        Some(PlannedFrame {
            frame_type: current.frame_type,
            display_order: current.display_order,
            poc_lsb,
            decoding_order,
            idr_pic_id: self.idr_pic_id,
            use_as_reference: current.use_as_reference,
            data: current.data,
            ref_list_0,
            ref_list_1,
        })
    }

    /// Must be called once the frame returned by [`Self::take_current`]
    /// has been durably encoded.
    pub fn notify_emitted(&mut self, frame: &PlannedFrame) {
        if frame.use_as_reference {
            self.encoded_ref_list.push_back(frame.display_order);
            while self.encoded_ref_list.len() > self.max_reference_frame_count as usize {
                self.encoded_ref_list.pop_front();
            }
        }
    }

    /// Converts every remaining buffered B-frame to P. After this call
    /// no new pushes are accepted; buffered
    /// entries are drained as P-frames by [`Self::pick_from_reorder_buffer`]
    /// regardless of whether their future reference has been encoded yet.
    pub fn flush(&mut self) {
        log::debug!("flush: converting {} buffered B-frame(s) to P", self.reorder_buffer.len());
        self.flushed = true;
    }

    /// `true` once [`Self::flush`] has run.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// `true` when there is no more work: no current frame, nothing
    /// buffered, and the planner has been flushed (or will never receive
    /// more input in this call's context). Used by tests and by the
    /// encoder to decide when a stream is fully drained.
    pub fn is_drained(&self) -> bool {
        self.current.is_none() && self.reorder_buffer.is_empty()
    }

    pub fn encoded_ref_list(&self) -> &VecDeque<u64> {
        &self.encoded_ref_list
    }

    pub fn reorder_buffer_len(&self) -> usize {
        self.reorder_buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::OwnedNv12Frame;

    fn frame() -> RawFrameHandle {
        std::rc::Rc::new(OwnedNv12Frame::solid(16, 16, 0))
    }

    /// Drains every frame the planner is currently ready to emit,
    /// respecting the real API's "no push while current is pending"
    /// contract: callers normally interleave `pushFrame` with repeated
    /// `startEncodingPushedFrame` calls, never pushing past a pending one.
    fn drain_ready(planner: &mut GopPlanner) -> Vec<PlannedFrame> {
        let mut out = Vec::new();
        while planner.has_current() {
            let f = planner.take_current().unwrap();
            planner.notify_emitted(&f);
            out.push(f);
        }
        out
    }

    /// Pushes `n` frames in display order, draining ready frames between
    /// pushes exactly as a well-behaved caller of the public API would.
    fn feed(planner: &mut GopPlanner, n: usize) -> Vec<PlannedFrame> {
        let mut out = Vec::new();
        for _ in 0..n {
            out.extend(drain_ready(planner));
            planner.push(frame());
        }
        out.extend(drain_ready(planner));
        out
    }

    #[test]
    fn classify_k0_b0_all_p_after_first() {
        assert_eq!(classify(0, 0, 0), FrameType::Idr);
        for d in 1..10u64 {
            assert_eq!(classify(d, 0, 0), FrameType::P);
        }
    }

    #[test]
    fn classify_k1_b0_all_idr() {
        for d in 0..10u64 {
            assert_eq!(classify(d, 1, 0), FrameType::Idr);
        }
    }

    #[test]
    fn classify_k30_b4_pattern() {
        // I B B B B P B B B B P ... I
        let mut types = Vec::new();
        for d in 0..10u64 {
            types.push(classify(d, 30, 4));
        }
        use FrameType::*;
        assert_eq!(types, vec![Idr, B, B, B, B, P, B, B, B, B]);
    }

    #[test]
    fn scenario_ip_stream_k0_b0_four_frames() {
        let mut planner = GopPlanner::new(0, 0, 1);
        let emitted = feed(&mut planner, 4);
        let display_orders: Vec<_> = emitted.iter().map(|f| f.display_order).collect();
        let decoding_orders: Vec<_> = emitted.iter().map(|f| f.decoding_order).collect();
        assert_eq!(display_orders, vec![0, 1, 2, 3]);
        assert_eq!(decoding_orders, vec![0, 1, 2, 3]);
        assert_eq!(emitted[0].frame_type, FrameType::Idr);
        for f in &emitted[1..] {
            assert_eq!(f.frame_type, FrameType::P);
        }
    }

    #[test]
    fn scenario_closed_gop_with_b_k4_b2_five_frames() {
        let mut planner = GopPlanner::new(4, 2, 2);
        let emitted = feed(&mut planner, 5);
        let display_orders: Vec<_> = emitted.iter().map(|f| f.display_order).collect();
        assert_eq!(display_orders, vec![0, 3, 1, 2, 4]);

        use FrameType::*;
        let types: Vec<_> = emitted.iter().map(|f| f.frame_type).collect();
        assert_eq!(types, vec![Idr, P, B, B, Idr]);

        let pocs: Vec<_> = emitted.iter().map(|f| f.poc_lsb).collect();
        assert_eq!(pocs, vec![0, 3, 1, 2, 0]);

        // frame-3 (P) L0 = [0]
        assert_eq!(emitted[1].ref_list_0, vec![0]);
        assert!(emitted[1].ref_list_1.is_empty());
        // frame-1 (B) L0=[0] L1=[3]
        assert_eq!(emitted[2].ref_list_0, vec![0]);
        assert_eq!(emitted[2].ref_list_1, vec![3]);
        // frame-2 (B) L0=[0] L1=[3]
        assert_eq!(emitted[3].ref_list_0, vec![0]);
        assert_eq!(emitted[3].ref_list_1, vec![3]);
        // frame-4 (IDR) empty
        assert!(emitted[4].ref_list_0.is_empty());
        assert!(emitted[4].ref_list_1.is_empty());
    }

    #[test]
    fn scenario_infinite_gop_with_b_k0_b2() {
        let mut planner = GopPlanner::new(0, 2, 2);
        let emitted = feed(&mut planner, 7);
        let display_orders: Vec<_> = emitted.iter().map(|f| f.display_order).collect();
        assert_eq!(display_orders, vec![0, 3, 1, 2, 6, 4, 5]);
    }

    #[test]
    fn flush_on_empty_planner_is_noop() {
        let mut planner = GopPlanner::new(4, 2, 2);
        planner.flush();
        assert!(!planner.has_current());
        assert!(planner.is_drained());
    }

    #[test]
    fn flush_converts_dangling_b_frames_to_p() {
        let mut planner = GopPlanner::new(4, 2, 3);
        let mut emitted = Vec::new();
        planner.push(frame()); // display 0, IDR: becomes current immediately.
        emitted.extend(drain_ready(&mut planner));
        planner.push(frame()); // display 1, B: buffered, current stays empty.
        planner.push(frame()); // display 2, B: buffered, current stays empty.
        // Frames 1 and 2 are buffered as B, waiting on frame 3 (not pushed).
        assert_eq!(planner.reorder_buffer_len(), 2);

        planner.flush();
        emitted.extend(drain_ready(&mut planner));
        let display_orders: Vec<_> = emitted.iter().map(|f| f.display_order).collect();
        assert_eq!(display_orders, vec![0, 1, 2]);
        assert_eq!(emitted[1].frame_type, FrameType::P);
        assert_eq!(emitted[2].frame_type, FrameType::P);
        assert_eq!(planner.encoded_ref_list().len(), 3);
    }

    #[test]
    fn b_frame_references_straddle_its_display_order() {
        let mut planner = GopPlanner::new(0, 2, 2);
        let emitted = feed(&mut planner, 7);
        for f in emitted.iter().filter(|f| f.frame_type == FrameType::B) {
            // ref_list_0/1 store POCs relative to the last IDR; recover
            // absolute display orders to check the straddle property.
            let forward_abs = f.ref_list_0[0];
            let backward_abs = f.ref_list_1[0];
            assert!(forward_abs < f.poc_lsb);
            assert!(backward_abs > f.poc_lsb);
        }
    }
}
