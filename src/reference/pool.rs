// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Owns the set of reconstructed-picture textures dedicated to the
//! video-encode engine, recycled via a free/used split.

use std::collections::HashSet;

use crate::device::{GpuDevice, TextureHandle};

/// One extra slot beyond `maxReferenceFrameCount` covers the in-flight
/// reconstructed picture of the frame currently being emitted.
pub struct ReferencePool {
    free: HashSet<TextureHandle>,
    used: HashSet<TextureHandle>,
    width: u32,
    height: u32,
    max_reference_frame_count: u32,
}

impl ReferencePool {
    pub fn new(width: u32, height: u32, max_reference_frame_count: u32) -> Self {
        ReferencePool {
            free: HashSet::new(),
            used: HashSet::new(),
            width,
            height,
            max_reference_frame_count,
        }
    }

    fn capacity(&self) -> usize {
        self.max_reference_frame_count as usize + 1
    }

    /// Takes a texture from `free`, creating one on the device if the
    /// free set is empty and there's still room under `N + 1`.
    pub fn allocate(&mut self, device: &dyn GpuDevice) -> anyhow::Result<TextureHandle> {
        let tex = if let Some(&tex) = self.free.iter().next() {
            self.free.remove(&tex);
            tex
        } else {
            device.create_texture(self.width, self.height)?
        };
        self.used.insert(tex);
        debug_assert!(self.free.len() + self.used.len() <= self.capacity());
        Ok(tex)
    }

    pub fn release(&mut self, tex: TextureHandle) {
        if self.used.remove(&tex) {
            self.free.insert(tex);
        }
    }

    /// Moves every texture currently in `used` back into `free`.
    /// Invoked on IDR/reset.
    pub fn reclaim_all(&mut self) {
        for tex in self.used.drain() {
            self.free.insert(tex);
        }
    }

    pub fn outstanding_count(&self) -> usize {
        self.free.len() + self.used.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::dummy::DummyDevice;

    #[test]
    fn allocate_creates_up_to_capacity_then_reuses() {
        let device = DummyDevice::new();
        let mut pool = ReferencePool::new(16, 16, 2);

        let a = pool.allocate(&device).unwrap();
        let b = pool.allocate(&device).unwrap();
        let c = pool.allocate(&device).unwrap();
        assert_eq!(pool.outstanding_count(), 3);
        assert!(pool.free.is_empty());

        pool.release(a);
        assert_eq!(pool.free.len(), 1);

        let d = pool.allocate(&device).unwrap();
        assert_eq!(d, a, "released texture should be reused before creating a new one");
        assert_eq!(pool.outstanding_count(), 3);

        let _ = (b, c);
    }

    #[test]
    fn reclaim_all_moves_used_to_free() {
        let device = DummyDevice::new();
        let mut pool = ReferencePool::new(16, 16, 2);
        let _ = pool.allocate(&device).unwrap();
        let _ = pool.allocate(&device).unwrap();
        assert_eq!(pool.used.len(), 2);

        pool.reclaim_all();
        assert!(pool.used.is_empty());
        assert_eq!(pool.free.len(), 2);
    }

    #[test]
    fn never_exceeds_n_plus_one_outstanding() {
        let device = DummyDevice::new();
        let mut pool = ReferencePool::new(16, 16, 1);
        let _ = pool.allocate(&device).unwrap();
        let _ = pool.allocate(&device).unwrap();
        assert_eq!(pool.outstanding_count(), 2);
    }
}
