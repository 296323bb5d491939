// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reference-picture texture pooling and the decoding-order descriptor
//! list the device uses to locate them.

pub mod manager;
pub mod pool;

pub use manager::{ReferenceDescriptor, ReferenceManager};
pub use pool::ReferencePool;
