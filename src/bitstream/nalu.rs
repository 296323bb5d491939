// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! NAL unit framing: 4-byte start code, 1-byte header, and the final
//! trailing-zero guard.

use super::BitWriter;

pub const NAL_REF_IDC_REF: u32 = 3;
pub const NAL_TYPE_SPS: u32 = 7;
pub const NAL_TYPE_PPS: u32 = 8;

/// Wraps an already-byte-aligned RBSP payload (produced with emulation
/// prevention turned on) into a full NAL unit: start code, header, the
/// RBSP bytes, and the trailing-zero guard.
///
/// `nal_ref_idc` and `nal_unit_type` follow the H.264 NAL header layout
/// (`forbidden_zero_bit=0`, `nal_ref_idc`, `nal_unit_type`).
pub fn wrap_rbsp(rbsp: &[u8], nal_ref_idc: u32, nal_unit_type: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    // Start code and header are emitted with prevention off: neither can
    // accidentally form a competing start code since the header's top bit
    // (forbidden_zero_bit) is 0 and nal_ref_idc/type are small constants.
    w.set_emulation_prevention(false);
    w.put_bits(24, 0);
    w.put_bits(8, 1);
    w.put_bits(1, 0); // forbidden_zero_bit
    w.put_bits(2, nal_ref_idc);
    w.put_bits(5, nal_unit_type);

    w.set_emulation_prevention(true);
    for &byte in rbsp {
        w.put_bits(8, byte as u32);
    }

    w.set_emulation_prevention(false);
    let mut out = w.into_bytes();
    if out.last() == Some(&0x00) {
        out.push(0x03);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_start_code_and_header() {
        let rbsp = [0x12, 0x34];
        let nal = wrap_rbsp(&rbsp, NAL_REF_IDC_REF, NAL_TYPE_SPS);
        assert_eq!(&nal[0..4], &[0x00, 0x00, 0x00, 0x01]);
        // forbidden_zero_bit=0, nal_ref_idc=3, nal_unit_type=7 -> 0b01100111
        assert_eq!(nal[4], 0b0110_0111);
        assert_eq!(&nal[5..7], &rbsp);
    }

    #[test]
    fn trailing_zero_byte_gets_emulation_guard() {
        let rbsp = [0x01, 0x00];
        let nal = wrap_rbsp(&rbsp, NAL_REF_IDC_REF, NAL_TYPE_PPS);
        assert_eq!(nal.last(), Some(&0x03));
    }

    #[test]
    fn no_guard_when_last_byte_nonzero() {
        let rbsp = [0x01, 0xFF];
        let nal = wrap_rbsp(&rbsp, NAL_REF_IDC_REF, NAL_TYPE_PPS);
        assert_eq!(nal.last(), Some(&0xFF));
    }

    #[test]
    fn no_false_start_code_inside_rbsp() {
        // Two zero bytes followed by a byte in {0,1,2,3} inside the payload
        // must have been emulation-prevented already.
        let rbsp = [0x00, 0x00, 0x01];
        let nal = wrap_rbsp(&rbsp, NAL_REF_IDC_REF, NAL_TYPE_SPS);
        let payload = &nal[5..];
        assert_eq!(payload, &[0x00, 0x00, 0x03, 0x01]);
    }
}
