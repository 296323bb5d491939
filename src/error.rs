// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Error taxonomy for the encoder.

use thiserror::Error;

/// Bits reported by the device in the resolved frame metadata when an
/// encode operation failed. Modeled as a plain newtype with associated
/// constants rather than pulling in the `bitflags` crate, matching this
/// codebase's preference for explicit enums over flag-derive crates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodeErrorFlags(pub u32);

impl EncodeErrorFlags {
    pub const NONE: Self = EncodeErrorFlags(0);
    pub const CODEC_PICTURE_CONTROL_NOT_SUPPORTED: Self = EncodeErrorFlags(1 << 0);
    pub const SUBREGION_LAYOUT_NOT_SUPPORTED: Self = EncodeErrorFlags(1 << 1);
    pub const INVALID_REFERENCE_PICTURES: Self = EncodeErrorFlags(1 << 2);
    pub const RECONFIGURATION_REQUEST_NOT_SUPPORTED: Self = EncodeErrorFlags(1 << 3);
    pub const INVALID_METADATA_BUFFER_SOURCE: Self = EncodeErrorFlags(1 << 4);
    pub const NO_ERROR: Self = Self::NONE;

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    const ALL: &'static [(&'static str, EncodeErrorFlags)] = &[
        ("CODEC_PICTURE_CONTROL_NOT_SUPPORTED", Self::CODEC_PICTURE_CONTROL_NOT_SUPPORTED),
        ("SUBREGION_LAYOUT_NOT_SUPPORTED", Self::SUBREGION_LAYOUT_NOT_SUPPORTED),
        ("INVALID_REFERENCE_PICTURES", Self::INVALID_REFERENCE_PICTURES),
        (
            "RECONFIGURATION_REQUEST_NOT_SUPPORTED",
            Self::RECONFIGURATION_REQUEST_NOT_SUPPORTED,
        ),
        ("INVALID_METADATA_BUFFER_SOURCE", Self::INVALID_METADATA_BUFFER_SOURCE),
    ];
}

impl std::fmt::Display for EncodeErrorFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "(none)");
        }
        let names: Vec<&str> =
            Self::ALL.iter().filter(|(_, bit)| self.contains(*bit)).map(|(name, _)| *name).collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Errors surfaced by the public encoder API. Every failure mode the
/// encoder surfaces maps to one of these variants; no error is
/// swallowed internally.
#[derive(Error, Debug)]
pub enum EncoderError {
    /// An unsupported resolution/profile/level/input-format combination, or
    /// an invalid combination of GOP parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The underlying device call returned a failure.
    #[error("device error: {0}")]
    Device(#[from] anyhow::Error),

    /// Resolved metadata reported one or more encode error flags.
    #[error("encoding error, flags = {0}")]
    Encoding(EncodeErrorFlags),

    /// A POC reference requested by the planner is absent from the
    /// reference-descriptor list.
    #[error("invalid reference: poc {0} not found in descriptor list")]
    InvalidReference(i64),

    /// The public API was called out of order, e.g. `pushFrame` while a
    /// frame is already current.
    #[error("protocol misuse: {0}")]
    ProtocolMisuse(&'static str),
}

pub type EncoderResult<T> = Result<T, EncoderError>;
