// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for reading, writing and editing SBN indexes.

#[cfg(feature = "std")]
use std::path::PathBuf;

use thiserror::Error;

/// Result type for SBN operations.
pub type SbnResult<T> = Result<T, SbnError>;

/// Errors surfaced by the SBN reader, writer and tree operations.
///
/// Format errors are fatal for the stream being read; nothing is retried.
#[derive(Debug, Error)]
pub enum SbnError {
    /// The file codes of a header are not `9994` / `-400`.
    #[error("not a shapefile index: file codes {file_code} / {file_code_index}")]
    NotAShapefileIndex {
        /// First header word.
        file_code: i32,
        /// Second header word.
        file_code_index: i32,
    },

    /// The input ended before a structure could be read completely.
    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required by the structure being read.
        needed: usize,
        /// Bytes left in the input.
        available: usize,
    },

    /// A record tag other than the expected one.
    #[error("unexpected record tag: expected {expected}, found {found}")]
    UnexpectedRecord {
        /// Tag the format requires here.
        expected: i32,
        /// Tag found in the input.
        found: i32,
    },

    /// Bin payloads are not numbered consecutively.
    #[error("bin id mismatch: expected {expected}, found {found}")]
    BinIdMismatch {
        /// Id the reader expected next.
        expected: i32,
        /// Id stored in the bin header.
        found: i32,
    },

    /// A bin header declares an impossible feature count.
    #[error("malformed bin {bin_id}: {num_features} features")]
    MalformedBin {
        /// Id of the offending bin.
        bin_id: i32,
        /// Declared feature count.
        num_features: i32,
    },

    /// The bin index references a node deeper than the header's record count allows.
    #[error("node {node} is outside a tree of {levels} levels")]
    NodeOutOfRange {
        /// Node id from the bin index.
        node: usize,
        /// Levels derived from the header.
        levels: u32,
    },

    /// A negative count or length in a header or index entry.
    #[error("invalid count {0}")]
    InvalidCount(i32),

    /// The feature id is already present in the tree.
    #[error("feature id {0} is already indexed")]
    DuplicateFid(u32),

    /// The `.sbn` and `.sbx` headers disagree.
    #[error("sbn and sbx disagree on the record count: {sbn} vs {sbx}")]
    HeaderMismatch {
        /// Record count in the `.sbn` header.
        sbn: u32,
        /// Record count in the `.sbx` header.
        sbx: u32,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Writing a text dump failed.
    #[error("formatting failed")]
    Format(#[from] core::fmt::Error),

    /// A requested `.sbn` or companion `.sbx` file does not exist.
    #[cfg(feature = "std")]
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Underlying I/O failure.
    #[cfg(feature = "std")]
    #[error("I/O error: {source}")]
    Io {
        /// The I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl SbnError {
    /// Whether the error describes malformed index data rather than a usage or I/O problem.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::NotAShapefileIndex { .. }
                | Self::Truncated { .. }
                | Self::UnexpectedRecord { .. }
                | Self::BinIdMismatch { .. }
                | Self::MalformedBin { .. }
                | Self::NodeOutOfRange { .. }
                | Self::InvalidCount(_)
                | Self::HeaderMismatch { .. }
        )
    }
}
