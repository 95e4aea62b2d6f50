// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loading and saving `.sbn`/`.sbx` file pairs.

use alloc::vec::Vec;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::codec;
use crate::config::SaveOptions;
use crate::error::{SbnError, SbnResult};
use crate::tree::SbnTree;

/// Path of the `.sbx` file that accompanies `sbn`.
pub fn sbx_path(sbn: &Path) -> PathBuf {
    sbn.with_extension("sbx")
}

/// Fail with [`SbnError::FileNotFound`] unless both files of the pair exist.
pub(crate) fn check_pair(sbn: &Path) -> SbnResult<PathBuf> {
    if !sbn.is_file() {
        return Err(SbnError::FileNotFound(sbn.to_path_buf()));
    }
    let sbx = sbx_path(sbn);
    if !sbx.is_file() {
        return Err(SbnError::FileNotFound(sbx));
    }
    Ok(sbx)
}

/// Render the `.sbn` file at `path` as text. See [`codec::dump_sbn`].
pub fn dump_file(path: impl AsRef<Path>, out: &mut impl core::fmt::Write) -> SbnResult<()> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(SbnError::FileNotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    codec::dump_sbn(&bytes, out)
}

impl SbnTree {
    /// Load the tree stored at `path` and its companion `.sbx`.
    ///
    /// Only the `.sbn` is parsed, but both files must exist.
    pub fn load(path: impl AsRef<Path>) -> SbnResult<Self> {
        let path = path.as_ref();
        check_pair(path)?;
        let bytes = fs::read(path)?;
        let tree = Self::from_bytes(&bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "read sbn file");
        Ok(tree)
    }

    /// Read a tree from an `.sbn` stream.
    pub fn read_from(mut reader: impl Read) -> SbnResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Write the tree to a pair of streams.
    pub fn write_to(&self, mut sbn: impl Write, mut sbx: impl Write) -> SbnResult<()> {
        let encoded = self.to_bytes();
        sbn.write_all(&encoded.sbn)?;
        sbx.write_all(&encoded.sbx)?;
        sbn.flush()?;
        sbx.flush()?;
        Ok(())
    }

    /// Write the tree to `path` and its companion `.sbx` with default options.
    pub fn save(&self, path: impl AsRef<Path>) -> SbnResult<()> {
        self.save_with(path, &SaveOptions::default())
    }

    /// Write the tree to `path` and its companion `.sbx`.
    ///
    /// With [`SaveOptions::atomic`] both files are first written next to their
    /// targets with a `.tmp` suffix and then renamed over them, so readers never
    /// see a half-written file.
    pub fn save_with(&self, path: impl AsRef<Path>, options: &SaveOptions) -> SbnResult<()> {
        let sbn = path.as_ref();
        let sbx = sbx_path(sbn);
        let encoded = self.to_bytes();

        if options.atomic {
            let sbn_tmp = tmp_path(sbn);
            let sbx_tmp = tmp_path(&sbx);
            write_file(&sbn_tmp, &encoded.sbn, options.sync)?;
            write_file(&sbx_tmp, &encoded.sbx, options.sync)?;
            fs::rename(&sbn_tmp, sbn)?;
            fs::rename(&sbx_tmp, &sbx)?;
            if options.sync {
                sync_parent(sbn);
            }
        } else {
            write_file(sbn, &encoded.sbn, options.sync)?;
            write_file(&sbx, &encoded.sbx, options.sync)?;
        }
        debug!(
            path = %sbn.display(),
            features = self.feature_count(),
            sbn_bytes = encoded.sbn.len(),
            sbx_bytes = encoded.sbx.len(),
            "saved sbn index"
        );
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_file(path: &Path, bytes: &[u8], sync: bool) -> SbnResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}

/// Best effort: not every platform can open a directory for syncing.
fn sync_parent(path: &Path) {
    if let Some(dir) = path.parent()
        && let Ok(dir) = File::open(dir)
    {
        let _ = dir.sync_all();
    }
}
