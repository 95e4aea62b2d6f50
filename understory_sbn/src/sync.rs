// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A tree shared between threads.

use alloc::vec::Vec;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::Backend;
use crate::config::SaveOptions;
use crate::error::SbnResult;
use crate::tree::{InsertOutcome, SbnTree};
use crate::types::{Envelope, Interval};

/// A cloneable handle to one [`SbnTree`] behind a reader/writer lock.
///
/// Queries share the read lock. Inserts and removes take the write lock, and so
/// does saving, so a save never interleaves with an edit.
#[derive(Clone, Debug)]
pub struct SharedSbnTree {
    inner: Arc<RwLock<SbnTree>>,
}

impl SharedSbnTree {
    /// Wrap `tree`.
    pub fn new(tree: SbnTree) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    /// Load a tree from disk. See [`SbnTree::load`].
    pub fn load(path: impl AsRef<Path>) -> SbnResult<Self> {
        SbnTree::load(path).map(Self::new)
    }

    /// Lock for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, SbnTree> {
        self.inner.read()
    }

    /// Lock for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, SbnTree> {
        self.inner.write()
    }

    /// See [`SbnTree::insert`].
    pub fn insert(
        &self,
        fid: u32,
        envelope: Envelope,
        z_range: Option<Interval>,
        m_range: Option<Interval>,
    ) -> SbnResult<InsertOutcome> {
        self.inner.write().insert(fid, envelope, z_range, m_range)
    }

    /// See [`SbnTree::remove`].
    pub fn remove(&self, fid: u32, envelope: Option<&Envelope>) -> bool {
        self.inner.write().remove(fid, envelope)
    }

    /// See [`SbnTree::query_fids`].
    pub fn query_fids(&self, envelope: &Envelope) -> Vec<u32> {
        self.inner.read().query_fids(envelope)
    }

    /// See [`SbnTree::save_with`].
    pub fn save_with(&self, path: impl AsRef<Path>, options: &SaveOptions) -> SbnResult<()> {
        let tree = self.inner.write();
        tree.save_with(path, options)
    }

    /// See [`SbnTree::save`].
    pub fn save(&self, path: impl AsRef<Path>) -> SbnResult<()> {
        self.save_with(path, &SaveOptions::default())
    }

    /// Take the tree back if this is the only handle.
    pub fn try_unwrap(self) -> Result<SbnTree, Self> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl From<SbnTree> for SharedSbnTree {
    fn from(tree: SbnTree) -> Self {
        Self::new(tree)
    }
}

impl Backend for SharedSbnTree {
    type Error = core::convert::Infallible;

    fn extent(&self) -> Envelope {
        self.inner.read().extent()
    }

    fn feature_count(&self) -> usize {
        self.inner.read().feature_count()
    }

    fn query_fids(&self, envelope: &Envelope) -> Result<Vec<u32>, Self::Error> {
        Ok(Self::query_fids(self, envelope))
    }
}
