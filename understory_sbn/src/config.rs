// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Configuration passed explicitly to readers and writers.

use crate::error::{SbnError, SbnResult};

/// Default deepest level whose nodes the query-only tree keeps in memory.
pub const DEFAULT_MAX_CACHE_LEVEL: u32 = 8;

/// Configuration for the lazy query-only tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOnlyConfig {
    /// Nodes at this level or above are cached after their first load; deeper
    /// nodes are re-read from disk on every query. Must be at least 1.
    pub max_cache_level: u32,
}

impl Default for QueryOnlyConfig {
    fn default() -> Self {
        Self {
            max_cache_level: DEFAULT_MAX_CACHE_LEVEL,
        }
    }
}

impl QueryOnlyConfig {
    /// Sets the deepest cached level.
    #[must_use]
    pub fn with_max_cache_level(mut self, level: u32) -> Self {
        self.max_cache_level = level;
        self
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> SbnResult<()> {
        if self.max_cache_level < 1 {
            return Err(SbnError::InvalidConfig(
                "max cache level must be greater or equal 1",
            ));
        }
        Ok(())
    }
}

/// How an index is written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Write to temporary files next to the targets and rename them into place.
    pub atomic: bool,
    /// Flush file contents to stable storage before returning (or renaming).
    pub sync: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            atomic: true,
            sync: false,
        }
    }
}

impl SaveOptions {
    /// Sets whether saves go through temporary files.
    #[must_use]
    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    /// Sets whether saves are synced to disk.
    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(QueryOnlyConfig::default().max_cache_level, 8);
        assert!(QueryOnlyConfig::default().validate().is_ok());
        let save = SaveOptions::default();
        assert!(save.atomic);
        assert!(!save.sync);
    }

    #[test]
    fn zero_cache_level_is_rejected() {
        let config = QueryOnlyConfig::default().with_max_cache_level(0);
        assert!(matches!(
            config.validate(),
            Err(SbnError::InvalidConfig(_))
        ));
    }
}
