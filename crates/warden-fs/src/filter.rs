//! Include/exclude glob filters for directory traversal
//!
//! Patterns use `globset` syntax and are matched against the `/`-separated
//! path relative to the traversal root, and against the entry's own name.
//! `*` may cross directory separators, so `*.log` excludes log files at any
//! depth. Exclusion always wins over inclusion.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Include/exclude pattern lists, as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFilter {
    /// When non-empty, only entries matching at least one pattern are kept.
    #[serde(default)]
    pub include_only: Vec<String>,
    /// Entries matching any pattern are skipped entirely.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl PathFilter {
    /// A filter that keeps everything.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_only.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// Compile the pattern lists into matchers.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` for the first malformed glob.
    pub fn compile(&self) -> Result<CompiledFilter> {
        Ok(CompiledFilter {
            include: build_set(&self.include_only)?,
            exclude: build_set(&self.exclude)?,
            include_prefixes: self
                .include_only
                .iter()
                .map(|p| literal_prefix(p))
                .collect(),
        })
    }
}

/// Compiled form of a [`PathFilter`].
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    include: GlobSet,
    exclude: GlobSet,
    /// Leading glob-free segments of each include pattern
    include_prefixes: Vec<Vec<String>>,
}

impl CompiledFilter {
    /// A compiled filter that keeps everything.
    pub fn allow_all() -> Self {
        Self {
            include: GlobSet::empty(),
            exclude: GlobSet::empty(),
            include_prefixes: Vec::new(),
        }
    }

    /// Whether the include list is active.
    pub fn has_includes(&self) -> bool {
        !self.include_prefixes.is_empty()
    }

    /// Whether an entry is excluded.
    pub fn is_excluded(&self, rel: &str) -> bool {
        self.exclude.is_match(rel) || self.exclude.is_match(entry_name(rel))
    }

    /// Whether a file is kept.
    ///
    /// With an active include list a file is kept when it matches a pattern
    /// itself or sits below a directory that does.
    pub fn keeps_file(&self, rel: &str) -> bool {
        if self.is_excluded(rel) {
            return false;
        }
        !self.has_includes() || self.is_included(rel) || self.has_included_ancestor(rel)
    }

    /// Whether a directory should be descended into.
    ///
    /// With an active include list a directory is descended when it matches a
    /// pattern itself or lies along the literal prefix of one.
    pub fn descends_into(&self, rel: &str) -> bool {
        if self.is_excluded(rel) {
            return false;
        }
        if !self.has_includes() || self.is_included(rel) || self.has_included_ancestor(rel) {
            return true;
        }

        let dir: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
        self.include_prefixes.iter().any(|prefix| {
            let shared = prefix.len().min(dir.len());
            prefix.is_empty() || prefix[..shared].iter().zip(&dir[..shared]).all(|(a, b)| a == b)
        })
    }

    fn is_included(&self, rel: &str) -> bool {
        self.include.is_match(rel) || self.include.is_match(entry_name(rel))
    }

    fn has_included_ancestor(&self, rel: &str) -> bool {
        rel.match_indices('/')
            .map(|(at, _)| &rel[..at])
            .filter(|dir| !dir.is_empty())
            .any(|dir| self.is_included(dir))
    }
}

impl Default for CompiledFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| Error::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| Error::InvalidPattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

fn literal_prefix(pattern: &str) -> Vec<String> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .take_while(|s| !s.contains(['*', '?', '[', '{']))
        .map(str::to_string)
        .collect()
}

fn entry_name(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}
