//! Banned-domain blocklist.
//!
//! A [`Blocklist`] is built from one or more list files (one domain per
//! line, `#` comments) and consulted before any zone lookup. Matched
//! names are answered with the configured redirect address instead of
//! being resolved. Like the zone table, a blocklist is immutable after
//! build and swapped wholesale on reload.

#![warn(missing_docs)]
#![warn(clippy::all)]

use arc_swap::ArcSwap;
use campion_config::BannedSection;
use campion_proto::Name;
use hashbrown::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while building a blocklist.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A list file could not be read.
    #[error("failed to read blocklist {path}: {source}")]
    Io {
        /// The configured list path.
        path: String,
        /// The underlying io error.
        source: std::io::Error,
    },

    /// The match mode is not recognized.
    #[error("unknown banned match mode {mode:?}")]
    UnknownMode {
        /// The configured mode string.
        mode: String,
    },
}

/// How a banned entry matches a queried name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// The entry matches only the exact name.
    Exact,
    /// The entry matches the name and every name under it.
    #[default]
    Suffix,
}

impl FromStr for MatchMode {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "suffix" => Ok(Self::Suffix),
            other => Err(FilterError::UnknownMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// The set of banned names plus the answer given for them.
#[derive(Debug)]
pub struct Blocklist {
    entries: HashSet<Name>,
    mode: MatchMode,
    redirect: Ipv4Addr,
    ttl: u32,
}

impl Default for Blocklist {
    fn default() -> Self {
        Self {
            entries: HashSet::new(),
            mode: MatchMode::default(),
            redirect: Ipv4Addr::LOCALHOST,
            ttl: 60,
        }
    }
}

impl Blocklist {
    /// Builds a blocklist from the banned config section.
    ///
    /// A configured list path that does not exist is logged and
    /// skipped, so a missing list never takes the server down; a path
    /// that exists but cannot be read fails the build.
    pub fn from_config(section: &BannedSection) -> Result<Self, FilterError> {
        let mode = section.mode.parse::<MatchMode>()?;
        let mut entries = HashSet::new();

        for list in &section.lists {
            let path = Path::new(list);
            if !path.exists() {
                warn!(path = %list, "banned list not found, skipping");
                continue;
            }
            let contents = std::fs::read_to_string(path).map_err(|source| FilterError::Io {
                path: list.clone(),
                source,
            })?;
            let before = entries.len();
            load_lines(&contents, &mut entries);
            debug!(path = %list, entries = entries.len() - before, "banned list loaded");
        }

        if !entries.is_empty() {
            info!(entries = entries.len(), ?mode, "blocklist active");
        }

        Ok(Self {
            entries,
            mode,
            redirect: section.ip,
            ttl: section.ttl,
        })
    }

    /// Returns true if `name` is banned.
    pub fn matches(&self, name: &Name) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let name = name.lowercased();
        match self.mode {
            MatchMode::Exact => self.entries.contains(&name),
            MatchMode::Suffix => self.entries.iter().any(|entry| name.is_under(entry)),
        }
    }

    /// The address answered for banned names.
    pub fn redirect(&self) -> Ipv4Addr {
        self.redirect
    }

    /// TTL of the redirect answer.
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Number of banned entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses domain-list lines: one name per line, blank lines and `#`
/// comments skipped, entries lowercased. Unparseable names are logged
/// and dropped rather than failing the whole list.
fn load_lines(contents: &str, entries: &mut HashSet<Name>) {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let domain = line.split('#').next().unwrap_or(line).trim();
        match domain.parse::<Name>() {
            Ok(name) => {
                entries.insert(name.lowercased());
            }
            Err(error) => {
                warn!(line = %domain, %error, "skipping unparseable banned entry");
            }
        }
    }
}

/// The live blocklist, atomically replaceable on reload.
pub struct SharedBlocklist {
    inner: ArcSwap<Blocklist>,
}

impl SharedBlocklist {
    /// Wraps an initial blocklist.
    pub fn new(blocklist: Blocklist) -> Self {
        Self {
            inner: ArcSwap::from_pointee(blocklist),
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<Blocklist> {
        self.inner.load_full()
    }

    /// Atomically replaces the blocklist.
    pub fn swap(&self, blocklist: Blocklist) {
        self.inner.store(Arc::new(blocklist));
    }
}
