//! Authoritative zone data and resolution.
//!
//! A [`ZoneTable`] is built once from configuration, validated
//! atomically, and never mutated afterwards. Reloads build a fresh
//! table and swap it into the [`SharedZone`], so concurrent lookups
//! always see a consistent snapshot and never coordinate with writers.

#![warn(missing_docs)]
#![warn(clippy::all)]

use arc_swap::ArcSwap;
use bytes::Bytes;
use campion_config::{Config, ZoneSection};
use campion_proto::{Name, RData, RecordType, ResourceRecord};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Longest CNAME chain followed before giving up.
pub const MAX_CNAME_DEPTH: usize = 8;

/// Errors raised while building a zone table from configuration.
///
/// Any of these fails the whole load; a partially-built table is
/// never installed.
#[derive(Debug, Error)]
pub enum ZoneError {
    /// A zone suffix does not parse as a domain name.
    #[error("invalid zone suffix {suffix:?}: {source}")]
    InvalidSuffix {
        /// The configured suffix.
        suffix: String,
        /// The underlying name error.
        source: campion_proto::Error,
    },

    /// A record name does not parse or qualify.
    #[error("invalid record name {name:?}: {source}")]
    InvalidName {
        /// The configured name.
        name: String,
        /// The underlying name error.
        source: campion_proto::Error,
    },

    /// A fully-qualified record name falls outside its zone.
    #[error("record name {name} is outside zone {suffix}")]
    NameOutsideZone {
        /// The qualified record name.
        name: Name,
        /// The zone suffix.
        suffix: Name,
    },

    /// A record type cannot be served from configuration.
    #[error("record type {rtype:?} cannot be configured")]
    UnsupportedType {
        /// The configured type string.
        rtype: String,
    },

    /// A record value does not match its type's shape.
    #[error("value {value:?} is not a valid {rtype} value for {name}")]
    InvalidValue {
        /// The qualified record name.
        name: Name,
        /// The record type.
        rtype: RecordType,
        /// The configured value.
        value: String,
    },

    /// A CNAME would coexist with other records at the same name.
    #[error("CNAME at {name} must be the only record at that name")]
    CnameConflict {
        /// The conflicting name.
        name: Name,
    },
}

/// Outcome of an authoritative lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The name is ours and these records answer the question. The
    /// vector is empty when the name exists but has no record of the
    /// requested type.
    Answered(Vec<ResourceRecord>),
    /// The name falls under a served suffix but does not exist.
    NameNotFound,
    /// The name is outside every served suffix; forward it.
    NotAuthoritative,
}

/// Immutable zone data: records by owner name plus the served suffixes.
#[derive(Debug, Default)]
pub struct ZoneTable {
    records: hashbrown::HashMap<Name, Vec<ResourceRecord>>,
    suffixes: Vec<Name>,
}

impl ZoneTable {
    /// Builds and validates the table from configuration.
    ///
    /// Validates that every name qualifies under its zone suffix, every
    /// value matches its declared type's shape, and CNAMEs stand alone.
    pub fn from_config(config: &Config) -> Result<Self, ZoneError> {
        let server_ip = config.resolve_server_ip();
        let mut table = Self::default();

        for zone in &config.zones {
            table.load_zone(zone, server_ip)?;
        }

        info!(
            zones = table.suffixes.len(),
            records = table.record_count(),
            "zone table loaded"
        );
        Ok(table)
    }

    fn load_zone(&mut self, zone: &ZoneSection, server_ip: Ipv4Addr) -> Result<(), ZoneError> {
        let suffix = Name::from_str(&zone.suffix)
            .map_err(|source| ZoneError::InvalidSuffix {
                suffix: zone.suffix.clone(),
                source,
            })?
            .lowercased();

        for record in &zone.records {
            let name = qualify(&record.name, &suffix)?;
            if !name.is_under(&suffix) {
                return Err(ZoneError::NameOutsideZone {
                    name,
                    suffix: suffix.clone(),
                });
            }
            let rtype = RecordType::from_str(&record.rtype).map_err(|_| {
                ZoneError::UnsupportedType {
                    rtype: record.rtype.clone(),
                }
            })?;
            let ttl = record.ttl.unwrap_or(zone.ttl);
            let rdata = parse_value(&name, rtype, &record.value, &suffix, server_ip)?;

            debug!(%name, %rtype, ttl, "loading record");
            self.insert(ResourceRecord::new(
                name,
                rtype,
                campion_proto::Class::IN,
                ttl,
                rdata,
            ))?;
        }

        self.suffixes.push(suffix);
        Ok(())
    }

    fn insert(&mut self, record: ResourceRecord) -> Result<(), ZoneError> {
        let existing = self.records.entry(record.name.clone()).or_default();

        let has_cname = existing.iter().any(|r| r.rtype == RecordType::CNAME);
        if has_cname || (record.rtype == RecordType::CNAME && !existing.is_empty()) {
            return Err(ZoneError::CnameConflict { name: record.name });
        }

        existing.push(record);
        Ok(())
    }

    /// Served suffixes.
    pub fn suffixes(&self) -> &[Name] {
        &self.suffixes
    }

    /// Total number of records.
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Returns true if `name` falls under a served suffix.
    pub fn is_authoritative(&self, name: &Name) -> bool {
        self.suffixes.iter().any(|suffix| name.is_under(suffix))
    }

    /// Resolves a question against the zone.
    ///
    /// CNAME chains are chased through the table up to
    /// [`MAX_CNAME_DEPTH`] links; a longer chain resolves to
    /// [`Lookup::NameNotFound`] rather than looping. A chain leading
    /// outside the served suffixes stops with the links collected so
    /// far. A name that exists without the requested type yields an
    /// empty [`Lookup::Answered`], which is distinct from
    /// [`Lookup::NameNotFound`].
    pub fn resolve(&self, name: &Name, rtype: RecordType) -> Lookup {
        if !self.is_authoritative(name) {
            return Lookup::NotAuthoritative;
        }

        let mut answers: Vec<ResourceRecord> = Vec::new();
        let mut current = name.clone();
        let mut depth = 0usize;

        loop {
            let Some(records) = self.records.get(&current) else {
                // Aliases pointing at missing local names still answer
                // with the chain collected so far.
                return if answers.is_empty() {
                    Lookup::NameNotFound
                } else {
                    Lookup::Answered(answers)
                };
            };

            let cname = records
                .iter()
                .find(|r| r.rtype == RecordType::CNAME)
                .and_then(|r| r.rdata.as_cname().map(|t| (r.clone(), t.clone())));

            match cname {
                Some((record, target))
                    if rtype != RecordType::CNAME && rtype != RecordType::ANY =>
                {
                    answers.push(record);
                    depth += 1;
                    if depth > MAX_CNAME_DEPTH {
                        debug!(name = %name, depth, "cname chain too deep");
                        return Lookup::NameNotFound;
                    }
                    if !self.is_authoritative(&target) {
                        return Lookup::Answered(answers);
                    }
                    current = target;
                }
                _ => {
                    answers.extend(
                        records
                            .iter()
                            .filter(|r| rtype == RecordType::ANY || r.rtype == rtype)
                            .cloned(),
                    );
                    return Lookup::Answered(answers);
                }
            }
        }
    }
}

/// Qualifies a configured record name against the zone suffix.
///
/// `@` names the apex, a name ending in a dot is taken as fully
/// qualified, anything else is relative to the suffix.
fn qualify(name: &str, suffix: &Name) -> Result<Name, ZoneError> {
    if name == "@" {
        return Ok(suffix.clone());
    }
    let parsed = Name::from_str(name).map_err(|source| ZoneError::InvalidName {
        name: name.to_string(),
        source,
    })?;
    let qualified = if name.ends_with('.') {
        parsed
    } else {
        parsed
            .joined(suffix)
            .map_err(|source| ZoneError::InvalidName {
                name: name.to_string(),
                source,
            })?
    };
    Ok(qualified.lowercased())
}

fn parse_value(
    name: &Name,
    rtype: RecordType,
    value: &str,
    suffix: &Name,
    server_ip: Ipv4Addr,
) -> Result<RData, ZoneError> {
    let invalid = || ZoneError::InvalidValue {
        name: name.clone(),
        rtype,
        value: value.to_string(),
    };

    match rtype {
        RecordType::A => {
            if value == "server" {
                return Ok(RData::A(server_ip));
            }
            value.parse::<Ipv4Addr>().map(RData::A).map_err(|_| invalid())
        }
        RecordType::AAAA => value
            .parse::<Ipv6Addr>()
            .map(RData::Aaaa)
            .map_err(|_| invalid()),
        RecordType::CNAME => Ok(RData::Cname(qualify(value, suffix).map_err(|_| invalid())?)),
        RecordType::NS => Ok(RData::Ns(qualify(value, suffix).map_err(|_| invalid())?)),
        RecordType::PTR => Ok(RData::Ptr(qualify(value, suffix).map_err(|_| invalid())?)),
        RecordType::MX => {
            let (pref, exchange) = value.split_once(char::is_whitespace).ok_or_else(invalid)?;
            let preference = pref.parse::<u16>().map_err(|_| invalid())?;
            let exchange = qualify(exchange.trim(), suffix).map_err(|_| invalid())?;
            Ok(RData::Mx {
                preference,
                exchange,
            })
        }
        RecordType::TXT => {
            // Long values split into 255-byte character strings.
            let bytes = value.as_bytes();
            let strings = bytes
                .chunks(255)
                .map(Bytes::copy_from_slice)
                .collect::<Vec<_>>();
            Ok(RData::Txt(strings))
        }
        _ => Err(ZoneError::UnsupportedType {
            rtype: rtype.to_string(),
        }),
    }
}

/// The live zone snapshot, atomically replaceable on reload.
pub struct SharedZone {
    inner: ArcSwap<ZoneTable>,
}

impl SharedZone {
    /// Wraps an initial table.
    pub fn new(table: ZoneTable) -> Self {
        Self {
            inner: ArcSwap::from_pointee(table),
        }
    }

    /// Returns the current snapshot. The snapshot stays valid for the
    /// caller even if a reload swaps the table mid-resolution.
    pub fn snapshot(&self) -> Arc<ZoneTable> {
        self.inner.load_full()
    }

    /// Atomically replaces the table.
    pub fn swap(&self, table: ZoneTable) {
        self.inner.store(Arc::new(table));
    }
}
