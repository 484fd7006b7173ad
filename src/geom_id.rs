//! Structured geometry identifiers.
//!
//! A [`GeomId`] names one placed volume instance: a category type plus a
//! fixed-arity tuple of unsigned sub-addresses. Identifiers are totally
//! ordered and hashable so they can key the mapping dictionary directly.
//! The text form is `[type:a.b.c]`, with `*` marking a wildcard field in
//! query patterns and `?` an unset field.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Reserved sub-address meaning "not set yet". Never present in a stored
/// dictionary entry.
pub const INVALID_ADDRESS: u32 = 0xFFFF_FFFF;

/// Reserved sub-address meaning "match anything". Legal only in query
/// patterns, never in stored dictionary entries.
pub const ANY_ADDRESS: u32 = 0xFFFF_FFFE;

/// Reserved type tag for an identifier with no category.
pub const INVALID_TYPE: u32 = 0xFFFF_FFFF;

/// Conventional type tag of the world category.
pub const WORLD_TYPE: u32 = 0;


/// A typed, fixed-arity tuple of sub-addresses naming one placed volume.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeomId {
    type_id: u32,        // category type tag
    addresses: Vec<u32>, // one sub-address per schema field
}

impl GeomId {
    pub fn new(type_id: u32, addresses: Vec<u32>) -> Self {
        Self { type_id, addresses }
    }

    /// An identifier of the given type with `depth` unset sub-addresses.
    pub fn with_depth(type_id: u32, depth: usize) -> Self {
        Self {
            type_id,
            addresses: vec![INVALID_ADDRESS; depth],
        }
    }

    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn depth(&self) -> usize {
        self.addresses.len()
    }

    pub fn addresses(&self) -> &[u32] {
        &self.addresses
    }

    /// The sub-address at field `i`. Panics if out of range, like slice
    /// indexing; callers validate arity against the category schema first.
    pub fn get(&self, i: usize) -> u32 {
        self.addresses[i]
    }

    pub fn set(&mut self, i: usize, value: u32) {
        if i >= self.addresses.len() {
            self.addresses.resize(i + 1, INVALID_ADDRESS);
        }
        self.addresses[i] = value;
    }

    pub fn set_any(&mut self, i: usize) {
        self.set(i, ANY_ADDRESS);
    }

    pub fn is_any(&self, i: usize) -> bool {
        self.addresses[i] == ANY_ADDRESS
    }

    /// True if the type is set and no sub-address is unset.
    pub fn is_valid(&self) -> bool {
        self.type_id != INVALID_TYPE
            && !self.addresses.is_empty()
            && self.addresses.iter().all(|&a| a != INVALID_ADDRESS)
    }

    /// True if the identifier is valid and contains no wildcard: the form
    /// required of stored dictionary keys.
    pub fn is_complete(&self) -> bool {
        self.is_valid() && self.addresses.iter().all(|&a| a != ANY_ADDRESS)
    }

    /// Copies the mother identifier's sub-addresses into the leading fields.
    ///
    /// Used during identifier synthesis when this identifier's category
    /// descends from the mother's category, so the daughter address is the
    /// mother address extended by its own indices.
    pub fn inherits_from(&mut self, mother: &GeomId) -> Result<()> {
        if self.addresses.len() < mother.addresses.len() {
            return Err(Error::IncompatibleDepth {
                id: self.clone(),
                parent: mother.clone(),
            });
        }
        for (i, &a) in mother.addresses.iter().enumerate() {
            self.addresses[i] = a;
        }
        Ok(())
    }

    /// Field-wise pattern match, treating [`ANY_ADDRESS`] on either side as
    /// always-matching. Types and arity must agree; unset fields never match.
    pub fn matches(&self, other: &GeomId) -> bool {
        if self.type_id != other.type_id || self.addresses.len() != other.addresses.len() {
            return false;
        }
        for (&a, &b) in self.addresses.iter().zip(other.addresses.iter()) {
            if a == INVALID_ADDRESS || b == INVALID_ADDRESS {
                return false;
            }
            if a != b && a != ANY_ADDRESS && b != ANY_ADDRESS {
                return false;
            }
        }
        true
    }
}

const IO_OPEN: char = '[';
const IO_CLOSE: char = ']';
const IO_TYPE_SEP: char = ':';
const IO_ADDR_SEP: char = '.';
const IO_ANY: char = '*';
const IO_INVALID: char = '?';

impl fmt::Display for GeomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{IO_OPEN}")?;
        if self.type_id == INVALID_TYPE {
            write!(f, "{IO_INVALID}")?;
        } else {
            write!(f, "{}", self.type_id)?;
        }
        write!(f, "{IO_TYPE_SEP}")?;
        for (i, &a) in self.addresses.iter().enumerate() {
            if i > 0 {
                write!(f, "{IO_ADDR_SEP}")?;
            }
            match a {
                INVALID_ADDRESS => write!(f, "{IO_INVALID}")?,
                ANY_ADDRESS => write!(f, "{IO_ANY}")?,
                _ => write!(f, "{a}")?,
            }
        }
        write!(f, "{IO_CLOSE}")
    }
}

impl FromStr for GeomId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::InvalidIdText(s.to_string());
        let inner = s
            .strip_prefix(IO_OPEN)
            .and_then(|rest| rest.strip_suffix(IO_CLOSE))
            .ok_or_else(bad)?;
        let (type_part, addr_part) = inner.split_once(IO_TYPE_SEP).ok_or_else(bad)?;

        let type_id = if type_part == IO_INVALID.to_string() {
            INVALID_TYPE
        } else {
            type_part.parse::<u32>().map_err(|_| bad())?
        };

        let mut addresses = Vec::new();
        for token in addr_part.split(IO_ADDR_SEP) {
            let value = match token {
                t if t.len() == 1 && t.starts_with(IO_INVALID) => INVALID_ADDRESS,
                t if t.len() == 1 && t.starts_with(IO_ANY) => ANY_ADDRESS,
                t => t.parse::<u32>().map_err(|_| bad())?,
            };
            addresses.push(value);
        }
        if addresses.is_empty() {
            return Err(bad());
        }
        Ok(GeomId { type_id, addresses })
    }
}
