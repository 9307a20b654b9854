//! Data structures for the sticky-session table

use crate::constants::{FIXED_KEY_SIZE, STRING_DEFAULT_KEY_SIZE};
use crate::ticks::Tick;
use std::net::Ipv4Addr;

/// Backend server identifier carried by an entry. 0 means "unset".
pub type ServerId = u32;

/// The closed set of key kinds a table can be configured with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyKind {
    Ip,
    Integer,
    String,
}

/// One row of the configuration keyword table.
pub struct TableTypeSpec {
    pub kind: KeyKind,
    pub keyword: &'static str,
    pub custom_key_size: bool,
    pub default_key_size: usize,
}

/// Configuration keywords of known table types.
pub const TABLE_TYPES: [TableTypeSpec; 3] = [
    TableTypeSpec {
        kind: KeyKind::Ip,
        keyword: "ip",
        custom_key_size: false,
        default_key_size: FIXED_KEY_SIZE,
    },
    TableTypeSpec {
        kind: KeyKind::Integer,
        keyword: "integer",
        custom_key_size: false,
        default_key_size: FIXED_KEY_SIZE,
    },
    TableTypeSpec {
        kind: KeyKind::String,
        keyword: "string",
        custom_key_size: true,
        default_key_size: STRING_DEFAULT_KEY_SIZE,
    },
];

/// Parse a table-type directive from a token slice: `ip`, `integer`, or
/// `string [len <n>]`. Returns the kind, the stored key width (terminator
/// included for strings) and how many tokens were consumed, or `None` if
/// the tokens name no known type or carry a zero `len`.
pub fn parse_table_type(args: &[&str]) -> Option<(KeyKind, usize, usize)> {
    let first = args.first()?;
    let spec = TABLE_TYPES.iter().find(|t| t.keyword == *first)?;
    let mut key_size = spec.default_key_size;
    let mut consumed = 1;
    if spec.custom_key_size && args.get(1).copied() == Some("len") {
        let len: usize = args.get(2)?.parse().ok()?;
        if len == 0 {
            return None;
        }
        // null terminated string needs +1 for the terminator slot
        key_size = len + 1;
        consumed = 3;
    }
    Some((spec.kind, key_size, consumed))
}

/// Table construction parameters.
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub kind: KeyKind,
    /// Stored key width in bytes. For `String` this includes the terminator
    /// slot; for `Ip`/`Integer` it is the fixed 4-byte width.
    pub key_size: usize,
    /// Maximum live entries. 0 disables the table entirely.
    pub capacity: usize,
    /// Expiration delay in milliseconds. 0 means entries never expire and
    /// no sweep runs.
    pub ttl_ms: u32,
    /// When true, a full table refuses new entries instead of evicting.
    pub no_purge: bool,
}

impl TableConfig {
    pub fn new(kind: KeyKind, capacity: usize) -> Self {
        let key_size = match kind {
            KeyKind::Ip | KeyKind::Integer => FIXED_KEY_SIZE,
            KeyKind::String => STRING_DEFAULT_KEY_SIZE,
        };
        TableConfig {
            kind,
            key_size,
            capacity,
            ttl_ms: 0,
            no_purge: false,
        }
    }

    /// Normalize a raw key to the stored representation.
    ///
    /// String keys keep at most `key_size - 1` bytes (silent truncation is
    /// the contract, not an error) and the terminator plus padding stay
    /// zero, so full-width comparison distinguishes keys that share a
    /// prefix but differ in length. Fixed kinds are copied verbatim.
    pub fn normalize_key(&self, raw: &[u8]) -> Box<[u8]> {
        let mut buf = vec![0u8; self.key_size];
        match self.kind {
            KeyKind::String => {
                let n = raw.len().min(self.key_size - 1);
                buf[..n].copy_from_slice(&raw[..n]);
            }
            KeyKind::Ip | KeyKind::Integer => {
                debug_assert_eq!(
                    raw.len(),
                    self.key_size,
                    "fixed-kind keys must be provided at their configured width"
                );
                let n = raw.len().min(self.key_size);
                buf[..n].copy_from_slice(&raw[..n]);
            }
        }
        buf.into_boxed_slice()
    }
}

/// A sticky session: one key, the server it maps to, and its deadlines.
///
/// `index_key` is the tick currently recorded in the Expiration Index for
/// this entry. It equals `expire` right after insert or re-stamp and only
/// diverges when a touch moves `expire` before the next scan catches up.
#[derive(Debug)]
pub struct SessionEntry {
    pub(crate) key: Box<[u8]>,
    pub(crate) server_id: ServerId,
    pub(crate) expire: Tick,
    pub(crate) index_key: Tick,
}

impl SessionEntry {
    pub(crate) fn new(config: &TableConfig, raw_key: &[u8]) -> Self {
        SessionEntry {
            key: config.normalize_key(raw_key),
            server_id: 0,
            expire: Tick::ETERNITY,
            index_key: Tick::ETERNITY,
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn expire_at(&self) -> Tick {
        self.expire
    }
}

/// Snapshot of a live entry returned by lookup.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntryView {
    pub server_id: ServerId,
    pub expire_at: Tick,
}

/// Result of a successful `store`.
#[derive(Debug)]
pub enum StoreOutcome {
    /// The entry was inserted; ownership moved into the table.
    Inserted,
    /// An entry with the same key already existed; its server id was
    /// updated and the caller's entry comes back unconsumed.
    Duplicate(SessionEntry),
}

/// Build a fixed 4-byte key from an IPv4 source address.
#[inline]
pub fn ipv4_key(addr: Ipv4Addr) -> [u8; FIXED_KEY_SIZE] {
    addr.octets()
}

/// Build a fixed 4-byte key from an integer, big-endian so index order
/// follows numeric order.
#[inline]
pub fn integer_key(value: u32) -> [u8; FIXED_KEY_SIZE] {
    value.to_be_bytes()
}
