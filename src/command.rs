//! Command and Reply Types
//!
//! This module defines the commands OctopusDB executes and the replies they
//! produce. Commands are plain data: a kind, a key, and up to two optional
//! arguments. The dispatch substrate never inspects the payload beyond the
//! key; command semantics live entirely in the execution context.
//!
//! ## Digest
//!
//! The task queue deduplicates structurally identical submissions. Identity
//! is a stable structural hash over `(kind, key, value, ttl_secs)`, computed
//! once at enqueue time. Two `Command` values with equal fields always
//! produce the same digest within a process.

use bytes::Bytes;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::error::OctopusError;

/// The operation a command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Set,
    Get,
    Del,
    Exists,
    Incr,
    Decr,
    Expire,
    Ttl,
    Persist,
    LPush,
    RPush,
    LPop,
    RPop,
    SAdd,
    SRem,
    SMembers,
}

impl CommandKind {
    /// Lower-case name used for operation events and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Set => "set",
            CommandKind::Get => "get",
            CommandKind::Del => "del",
            CommandKind::Exists => "exists",
            CommandKind::Incr => "incr",
            CommandKind::Decr => "decr",
            CommandKind::Expire => "expire",
            CommandKind::Ttl => "ttl",
            CommandKind::Persist => "persist",
            CommandKind::LPush => "lpush",
            CommandKind::RPush => "rpush",
            CommandKind::LPop => "lpop",
            CommandKind::RPop => "rpop",
            CommandKind::SAdd => "sadd",
            CommandKind::SRem => "srem",
            CommandKind::SMembers => "smembers",
        }
    }
}

/// A single-key command.
///
/// Construct commands through the helpers (`Command::set`, `Command::get`,
/// ...) rather than the struct literal; the helpers keep the optional fields
/// consistent with the kind.
///
/// # Example
///
/// ```
/// use octopusdb::command::{Command, CommandKind};
/// use bytes::Bytes;
///
/// let cmd = Command::set("name", "Alice");
/// assert_eq!(cmd.kind, CommandKind::Set);
/// assert_eq!(cmd.key, Bytes::from("name"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    /// The operation to perform.
    pub kind: CommandKind,
    /// The key the operation targets.
    pub key: Bytes,
    /// Value argument (set, push, set-member operations).
    pub value: Option<Bytes>,
    /// TTL argument in seconds (expire).
    pub ttl_secs: Option<u64>,
}

impl Command {
    fn new(kind: CommandKind, key: impl Into<Bytes>) -> Self {
        Self {
            kind,
            key: key.into(),
            value: None,
            ttl_secs: None,
        }
    }

    fn with_value(kind: CommandKind, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            kind,
            key: key.into(),
            value: Some(value.into()),
            ttl_secs: None,
        }
    }

    pub fn set(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::with_value(CommandKind::Set, key, value)
    }

    pub fn get(key: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::Get, key)
    }

    pub fn del(key: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::Del, key)
    }

    pub fn exists(key: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::Exists, key)
    }

    pub fn incr(key: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::Incr, key)
    }

    pub fn decr(key: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::Decr, key)
    }

    pub fn expire(key: impl Into<Bytes>, ttl_secs: u64) -> Self {
        let mut cmd = Self::new(CommandKind::Expire, key);
        cmd.ttl_secs = Some(ttl_secs);
        cmd
    }

    pub fn ttl(key: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::Ttl, key)
    }

    pub fn persist(key: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::Persist, key)
    }

    pub fn lpush(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::with_value(CommandKind::LPush, key, value)
    }

    pub fn rpush(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::with_value(CommandKind::RPush, key, value)
    }

    pub fn lpop(key: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::LPop, key)
    }

    pub fn rpop(key: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::RPop, key)
    }

    pub fn sadd(key: impl Into<Bytes>, member: impl Into<Bytes>) -> Self {
        Self::with_value(CommandKind::SAdd, key, member)
    }

    pub fn srem(key: impl Into<Bytes>, member: impl Into<Bytes>) -> Self {
        Self::with_value(CommandKind::SRem, key, member)
    }

    pub fn smembers(key: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::SMembers, key)
    }

    /// Stable structural digest used for queue deduplication.
    ///
    /// Equal commands hash equal; the digest is stable for the lifetime of
    /// the process, which is all deduplication needs since the queue never
    /// outlives it.
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// The value a command execution produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Acknowledgement ("OK").
    Ok,
    /// A value read or produced by the command.
    Value(Bytes),
    /// An integer result (counts, lengths, cardinalities, remaining TTL).
    Int(i64),
    /// The key or element does not exist.
    Null,
    /// The members of a set (order unspecified).
    Members(Vec<Bytes>),
}

/// Result of executing one command.
pub type CommandResult = Result<Reply, OctopusError>;
