//! Execution Context
//!
//! An execution context is the unit of isolation in OctopusDB: it owns a
//! private key-value map and TTL map and executes exactly one command at a
//! time. Nothing here is locked or shared; the worker pool guarantees a
//! context only ever runs on its own task.
//!
//! ## Expiry
//!
//! Expiry is lazy *and* eager:
//! - Every command first checks the target key's deadline and deletes the
//!   entry if it has passed (lazy).
//! - `expire` records the deadline in a min-heap; the worker's run loop asks
//!   [`next_deadline`](ExecutionContext::next_deadline), sleeps until it, and
//!   calls [`purge_due`](ExecutionContext::purge_due) so unread keys are
//!   removed shortly after their deadline (eager).
//!
//! `persist` and `del` cancel a deadline by removing it from the TTL map
//! only; the heap entry goes stale and is discarded when it fires, after
//! validation against the map. A replaced deadline works the same way: the
//! newer `expire` pushes a fresh heap entry.

use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::trace;

use crate::command::{Command, CommandKind, CommandResult, Reply};
use crate::error::OctopusError;
use crate::queue::MinHeap;
use crate::store::Value;

/// An isolated key-value store with TTL support.
///
/// # Example
///
/// ```
/// use octopusdb::command::{Command, Reply};
/// use octopusdb::store::ExecutionContext;
/// use bytes::Bytes;
///
/// let mut ctx = ExecutionContext::new(0);
///
/// assert_eq!(ctx.execute(&Command::set("name", "Alice")), Ok(Reply::Ok));
/// assert_eq!(
///     ctx.execute(&Command::get("name")),
///     Ok(Reply::Value(Bytes::from("Alice")))
/// );
/// assert_eq!(ctx.execute(&Command::del("name")), Ok(Reply::Int(1)));
/// assert_eq!(ctx.execute(&Command::get("name")), Ok(Reply::Null));
/// ```
#[derive(Debug)]
pub struct ExecutionContext {
    id: u32,
    /// The key-value data owned by this context.
    store: HashMap<Bytes, Value>,
    /// Absolute expiry deadline per key with an active expiration.
    ttl: HashMap<Bytes, Instant>,
    /// Pending deadlines for eager expiry; may contain stale entries, which
    /// are validated against `ttl` when they fire.
    deadlines: MinHeap<Instant, Bytes>,
}

impl ExecutionContext {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            store: HashMap::new(),
            ttl: HashMap::new(),
            deadlines: MinHeap::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of live keys (after any lazy expiry already performed).
    pub fn key_count(&self) -> usize {
        self.store.len()
    }

    /// Executes one command against the owned maps.
    ///
    /// Type mismatches and counter parse failures come back as errors in the
    /// result; they never poison the context.
    pub fn execute(&mut self, command: &Command) -> CommandResult {
        self.expire_if_due(&command.key);
        trace!(worker = self.id, kind = command.kind.as_str(), "executing command");

        match command.kind {
            CommandKind::Set => self.set(command),
            CommandKind::Get => self.get(command),
            CommandKind::Del => self.del(command),
            CommandKind::Exists => {
                Ok(Reply::Int(i64::from(self.store.contains_key(&command.key))))
            }
            CommandKind::Incr => self.apply_delta(command, 1),
            CommandKind::Decr => self.apply_delta(command, -1),
            CommandKind::Expire => self.expire(command),
            CommandKind::Ttl => self.ttl_remaining(command),
            CommandKind::Persist => {
                Ok(Reply::Int(i64::from(self.cancel_ttl(&command.key))))
            }
            CommandKind::LPush => self.push(command, true),
            CommandKind::RPush => self.push(command, false),
            CommandKind::LPop => self.pop(command, true),
            CommandKind::RPop => self.pop(command, false),
            CommandKind::SAdd => self.sadd(command),
            CommandKind::SRem => self.srem(command),
            CommandKind::SMembers => self.smembers(command),
        }
    }

    // ------------------------------------------------------------------
    // Command handlers
    // ------------------------------------------------------------------

    fn set(&mut self, command: &Command) -> CommandResult {
        let value = command.value.clone().unwrap_or_default();
        self.store.insert(command.key.clone(), Value::Str(value));
        self.cancel_ttl(&command.key);
        Ok(Reply::Ok)
    }

    fn get(&mut self, command: &Command) -> CommandResult {
        match self.store.get(&command.key) {
            None => Ok(Reply::Null),
            Some(value) => value
                .as_get_bytes()
                .map(Reply::Value)
                .ok_or(OctopusError::WrongType),
        }
    }

    fn del(&mut self, command: &Command) -> CommandResult {
        let removed = self.store.remove(&command.key).is_some();
        self.ttl.remove(&command.key);
        Ok(Reply::Int(i64::from(removed)))
    }

    fn apply_delta(&mut self, command: &Command, delta: i64) -> CommandResult {
        let current = match self.store.get(&command.key) {
            None => 0,
            Some(Value::Int(n)) => *n,
            Some(Value::Str(bytes)) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(OctopusError::NotInteger)?,
            Some(Value::List(_)) | Some(Value::Set(_)) => {
                return Err(OctopusError::WrongType)
            }
        };

        let updated = current.checked_add(delta).ok_or(OctopusError::NotInteger)?;
        // Any TTL on the key is preserved: only the value changes.
        self.store.insert(command.key.clone(), Value::Int(updated));
        Ok(Reply::Value(Bytes::from(updated.to_string())))
    }

    fn expire(&mut self, command: &Command) -> CommandResult {
        if !self.store.contains_key(&command.key) {
            return Ok(Reply::Int(0));
        }
        let secs = command.ttl_secs.unwrap_or(0);
        let deadline = Instant::now() + Duration::from_secs(secs);
        self.expire_at(command.key.clone(), deadline);
        Ok(Reply::Int(1))
    }

    fn ttl_remaining(&mut self, command: &Command) -> CommandResult {
        match self.ttl.get(&command.key) {
            None => Ok(Reply::Int(-1)),
            Some(&deadline) => {
                let remaining_ms = deadline
                    .saturating_duration_since(Instant::now())
                    .as_millis() as i64;
                // Round up: a deadline 1 ms away still reads as 1 second.
                Ok(Reply::Int((remaining_ms + 999) / 1000))
            }
        }
    }

    fn push(&mut self, command: &Command, front: bool) -> CommandResult {
        let value = command.value.clone().unwrap_or_default();
        let list = match self
            .store
            .entry(command.key.clone())
            .or_insert_with(|| Value::List(VecDeque::new()))
        {
            Value::List(list) => list,
            _ => return Err(OctopusError::WrongType),
        };

        if front {
            list.push_front(value);
        } else {
            list.push_back(value);
        }
        Ok(Reply::Int(list.len() as i64))
    }

    fn pop(&mut self, command: &Command, front: bool) -> CommandResult {
        let list = match self.store.get_mut(&command.key) {
            None => return Ok(Reply::Null),
            Some(Value::List(list)) => list,
            Some(_) => return Err(OctopusError::WrongType),
        };

        let element = if front {
            list.pop_front()
        } else {
            list.pop_back()
        };

        // An emptied list disappears, along with any TTL it carried.
        if list.is_empty() {
            self.store.remove(&command.key);
            self.ttl.remove(&command.key);
        }

        Ok(element.map(Reply::Value).unwrap_or(Reply::Null))
    }

    fn sadd(&mut self, command: &Command) -> CommandResult {
        let member = command.value.clone().unwrap_or_default();
        let set = match self
            .store
            .entry(command.key.clone())
            .or_insert_with(|| Value::Set(HashSet::new()))
        {
            Value::Set(set) => set,
            _ => return Err(OctopusError::WrongType),
        };

        set.insert(member);
        Ok(Reply::Int(set.len() as i64))
    }

    fn srem(&mut self, command: &Command) -> CommandResult {
        let member = command.value.clone().unwrap_or_default();
        let set = match self.store.get_mut(&command.key) {
            None => return Ok(Reply::Int(0)),
            Some(Value::Set(set)) => set,
            Some(_) => return Err(OctopusError::WrongType),
        };

        let removed = set.remove(&member);
        if set.is_empty() {
            self.store.remove(&command.key);
            self.ttl.remove(&command.key);
        }
        Ok(Reply::Int(i64::from(removed)))
    }

    fn smembers(&mut self, command: &Command) -> CommandResult {
        match self.store.get(&command.key) {
            None => Ok(Reply::Members(Vec::new())),
            Some(Value::Set(set)) => Ok(Reply::Members(set.iter().cloned().collect())),
            Some(_) => Err(OctopusError::WrongType),
        }
    }

    // ------------------------------------------------------------------
    // Expiry plumbing
    // ------------------------------------------------------------------

    /// Records `deadline` for `key`, replacing any previous one.
    fn expire_at(&mut self, key: Bytes, deadline: Instant) {
        self.ttl.insert(key.clone(), deadline);
        self.deadlines.push(deadline, key);
    }

    /// Removes any deadline on `key`; returns whether one existed.
    fn cancel_ttl(&mut self, key: &Bytes) -> bool {
        self.ttl.remove(key).is_some()
    }

    /// Lazy expiry: deletes the entry if its deadline has passed.
    fn expire_if_due(&mut self, key: &Bytes) {
        if let Some(&deadline) = self.ttl.get(key) {
            if deadline <= Instant::now() {
                self.store.remove(key);
                self.ttl.remove(key);
                trace!(worker = self.id, "lazily expired key");
            }
        }
    }

    /// Earliest pending deadline, for the run loop to sleep on.
    ///
    /// May refer to a stale heap entry (cancelled or replaced deadline); an
    /// early wake-up then purges nothing and the loop re-arms, which is
    /// harmless.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.peek().map(|(deadline, _)| *deadline)
    }

    /// Eager expiry: removes every key whose deadline has passed.
    ///
    /// Returns the number of keys removed. Stale heap entries are discarded
    /// without touching the store.
    pub fn purge_due(&mut self) -> usize {
        let now = Instant::now();
        let mut purged = 0;

        while matches!(self.deadlines.peek(), Some((deadline, _)) if *deadline <= now) {
            let Some((_, key)) = self.deadlines.pop() else {
                break;
            };
            match self.ttl.get(&key) {
                Some(&deadline) if deadline <= now => {
                    self.store.remove(&key);
                    self.ttl.remove(&key);
                    purged += 1;
                }
                // Stale entry: the deadline was cancelled or replaced.
                _ => {}
            }
        }

        if purged > 0 {
            trace!(worker = self.id, purged, "eagerly expired keys");
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(reply: CommandResult) -> Bytes {
        match reply {
            Ok(Reply::Value(bytes)) => bytes,
            other => panic!("expected a value reply, got {other:?}"),
        }
    }

    #[test]
    fn set_get_del_exists_round() {
        let mut ctx = ExecutionContext::new(0);

        assert_eq!(ctx.execute(&Command::set("name", "Alice")), Ok(Reply::Ok));
        assert_eq!(
            ctx.execute(&Command::get("name")),
            Ok(Reply::Value(Bytes::from("Alice")))
        );
        assert_eq!(ctx.execute(&Command::del("name")), Ok(Reply::Int(1)));
        assert_eq!(ctx.execute(&Command::get("name")), Ok(Reply::Null));
        assert_eq!(ctx.execute(&Command::exists("name")), Ok(Reply::Int(0)));
        assert_eq!(ctx.execute(&Command::del("name")), Ok(Reply::Int(0)));
    }

    #[test]
    fn counters_start_at_zero_and_read_back_as_strings() {
        let mut ctx = ExecutionContext::new(0);

        assert_eq!(value(ctx.execute(&Command::incr("hits"))), Bytes::from("1"));
        assert_eq!(value(ctx.execute(&Command::incr("hits"))), Bytes::from("2"));
        assert_eq!(value(ctx.execute(&Command::decr("hits"))), Bytes::from("1"));
        assert_eq!(
            ctx.execute(&Command::get("hits")),
            Ok(Reply::Value(Bytes::from("1")))
        );

        // A decremented missing key goes negative.
        assert_eq!(value(ctx.execute(&Command::decr("debt"))), Bytes::from("-1"));
    }

    #[test]
    fn incr_adopts_numeric_strings_and_rejects_others() {
        let mut ctx = ExecutionContext::new(0);

        ctx.execute(&Command::set("c", "10")).unwrap();
        assert_eq!(value(ctx.execute(&Command::incr("c"))), Bytes::from("11"));
        assert_eq!(value(ctx.execute(&Command::decr("c"))), Bytes::from("10"));

        ctx.execute(&Command::set("word", "hello")).unwrap();
        assert_eq!(
            ctx.execute(&Command::incr("word")),
            Err(OctopusError::NotInteger)
        );
        // The failed increment left the value untouched.
        assert_eq!(
            ctx.execute(&Command::get("word")),
            Ok(Reply::Value(Bytes::from("hello")))
        );
    }

    #[test]
    fn incr_overflow_is_rejected() {
        let mut ctx = ExecutionContext::new(0);
        ctx.execute(&Command::set("big", i64::MAX.to_string()))
            .unwrap();
        assert_eq!(
            ctx.execute(&Command::incr("big")),
            Err(OctopusError::NotInteger)
        );
    }

    #[test]
    fn commands_enforce_value_tags() {
        let mut ctx = ExecutionContext::new(0);

        ctx.execute(&Command::rpush("L", "x")).unwrap();
        assert_eq!(ctx.execute(&Command::get("L")), Err(OctopusError::WrongType));
        assert_eq!(
            ctx.execute(&Command::incr("L")),
            Err(OctopusError::WrongType)
        );
        assert_eq!(
            ctx.execute(&Command::sadd("L", "a")),
            Err(OctopusError::WrongType)
        );

        ctx.execute(&Command::set("s", "text")).unwrap();
        assert_eq!(
            ctx.execute(&Command::lpush("s", "x")),
            Err(OctopusError::WrongType)
        );
        assert_eq!(
            ctx.execute(&Command::smembers("s")),
            Err(OctopusError::WrongType)
        );

        ctx.execute(&Command::sadd("tags", "rust")).unwrap();
        assert_eq!(
            ctx.execute(&Command::rpop("tags")),
            Err(OctopusError::WrongType)
        );
    }

    #[test]
    fn list_push_pop_both_ends() {
        let mut ctx = ExecutionContext::new(0);

        assert_eq!(ctx.execute(&Command::rpush("L", "x")), Ok(Reply::Int(1)));
        assert_eq!(ctx.execute(&Command::rpush("L", "y")), Ok(Reply::Int(2)));
        assert_eq!(
            ctx.execute(&Command::lpop("L")),
            Ok(Reply::Value(Bytes::from("x")))
        );
        assert_eq!(
            ctx.execute(&Command::rpop("L")),
            Ok(Reply::Value(Bytes::from("y")))
        );
        assert_eq!(ctx.execute(&Command::lpop("L")), Ok(Reply::Null));
        // The emptied list no longer exists as a key.
        assert_eq!(ctx.execute(&Command::exists("L")), Ok(Reply::Int(0)));
    }

    #[test]
    fn lpush_prepends() {
        let mut ctx = ExecutionContext::new(0);

        ctx.execute(&Command::lpush("L", "a")).unwrap();
        ctx.execute(&Command::lpush("L", "b")).unwrap();
        assert_eq!(
            ctx.execute(&Command::lpop("L")),
            Ok(Reply::Value(Bytes::from("b")))
        );
    }

    #[test]
    fn set_members_are_unique() {
        let mut ctx = ExecutionContext::new(0);

        assert_eq!(ctx.execute(&Command::sadd("s", "a")), Ok(Reply::Int(1)));
        assert_eq!(ctx.execute(&Command::sadd("s", "a")), Ok(Reply::Int(1)));
        assert_eq!(ctx.execute(&Command::sadd("s", "b")), Ok(Reply::Int(2)));

        let members = match ctx.execute(&Command::smembers("s")) {
            Ok(Reply::Members(members)) => members,
            other => panic!("expected members, got {other:?}"),
        };
        let members: HashSet<Bytes> = members.into_iter().collect();
        assert_eq!(
            members,
            HashSet::from([Bytes::from("a"), Bytes::from("b")])
        );

        assert_eq!(ctx.execute(&Command::srem("s", "a")), Ok(Reply::Int(1)));
        assert_eq!(ctx.execute(&Command::srem("s", "a")), Ok(Reply::Int(0)));
        // Removing the last member removes the key.
        assert_eq!(ctx.execute(&Command::srem("s", "b")), Ok(Reply::Int(1)));
        assert_eq!(ctx.execute(&Command::exists("s")), Ok(Reply::Int(0)));
        assert_eq!(
            ctx.execute(&Command::smembers("s")),
            Ok(Reply::Members(Vec::new()))
        );
    }

    #[test]
    fn expire_requires_an_existing_key() {
        let mut ctx = ExecutionContext::new(0);
        assert_eq!(ctx.execute(&Command::expire("ghost", 5)), Ok(Reply::Int(0)));

        ctx.execute(&Command::set("k", "v")).unwrap();
        assert_eq!(ctx.execute(&Command::expire("k", 5)), Ok(Reply::Int(1)));
    }

    #[test]
    fn ttl_rounds_up_and_reports_minus_one_without_deadline() {
        let mut ctx = ExecutionContext::new(0);

        ctx.execute(&Command::set("k", "v")).unwrap();
        assert_eq!(ctx.execute(&Command::ttl("k")), Ok(Reply::Int(-1)));

        ctx.execute(&Command::expire("k", 5)).unwrap();
        match ctx.execute(&Command::ttl("k")) {
            Ok(Reply::Int(secs)) => assert!(secs == 5, "expected ceil to 5, got {secs}"),
            other => panic!("unexpected ttl reply: {other:?}"),
        }

        assert_eq!(ctx.execute(&Command::persist("k")), Ok(Reply::Int(1)));
        assert_eq!(ctx.execute(&Command::ttl("k")), Ok(Reply::Int(-1)));
        assert_eq!(ctx.execute(&Command::persist("k")), Ok(Reply::Int(0)));
    }

    #[test]
    fn lazy_expiry_removes_overdue_keys_on_access() {
        let mut ctx = ExecutionContext::new(0);

        ctx.execute(&Command::set("k", "v")).unwrap();
        ctx.expire_at(Bytes::from("k"), Instant::now() - Duration::from_millis(1));

        assert_eq!(ctx.execute(&Command::get("k")), Ok(Reply::Null));
        assert_eq!(ctx.key_count(), 0);
        assert_eq!(ctx.execute(&Command::ttl("k")), Ok(Reply::Int(-1)));
    }

    #[test]
    fn set_overwrites_and_clears_any_deadline() {
        let mut ctx = ExecutionContext::new(0);

        ctx.execute(&Command::set("k", "v")).unwrap();
        ctx.execute(&Command::expire("k", 100)).unwrap();
        ctx.execute(&Command::set("k", "fresh")).unwrap();

        assert_eq!(ctx.execute(&Command::ttl("k")), Ok(Reply::Int(-1)));
        assert_eq!(
            ctx.execute(&Command::get("k")),
            Ok(Reply::Value(Bytes::from("fresh")))
        );
    }

    #[test]
    fn purge_due_removes_unread_keys() {
        let mut ctx = ExecutionContext::new(0);

        ctx.execute(&Command::set("doomed", "v")).unwrap();
        ctx.execute(&Command::set("kept", "v")).unwrap();
        ctx.expire_at(
            Bytes::from("doomed"),
            Instant::now() - Duration::from_millis(1),
        );

        assert_eq!(ctx.purge_due(), 1);
        assert_eq!(ctx.key_count(), 1);
        assert_eq!(ctx.execute(&Command::exists("kept")), Ok(Reply::Int(1)));
    }

    #[test]
    fn purge_skips_cancelled_and_replaced_deadlines() {
        let mut ctx = ExecutionContext::new(0);

        // Cancelled: persist removed the deadline, heap entry went stale.
        ctx.execute(&Command::set("a", "v")).unwrap();
        ctx.expire_at(Bytes::from("a"), Instant::now() - Duration::from_millis(1));
        ctx.cancel_ttl(&Bytes::from("a"));

        // Replaced: the live deadline is far in the future.
        ctx.execute(&Command::set("b", "v")).unwrap();
        ctx.expire_at(Bytes::from("b"), Instant::now() - Duration::from_millis(1));
        ctx.expire_at(Bytes::from("b"), Instant::now() + Duration::from_secs(60));

        assert_eq!(ctx.purge_due(), 0);
        assert_eq!(ctx.key_count(), 2);
        // The future deadline is still armed.
        assert!(ctx.next_deadline().is_some());
    }

    #[test]
    fn next_deadline_reports_the_earliest() {
        let mut ctx = ExecutionContext::new(0);

        assert_eq!(ctx.next_deadline(), None);

        let soon = Instant::now() + Duration::from_secs(1);
        let later = Instant::now() + Duration::from_secs(60);
        ctx.execute(&Command::set("a", "v")).unwrap();
        ctx.execute(&Command::set("b", "v")).unwrap();
        ctx.expire_at(Bytes::from("b"), later);
        ctx.expire_at(Bytes::from("a"), soon);

        assert_eq!(ctx.next_deadline(), Some(soon));
    }
}
