use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

struct Entry<V> {
    value: V,
    expires: Option<Instant>,
}

impl<V> Entry<V> {
    fn new(value: V, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires.is_none_or(|at| at > now)
    }
}

type Slots<V> = HashMap<String, VecDeque<Entry<V>>>;

/// Default spacing between expiry sweeps across all keys.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Keyed collection of blocking FIFO queues.
///
/// Slots are created on first write and dropped when they drain. Every write
/// wakes all waiters; each waiter re-checks its own key. Expired entries are
/// dropped when their key is accessed, and writes sweep every key at most
/// once per sweep interval so slots nobody reads stay bounded.
pub struct Space<V> {
    slots: Mutex<Slots<V>>,
    changed: Condvar,
    sweep_interval: Duration,
    /// Only locked while `slots` is held.
    next_sweep: Mutex<Instant>,
}

impl<V> Default for Space<V> {
    fn default() -> Self {
        Self::with_sweep_interval(SWEEP_INTERVAL)
    }
}

impl<V> Space<V> {
    /// Create a space that sweeps expired entries on write at most once per
    /// `interval`.
    pub fn with_sweep_interval(interval: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            changed: Condvar::new(),
            sweep_interval: interval,
            next_sweep: Mutex::new(Instant::now() + interval),
        }
    }

    fn sweep_if_due(&self, slots: &mut Slots<V>) {
        let now = Instant::now();
        {
            let mut next = self.next_sweep.lock();
            if now < *next {
                return;
            }
            *next = now + self.sweep_interval;
        }
        let before = slots.len();
        slots.retain(|_, queue| {
            queue.retain(|entry| entry.is_live(now));
            !queue.is_empty()
        });
        if slots.len() < before {
            trace!(dropped = before - slots.len(), "space sweep emptied slots");
        }
    }
}

impl<V> std::fmt::Debug for Space<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("keys", &self.slots.lock().len())
            .finish()
    }
}

impl<V: Clone> Space<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` to the tail of `key`.
    pub fn out(&self, key: &str, value: V) {
        self.insert(key, Entry::new(value, None), false);
    }

    /// Append `value` to the tail of `key`; it disappears after `ttl`.
    pub fn out_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        self.insert(key, Entry::new(value, Some(ttl)), false);
    }

    /// Insert `value` at the head of `key`, ahead of everything queued.
    pub fn push(&self, key: &str, value: V) {
        self.insert(key, Entry::new(value, None), true);
    }

    /// Insert `value` at the head of `key`; it disappears after `ttl`.
    pub fn push_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        self.insert(key, Entry::new(value, Some(ttl)), true);
    }

    /// Remove and return the head of `key`, blocking until one exists.
    pub fn take(&self, key: &str) -> V {
        let mut slots = self.slots.lock();
        loop {
            if let Some(value) = pop_live(&mut *slots, key) {
                return value;
            }
            self.changed.wait(&mut slots);
        }
    }

    /// Remove and return the head of `key`, waiting at most `timeout`.
    pub fn take_timeout(&self, key: &str, timeout: Duration) -> Option<V> {
        self.wait_for(key, timeout, pop_live)
    }

    /// Remove and return the head of `key` without blocking.
    pub fn try_take(&self, key: &str) -> Option<V> {
        pop_live(&mut *self.slots.lock(), key)
    }

    /// Return a copy of the head of `key`, waiting at most `timeout`.
    ///
    /// The entry stays queued.
    pub fn read_timeout(&self, key: &str, timeout: Duration) -> Option<V> {
        self.wait_for(key, timeout, peek_live)
    }

    /// Return a copy of the head of `key` without blocking.
    pub fn peek(&self, key: &str) -> Option<V> {
        peek_live(&mut *self.slots.lock(), key)
    }

    /// Discard every entry under `key`.
    pub fn clear(&self, key: &str) {
        if self.slots.lock().remove(key).is_some() {
            trace!(key, "space slot cleared");
        }
    }

    /// Number of live entries under `key`.
    pub fn size(&self, key: &str) -> usize {
        let mut slots = self.slots.lock();
        purge(&mut *slots, key);
        slots.get(key).map_or(0, VecDeque::len)
    }

    fn insert(&self, key: &str, entry: Entry<V>, front: bool) {
        let mut slots = self.slots.lock();
        self.sweep_if_due(&mut *slots);
        let queue = slots.entry(key.to_string()).or_default();
        if front {
            queue.push_front(entry);
        } else {
            queue.push_back(entry);
        }
        drop(slots);
        self.changed.notify_all();
    }

    fn wait_for(
        &self,
        key: &str,
        timeout: Duration,
        mut probe: impl FnMut(&mut Slots<V>, &str) -> Option<V>,
    ) -> Option<V> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots.lock();
        loop {
            if let Some(value) = probe(&mut *slots, key) {
                return Some(value);
            }
            if self.changed.wait_until(&mut slots, deadline).timed_out() {
                return probe(&mut *slots, key);
            }
        }
    }
}

fn purge<V>(slots: &mut Slots<V>, key: &str) {
    let now = Instant::now();
    let emptied = match slots.get_mut(key) {
        Some(queue) => {
            queue.retain(|entry| entry.is_live(now));
            queue.is_empty()
        }
        None => false,
    };
    if emptied {
        slots.remove(key);
    }
}

fn pop_live<V>(slots: &mut Slots<V>, key: &str) -> Option<V> {
    purge(slots, key);
    let queue = slots.get_mut(key)?;
    let value = queue.pop_front().map(|entry| entry.value);
    if queue.is_empty() {
        slots.remove(key);
    }
    value
}

fn peek_live<V: Clone>(slots: &mut Slots<V>, key: &str) -> Option<V> {
    purge(slots, key);
    slots
        .get(key)
        .and_then(|queue| queue.front())
        .map(|entry| entry.value.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn out_and_take_are_fifo() {
        let space = Space::new();
        space.out("q", 1);
        space.out("q", 2);
        space.out("q", 3);

        assert_eq!(space.size("q"), 3);
        assert_eq!(space.take("q"), 1);
        assert_eq!(space.take("q"), 2);
        assert_eq!(space.take("q"), 3);
        assert_eq!(space.size("q"), 0);
    }

    #[test]
    fn push_goes_to_front() {
        let space = Space::new();
        space.out("q", "second");
        space.push("q", "first");
        assert_eq!(space.try_take("q"), Some("first"));
        assert_eq!(space.try_take("q"), Some("second"));
        assert_eq!(space.try_take("q"), None);
    }

    #[test]
    fn keys_are_independent() {
        let space = Space::new();
        space.out("a", 1);
        space.out("b", 2);
        assert_eq!(space.take_timeout("b", Duration::ZERO), Some(2));
        assert_eq!(space.take_timeout("b", Duration::ZERO), None);
        assert_eq!(space.size("a"), 1);
    }

    #[test]
    fn take_timeout_expires_on_empty_slot() {
        let space: Space<u32> = Space::new();
        let started = Instant::now();
        assert_eq!(space.take_timeout("q", Duration::from_millis(50)), None);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn take_blocks_until_out() {
        let space = Arc::new(Space::new());
        let producer = {
            let space = Arc::clone(&space);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                space.out("q", 42u32);
            })
        };

        assert_eq!(space.take("q"), 42);
        producer.join().unwrap();
    }

    #[test]
    fn waiter_on_other_key_is_not_satisfied() {
        let space = Arc::new(Space::new());
        let waiter = {
            let space = Arc::clone(&space);
            thread::spawn(move || space.take_timeout("wanted", Duration::from_millis(100)))
        };
        thread::sleep(Duration::from_millis(20));
        space.out("other", 1u8);
        assert_eq!(waiter.join().unwrap(), None);
        assert_eq!(space.size("other"), 1);
    }

    #[test]
    fn read_is_not_destructive() {
        let space = Space::new();
        space.out("ready", "now".to_string());
        assert_eq!(
            space.read_timeout("ready", Duration::from_millis(10)),
            Some("now".to_string())
        );
        assert_eq!(space.peek("ready"), Some("now".to_string()));
        assert_eq!(space.size("ready"), 1);
    }

    #[test]
    fn read_timeout_wakes_on_out() {
        let space = Arc::new(Space::new());
        let reader = {
            let space = Arc::clone(&space);
            thread::spawn(move || space.read_timeout("ready", Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        space.out("ready", 7u8);
        assert_eq!(reader.join().unwrap(), Some(7));
        assert_eq!(space.size("ready"), 1);
    }

    #[test]
    fn expired_entries_are_invisible() {
        let space = Space::new();
        space.out_with_ttl("q", "stale", Duration::from_millis(20));
        space.out("q", "fresh");
        assert_eq!(space.size("q"), 2);

        thread::sleep(Duration::from_millis(40));
        assert_eq!(space.size("q"), 1);
        assert_eq!(space.peek("q"), Some("fresh"));
    }

    #[test]
    fn pushed_ttl_entry_expires_from_front() {
        let space = Space::new();
        space.out("q", 2);
        space.push_with_ttl("q", 1, Duration::from_millis(20));
        assert_eq!(space.peek("q"), Some(1));

        thread::sleep(Duration::from_millis(40));
        assert_eq!(space.take_timeout("q", Duration::ZERO), Some(2));
    }

    #[test]
    fn writes_sweep_expired_entries_of_unread_keys() {
        let space = Space::with_sweep_interval(Duration::ZERO);
        for n in 0..100 {
            space.out_with_ttl("unread", n, Duration::from_millis(10));
        }
        space.out("unread-live", 0);
        assert_eq!(space.slots.lock()["unread"].len(), 100);

        thread::sleep(Duration::from_millis(30));
        space.out("other", 1);

        let slots = space.slots.lock();
        assert!(!slots.contains_key("unread"));
        assert_eq!(slots["unread-live"].len(), 1);
        assert_eq!(slots["other"].len(), 1);
    }

    #[test]
    fn sweep_waits_for_its_interval() {
        let space = Space::with_sweep_interval(Duration::from_secs(60));
        space.out_with_ttl("unread", 1, Duration::from_millis(10));
        thread::sleep(Duration::from_millis(30));
        space.out("other", 2);
        assert!(space.slots.lock().contains_key("unread"));
        assert_eq!(space.size("unread"), 0);
    }

    #[test]
    fn clear_drops_all_entries() {
        let space = Space::new();
        space.out("q", 1);
        space.out("q", 2);
        space.clear("q");
        assert_eq!(space.size("q"), 0);
        assert_eq!(space.peek("q"), None);
        space.clear("missing");
    }

    #[test]
    fn many_producers_one_consumer() {
        let space = Arc::new(Space::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let space = Arc::clone(&space);
                thread::spawn(move || {
                    for i in 0..25 {
                        space.out("q", p * 100 + i);
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        for _ in 0..100 {
            seen.push(space.take_timeout("q", Duration::from_secs(5)).unwrap());
        }
        for producer in producers {
            producer.join().unwrap();
        }

        seen.sort_unstable();
        let expected: Vec<_> = (0..4).flat_map(|p| (0..25).map(move |i| p * 100 + i)).collect();
        assert_eq!(seen, expected);
    }
}
