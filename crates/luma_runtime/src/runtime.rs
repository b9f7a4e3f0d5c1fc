//! The `Runtime` global state and its string operations.

use luma_core::{ObjectId, Tag, Value, random_seed, str_hash};
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::core::{Heap, ManagedObject};
use crate::errors::{RuntimeError, messages};
use crate::gc::GcState;
use crate::strings::{LuaString, StringCache, StringTable};
use crate::thread::Thread;
use crate::fatal;

/// One independent runtime instance. Single-threaded; every operation takes
/// `&mut self`.
pub struct Runtime {
    pub(crate) heap: Heap,
    pub(crate) strings: StringTable,
    pub(crate) cache: StringCache,
    pub(crate) config: RuntimeConfig,
    /// Pre-allocated message for allocation failures. Never collected.
    pub(crate) memerrmsg: ObjectId,
    pub(crate) registry: Vec<Value>,
    pub(crate) main_thread: ObjectId,
    pub(crate) current: ObjectId,
    /// Objects under construction that must survive a collection.
    pub(crate) gc_temp_roots: Vec<Value>,
    pub(crate) gc: GcState,
}

impl Runtime {
    /// Set up the heap, the string table with its seed, the memory-error
    /// message, the string cache and the main thread.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let config = config.normalized();
        let seed = config.hash_seed.unwrap_or_else(random_seed);
        let mut heap = Heap::new(config.memory_limit);
        let mut strings = StringTable::new(&mut heap, seed, config.min_string_table_size)?;

        let msg = messages::MEMERRMSG.as_bytes();
        let memerrmsg = if msg.len() <= config.short_string_max {
            let id = heap.alloc(ManagedObject::ShortStr(LuaString::new(msg, strings.hash(msg))))?;
            strings.insert(&mut heap, id);
            id
        } else {
            heap.alloc(ManagedObject::LongStr(LuaString::new(msg, seed)))?
        };
        heap.fix(memerrmsg);

        let main_thread = heap.alloc(ManagedObject::Thread(Box::new(Thread::new())))?;
        let cache = StringCache::new(config.string_cache_sets, config.string_cache_ways, memerrmsg);
        let gc = GcState::new(heap.object_count(), &config);
        Ok(Self {
            heap,
            strings,
            cache,
            config,
            memerrmsg,
            registry: Vec::new(),
            main_thread,
            current: main_thread,
            gc_temp_roots: Vec::new(),
            gc,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn string_table(&self) -> &StringTable {
        &self.strings
    }

    pub fn seed(&self) -> u32 {
        self.strings.seed()
    }

    pub fn main_thread(&self) -> Value {
        Value::from_object(Tag::THREAD, self.main_thread)
    }

    /// Allocate `obj`. When it does not fit in the memory limit one full
    /// collection runs first, with the objects `obj` refers to kept alive.
    pub(crate) fn alloc(&mut self, obj: ManagedObject) -> Result<ObjectId, RuntimeError> {
        if !self.heap.account.fits(obj.size()) {
            let mut pending = Vec::new();
            obj.trace(&mut pending);
            self.reclaim(&pending);
        }
        self.heap.alloc(obj)
    }

    /// Make sure `bytes` more fit in the memory limit, collecting once if
    /// they do not.
    pub(crate) fn reserve(&mut self, bytes: usize) -> Result<(), RuntimeError> {
        if !self.heap.account.fits(bytes) {
            self.reclaim(&[]);
            if !self.heap.account.fits(bytes) {
                return Err(RuntimeError::OutOfMemory);
            }
        }
        Ok(())
    }

    fn reclaim(&mut self, pending: &[ObjectId]) {
        let mark = self.gc_temp_roots.len();
        for &id in pending {
            let v = self.value_of(id);
            self.gc_temp_roots.push(v);
        }
        debug!(
            used = self.heap.bytes_used(),
            "allocation over the memory limit, forcing a full collection"
        );
        self.full_collection();
        self.gc_temp_roots.truncate(mark);
    }

    /// Value referring to heap object `id`, tagged from its header.
    pub fn value_of(&self, id: ObjectId) -> Value {
        Value::from_object(self.heap.tag(id), id)
    }

    pub fn memory_error_message(&self) -> Value {
        self.value_of(self.memerrmsg)
    }

    // ---- registry ----

    /// Keep `v` reachable until `unanchor` is called with the returned slot.
    pub fn anchor(&mut self, v: Value) -> usize {
        self.heap.check_liveness(v);
        if let Some(i) = self.registry.iter().position(|r| r.is_empty()) {
            self.registry[i] = v;
            return i;
        }
        self.registry.push(v);
        self.registry.len() - 1
    }

    pub fn unanchor(&mut self, slot: usize) {
        if let Some(r) = self.registry.get_mut(slot) {
            *r = Value::EMPTY;
        }
    }

    pub fn anchored(&self, slot: usize) -> Option<Value> {
        self.registry.get(slot).copied().filter(|v| !v.is_empty())
    }

    // ---- strings ----

    #[track_caller]
    pub fn lua_string(&self, v: Value) -> &LuaString {
        if !v.is_string() {
            fatal(&format!("expected a string, found {}", v.tag()));
        }
        match self.heap.get(v.as_object()).as_string() {
            Some(s) => s,
            None => fatal("string header does not match its value"),
        }
    }

    #[track_caller]
    fn lua_string_mut(&mut self, v: Value) -> &mut LuaString {
        match self.heap.get_mut(v.as_object()) {
            ManagedObject::ShortStr(s) | ManagedObject::LongStr(s) => s,
            _ => fatal("string header does not match its value"),
        }
    }

    pub fn string_bytes(&self, v: Value) -> &[u8] {
        self.lua_string(v).as_bytes()
    }

    /// Intern a short byte sequence. Equal sequences yield the same object;
    /// an entry that is dead but not yet swept is brought back to life.
    pub fn intern_short(&mut self, bytes: &[u8]) -> Result<Value, RuntimeError> {
        debug_assert!(bytes.len() <= self.config.short_string_max);
        let h = self.strings.hash(bytes);
        if let Some(id) = self.strings.find(&self.heap, bytes, h) {
            if self.heap.is_dead(id) {
                self.heap.resurrect(id);
            }
            return Ok(Value::short_string(id));
        }
        self.check_string_ceiling()?;
        if self.strings.used() >= self.strings.size() {
            self.grow_string_table();
        }
        let id = self.alloc(ManagedObject::ShortStr(LuaString::new(bytes, h)))?;
        self.strings.insert(&mut self.heap, id);
        Ok(Value::short_string(id))
    }

    /// Fails only if the interned-string count is still at the ceiling after
    /// a forced full collection.
    fn check_string_ceiling(&mut self) -> Result<(), RuntimeError> {
        if self.strings.used() < self.config.max_strings {
            return Ok(());
        }
        warn!(
            used = self.strings.used(),
            "interned string count at ceiling, forcing a full collection"
        );
        self.full_collection();
        if self.strings.used() >= self.config.max_strings {
            return Err(RuntimeError::OutOfMemory);
        }
        Ok(())
    }

    fn grow_string_table(&mut self) {
        let size = self.strings.size();
        if size <= self.config.max_string_table_size / 2 {
            self.strings.resize(&mut self.heap, size * 2);
        }
    }

    /// Fresh long string; never touches the string table.
    pub fn make_long(&mut self, bytes: &[u8]) -> Result<Value, RuntimeError> {
        self.reserve(bytes.len())?;
        let s = LuaString::new(bytes, self.strings.seed());
        let id = self.alloc(ManagedObject::LongStr(s))?;
        Ok(Value::long_string(id))
    }

    /// Content hash of a long string, computed on first request.
    #[track_caller]
    pub fn hash_long(&mut self, v: Value) -> u32 {
        v.expect_object(Tag::LONG_STR);
        let s = self.lua_string_mut(v);
        if s.extra == 0 {
            s.hash = str_hash(s.as_bytes(), s.hash);
            s.extra = 1;
        }
        s.hash
    }

    /// Intern or create depending on length.
    pub fn new_string(&mut self, bytes: &[u8]) -> Result<Value, RuntimeError> {
        if bytes.len() <= self.config.short_string_max {
            return self.intern_short(bytes);
        }
        if bytes.len() >= (isize::MAX as usize) - std::mem::size_of::<LuaString>() {
            return Err(RuntimeError::TooBig);
        }
        self.make_long(bytes)
    }

    /// `new_string` through the string cache, keyed by the address of
    /// `bytes`.
    pub fn new_cached(&mut self, bytes: &[u8]) -> Result<Value, RuntimeError> {
        if let Some(id) = self.cache.lookup(&self.heap, bytes) {
            return Ok(self.value_of(id));
        }
        let v = self.new_string(bytes)?;
        self.cache.insert(bytes, v.as_object());
        Ok(v)
    }

    /// Replace cache entries that the current cycle will collect.
    pub fn clear_cache(&mut self) {
        self.cache.clear(&self.heap, self.memerrmsg);
    }

    /// Long-string equality: same object, or same length and bytes.
    pub fn eq_long(&self, a: Value, b: Value) -> bool {
        debug_assert!(a.is_long_string() && b.is_long_string());
        a == b || {
            let (sa, sb) = (self.lua_string(a), self.lua_string(b));
            sa.len() == sb.len() && sa.as_bytes() == sb.as_bytes()
        }
    }

    /// Intern `word` and pin it as reserved word number `index` (> 0).
    pub fn reserve_word(&mut self, word: &[u8], index: u8) -> Result<Value, RuntimeError> {
        debug_assert!(index > 0);
        let v = self.intern_short(word)?;
        self.lua_string_mut(v).extra = index;
        self.heap.fix(v.as_object());
        Ok(v)
    }

    pub fn is_reserved(&self, v: Value) -> bool {
        v.is_short_string() && self.lua_string(v).extra > 0
    }

    /// Primitive equality without metamethods.
    pub fn raw_equals(&self, a: Value, b: Value) -> bool {
        if a.is_number() && b.is_number() {
            return match (a.try_integer(), b.try_integer()) {
                (Some(x), Some(y)) => x == y,
                (None, None) => a.as_float() == b.as_float(),
                (Some(i), None) => float_equals_int(b.as_float(), i),
                (None, Some(i)) => float_equals_int(a.as_float(), i),
            };
        }
        if a.tag() != b.tag() {
            return false;
        }
        if a.is_long_string() {
            return self.eq_long(a, b);
        }
        a == b
    }

    /// Error object to hand to closing methods for `e`.
    pub fn error_object(&mut self, e: RuntimeError) -> Value {
        match e {
            RuntimeError::Runtime(v) => v,
            RuntimeError::OutOfMemory => self.memory_error_message(),
            other => {
                let msg = other.to_string();
                self.new_string(msg.as_bytes())
                    .unwrap_or_else(|_| self.memory_error_message())
            }
        }
    }
}

fn float_equals_int(f: f64, i: i64) -> bool {
    // Exact only when the float holds an integral value in i64 range.
    f.fract() == 0.0 && f >= -(2f64.powi(63)) && f < 2f64.powi(63) && f as i64 == i
}
