//! Object storage and collector colors.
//!
//! Objects live in a slot vector addressed by `ObjectId`. Every slot carries
//! a color byte using two whites: the current white marks objects created
//! or kept in this cycle, the other white marks objects the last marking
//! phase did not reach. Between the end of marking and the end of sweeping
//! an object in the other white is dead, even though its slot is still
//! occupied.

use luma_core::{ObjectId, Tag, Value};

use super::object::ManagedObject;
use crate::errors::RuntimeError;

const WHITE0: u8 = 1 << 0;
const WHITE1: u8 = 1 << 1;
const WHITE_BITS: u8 = WHITE0 | WHITE1;
const BLACK: u8 = 1 << 2;
/// Never collected. Fixed objects are never white.
const FIXED: u8 = 1 << 3;

struct Slot {
    marked: u8,
    obj: ManagedObject,
}

/// Bytes charged against the configured memory limit.
#[derive(Debug, Default)]
pub struct MemoryAccount {
    used: usize,
    limit: Option<usize>,
}

impl MemoryAccount {
    pub fn new(limit: Option<usize>) -> Self {
        Self { used: 0, limit }
    }

    /// Reserve `bytes`; returns false when the limit would be exceeded.
    pub fn try_charge(&mut self, bytes: usize) -> bool {
        let Some(total) = self.used.checked_add(bytes) else {
            return false;
        };
        if self.limit.is_some_and(|l| total > l) {
            return false;
        }
        self.used = total;
        true
    }

    /// Whether `bytes` more could be charged right now.
    pub fn fits(&self, bytes: usize) -> bool {
        match (self.used.checked_add(bytes), self.limit) {
            (None, _) => false,
            (Some(total), Some(l)) => total <= l,
            (Some(_), None) => true,
        }
    }

    pub fn release(&mut self, bytes: usize) {
        self.used = self.used.saturating_sub(bytes);
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }
}

#[cold]
#[track_caller]
fn dangling(id: ObjectId) -> ! {
    panic!("internal consistency violation: dangling object {id}")
}

pub struct Heap {
    slots: Vec<Option<Slot>>,
    free_list: Vec<usize>,
    current_white: u8,
    live: usize,
    pub(crate) account: MemoryAccount,
}

impl Heap {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            slots: Vec::with_capacity(256),
            free_list: Vec::new(),
            current_white: WHITE0,
            live: 0,
            account: MemoryAccount::new(limit),
        }
    }

    /// Allocate an object in the current white.
    pub fn alloc(&mut self, obj: ManagedObject) -> Result<ObjectId, RuntimeError> {
        if !self.account.try_charge(obj.size()) {
            return Err(RuntimeError::OutOfMemory);
        }
        let slot = Slot {
            marked: self.current_white,
            obj,
        };
        self.live += 1;
        if let Some(i) = self.free_list.pop() {
            self.slots[i] = Some(slot);
            Ok(ObjectId(i))
        } else {
            self.slots.push(Some(slot));
            Ok(ObjectId(self.slots.len() - 1))
        }
    }

    /// Release a slot. Only the sweeper calls this.
    pub(crate) fn free(&mut self, id: ObjectId) {
        if let Some(slot) = self.slots.get_mut(id.0).and_then(Option::take) {
            self.account.release(slot.obj.size());
            self.free_list.push(id.0);
            self.live -= 1;
        }
    }

    #[inline]
    #[track_caller]
    fn slot(&self, id: ObjectId) -> &Slot {
        match self.slots.get(id.0) {
            Some(Some(s)) => s,
            _ => dangling(id),
        }
    }

    #[inline]
    #[track_caller]
    fn slot_mut(&mut self, id: ObjectId) -> &mut Slot {
        match self.slots.get_mut(id.0) {
            Some(Some(s)) => s,
            _ => dangling(id),
        }
    }

    #[inline]
    #[track_caller]
    pub fn get(&self, id: ObjectId) -> &ManagedObject {
        &self.slot(id).obj
    }

    #[inline]
    #[track_caller]
    pub fn get_mut(&mut self, id: ObjectId) -> &mut ManagedObject {
        &mut self.slot_mut(id).obj
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    #[track_caller]
    pub fn tag(&self, id: ObjectId) -> Tag {
        self.get(id).tag()
    }

    /// Number of occupied slots.
    pub fn object_count(&self) -> usize {
        self.live
    }

    /// Upper bound of slot indices, for the sweeper's cursor.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn bytes_used(&self) -> usize {
        self.account.used()
    }

    // ---- colors ----

    #[inline]
    fn other_white(&self) -> u8 {
        self.current_white ^ WHITE_BITS
    }

    pub fn is_white(&self, id: ObjectId) -> bool {
        self.slot(id).marked & WHITE_BITS != 0
    }

    pub fn is_black(&self, id: ObjectId) -> bool {
        self.slot(id).marked & BLACK != 0
    }

    /// Neither white nor black: reached but not yet traversed.
    pub fn is_gray(&self, id: ObjectId) -> bool {
        self.slot(id).marked & (WHITE_BITS | BLACK) == 0
    }

    pub fn is_fixed(&self, id: ObjectId) -> bool {
        self.slot(id).marked & FIXED != 0
    }

    /// Unreached by the last marking phase and not yet swept.
    pub fn is_dead(&self, id: ObjectId) -> bool {
        let marked = self.slot(id).marked;
        marked & FIXED == 0 && marked & self.other_white() != 0
    }

    pub(crate) fn set_gray(&mut self, id: ObjectId) {
        let s = self.slot_mut(id);
        s.marked &= !(WHITE_BITS | BLACK);
    }

    pub fn mark_black(&mut self, id: ObjectId) {
        let s = self.slot_mut(id);
        s.marked = (s.marked & !WHITE_BITS) | BLACK;
    }

    /// Reset to the current white, keeping the fixed bit.
    pub(crate) fn make_white(&mut self, id: ObjectId) {
        let white = self.current_white;
        let s = self.slot_mut(id);
        if s.marked & FIXED == 0 {
            s.marked = (s.marked & !(WHITE_BITS | BLACK)) | white;
        }
    }

    /// Bring a dead-but-unswept object back to the current white.
    pub(crate) fn resurrect(&mut self, id: ObjectId) {
        let s = self.slot_mut(id);
        s.marked ^= WHITE_BITS;
    }

    /// Exempt an object from collection for the life of the heap.
    pub fn fix(&mut self, id: ObjectId) {
        let s = self.slot_mut(id);
        s.marked = (s.marked & !WHITE_BITS) | FIXED;
    }

    /// Swap the meaning of the two whites. Called once marking completes.
    pub(crate) fn flip_white(&mut self) {
        self.current_white = self.other_white();
    }

    /// Liveness check for a value read out of a heap object or root.
    #[inline]
    pub fn check_liveness(&self, v: Value) {
        if let Some(id) = v.try_object() {
            debug_assert!(
                self.contains(id) && self.tag(id) == v.tag(),
                "value {v:?} does not match its object"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::userdata::Userdata;

    fn ud() -> ManagedObject {
        ManagedObject::Userdata(Userdata::try_new(8, 0).unwrap())
    }

    #[test]
    fn fresh_objects_are_current_white() {
        let mut heap = Heap::new(None);
        let id = heap.alloc(ud()).unwrap();
        assert!(heap.is_white(id));
        assert!(!heap.is_dead(id));
        heap.flip_white();
        assert!(heap.is_dead(id));
        heap.resurrect(id);
        assert!(!heap.is_dead(id));
        assert!(heap.is_white(id));
    }

    #[test]
    fn fixed_objects_never_die() {
        let mut heap = Heap::new(None);
        let id = heap.alloc(ud()).unwrap();
        heap.fix(id);
        heap.flip_white();
        assert!(!heap.is_dead(id));
        assert!(!heap.is_white(id));
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = Heap::new(None);
        let a = heap.alloc(ud()).unwrap();
        heap.free(a);
        assert!(!heap.contains(a));
        let b = heap.alloc(ud()).unwrap();
        assert_eq!(a, b);
        assert_eq!(heap.object_count(), 1);
    }

    #[test]
    fn memory_limit_rejects_allocations() {
        let mut heap = Heap::new(Some(1));
        assert!(matches!(heap.alloc(ud()), Err(RuntimeError::OutOfMemory)));
        assert_eq!(heap.bytes_used(), 0);
    }

    #[test]
    #[should_panic(expected = "dangling object")]
    fn reading_a_freed_slot_is_fatal() {
        let mut heap = Heap::new(None);
        let a = heap.alloc(ud()).unwrap();
        heap.free(a);
        heap.get(a);
    }
}
