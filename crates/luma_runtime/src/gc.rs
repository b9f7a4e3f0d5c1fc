//! Incremental tri-color collector for the Runtime.
//!
//! A cycle runs Pause -> Propagate -> (atomic) -> Sweep -> Pause. Marking is
//! incremental; black objects that receive references to white ones are
//! handled by the barriers below. Threads are re-traversed in the atomic
//! step because stack writes are not barriered.

use luma_core::{ObjectId, Tag, Value};
use tracing::{debug, trace};

use crate::Runtime;
use crate::config::RuntimeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    Pause,
    Propagate,
    Sweep,
}

pub(crate) struct GcState {
    phase: GcPhase,
    gray: Vec<ObjectId>,
    /// Objects to traverse again in the atomic step.
    gray_again: Vec<ObjectId>,
    sweep_cursor: usize,
    /// Live-object count that starts the next cycle.
    threshold: usize,
    scratch: Vec<ObjectId>,
}

impl GcState {
    pub(crate) fn new(live: usize, config: &RuntimeConfig) -> Self {
        Self {
            phase: GcPhase::Pause,
            gray: Vec::new(),
            gray_again: Vec::new(),
            sweep_cursor: 0,
            threshold: next_threshold(live, config),
            scratch: Vec::new(),
        }
    }
}

fn next_threshold(live: usize, config: &RuntimeConfig) -> usize {
    (live.saturating_mul(config.gc_pause) / 100).max(live + config.gc_step_size)
}

impl Runtime {
    pub fn gc_phase(&self) -> GcPhase {
        self.gc.phase
    }

    fn mark_object(&mut self, id: ObjectId) {
        if !self.heap.is_white(id) {
            return;
        }
        match self.heap.tag(id) {
            Tag::SHORT_STR | Tag::LONG_STR => self.heap.mark_black(id),
            _ => {
                self.heap.set_gray(id);
                self.gc.gray.push(id);
            }
        }
    }

    fn mark_value(&mut self, v: Value) {
        if let Some(id) = v.try_object() {
            self.heap.check_liveness(v);
            self.mark_object(id);
        }
    }

    /// Collect all GC roots from the runtime state.
    fn collect_gc_roots(&self) -> Vec<Value> {
        let mut roots = Vec::with_capacity(self.registry.len() + self.gc_temp_roots.len() + 2);
        roots.extend_from_slice(&self.registry);
        roots.extend_from_slice(&self.gc_temp_roots);
        roots.push(Value::from_object(Tag::THREAD, self.main_thread));
        roots.push(Value::from_object(Tag::THREAD, self.current));
        roots
    }

    fn mark_roots(&mut self) {
        for v in self.collect_gc_roots() {
            self.mark_value(v);
        }
    }

    /// Blacken one gray object. Outside the atomic step threads go back to
    /// gray and wait for it.
    fn propagate_one(&mut self, atomic: bool) -> bool {
        let Some(id) = self.gc.gray.pop() else {
            return false;
        };
        self.heap.mark_black(id);
        let mut children = std::mem::take(&mut self.gc.scratch);
        children.clear();
        self.heap.get(id).trace(&mut children);
        for &child in &children {
            self.mark_object(child);
        }
        self.gc.scratch = children;
        if !atomic && self.heap.tag(id) == Tag::THREAD {
            self.heap.set_gray(id);
            self.gc.gray_again.push(id);
        }
        true
    }

    fn atomic(&mut self) {
        self.mark_roots();
        let again = std::mem::take(&mut self.gc.gray_again);
        self.gc.gray.extend(again);
        while self.propagate_one(true) {}
        self.clear_cache();
        self.heap.flip_white();
        self.gc.phase = GcPhase::Sweep;
        self.gc.sweep_cursor = 0;
        trace!(objects = self.heap.object_count(), "marking finished");
    }

    /// Sweep up to `budget` slots. Dead short strings leave the string table
    /// before their slot is freed.
    fn sweep_step(&mut self, budget: usize) {
        let start = self.gc.sweep_cursor;
        let end = start.saturating_add(budget).min(self.heap.capacity());
        let mut freed = 0usize;
        for i in start..end {
            let id = ObjectId(i);
            if !self.heap.contains(id) || self.heap.is_fixed(id) {
                continue;
            }
            if self.heap.is_dead(id) {
                if self.heap.tag(id) == Tag::SHORT_STR {
                    self.strings.remove(&mut self.heap, id);
                }
                self.heap.free(id);
                freed += 1;
            } else {
                self.heap.make_white(id);
            }
        }
        self.gc.sweep_cursor = end;
        trace!(from = start, to = end, freed, "sweep step");
        if end >= self.heap.capacity() {
            self.finish_cycle();
        }
    }

    fn finish_cycle(&mut self) {
        let size = self.strings.size();
        if self.strings.used() < size / 4 && size > self.config.min_string_table_size {
            self.strings.resize(&mut self.heap, size / 2);
        }
        self.gc.threshold = next_threshold(self.heap.object_count(), &self.config);
        self.gc.phase = GcPhase::Pause;
    }

    /// One increment of collector work.
    pub fn gc_step(&mut self) {
        let budget = self.config.gc_step_size;
        match self.gc.phase {
            GcPhase::Pause => {
                self.mark_roots();
                self.gc.phase = GcPhase::Propagate;
            }
            GcPhase::Propagate => {
                let mut n = 0;
                while n < budget && self.propagate_one(false) {
                    n += 1;
                }
                if self.gc.gray.is_empty() {
                    self.atomic();
                }
            }
            GcPhase::Sweep => self.sweep_step(budget),
        }
    }

    /// Step the collector if a cycle is running or allocation passed the
    /// threshold.
    pub fn check_gc(&mut self) {
        if self.gc.phase != GcPhase::Pause || self.heap.object_count() >= self.gc.threshold {
            self.gc_step();
        }
    }

    /// Finish any cycle in progress, then run a complete one.
    pub fn full_collection(&mut self) {
        let before = self.heap.object_count();
        while self.gc.phase != GcPhase::Pause {
            self.gc_step_unbounded();
        }
        self.mark_roots();
        self.gc.phase = GcPhase::Propagate;
        while self.gc.phase != GcPhase::Pause {
            self.gc_step_unbounded();
        }
        debug!(before, after = self.heap.object_count(), "full collection");
    }

    fn gc_step_unbounded(&mut self) {
        match self.gc.phase {
            GcPhase::Pause => {}
            GcPhase::Propagate => {
                while self.propagate_one(false) {}
                self.atomic();
            }
            GcPhase::Sweep => self.sweep_step(usize::MAX),
        }
    }

    /// Forward barrier: `owner` now references `v`.
    pub fn barrier(&mut self, owner: ObjectId, v: Value) {
        let Some(id) = v.try_object() else {
            return;
        };
        if self.heap.is_black(owner) && self.heap.is_white(id) {
            if self.gc.phase == GcPhase::Propagate {
                self.mark_object(id);
            } else {
                self.heap.make_white(owner);
            }
        }
    }

    /// Backward barrier: re-traverse `owner` in the atomic step.
    pub fn barrier_back(&mut self, owner: ObjectId, v: Value) {
        let Some(id) = v.try_object() else {
            return;
        };
        if self.heap.is_black(owner) && self.heap.is_white(id) {
            if self.gc.phase == GcPhase::Propagate {
                self.heap.set_gray(owner);
                self.gc.gray_again.push(owner);
            } else {
                self.heap.make_white(owner);
            }
        }
    }

    /// Exempt `v` from collection for the life of the runtime.
    pub fn fix(&mut self, v: Value) {
        if let Some(id) = v.try_object() {
            self.heap.fix(id);
        }
    }

    pub fn is_dead(&self, v: Value) -> bool {
        v.try_object().is_some_and(|id| self.heap.is_dead(id))
    }

    pub fn is_white(&self, v: Value) -> bool {
        v.try_object().is_some_and(|id| self.heap.is_white(id))
    }
}
