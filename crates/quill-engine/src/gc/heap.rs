// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Object storage with compact headers.
//!
//! Objects live in index-addressed slots. An intrusive `next` link in every
//! header threads all live objects into one list, which is the only path the
//! sweep phase uses to enumerate them. Freed slots are recycled.

use crate::config::VmConfig;
use crate::runtime::table::{Property, hash_str};
use crate::runtime::{Array, Class, Closure, Dict, Function, Instance, Module, Range};
use crate::runtime::{Obj, StringObj, Table, Value};

macro_rules! typed_access {
    ($($get:ident, $get_mut:ident => $variant:ident($ty:ty);)+) => {
        $(
            pub fn $get(&self, r: ObjRef) -> Option<&$ty> {
                match self.get(r) {
                    Obj::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            pub fn $get_mut(&mut self, r: ObjRef) -> Option<&mut $ty> {
                match self.get_mut(r) {
                    Obj::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        )+
    };
}

/// Handle to a heap object. Copyable and non-owning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(u32);

impl ObjRef {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Per-object GC metadata.
#[derive(Debug, Clone, Copy)]
pub struct ObjectHeader {
    /// Marked when equal to the heap's current mark flag.
    pub mark: bool,
    /// Set once the slot has been freed; any later access is a bug.
    pub stale: bool,
    /// Destructor already scheduled, never schedule it again.
    pub finalized: bool,
    pub next: Option<ObjRef>,
    /// Bytes charged for this object at the last measurement.
    pub size: usize,
}

struct Slot {
    header: ObjectHeader,
    obj: Option<Obj>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    Idle,
    /// Roots marked, gray worklist being drained or sweep pending.
    Marking,
}

/// Counters exposed to hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub cycles: usize,
    pub objects_freed: usize,
    pub live_objects: usize,
    pub bytes_allocated: usize,
    pub next_gc: usize,
}

pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<ObjRef>,
    mark_flag: bool,
    phase: GcPhase,
    /// Marked but not yet traced.
    gray: Vec<ObjRef>,
    scratch: Vec<Value>,
    bytes_allocated: usize,
    next_gc: usize,
    growth_factor: usize,
    stress: bool,
    paused: usize,
    live: usize,
    /// Weak intern set: string object to nothing, keyed by content hash.
    strings: Table,
    stats: GcStats,
}

impl Heap {
    pub fn new(config: &VmConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            mark_flag: true,
            phase: GcPhase::Idle,
            gray: Vec::new(),
            scratch: Vec::new(),
            bytes_allocated: 0,
            next_gc: config.gc_initial_threshold,
            growth_factor: config.gc_growth_factor.max(1),
            stress: config.gc_stress,
            paused: 0,
            live: 0,
            strings: Table::new(),
            stats: GcStats::default(),
        }
    }

    /// Link a new object into the heap. Never collects.
    pub fn insert(&mut self, obj: Obj) -> ObjRef {
        let size = obj.byte_size();
        // Objects created while a cycle is marking count as marked, so that
        // cycle never sweeps them.
        let mark = match self.phase {
            GcPhase::Idle => !self.mark_flag,
            GcPhase::Marking => self.mark_flag,
        };
        let header = ObjectHeader {
            mark,
            stale: false,
            finalized: false,
            next: self.head,
            size,
        };
        let slot = Slot {
            header,
            obj: Some(obj),
        };
        let r = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = slot;
                ObjRef(index)
            }
            None => {
                self.slots.push(slot);
                ObjRef((self.slots.len() - 1) as u32)
            }
        };
        self.head = Some(r);
        self.bytes_allocated += size;
        self.live += 1;
        if self.phase == GcPhase::Marking {
            self.gray.push(r);
        }
        r
    }

    pub fn get(&self, r: ObjRef) -> &Obj {
        match &self.slots[r.0 as usize].obj {
            Some(obj) => obj,
            None => unreachable!("stale object reference {r:?}"),
        }
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        match &mut self.slots[r.0 as usize].obj {
            Some(obj) => obj,
            None => unreachable!("stale object reference {r:?}"),
        }
    }

    /// Whether `r` still names a live object.
    pub fn is_live(&self, r: ObjRef) -> bool {
        self.slots
            .get(r.0 as usize)
            .is_some_and(|slot| !slot.header.stale && slot.obj.is_some())
    }

    pub fn header(&self, r: ObjRef) -> &ObjectHeader {
        &self.slots[r.0 as usize].header
    }

    pub fn header_mut(&mut self, r: ObjRef) -> &mut ObjectHeader {
        &mut self.slots[r.0 as usize].header
    }

    typed_access! {
        as_string, as_string_mut => String(StringObj);
        as_function, as_function_mut => Function(Function);
        as_closure, as_closure_mut => Closure(Closure);
        as_class, as_class_mut => Class(Class);
        as_instance, as_instance_mut => Instance(Instance);
        as_array, as_array_mut => Array(Array);
        as_dict, as_dict_mut => Dict(Dict);
        as_module, as_module_mut => Module(Module);
        as_range, as_range_mut => Range(Range);
    }

    /// String content, or `""` for non-strings.
    pub fn str(&self, r: ObjRef) -> &str {
        match self.get(r) {
            Obj::String(s) => s.as_str(),
            _ => "",
        }
    }

    /// Text of a string value.
    pub fn value_str(&self, value: Value) -> Option<&str> {
        match value {
            Value::Obj(r) => match self.get(r) {
                Obj::String(s) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Return the interned string for `s`, allocating it if needed.
    pub fn intern(&mut self, s: &str) -> ObjRef {
        let hash = hash_str(s);
        if let Some(existing) = self.find_interned(s, hash) {
            return existing;
        }
        let r = self.insert(Obj::String(StringObj {
            chars: s.into(),
            hash,
        }));
        self.strings
            .set_hashed(Value::Obj(r), hash, Property::value(Value::Null));
        r
    }

    fn find_interned(&self, s: &str, hash: u32) -> Option<ObjRef> {
        let slots = &self.slots;
        self.strings
            .find_by_hash(hash, |key| match key {
                Value::Obj(r) => matches!(
                    &slots[r.0 as usize].obj,
                    Some(Obj::String(candidate)) if &*candidate.chars == s
                ),
                _ => false,
            })
            .and_then(|key| key.as_obj())
    }

    pub fn interned_count(&self) -> usize {
        self.strings.len()
    }

    /// Suspend collection, e.g. while the compiler holds unrooted objects.
    pub fn pause(&mut self) {
        self.paused += 1;
    }

    pub fn resume(&mut self) {
        self.paused = self.paused.saturating_sub(1);
    }

    pub fn is_paused(&self) -> bool {
        self.paused > 0
    }

    pub fn should_collect(&self) -> bool {
        self.paused == 0
            && self.phase == GcPhase::Idle
            && (self.stress || self.bytes_allocated > self.next_gc)
    }

    pub fn phase(&self) -> GcPhase {
        self.phase
    }

    pub fn stats(&self) -> GcStats {
        GcStats {
            live_objects: self.live,
            bytes_allocated: self.bytes_allocated,
            next_gc: self.next_gc,
            ..self.stats
        }
    }

    /// Start a cycle: everything is white until marked.
    pub fn begin_cycle(&mut self) {
        debug_assert_eq!(self.phase, GcPhase::Idle);
        self.phase = GcPhase::Marking;
        self.gray.clear();
    }

    pub fn is_marked(&self, r: ObjRef) -> bool {
        self.slots[r.0 as usize].header.mark == self.mark_flag
    }

    /// Mark an object gray.
    pub fn mark(&mut self, r: ObjRef) {
        let header = &mut self.slots[r.0 as usize].header;
        if header.mark == self.mark_flag {
            return;
        }
        header.mark = self.mark_flag;
        self.gray.push(r);
    }

    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark(r);
        }
    }

    pub fn mark_table(&mut self, table: &Table) {
        for (key, prop) in table.iter() {
            self.mark_value(key);
            self.mark_value(prop.value);
        }
    }

    /// Drain the gray worklist, blackening each object by marking its children.
    pub fn trace(&mut self) {
        let mut children = std::mem::take(&mut self.scratch);
        while let Some(r) = self.gray.pop() {
            children.clear();
            if let Some(obj) = &self.slots[r.0 as usize].obj {
                super::collector::references(obj, &mut children);
            }
            for child in children.iter().copied() {
                self.mark_value(child);
            }
        }
        self.scratch = children;
    }

    /// Resurrect unmarked instances whose class has a destructor that has not
    /// run yet. Returns `(instance, destructor)` pairs; the objects stay alive
    /// until the destructor ran and a later cycle finds them unreachable.
    pub fn queue_finalizers(&mut self) -> Vec<(ObjRef, Value)> {
        let mut queued = Vec::new();
        let mut cursor = self.head;
        while let Some(r) = cursor {
            let header = self.slots[r.0 as usize].header;
            cursor = header.next;
            if header.mark == self.mark_flag || header.finalized {
                continue;
            }
            let Some(Obj::Instance(instance)) = &self.slots[r.0 as usize].obj else {
                continue;
            };
            if let Some(destructor) = self.find_destructor(instance.class) {
                queued.push((r, destructor));
            }
        }
        for (r, destructor) in &queued {
            self.slots[r.0 as usize].header.finalized = true;
            self.mark(*r);
            self.mark_value(*destructor);
        }
        self.trace();
        queued
    }

    fn find_destructor(&self, mut class: ObjRef) -> Option<Value> {
        loop {
            match self.get(class) {
                Obj::Class(c) => {
                    if c.destructor.is_some() {
                        return c.destructor;
                    }
                    class = c.superclass?;
                }
                _ => return None,
            }
        }
    }

    /// Drop intern-table entries for unmarked strings.
    pub fn sweep_strings(&mut self) -> usize {
        let slots = &self.slots;
        let flag = self.mark_flag;
        self.strings.retain(|key| match key {
            Value::Obj(r) => slots[r.0 as usize].header.mark == flag,
            _ => false,
        })
    }

    /// Free every unmarked object, then flip the mark flag so survivors read
    /// as unmarked for the next cycle. Returns the number of objects freed.
    pub fn sweep(&mut self) -> usize {
        let mut freed = 0;
        let mut live_bytes = 0;
        let mut prev: Option<ObjRef> = None;
        let mut cursor = self.head;

        while let Some(r) = cursor {
            let index = r.0 as usize;
            let next = self.slots[index].header.next;
            if self.slots[index].header.mark == self.mark_flag {
                let size = self.slots[index].obj.as_ref().map_or(0, Obj::byte_size);
                self.slots[index].header.size = size;
                live_bytes += size;
                prev = Some(r);
            } else {
                match prev {
                    Some(p) => self.slots[p.0 as usize].header.next = next,
                    None => self.head = next,
                }
                let slot = &mut self.slots[index];
                debug_assert!(!slot.header.stale, "double free of {r:?}");
                // Dropping the object releases the structures it owns.
                slot.obj = None;
                slot.header.stale = true;
                slot.header.next = None;
                self.free.push(r.0);
                freed += 1;
            }
            cursor = next;
        }

        self.live -= freed;
        self.bytes_allocated = live_bytes;
        self.next_gc = (live_bytes * self.growth_factor).max(1024);
        self.mark_flag = !self.mark_flag;
        self.phase = GcPhase::Idle;
        self.stats.cycles += 1;
        self.stats.objects_freed += freed;
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(&VmConfig::default())
    }

    fn array(heap: &mut Heap, items: Vec<Value>) -> ObjRef {
        heap.insert(Obj::Array(Array { items }))
    }

    fn collect(heap: &mut Heap, roots: &[ObjRef]) -> usize {
        heap.begin_cycle();
        for r in roots {
            heap.mark(*r);
        }
        heap.trace();
        heap.sweep_strings();
        heap.sweep()
    }

    #[test]
    fn test_intern_returns_same_object() {
        let mut heap = heap();
        let a = heap.intern("hello");
        let b = heap.intern(&(String::from("hel") + "lo"));
        assert_eq!(a, b);
        let empty1 = heap.intern("");
        let empty2 = heap.intern("");
        assert_eq!(empty1, empty2);
        assert_ne!(a, empty1);
        assert_eq!(heap.interned_count(), 2);
    }

    #[test]
    fn test_unreachable_objects_are_freed() {
        let mut heap = heap();
        let kept = heap.intern("kept");
        let child = heap.intern("child");
        let parent = array(&mut heap, vec![Value::Obj(child)]);
        let garbage = array(&mut heap, vec![]);

        let freed = collect(&mut heap, &[kept, parent]);
        assert_eq!(freed, 1);
        assert!(heap.is_live(kept));
        assert!(heap.is_live(child));
        assert!(heap.is_live(parent));
        assert!(!heap.is_live(garbage));
        assert!(heap.header(garbage).stale);
    }

    #[test]
    fn test_flag_flip_resets_marks() {
        let mut heap = heap();
        let a = array(&mut heap, vec![]);
        collect(&mut heap, &[a]);
        // Survivors read as unmarked in the next cycle without a reset pass.
        assert!(!heap.is_marked(a));
        assert_eq!(collect(&mut heap, &[]), 1);
        assert!(!heap.is_live(a));
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = heap();
        let a = array(&mut heap, vec![]);
        let b = array(&mut heap, vec![Value::Obj(a)]);
        if let Obj::Array(arr) = heap.get_mut(a) {
            arr.items.push(Value::Obj(b));
        }
        assert_eq!(collect(&mut heap, &[]), 2);
    }

    #[test]
    fn test_allocation_during_marking_survives_cycle() {
        let mut heap = heap();
        heap.begin_cycle();
        let fresh = array(&mut heap, vec![]);
        heap.trace();
        assert_eq!(heap.sweep(), 0);
        assert!(heap.is_live(fresh));
        // The next cycle treats it like any other object.
        assert_eq!(collect(&mut heap, &[]), 1);
    }

    #[test]
    fn test_weak_intern_table() {
        let mut heap = heap();
        let gone = heap.intern("temporary");
        collect(&mut heap, &[]);
        assert!(!heap.is_live(gone));
        assert_eq!(heap.interned_count(), 0);
        // Re-interning allocates a fresh object.
        let again = heap.intern("temporary");
        assert!(heap.is_live(again));
        assert_eq!(heap.str(again), "temporary");
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let mut heap = heap();
        let a = array(&mut heap, vec![]);
        collect(&mut heap, &[]);
        let b = array(&mut heap, vec![]);
        assert_eq!(a.index(), b.index());
        assert!(heap.is_live(b));
        assert_eq!(heap.stats().live_objects, 1);
    }

    #[test]
    fn test_finalizers_queue_once() {
        use crate::runtime::Class;

        let mut heap = heap();
        let name = heap.intern("A");
        let mut class = Class::new(name);
        class.destructor = Some(Value::Bool(true));
        let class = heap.insert(Obj::Class(class));
        let instance = heap.insert(Obj::Instance(Instance {
            class,
            fields: Table::new(),
        }));

        heap.begin_cycle();
        heap.mark(class);
        heap.trace();
        let queued = heap.queue_finalizers();
        heap.sweep();
        assert_eq!(queued.len(), 1);
        assert!(heap.is_live(instance));

        heap.begin_cycle();
        heap.mark(class);
        heap.trace();
        assert!(heap.queue_finalizers().is_empty());
        heap.sweep();
        assert!(!heap.is_live(instance));
    }

    #[test]
    fn test_pause_blocks_collection() {
        let config = VmConfig {
            gc_stress: true,
            ..VmConfig::default()
        };
        let mut heap = Heap::new(&config);
        assert!(heap.should_collect());
        heap.pause();
        assert!(!heap.should_collect());
        heap.resume();
        assert!(heap.should_collect());
    }
}
