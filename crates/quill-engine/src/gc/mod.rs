// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Garbage collector for the script runtime.
//!
//! Non-incremental, non-generational mark-sweep:
//! - [`heap`]: slot storage, object headers and the intrusive object list
//! - [`collector`]: root marking and the collection cycle
//! - [`root`]: scoped temporary roots for native code

pub mod collector;
pub mod heap;
pub mod root;

pub use heap::{GcPhase, GcStats, Heap, ObjRef, ObjectHeader};
pub use root::RootScope;

use crate::runtime::{Obj, Value};
use crate::vm::Vm;

impl Vm {
    /// Allocate an object, collecting first when the threshold is exceeded.
    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.insert(obj)
    }

    /// Interned string for `s`, allocating through the collector if new.
    pub fn intern(&mut self, s: &str) -> ObjRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.intern(s)
    }

    pub fn string_value(&mut self, s: &str) -> Value {
        Value::Obj(self.intern(s))
    }
}
