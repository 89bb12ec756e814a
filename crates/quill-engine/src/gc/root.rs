// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Scoped temporary roots.
//!
//! Native code holding a value that nothing else references (a result array
//! being filled, an accumulator) roots it for the lifetime of a
//! [`RootScope`]. The scope dereferences to the [`Vm`], so the guarded code
//! keeps full access to the runtime, and every root it pushed is released
//! when the scope drops, on early returns and `?` included.

use std::ops::{Deref, DerefMut};

use crate::runtime::Value;
use crate::vm::Vm;

pub struct RootScope<'a> {
    vm: &'a mut Vm,
    base: usize,
}

impl<'a> RootScope<'a> {
    pub fn new(vm: &'a mut Vm) -> Self {
        let base = vm.temp_roots.len();
        Self { vm, base }
    }

    /// Root `value` until the scope ends. Returns the value for chaining.
    pub fn push_root(&mut self, value: Value) -> Value {
        self.vm.temp_roots.push(value);
        value
    }

    /// Replace the root at `index` (in push order within this scope).
    pub fn set_root(&mut self, index: usize, value: Value) {
        self.vm.temp_roots[self.base + index] = value;
    }

    pub fn root_count(&self) -> usize {
        self.vm.temp_roots.len() - self.base
    }
}

impl Deref for RootScope<'_> {
    type Target = Vm;

    fn deref(&self) -> &Vm {
        &*self.vm
    }
}

impl DerefMut for RootScope<'_> {
    fn deref_mut(&mut self) -> &mut Vm {
        &mut *self.vm
    }
}

impl Drop for RootScope<'_> {
    fn drop(&mut self) {
        self.vm.temp_roots.truncate(self.base);
    }
}

impl Vm {
    /// Open a scope for temporary roots.
    pub fn root_scope(&mut self) -> RootScope<'_> {
        RootScope::new(self)
    }
}
