// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Per-function compile state: locals, upvalues, scopes and loops.
//!
//! Local slot numbers are frame-relative stack indices. Slot 0 holds the
//! callee, or `this` for methods, so a function's first parameter is slot 1.

use crate::compiler::bytecode::Blob;
use crate::runtime::{FunctionKind, UpvalueDesc};

/// A local variable in a scope.
#[derive(Debug, Clone)]
pub struct Local {
    /// The variable name
    pub name: String,
    /// Scope depth of the declaration, `None` until its initializer finished
    pub depth: Option<usize>,
    /// Whether a closure captured this slot
    pub captured: bool,
}

/// An enclosing loop, for `break` and `continue`.
#[derive(Debug, Clone)]
pub struct LoopState {
    /// Target of `continue`; `None` while it lies ahead (do-while)
    pub start: Option<usize>,
    /// Forward `continue` jumps awaiting the condition
    pub continue_jumps: Vec<usize>,
    /// First offset scanned for break placeholders
    pub body_start: usize,
    /// Locals deeper than this belong to the body
    pub scope_depth: usize,
    /// Locals deeper than this are dropped by `break`
    pub break_depth: usize,
    /// Try regions already open when the loop began
    pub try_depth: usize,
}

/// Lookup failures that the compiler reports as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    Uninitialized,
    TooManyLocals,
    TooManyUpvalues,
    Duplicate,
}

impl ScopeError {
    pub fn message(self) -> &'static str {
        match self {
            ScopeError::Uninitialized => "Cannot read local variable in its own initializer.",
            ScopeError::TooManyLocals => "Too many local variables in function.",
            ScopeError::TooManyUpvalues => "Too many closure variables in function.",
            ScopeError::Duplicate => "Already a variable with this name in this scope.",
        }
    }
}

/// Everything the compiler tracks for one function being emitted.
#[derive(Debug)]
pub struct FunctionState {
    pub kind: FunctionKind,
    pub name: Option<String>,
    pub blob: Blob,
    pub locals: Vec<Local>,
    pub upvalues: Vec<UpvalueDesc>,
    pub scope_depth: usize,
    pub loops: Vec<LoopState>,
    /// Open try regions
    pub try_depth: usize,
    pub arity: usize,
    pub required: usize,
    pub variadic: bool,
}

impl FunctionState {
    pub fn new(kind: FunctionKind, name: Option<String>) -> Self {
        let slot_zero = if kind.has_receiver() { "this" } else { "" };
        Self {
            kind,
            name,
            blob: Blob::new(),
            locals: vec![Local {
                name: slot_zero.to_string(),
                depth: Some(0),
                captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
            loops: Vec::new(),
            try_depth: 0,
            arity: 0,
            required: 0,
            variadic: false,
        }
    }

    /// Script code at depth 0 binds module variables instead of locals.
    pub fn is_global_scope(&self) -> bool {
        self.kind == FunctionKind::Script && self.scope_depth == 0
    }

    pub fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Leave a scope and return the locals it owned, innermost first.
    pub fn end_scope(&mut self) -> Vec<Local> {
        self.scope_depth -= 1;
        let keep = self
            .locals
            .iter()
            .rposition(|local| local.depth.is_some_and(|d| d <= self.scope_depth))
            .map_or(0, |i| i + 1);
        let mut dropped = self.locals.split_off(keep);
        dropped.reverse();
        dropped
    }

    /// Locals deeper than `depth`, innermost first, without removing them.
    pub fn locals_above(&self, depth: usize) -> impl Iterator<Item = &Local> {
        self.locals
            .iter()
            .rev()
            .take_while(move |local| local.depth.is_none_or(|d| d > depth))
    }

    /// Add an uninitialized local; checks for a duplicate in the same scope.
    pub fn declare_local(&mut self, name: &str) -> Result<u16, ScopeError> {
        for local in self.locals.iter().rev() {
            if local.depth.is_some_and(|d| d < self.scope_depth) {
                break;
            }
            if local.name == name {
                return Err(ScopeError::Duplicate);
            }
        }
        self.add_local(name)
    }

    pub fn add_local(&mut self, name: &str) -> Result<u16, ScopeError> {
        let slot = u16::try_from(self.locals.len()).map_err(|_| ScopeError::TooManyLocals)?;
        self.locals.push(Local {
            name: name.to_string(),
            depth: None,
            captured: false,
        });
        Ok(slot)
    }

    /// Mark the newest local as usable.
    pub fn mark_initialized(&mut self) {
        let depth = self.scope_depth;
        if let Some(local) = self.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    /// Slot of the newest local called `name`.
    pub fn resolve_local(&self, name: &str) -> Result<Option<u16>, ScopeError> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth.is_none() {
                    return Err(ScopeError::Uninitialized);
                }
                return Ok(Some(i as u16));
            }
        }
        Ok(None)
    }

    /// Index of the upvalue describing `(index, is_local)`, adding it once.
    pub fn add_upvalue(&mut self, index: u16, is_local: bool) -> Result<u16, ScopeError> {
        let desc = UpvalueDesc { index, is_local };
        if let Some(existing) = self.upvalues.iter().position(|u| *u == desc) {
            return Ok(existing as u16);
        }
        let slot = u16::try_from(self.upvalues.len()).map_err(|_| ScopeError::TooManyUpvalues)?;
        self.upvalues.push(desc);
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function() -> FunctionState {
        let mut state = FunctionState::new(FunctionKind::Function, None);
        state.begin_scope();
        state
    }

    #[test]
    fn test_slot_zero_is_reserved() {
        let state = FunctionState::new(FunctionKind::Method, None);
        assert_eq!(state.resolve_local("this"), Ok(Some(0)));
        let state = FunctionState::new(FunctionKind::Function, None);
        assert_eq!(state.resolve_local("this"), Ok(None));
    }

    #[test]
    fn test_declare_and_resolve() {
        let mut state = function();
        assert_eq!(state.declare_local("x"), Ok(1));
        assert_eq!(state.resolve_local("x"), Err(ScopeError::Uninitialized));
        state.mark_initialized();
        assert_eq!(state.resolve_local("x"), Ok(Some(1)));
        assert_eq!(state.resolve_local("y"), Ok(None));
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let mut state = function();
        state.declare_local("x").unwrap();
        state.mark_initialized();
        assert_eq!(state.declare_local("x"), Err(ScopeError::Duplicate));

        // Shadowing in an inner scope is fine.
        state.begin_scope();
        assert_eq!(state.declare_local("x"), Ok(2));
        state.mark_initialized();
        assert_eq!(state.resolve_local("x"), Ok(Some(2)));
    }

    #[test]
    fn test_end_scope_returns_innermost_first() {
        let mut state = function();
        state.begin_scope();
        for name in ["a", "b"] {
            state.declare_local(name).unwrap();
            state.mark_initialized();
        }
        let dropped = state.end_scope();
        let names: Vec<_> = dropped.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(state.locals.len(), 1);
    }

    #[test]
    fn test_locals_above_keeps_locals() {
        let mut state = function();
        state.declare_local("outer").unwrap();
        state.mark_initialized();
        state.begin_scope();
        state.declare_local("inner").unwrap();
        state.mark_initialized();
        assert_eq!(state.locals_above(1).count(), 1);
        assert_eq!(state.locals.len(), 3);
    }

    #[test]
    fn test_upvalues_are_memoized() {
        let mut state = function();
        assert_eq!(state.add_upvalue(3, true), Ok(0));
        assert_eq!(state.add_upvalue(1, false), Ok(1));
        assert_eq!(state.add_upvalue(3, true), Ok(0));
        assert_eq!(state.upvalues.len(), 2);
    }

    #[test]
    fn test_global_scope() {
        let mut state = FunctionState::new(FunctionKind::Script, None);
        assert!(state.is_global_scope());
        state.begin_scope();
        assert!(!state.is_global_scope());
    }
}
