// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime data model: values, heap objects, tables and call frames.

pub mod format;
pub mod function;
pub mod object;
pub mod table;
pub mod value;

pub use function::{
    BoundMethod, CallFrame, Closure, Function, FunctionKind, Handler, Native, NativeCall,
    NativeFn, TryState, Upvalue, UpvalueDesc, UpvalueState,
};
pub use object::{Accessor, Array, Class, Dict, Instance, Module, Obj, Range, StringObj};
pub use table::{PropKind, Property, Table};
pub use value::Value;
