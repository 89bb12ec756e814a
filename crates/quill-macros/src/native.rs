// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error handling macros for native functions.
//!
//! A native function returns `Result<Value, Throw>`; these macros build the
//! thrown exception through the VM so that it carries the script location.

/// Early return with a script exception.
///
/// # Example
///
/// ```
/// use quill_macros::bail;
///
/// struct Vm;
/// impl Vm {
///     fn error(&mut self, message: String) -> String { message }
/// }
///
/// fn sqrt(vm: &mut Vm, x: f64) -> Result<f64, String> {
///     if x < 0.0 {
///         bail!(vm, "cannot take the root of {}", x);
///     }
///     Ok(x.sqrt())
/// }
///
/// let mut vm = Vm;
/// assert_eq!(sqrt(&mut vm, -1.0).unwrap_err(), "cannot take the root of -1");
/// ```
#[macro_export]
macro_rules! bail {
    ($vm:expr, $msg:literal $(,)?) => {
        return Err($vm.error(::std::string::String::from($msg)))
    };
    ($vm:expr, $fmt:literal, $($arg:tt)*) => {
        return Err($vm.error(format!($fmt, $($arg)*)))
    };
}

/// Raise a script exception unless the condition holds.
#[macro_export]
macro_rules! ensure {
    ($vm:expr, $cond:expr, $msg:literal $(,)?) => {
        if !$cond {
            return Err($vm.error(::std::string::String::from($msg)));
        }
    };
    ($vm:expr, $cond:expr, $fmt:literal, $($arg:tt)*) => {
        if !$cond {
            return Err($vm.error(format!($fmt, $($arg)*)));
        }
    };
}

/// Check a native call's argument count.
///
/// `arity!(vm, call, 2)` requires exactly two arguments, `arity!(vm, call, 1..=2)`
/// accepts a range.
#[macro_export]
macro_rules! arity {
    ($vm:expr, $call:expr, $min:literal ..= $max:literal) => {
        if $call.args.len() < $min || $call.args.len() > $max {
            return Err($vm.arity_error(&$call.name, $min, $max, $call.args.len()));
        }
    };
    ($vm:expr, $call:expr, $n:literal) => {
        if $call.args.len() != $n {
            return Err($vm.arity_error(&$call.name, $n, $n, $call.args.len()));
        }
    };
}

#[cfg(test)]
mod tests {
    struct MockVm {
        raised: usize,
    }

    impl MockVm {
        fn error(&mut self, message: String) -> String {
            self.raised += 1;
            message
        }

        fn arity_error(&mut self, name: &str, min: usize, max: usize, got: usize) -> String {
            self.raised += 1;
            format!("{name}() expects {min}..{max} arguments, {got} given")
        }
    }

    struct Call {
        name: String,
        args: Vec<i32>,
    }

    fn first(vm: &mut MockVm, call: &Call) -> Result<i32, String> {
        arity!(vm, call, 1..=2);
        ensure!(vm, call.args[0] >= 0, "negative argument {}", call.args[0]);
        Ok(call.args[0])
    }

    #[test]
    fn test_ensure() {
        let mut vm = MockVm { raised: 0 };
        let call = Call { name: "first".into(), args: vec![-4] };
        assert_eq!(first(&mut vm, &call).unwrap_err(), "negative argument -4");
        assert_eq!(vm.raised, 1);
    }

    #[test]
    fn test_arity() {
        let mut vm = MockVm { raised: 0 };
        let call = Call { name: "first".into(), args: vec![] };
        assert_eq!(
            first(&mut vm, &call).unwrap_err(),
            "first() expects 1..2 arguments, 0 given"
        );
        let call = Call { name: "first".into(), args: vec![3, 4] };
        assert_eq!(first(&mut vm, &call), Ok(3));
    }

    #[test]
    fn test_bail() {
        fn early_return(vm: &mut MockVm, fail: bool) -> Result<i32, String> {
            if fail {
                bail!(vm, "failed");
            }
            Ok(42)
        }

        let mut vm = MockVm { raised: 0 };
        assert_eq!(early_return(&mut vm, false), Ok(42));
        assert!(early_return(&mut vm, true).is_err());
    }
}
