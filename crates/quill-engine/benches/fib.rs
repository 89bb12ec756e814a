// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use quill_engine::Engine;

const FIB: &str = "function fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }\nreturn fib(20);";

const ALLOC: &str = r#"
    var items = [];
    for (var i in 0..2000) { items.push({id: i, name: "item" + i}); }
    return items.filter(function(x) { return x["id"] % 2 == 0; }).length;
"#;

fn bench_fib(c: &mut Criterion) {
    c.bench_function("fib(20)", |b| {
        b.iter(|| {
            let mut engine = Engine::new();
            black_box(engine.eval(black_box(FIB)).ok())
        })
    });
}

fn bench_alloc(c: &mut Criterion) {
    c.bench_function("alloc_2000_dicts", |b| {
        b.iter(|| {
            let mut engine = Engine::new();
            black_box(engine.eval(black_box(ALLOC)).ok())
        })
    });
}

fn bench_compile(c: &mut Criterion) {
    let mut engine = Engine::new();
    c.bench_function("disassemble_fib", |b| {
        b.iter(|| black_box(engine.disassemble(black_box(FIB)).ok()))
    });
}

criterion_group!(benches, bench_fib, bench_alloc, bench_compile);
criterion_main!(benches);
