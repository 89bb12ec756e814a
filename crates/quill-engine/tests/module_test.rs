// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Import resolution against real directories and custom loaders.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use quill_engine::{Engine, Error, ModuleLoader, ModuleSource, SharedBuffer, VmConfig};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, source).unwrap();
    path
}

fn engine(config: VmConfig) -> (Engine, SharedBuffer) {
    let out = SharedBuffer::new();
    let config = VmConfig {
        report_uncaught: false,
        ..config
    };
    (Engine::with_config(config).with_output(out.clone()), out)
}

#[test]
fn test_import_next_to_the_main_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "util.quill", "function add(a, b) { return a + b; }\nvar answer = 42;");
    let main = write(dir.path(), "main.quill", "import util;\necho util.add(1, 2);\necho util.answer;");

    let (mut engine, out) = engine(VmConfig::default());
    engine.eval_file(&main).unwrap();
    assert_eq!(out.contents(), "3\n42\n");
}

#[test]
fn test_import_string_path_with_alias() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "lib/shapes.quill", "class Square { constructor(s) { this.s = s; } area() { return this.s * this.s; } }");
    let main = write(dir.path(), "main.quill", "import \"lib/shapes\" as shapes;\necho shapes.Square(3).area();");

    let (mut engine, out) = engine(VmConfig::default());
    engine.eval_file(&main).unwrap();
    assert_eq!(out.contents(), "9\n");
}

#[test]
fn test_search_paths_are_consulted() {
    let lib = TempDir::new().unwrap();
    write(lib.path(), "greet.quill", "function hello(n) { return \"hello \" + n; }");
    let app = TempDir::new().unwrap();
    let main = write(app.path(), "main.quill", "import greet;\necho greet.hello(\"there\");");

    let config = VmConfig {
        module_paths: vec![lib.path().to_path_buf()],
        ..VmConfig::default()
    };
    let (mut engine, out) = engine(config);
    engine.eval_file(&main).unwrap();
    assert_eq!(out.contents(), "hello there\n");
}

#[test]
fn test_module_body_runs_once() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "noisy.quill", "echo \"loading\";\nvar value = 1;");
    let main = write(dir.path(), "main.quill", "import noisy;\nimport noisy as again;\necho again.value;");

    let (mut engine, out) = engine(VmConfig::default());
    engine.eval_file(&main).unwrap();
    assert_eq!(out.contents(), "loading\n1\n");
}

#[test]
fn test_cached_module_survives_collection() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "noisy.quill", "echo \"loading\";\nvar value = 5;");
    // The module is only bound to a local, so nothing but the cache holds it.
    let main = write(
        dir.path(),
        "main.quill",
        "function load() { import noisy; return noisy.value; }\necho load();",
    );

    let (mut engine, out) = engine(VmConfig::default());
    engine.eval_file(&main).unwrap();
    engine.collect_garbage();
    engine.collect_garbage();
    engine.eval("echo load();").unwrap();
    assert_eq!(out.contents(), "loading\n5\n5\n");
}

#[test]
fn test_cyclic_imports_see_partial_module() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.quill", "var name = \"a\";\nimport b;\nfunction peer() { return b.name; }");
    write(dir.path(), "b.quill", "var name = \"b\";\nimport a;\nfunction peer() { return a.name; }");
    let main = write(dir.path(), "main.quill", "import a;\necho a.peer();\necho a.b.peer();");

    let (mut engine, out) = engine(VmConfig::default());
    engine.eval_file(&main).unwrap();
    assert_eq!(out.contents(), "b\na\n");
}

#[test]
fn test_missing_module_is_catchable() {
    let dir = TempDir::new().unwrap();
    let main = write(
        dir.path(),
        "main.quill",
        "try { import nowhere; } catch (e) { echo e.message.starts_with(\"Cannot import 'nowhere'\"); }",
    );

    let (mut engine, out) = engine(VmConfig::default());
    engine.eval_file(&main).unwrap();
    assert_eq!(out.contents(), "true\n");
}

#[test]
fn test_module_with_compile_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "broken.quill", "var = ;");
    let main = write(dir.path(), "main.quill", "import broken;");

    let (mut engine, _) = engine(VmConfig::default());
    match engine.eval_file(&main) {
        Err(Error::Runtime(error)) => {
            assert!(error.message.starts_with("Cannot compile module 'broken'"), "{}", error.message);
        }
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

struct MemoryLoader(HashMap<&'static str, &'static str>);

impl ModuleLoader for MemoryLoader {
    fn resolve(&self, name: &str, _importer: Option<&Path>) -> Result<ModuleSource, String> {
        match self.0.get(name) {
            Some(source) => Ok(ModuleSource {
                path: PathBuf::from(format!("mem/{name}")),
                source: source.to_string(),
            }),
            None => Err("not in memory".to_string()),
        }
    }
}

#[test]
fn test_custom_loader() {
    let loader = MemoryLoader(HashMap::from([("math", "var pi = 3;")]));
    let out = SharedBuffer::new();
    let config = VmConfig {
        report_uncaught: false,
        ..VmConfig::default()
    };
    let mut engine = Engine::with_config(config)
        .with_output(out.clone())
        .with_loader(Box::new(loader));
    engine.eval("import math;\necho math.pi;").unwrap();
    assert_eq!(out.contents(), "3\n");

    let error = engine.eval("import other;").unwrap_err();
    assert!(error.to_string().contains("not in memory"), "{error}");
}
