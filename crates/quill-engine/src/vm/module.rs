// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module loading.
//!
//! `import` asks a [`ModuleLoader`] to turn a name into source text, compiles
//! it into a fresh module and runs its top level once. Modules are cached by
//! resolved path, so a module imported while it is still running hands back
//! its partially initialised bindings.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Vm, VmResult};
use crate::gc::ObjRef;
use crate::runtime::{Module, Obj, Table, Value};

/// Source text of a resolved module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    /// Canonical location; doubles as the cache key
    pub path: PathBuf,
    pub source: String,
}

/// Resolves import names to source text.
pub trait ModuleLoader {
    /// Resolve `name` as imported from the module at `importer`, if that
    /// module came from a file.
    fn resolve(&self, name: &str, importer: Option<&Path>) -> Result<ModuleSource, String>;
}

/// Loads modules from the filesystem.
///
/// Relative names are looked up next to the importing file first, then in
/// each search path in order.
#[derive(Debug, Clone, Default)]
pub struct FileLoader {
    search_paths: Vec<PathBuf>,
    extension: String,
}

impl FileLoader {
    pub fn new(search_paths: Vec<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            search_paths,
            extension: extension.into(),
        }
    }

    fn candidates(&self, name: &str, importer: Option<&Path>) -> Vec<PathBuf> {
        let mut path = PathBuf::from(name);
        if path.extension().is_none() && !self.extension.is_empty() {
            path.set_extension(&self.extension);
        }
        if path.is_absolute() {
            return vec![path];
        }
        let base = match importer.and_then(Path::parent) {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("."),
        };
        std::iter::once(base)
            .chain(self.search_paths.iter().cloned())
            .map(|dir| dir.join(&path))
            .collect()
    }
}

impl ModuleLoader for FileLoader {
    fn resolve(&self, name: &str, importer: Option<&Path>) -> Result<ModuleSource, String> {
        let candidates = self.candidates(name, importer);
        for candidate in &candidates {
            if !candidate.is_file() {
                continue;
            }
            let source = std::fs::read_to_string(candidate)
                .map_err(|e| format!("cannot read '{}': {e}", candidate.display()))?;
            let path = candidate.canonicalize().unwrap_or_else(|_| candidate.clone());
            return Ok(ModuleSource { path, source });
        }
        let searched: Vec<String> = candidates.iter().map(|c| c.display().to_string()).collect();
        Err(format!("module not found (searched {})", searched.join(", ")))
    }
}

impl Vm {
    /// Path of the file the running frame's module came from.
    fn importer_path(&self) -> Option<PathBuf> {
        let module = self.heap.as_module(self.frames.last()?.module)?;
        let path = self.heap.str(module.path);
        // Modules without a file carry names like `<main>`.
        (!path.starts_with('<')).then(|| PathBuf::from(path))
    }

    /// Load (or fetch from the cache) the module `name`.
    pub(crate) fn import(&mut self, name: ObjRef) -> VmResult<Value> {
        let name_text = self.heap.str(name).to_string();
        let importer = self.importer_path();
        let resolved = match self.loader.resolve(&name_text, importer.as_deref()) {
            Ok(resolved) => resolved,
            Err(reason) => return Err(self.error(format!("Cannot import '{name_text}': {reason}"))),
        };

        let path_text = resolved.path.to_string_lossy().into_owned();
        let key = self.intern(&path_text);
        if let Some(module) = self.modules.get_value(Value::Obj(key)) {
            return Ok(module);
        }

        let module = {
            let mut scope = self.root_scope();
            scope.push_root(Value::Obj(key));
            let stem = resolved
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| name_text.clone());
            let module_name = scope.intern(&stem);
            scope.heap.insert(Obj::Module(Module {
                name: module_name,
                path: key,
                values: Table::new(),
                loaded: false,
            }))
        };
        // Cached before running so import cycles see the partial module.
        self.modules.set_value(Value::Obj(key), Value::Obj(module));
        debug!(module = %name_text, path = %path_text, "loading module");

        let function = match crate::compiler::compile(&mut self.heap, &resolved.source, module) {
            Ok(function) => function,
            Err(errors) => {
                self.modules.delete(Value::Obj(key));
                debug!(module = %name_text, errors = errors.len(), "module failed to compile");
                return Err(self.error(format!("Cannot compile module '{name_text}':\n{errors}")));
            }
        };
        if let Err(thrown) = self.run_function(function) {
            self.modules.delete(Value::Obj(key));
            return Err(thrown);
        }
        if let Some(m) = self.heap.as_module_mut(module) {
            m.loaded = true;
        }
        Ok(Value::Obj(module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_prefer_importer_directory() {
        let loader = FileLoader::new(vec![PathBuf::from("/lib")], "quill");
        let candidates = loader.candidates("util", Some(Path::new("/app/main.quill")));
        assert_eq!(
            candidates,
            vec![PathBuf::from("/app/util.quill"), PathBuf::from("/lib/util.quill")]
        );
    }

    #[test]
    fn test_explicit_extension_is_kept() {
        let loader = FileLoader::new(Vec::new(), "quill");
        let candidates = loader.candidates("data.txt", None);
        assert_eq!(candidates, vec![PathBuf::from("./data.txt")]);
    }

    #[test]
    fn test_missing_module_lists_search_path() {
        let loader = FileLoader::new(Vec::new(), "quill");
        let error = loader.resolve("/nowhere/missing", None).unwrap_err();
        assert!(error.contains("/nowhere/missing.quill"));
    }
}
