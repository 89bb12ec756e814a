// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables for one VM instance. Every field has a default, so a config file
/// only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Bytes allocated before the first collection
    pub gc_initial_threshold: usize,
    /// Next threshold is live bytes times this factor
    pub gc_growth_factor: usize,
    /// Collect on every allocation
    pub gc_stress: bool,
    /// Call depth at which a stack overflow is raised
    pub max_frames: usize,
    pub stack_trace_limit: usize,
    /// Print uncaught exceptions to stderr
    pub report_uncaught: bool,
    /// Extra directories searched by `import`
    pub module_paths: Vec<PathBuf>,
    /// Appended to import paths that lack an extension
    pub file_extension: String,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            gc_initial_threshold: 1024 * 1024,
            gc_growth_factor: 2,
            gc_stress: false,
            max_frames: 1024,
            stack_trace_limit: 15,
            report_uncaught: true,
            module_paths: Vec::new(),
            file_extension: "quill".to_string(),
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VmConfig::default();
        assert_eq!(config.gc_initial_threshold, 1024 * 1024);
        assert_eq!(config.max_frames, 1024);
        assert_eq!(config.file_extension, "quill");
        assert!(config.report_uncaught);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = VmConfig::from_toml_str("gc_stress = true\nmodule_paths = [\"lib\"]\n").unwrap();
        assert!(config.gc_stress);
        assert_eq!(config.module_paths, vec![PathBuf::from("lib")]);
        assert_eq!(config.stack_trace_limit, 15);
    }

    #[test]
    fn test_unknown_type_is_error() {
        assert!(matches!(
            VmConfig::from_toml_str("max_frames = \"many\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            VmConfig::load("/definitely/not/here.toml"),
            Err(Error::Io { .. })
        ));
    }
}
