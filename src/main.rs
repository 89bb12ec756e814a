// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Quill - command line runner and REPL for the Quill scripting language
//!
//! ## Features
//!
//! - Run a script file or an inline snippet
//! - Dump the bytecode of a program instead of running it
//! - Interactive REPL with highlighting, completion and history

mod repl;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use quill_engine::{Engine, Error, VmConfig, render_report};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit status for programs that fail to compile
const EXIT_COMPILE_ERROR: u8 = 65;
/// Exit status for uncaught script exceptions
const EXIT_RUNTIME_ERROR: u8 = 70;

#[derive(Debug, Parser)]
#[command(name = "quill", version, about = "Run Quill scripts or start an interactive session")]
struct Cli {
    /// Script to execute
    file: Option<PathBuf>,

    /// Evaluate CODE instead of reading a file
    #[arg(short, long, value_name = "CODE")]
    eval: Option<String>,

    /// Print the bytecode listing instead of running
    #[arg(long)]
    disassemble: bool,

    /// Configuration file (defaults to <config dir>/quill/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Add a directory to the import search path
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Collect garbage on every allocation
    #[arg(long)]
    gc_stress: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("quill=debug,quill_engine=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve the effective configuration: file values first, then flags.
fn load_config(cli: &Cli) -> Result<VmConfig> {
    let default_path = dirs::config_dir().map(|dir| dir.join("quill").join("config.toml"));
    let path = match (&cli.config, default_path) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(path)) if path.is_file() => Some(path),
        _ => None,
    };

    let mut config = match &path {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            VmConfig::load(path)
                .with_context(|| format!("failed to load configuration from '{}'", path.display()))?
        }
        None => VmConfig::default(),
    };
    if cli.gc_stress {
        config.gc_stress = true;
    }
    config.module_paths.extend(cli.include.iter().cloned());
    // Errors are reported here, with colours.
    config.report_uncaught = false;
    Ok(config)
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli)?;
    let mut engine = Engine::with_config(config);

    if cli.disassemble {
        let source = match (&cli.eval, &cli.file) {
            (Some(code), _) => code.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("cannot read '{}'", path.display()))?,
            (None, None) => anyhow::bail!("--disassemble needs a FILE or --eval CODE"),
        };
        return Ok(finish(engine.disassemble(&source)));
    }

    if let Some(code) = &cli.eval {
        return Ok(finish(engine.eval(code)));
    }

    if let Some(path) = &cli.file {
        return Ok(run_file(&mut engine, path));
    }

    let mut repl = repl::Repl::new(engine).context("failed to initialize the REPL")?;
    repl.run().context("REPL terminated")?;
    Ok(ExitCode::SUCCESS)
}

fn run_file(engine: &mut Engine, path: &Path) -> ExitCode {
    debug!(path = %path.display(), "running script");
    match engine.eval_file(path) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            exit_code(&e)
        }
    }
}

/// Print a non-empty result, or report the error.
fn finish(result: quill_engine::Result<String>) -> ExitCode {
    match result {
        Ok(text) => {
            if !text.is_empty() {
                if text.ends_with('\n') {
                    print!("{text}");
                } else {
                    println!("{text}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&e);
            exit_code(&e)
        }
    }
}

fn exit_code(error: &Error) -> ExitCode {
    ExitCode::from(exit_status(error))
}

fn exit_status(error: &Error) -> u8 {
    match error {
        Error::Compile(_) => EXIT_COMPILE_ERROR,
        Error::Runtime(_) => EXIT_RUNTIME_ERROR,
        _ => 1,
    }
}

/// Print an engine error to stderr.
fn report(error: &Error) {
    match error {
        Error::Compile(errors) => {
            for e in errors.iter() {
                let location = format!("[line {}]", e.line);
                let message = format!("Error{}: {}", e.location, e.message);
                eprintln!("{} {}", location.dimmed(), message.red());
            }
        }
        Error::Runtime(e) => {
            let report = render_report(e);
            let mut lines = report.lines();
            if let Some(first) = lines.next() {
                eprintln!("{}", first.red().bold());
            }
            for line in lines {
                eprintln!("{}", line.dimmed());
            }
        }
        other => eprintln!("{}: {}", "Error".red().bold(), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from(["quill", "-e", "echo 1;", "-I", "lib", "-I", "vendor", "--gc-stress"]);
        assert_eq!(cli.eval.as_deref(), Some("echo 1;"));
        assert_eq!(cli.include, vec![PathBuf::from("lib"), PathBuf::from("vendor")]);
        assert!(cli.gc_stress);
        assert!(!cli.verbose);
        assert!(cli.file.is_none());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from(["quill", "--gc-stress", "-I", "extra"]);
        let mut config = load_config(&cli).unwrap();
        assert!(config.gc_stress);
        assert!(!config.report_uncaught);
        assert_eq!(config.module_paths.pop(), Some(PathBuf::from("extra")));
    }

    #[test]
    fn test_exit_codes() {
        let mut engine = Engine::with_config(VmConfig {
            report_uncaught: false,
            ..VmConfig::default()
        });
        let compile = engine.eval("var = ;").unwrap_err();
        assert_eq!(exit_status(&compile), EXIT_COMPILE_ERROR);
        let runtime = engine.eval("throw Exception(\"x\");").unwrap_err();
        assert_eq!(exit_status(&runtime), EXIT_RUNTIME_ERROR);
    }
}
