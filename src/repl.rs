// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL (Read-Eval-Print Loop) for Quill.

use owo_colors::OwoColorize;
use quill_engine::{Engine, builtins};
use quill_engine::lexer::keywords::KEYWORDS;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Config, Editor, Helper};
use std::borrow::Cow;
use std::path::PathBuf;

/// REPL configuration constants
const HISTORY_FILE: &str = "history.txt";
const MAX_HISTORY_SIZE: usize = 1000;


/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Load,
    Gc,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let rest = input.trim().strip_prefix('.')?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        let command = match cmd.as_str() {
            "help" | "h" | "?" => ReplCommand::Help,
            "exit" | "quit" | "q" => ReplCommand::Exit,
            "clear" | "cls" => ReplCommand::Clear,
            "version" | "v" => ReplCommand::Version,
            "load" | "l" => ReplCommand::Load,
            "gc" => ReplCommand::Gc,
            _ => return None,
        };
        Some((command, arg))
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".load <file>", "Load and execute a Quill file"),
            (".gc", "Run the garbage collector and show heap statistics"),
        ]
    }
}

/// Turn a bare expression into a statement that prints it.
///
/// Input ending in `;` or `}` is taken as written.
fn prepare_line(line: &str) -> Cow<'_, str> {
    let trimmed = line.trim_end();
    if trimmed.ends_with(';') || trimmed.ends_with('}') {
        Cow::Borrowed(line)
    } else {
        Cow::Owned(format!("echo {trimmed};"))
    }
}

/// Completion, hints, validation and highlighting for the line editor
struct QuillHelper {
    words: Vec<String>,
}

impl QuillHelper {
    fn new() -> Self {
        let words = KEYWORDS
            .iter()
            .copied()
            .chain(builtins::global_names())
            .map(|w| w.to_string())
            .chain(ReplCommand::all_commands().iter().map(|&(cmd, _)| {
                cmd.split_whitespace().next().unwrap_or(cmd).to_string()
            }))
            .collect();
        Self { words }
    }

    fn word_start(line: &str) -> usize {
        line.rfind(|c: char| !c.is_alphanumeric() && c != '_' && c != '.')
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

impl Completer for QuillHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = Self::word_start(&line[..pos]);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches: Vec<Pair> = self
            .words
            .iter()
            .filter(|w| w.starts_with(word))
            .map(|w| Pair {
                display: w.clone(),
                replacement: w[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for QuillHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }
        let word = &line[Self::word_start(line)..];
        if word.len() < 2 {
            return None;
        }
        self.words
            .iter()
            .find(|w| w.starts_with(word) && w.len() > word.len())
            .map(|w| (&w[word.len()..]).dimmed().to_string())
    }
}

impl Highlighter for QuillHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.trim_start().starts_with('.') {
            return Cow::Owned(line.magenta().to_string());
        }

        let mut result = String::with_capacity(line.len() * 2);
        let mut current_word = String::new();
        let mut in_string = None;

        for c in line.chars() {
            if let Some(quote) = in_string {
                current_word.push(c);
                if c == quote {
                    result.push_str(&current_word.green().to_string());
                    current_word.clear();
                    in_string = None;
                }
                continue;
            }
            if c.is_alphanumeric() || c == '_' || c == '@' {
                current_word.push(c);
                continue;
            }
            if !current_word.is_empty() {
                result.push_str(&highlight_word(&current_word));
                current_word.clear();
            }
            match c {
                '"' | '\'' => {
                    in_string = Some(c);
                    current_word.push(c);
                }
                '(' | ')' | '[' | ']' | '{' | '}' => result.push_str(&c.yellow().to_string()),
                '+' | '-' | '*' | '/' | '%' | '=' | '<' | '>' | '!' | '&' | '|' | '^' | '~' => {
                    result.push_str(&c.cyan().to_string())
                }
                _ => result.push(c),
            }
        }

        if in_string.is_some() {
            result.push_str(&current_word.green().to_string());
        } else if !current_word.is_empty() {
            result.push_str(&highlight_word(&current_word));
        }

        Cow::Owned(result)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn highlight_word(word: &str) -> String {
    const LITERALS: &[&str] = &["true", "false", "null", "this", "super"];

    if LITERALS.contains(&word) {
        word.blue().to_string()
    } else if KEYWORDS.contains(&word) {
        word.magenta().bold().to_string()
    } else if builtins::global_names().any(|name| name == word) {
        word.cyan().to_string()
    } else if word.starts_with(|c: char| c.is_ascii_digit()) {
        word.yellow().to_string()
    } else {
        word.to_string()
    }
}

impl Validator for QuillHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        if !is_balanced(input) {
            return Ok(ValidationResult::Incomplete);
        }

        // Trailing operators expect a continuation line.
        let trimmed = input.trim_end();
        let continues = ['\\', '+', '-', '*', '/', '=', ',', '(', '[', '{']
            .iter()
            .any(|c| trimmed.ends_with(*c));
        if continues {
            return Ok(ValidationResult::Incomplete);
        }
        Ok(ValidationResult::Valid(None))
    }
}

/// Check if brackets, braces, and parentheses are balanced
fn is_balanced(input: &str) -> bool {
    let mut stack = Vec::new();
    let mut in_string = None;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if c == '\\' && in_string.is_some() {
            escape_next = true;
            continue;
        }

        match in_string {
            Some(quote) if c == quote => in_string = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => in_string = Some(c),
                '(' => stack.push(')'),
                '[' => stack.push(']'),
                '{' => stack.push('}'),
                ')' | ']' | '}' => {
                    if stack.pop() != Some(c) {
                        // Let the compiler report the mismatch.
                        return true;
                    }
                }
                _ => {}
            },
        }
    }

    stack.is_empty() && in_string.is_none()
}

impl Helper for QuillHelper {}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}

/// The interactive REPL
pub struct Repl {
    engine: Engine,
    editor: Editor<QuillHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    pub fn new(engine: Engine) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(QuillHelper::new()));

        let history_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quill")
            .join(HISTORY_FILE);
        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        // A missing history file is normal on first start.
        let _ = editor.load_history(&history_path);

        Ok(Self {
            engine,
            editor,
            history_path,
        })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "quill>".bright_green().bold());
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.starts_with('.') {
                        match ReplCommand::parse(trimmed) {
                            Some((cmd, arg)) => match self.execute_command(cmd, arg) {
                                CommandResult::Continue => continue,
                                CommandResult::Exit => break,
                            },
                            None => {
                                eprintln!(
                                    "{}: unknown command {} (try {})",
                                    "Error".red().bold(),
                                    trimmed.cyan(),
                                    ".help".cyan()
                                );
                                continue;
                            }
                        }
                    }
                    self.eval_and_print(trimmed);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        if let Err(e) = self.editor.save_history(&self.history_path) {
            tracing::warn!(error = %e, path = %self.history_path.display(), "cannot save history");
        }
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!(
            "  {} {}",
            "Quill".bright_cyan().bold(),
            env!("CARGO_PKG_VERSION").bright_yellow()
        );
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => {
                println!("{} {}", "quill".bright_cyan().bold(), env!("CARGO_PKG_VERSION").yellow());
            }
            ReplCommand::Load => match arg {
                Some(path) => self.load_file(path),
                None => eprintln!(
                    "{}: {} {}",
                    "Error".red().bold(),
                    ".load".cyan(),
                    "requires a file path".dimmed()
                ),
            },
            ReplCommand::Gc => {
                self.engine.collect_garbage();
                let stats = self.engine.gc_stats();
                println!(
                    "{} cycles, {} objects live, {} freed, {} bytes allocated, next cycle at {} bytes",
                    stats.cycles.yellow(),
                    stats.live_objects.yellow(),
                    stats.objects_freed.yellow(),
                    stats.bytes_allocated.yellow(),
                    stats.next_gc.yellow()
                );
            }
        }
        CommandResult::Continue
    }

    fn print_help(&self) {
        println!();
        println!("{}", "REPL Commands:".white().bold());
        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:16} {}", cmd.cyan(), desc.dimmed());
        }
        println!();
        println!("{}", "Input:".white().bold());
        println!(
            "  {}",
            "Lines not ending in ';' or '}' are printed as expressions.".dimmed()
        );
        println!();
    }

    fn load_file(&mut self, path: &str) {
        match self.engine.eval_file(path) {
            Ok(text) => print_result(&text),
            Err(e) => super::report(&e),
        }
    }

    fn eval_and_print(&mut self, input: &str) {
        match self.engine.eval(&prepare_line(input)) {
            Ok(text) => print_result(&text),
            Err(e) => super::report(&e),
        }
    }
}

fn print_result(text: &str) {
    if !text.is_empty() {
        println!("{}", text.yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repl_command_parse() {
        assert_eq!(ReplCommand::parse(".help"), Some((ReplCommand::Help, None)));
        assert_eq!(ReplCommand::parse(".exit"), Some((ReplCommand::Exit, None)));
        assert_eq!(ReplCommand::parse(".gc"), Some((ReplCommand::Gc, None)));
        assert_eq!(
            ReplCommand::parse(".load  test.quill "),
            Some((ReplCommand::Load, Some("test.quill")))
        );
        assert!(ReplCommand::parse(".frobnicate").is_none());
        assert!(ReplCommand::parse("not a command").is_none());
    }

    #[test]
    fn test_prepare_line() {
        assert_eq!(prepare_line("1 + 2"), "echo 1 + 2;");
        assert_eq!(prepare_line("var x = 1;"), "var x = 1;");
        assert_eq!(prepare_line("if (x) { echo x; }"), "if (x) { echo x; }");
    }

    #[test]
    fn test_is_balanced() {
        assert!(is_balanced("(1 + 2)"));
        assert!(is_balanced("{a: 1}"));
        assert!(is_balanced("function f() { return 1; }"));
        assert!(!is_balanced("(1 + 2"));
        assert!(!is_balanced("class A {"));
        assert!(is_balanced("\"string with (unbalanced\""));
        assert!(!is_balanced("\"open string"));
    }

    #[test]
    fn test_highlight_word() {
        assert_eq!(highlight_word("foo"), "foo");
        assert_ne!(highlight_word("class"), "class");
        assert_ne!(highlight_word("42"), "42");
        assert_ne!(highlight_word("println"), "println");
    }

    #[test]
    fn test_completion_words_include_engine_globals() {
        let helper = QuillHelper::new();
        for name in builtins::global_names() {
            assert!(helper.words.iter().any(|w| w == name), "missing {name}");
        }
        assert!(helper.words.iter().any(|w| w == "Exception"));
    }
}
