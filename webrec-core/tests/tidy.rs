//! Webrec Core Style Enforcement
//!
//! Scans `src/` for the handful of rules clippy cannot express: module
//! size, anti-pattern module names, and panicking or printing from
//! library code.

use std::fs;
use std::path::{Path, PathBuf};

/// Module size limit
const MAX_MODULE_LINES: usize = 500;

/// Anti-pattern module names
const BANNED_MODULE_NAMES: &[&str] = &[
    "utils", "util", "helpers", "helper", "common", "shared", "misc", "tools",
];

/// Calls that have no place outside tests in a library crate
const BANNED_CALLS: &[(&str, &str)] = &[
    (".unwrap()", "propagate the error instead of unwrapping"),
    (".expect(", "propagate the error instead of expecting"),
    ("println!", "library code logs through tracing"),
    ("eprintln!", "library code logs through tracing"),
    ("dbg!", "leftover debugging output"),
];

/// Modules that exist only to support tests
const TEST_SUPPORT_MODULES: &[&str] = &["test_fixtures.rs"];

#[derive(Debug)]
struct StyleViolation {
    file: PathBuf,
    line: usize,
    rule: &'static str,
    message: String,
}

fn source_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = fs::read_dir(dir).unwrap();
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            source_files(&path, files);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
}

fn workspace_sources() -> Vec<PathBuf> {
    let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut files = Vec::new();
    source_files(&src, &mut files);
    files.sort();
    files
}

fn is_test_support(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| TEST_SUPPORT_MODULES.iter().any(|m| name == *m))
}

/// Lines of `content` before its `#[cfg(test)]` module.
fn production_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .map(|(index, line)| (index + 1, line))
}

fn check_module_size(path: &Path, content: &str, violations: &mut Vec<StyleViolation>) {
    let lines = content.lines().count();
    if lines > MAX_MODULE_LINES {
        violations.push(StyleViolation {
            file: path.to_path_buf(),
            line: lines,
            rule: "module-size",
            message: format!("{lines} lines, limit is {MAX_MODULE_LINES}; split the module"),
        });
    }
}

fn check_module_name(path: &Path, violations: &mut Vec<StyleViolation>) {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
        return;
    };
    if BANNED_MODULE_NAMES.contains(&stem.as_str()) {
        violations.push(StyleViolation {
            file: path.to_path_buf(),
            line: 1,
            rule: "module-name",
            message: format!("`{stem}` says nothing about what the module does"),
        });
    }
}

fn check_banned_calls(path: &Path, content: &str, violations: &mut Vec<StyleViolation>) {
    for (line_number, line) in production_lines(content) {
        let code = line.trim_start();
        if code.starts_with("//") {
            continue;
        }
        for (pattern, message) in BANNED_CALLS {
            if code.contains(pattern) {
                violations.push(StyleViolation {
                    file: path.to_path_buf(),
                    line: line_number,
                    rule: "banned-call",
                    message: format!("`{pattern}`: {message}"),
                });
            }
        }
    }
}

fn report(violations: &[StyleViolation]) -> bool {
    for violation in violations {
        println!(
            "{}:{} [{}] {}",
            violation.file.display(),
            violation.line,
            violation.rule,
            violation.message
        );
    }
    violations.is_empty()
}

#[test]
fn tidy() {
    let mut violations = Vec::new();
    let files = workspace_sources();
    assert!(!files.is_empty(), "no sources found");

    for path in &files {
        let content = fs::read_to_string(path).unwrap();
        check_module_size(path, &content, &mut violations);
        check_module_name(path, &mut violations);
        if !is_test_support(path) {
            check_banned_calls(path, &content, &mut violations);
        }
    }

    assert!(report(&violations), "{} style violation(s)", violations.len());
}

#[test]
fn test_production_lines_stop_at_test_module() {
    let content = "fn a() {}\n#[cfg(test)]\nmod tests { fn b() { x.unwrap(); } }\n";
    let lines: Vec<_> = production_lines(content).collect();
    assert_eq!(lines, vec![(1, "fn a() {}")]);

    let mut violations = Vec::new();
    check_banned_calls(Path::new("a.rs"), content, &mut violations);
    assert!(violations.is_empty());
}

#[test]
fn test_banned_module_name_detected() {
    let mut violations = Vec::new();
    check_module_name(Path::new("src/utils.rs"), &mut violations);
    check_module_name(Path::new("src/media_buffer.rs"), &mut violations);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].rule, "module-name");
}
