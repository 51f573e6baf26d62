//! Dead Code Enforcement
//!
//! Production code must not silence the dead code lint. Test code is exempt
//! since fixtures are often only partly used by a given test binary.

use std::fs;
use std::path::{Path, PathBuf};

/// Directories under the workspace root that are not part of the build.
const SKIPPED_DIRS: &[&str] = &["target", "examples", "docs", "public"];

/// A dead code allowance found in production code
#[derive(Debug)]
struct DeadCodeViolation {
    file_path: PathBuf,
    line_number: usize,
    context: String,
}

/// Collects dead code allowances across the workspace
#[derive(Default)]
struct DeadCodeChecker {
    violations: Vec<DeadCodeViolation>,
    files_checked: usize,
}

impl DeadCodeChecker {
    /// Find all Rust sources below `dir`, skipping hidden and build dirs
    fn find_rust_files(dir: &Path, files: &mut Vec<PathBuf>, depth: usize) -> std::io::Result<()> {
        if depth > 10 {
            return Ok(());
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(name) = path.file_name().map(|n| n.to_string_lossy())
                && (name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref()))
            {
                continue;
            }

            if path.is_dir() {
                Self::find_rust_files(&path, files, depth + 1)?;
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
        Ok(())
    }

    /// Whether `path` holds test code
    fn is_test_file(path: &Path) -> bool {
        let path_str = path.to_string_lossy().replace('\\', "/").to_lowercase();

        path_str.contains("/tests/")
            || path_str.contains("test_")
            || path_str.ends_with("_test.rs")
            || path_str.contains("webrec-tests/")
    }

    /// Whether `line` silences the dead code lint
    fn allows_dead_code(line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.starts_with("#[allow(") && trimmed.contains("dead_code")
            || trimmed.starts_with("#![allow(") && trimmed.contains("dead_code")
    }

    fn check_content(&mut self, path: &Path, content: &str) {
        self.files_checked += 1;
        for (index, line) in content.lines().enumerate() {
            if Self::allows_dead_code(line) {
                self.violations.push(DeadCodeViolation {
                    file_path: path.to_path_buf(),
                    line_number: index + 1,
                    context: line.trim().to_string(),
                });
            }
        }
    }

    fn check_workspace(&mut self, root: &Path) -> std::io::Result<()> {
        let mut files = Vec::new();
        Self::find_rust_files(root, &mut files, 0)?;

        for file in files.iter().filter(|f| !Self::is_test_file(f)) {
            let content = fs::read_to_string(file)?;
            self.check_content(file, &content);
        }
        Ok(())
    }

    /// Prints violations; returns whether the check passed
    fn report_violations(&self) -> bool {
        if self.violations.is_empty() {
            println!(
                "Dead code enforcement: {} files checked, no violations found",
                self.files_checked
            );
            return true;
        }

        for violation in &self.violations {
            println!("{}:{}", violation.file_path.display(), violation.line_number);
            println!("  {}", violation.context);
        }
        println!();
        println!(
            "Found {} violation(s) in {} file(s) checked",
            self.violations.len(),
            self.files_checked
        );
        println!("Remove the unused code or use it; move test-only helpers behind cfg(test).");

        false
    }
}

#[test]
fn test_is_test_file() {
    assert!(DeadCodeChecker::is_test_file(Path::new("webrec-core/tests/tidy.rs")));
    assert!(DeadCodeChecker::is_test_file(Path::new("webrec-core/src/test_fixtures.rs")));
    assert!(DeadCodeChecker::is_test_file(Path::new(
        "../webrec-tests/e2e/client_disconnect.rs"
    )));

    assert!(!DeadCodeChecker::is_test_file(Path::new("webrec-core/src/lib.rs")));
    assert!(!DeadCodeChecker::is_test_file(Path::new(
        "webrec-core/src/recording/session.rs"
    )));
}

#[test]
fn test_dead_code_detection() {
    let mut checker = DeadCodeChecker::default();
    let content = r#"
use std::collections::HashMap;

#[allow(dead_code)]
struct UnusedStruct {
    field: u32,
}

#[allow(clippy::too_many_lines, dead_code)]
fn unused_function() {}

// #[allow(dead_code)] in a comment is fine
"#;

    checker.check_content(Path::new("sample.rs"), content);

    assert_eq!(checker.violations.len(), 2);
    assert_eq!(checker.violations[0].line_number, 4);
    assert_eq!(checker.violations[1].line_number, 9);
}

#[test]
fn dead_code_enforcement() {
    let mut checker = DeadCodeChecker::default();
    checker
        .check_workspace(Path::new(".."))
        .expect("Failed to check workspace");

    assert!(
        checker.report_violations(),
        "Dead code allowance violations found in production code - see output above"
    );
}
