// PHI audit: static scan of every Rust source file for tracing calls that carry
// lab values, units, parameter names or user ids. Logs may only hold opaque
// parameter ids, operation names, statuses and counts.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    /// Field names and interpolations that MUST NOT appear in tracing macro arguments.
    const PHI_PATTERNS: &[&str] = &[
        // Source parameter fields
        "parameter_name",
        "user_id",
        "reference_range =",
        "raw.value",
        "raw.unit",
        "raw.reference_range",
        "effective_unit",
        // Audit and result fields holding measured data
        "original_name",
        "original_value",
        "original_unit",
        "normalized_value",
        "failure_reason",
        "variant_name",
        // Interpolations that leak values
        "%value",
        "?value",
        "value = ",
        "unit = ",
        "%unit",
        "?unit",
        "record.normalized",
    ];

    const ALLOWLIST: &[&str] = &[
        // This audit file itself references the patterns
        "phi_audit.rs",
    ];

    const TRACING_MACROS: &[&str] = &[
        "tracing::info!",
        "tracing::warn!",
        "tracing::error!",
        "tracing::debug!",
        "tracing::trace!",
    ];

    type Violation = (String, usize, String, String);

    #[test]
    fn no_phi_in_tracing_calls() {
        let src_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
        assert!(src_dir.exists(), "Source directory not found: {}", src_dir.display());

        let mut violations = Vec::new();
        scan_directory(&src_dir, &mut violations);

        if !violations.is_empty() {
            let report = violations
                .iter()
                .map(|(file, line_num, line, pattern)| {
                    format!("  {}:{}: found '{}' in: {}", file, line_num, pattern, line.trim())
                })
                .collect::<Vec<_>>()
                .join("\n");
            panic!(
                "PHI AUDIT FAILED: {} violation(s) found in tracing calls:\n{}\n\n\
                 Fix: log the parameter_id instead of the value.",
                violations.len(),
                report
            );
        }
    }

    #[test]
    fn phi_patterns_list_is_not_empty() {
        assert!(
            PHI_PATTERNS.len() >= 10,
            "PHI_PATTERNS should contain at least 10 patterns, found {}",
            PHI_PATTERNS.len()
        );
    }

    #[test]
    fn scanner_detects_known_violation() {
        let source = "tracing::warn!(\n    name = %raw.parameter_name,\n    \"unmapped\"\n);\n";
        let found = scan_source("synthetic.rs", source);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, 1);
        assert_eq!(found[0].3, "parameter_name");
    }

    #[test]
    fn scanner_passes_clean_tracing() {
        let source = r#"tracing::info!(parameter_id = %raw.parameter_id, operations = 3, "done");"#;
        assert!(scan_source("synthetic.rs", source).is_empty());
    }

    #[test]
    fn scanner_ignores_non_tracing_lines() {
        let source = "let unit = raw.unit.as_deref();\nformat!(\"{}\", raw.parameter_name);\n";
        assert!(scan_source("synthetic.rs", source).is_empty());
    }

    fn scan_directory(dir: &Path, violations: &mut Vec<Violation>) {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                scan_directory(&path, violations);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                scan_file(&path, violations);
            }
        }
    }

    fn scan_file(path: &Path, violations: &mut Vec<Violation>) {
        let filename = path.file_name().unwrap_or_default().to_string_lossy();
        if ALLOWLIST.iter().any(|a| filename.contains(a)) {
            return;
        }

        let Ok(content) = fs::read_to_string(path) else {
            return;
        };

        let relative_path = path
            .strip_prefix(Path::new(env!("CARGO_MANIFEST_DIR")).join("src"))
            .unwrap_or(path)
            .display()
            .to_string();

        violations.extend(scan_source(&relative_path, &content));
    }

    /// Collect each tracing macro call (possibly multi-line) and match it against the patterns.
    fn scan_source(file: &str, content: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        let lines: Vec<&str> = content.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            let trimmed = lines[i].trim();
            if !TRACING_MACROS.iter().any(|m| trimmed.starts_with(m)) {
                i += 1;
                continue;
            }

            let start_line = i + 1;
            let mut call = String::from(trimmed);
            let mut depth = paren_delta(trimmed);
            let mut j = i + 1;
            while depth > 0 && j < lines.len() {
                let next = lines[j].trim();
                call.push(' ');
                call.push_str(next);
                depth += paren_delta(next);
                j += 1;
            }

            for pattern in PHI_PATTERNS {
                if call.contains(pattern) {
                    let found = (file.to_string(), start_line, call.clone(), pattern.to_string());
                    violations.push(found);
                }
            }
            i = j;
        }
        violations
    }

    fn paren_delta(line: &str) -> i32 {
        line.chars().fold(0, |depth, ch| match ch {
            '(' => depth + 1,
            ')' => depth - 1,
            _ => depth,
        })
    }
}
