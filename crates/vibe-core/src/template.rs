//! PR/issue body composition (spec §4.4, "PR creation" and "PR update").
//!
//! A PR body is three named sections layered onto an optional repo
//! template: `## Summary`, `### Description`, `### How to Test`. Filling
//! in a template only ever touches the span between one of these
//! headings and the next; everything else in the template — intro text,
//! checklists, unrelated headings — passes through untouched.

use vibe_types::VibeError;

/// One of the three sections `pr`/`pr-update` fill. The heading text is
/// matched verbatim (after trimming), so a template using different
/// casing or wording for its headings won't be recognized — documented
/// behaviour, not a bug: the tool fills *these* headings, not whichever
/// ones a given template happens to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Summary,
    Description,
    Testing,
}

impl Section {
    pub fn heading(self) -> &'static str {
        match self {
            Section::Summary => "## Summary",
            Section::Description => "### Description",
            Section::Testing => "### How to Test",
        }
    }

    /// Iterate the three sections in template order.
    pub fn all() -> [Section; 3] {
        [Section::Summary, Section::Description, Section::Testing]
    }

    pub fn flag_name(self) -> &'static str {
        match self {
            Section::Summary => "summary",
            Section::Description => "description",
            Section::Testing => "testing",
        }
    }
}

/// The three section values a `pr`/`pr-update` invocation may supply.
/// `None` means "leave the template's existing content for this
/// section alone" (for `pr`, the template's placeholder text stays;
/// for `pr-update`, that section is simply not among the ones touched).
#[derive(Debug, Clone, Default)]
pub struct SectionValues {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub testing: Option<String>,
}

impl SectionValues {
    fn get(&self, section: Section) -> Option<&str> {
        match section {
            Section::Summary => self.summary.as_deref(),
            Section::Description => self.description.as_deref(),
            Section::Testing => self.testing.as_deref(),
        }
    }
}

/// The marker a template may carry for the ticket reference; replaced
/// with `Closes: <ticket-url>` wherever it appears, case-insensitively.
pub const TICKET_MARKER: &str = "{{ticket}}";

/// Compose a PR body: start from `template` if present (try several
/// casings is the caller's job, via `HostingClient::get_pr_template`),
/// fill each section present in `values`, and substitute the ticket
/// marker. With no template, synthesize one from the three sections.
pub fn compose_pr_body(template: Option<&str>, values: &SectionValues, ticket_url: Option<&str>) -> String {
    let mut body = match template {
        Some(template) => fill_sections(template, values),
        None => synthesize_body(values),
    };

    if let Some(url) = ticket_url {
        let replacement = format!("Closes: {url}");
        if body.to_lowercase().contains(&TICKET_MARKER.to_lowercase()) {
            body = replace_case_insensitive(&body, TICKET_MARKER, &replacement);
        } else {
            body.push_str(&format!("\n\n{replacement}\n"));
        }
    }

    body
}

fn synthesize_body(values: &SectionValues) -> String {
    let mut out = String::new();
    for section in Section::all() {
        out.push_str(section.heading());
        out.push('\n');
        out.push_str(values.get(section).unwrap_or(""));
        out.push_str("\n\n");
    }
    out.trim_end().to_string() + "\n"
}

fn fill_sections(template: &str, values: &SectionValues) -> String {
    let mut body = template.to_string();
    for section in Section::all() {
        if let Some(value) = values.get(section) {
            body = match replace_section(&body, section, value) {
                Ok(replaced) => replaced,
                // Template doesn't carry this heading; append it so the
                // value isn't silently dropped.
                Err(_) => {
                    format!("{}\n\n{}\n{}\n", body.trim_end(), section.heading(), value)
                }
            };
        }
    }
    body
}

/// Replace the content of `section` (the span from its heading line to
/// the next heading of equal-or-higher level, or EOF) with `new_content`.
/// Everything outside that span is byte-for-byte preserved, modulo one
/// trailing newline, per the PR-update idempotence property.
pub fn replace_section(body: &str, section: Section, new_content: &str) -> Result<String, VibeError> {
    let heading = section.heading();
    let lines: Vec<&str> = body.lines().collect();

    let Some(heading_idx) = lines.iter().position(|line| line.trim() == heading) else {
        return Err(VibeError::not_found(
            vibe_types::NotFoundKind::Other,
            format!("no '{heading}' section in PR body"),
        ));
    };

    let heading_level = heading.chars().take_while(|&c| c == '#').count();
    let end_idx = lines[heading_idx + 1..]
        .iter()
        .position(|line| {
            let trimmed = line.trim_start();
            let level = trimmed.chars().take_while(|&c| c == '#').count();
            level > 0 && level <= heading_level
        })
        .map(|offset| heading_idx + 1 + offset)
        .unwrap_or(lines.len());

    let mut out = Vec::with_capacity(lines.len());
    out.extend_from_slice(&lines[..=heading_idx]);
    out.push(new_content);
    out.extend_from_slice(&lines[end_idx..]);

    Ok(out.join("\n") + "\n")
}

fn replace_case_insensitive(haystack: &str, needle: &str, replacement: &str) -> String {
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    match lower_haystack.find(&lower_needle) {
        Some(idx) => {
            let mut out = String::with_capacity(haystack.len());
            out.push_str(&haystack[..idx]);
            out.push_str(replacement);
            out.push_str(&haystack[idx + needle.len()..]);
            out
        }
        None => haystack.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
## Summary

_one-liner_

### Description

_why_

### How to Test

_steps_

## Checklist
- [ ] tests pass
";

    #[test]
    fn fill_sections_replaces_only_targeted_spans() {
        let values = SectionValues {
            summary: Some("Fix null check".to_string()),
            description: None,
            testing: Some("Log in, log out.".to_string()),
        };
        let body = compose_pr_body(Some(TEMPLATE), &values, None);

        assert!(body.contains("## Summary\nFix null check\n"));
        assert!(body.contains("_why_")); // untouched
        assert!(body.contains("## Checklist\n- [ ] tests pass"));
    }

    #[test]
    fn compose_with_no_template_synthesizes_all_three_sections() {
        let values = SectionValues {
            summary: Some("s".to_string()),
            description: Some("d".to_string()),
            testing: Some("t".to_string()),
        };
        let body = compose_pr_body(None, &values, None);
        assert!(body.contains("## Summary\ns"));
        assert!(body.contains("### Description\nd"));
        assert!(body.contains("### How to Test\nt"));
    }

    #[test]
    fn ticket_marker_is_substituted() {
        let template = "## Summary\n\n{{TICKET}}\n\n### Description\n\n_d_\n";
        let body = compose_pr_body(Some(template), &SectionValues::default(), Some("https://tracker/x"));
        assert!(body.contains("Closes: https://tracker/x"));
        assert!(!body.to_lowercase().contains("{{ticket}}"));
    }

    #[test]
    fn replace_section_preserves_everything_else() {
        let replaced = replace_section(TEMPLATE, Section::Description, "New description").unwrap();
        assert!(replaced.contains("### Description\nNew description\n"));
        assert!(replaced.contains("_one-liner_"));
        assert!(replaced.contains("_steps_"));
        assert!(replaced.contains("## Checklist"));
    }

    #[test]
    fn replace_section_errors_when_heading_absent() {
        let err = replace_section("no headings here", Section::Summary, "x").unwrap_err();
        assert!(matches!(err, VibeError::NotFound { .. }));
    }
}
