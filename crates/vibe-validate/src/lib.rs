//! Ticket-ID and branch-name validation, slugification, and the shell
//! metacharacter blocklist (spec §3, §4.2).
//!
//! Every user-supplied string that might end up in a branch name, a shell
//! command, or a path segment passes through here first. `SanitizeInput`
//! is the last line of defense before anything reaches `std::process::Command`.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Shell metacharacters forbidden anywhere in a branch name or sanitized
/// input (spec §3).
pub const METACHARACTERS: &[char] = &[
    ';', '&', '|', '>', '<', '$', '`', '(', ')', '{', '}', '[', ']', '\\',
];

const MAX_SLUG_GRAPHEMES: usize = 50;

static TICKET_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]{9}$").unwrap());

/// Regexes tried in order by [`extract_issue_number_from_branch`]; the
/// first capture group of the first match wins.
static ISSUE_NUMBER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(?:^|/)(?:issue|gh)-(\d+)(?:/|-|$)").unwrap(),
        Regex::new(r"(?i)(?:^|/)(?:fix|feature|bug)/(\d+)-").unwrap(),
        Regex::new(r"#(\d+)").unwrap(),
    ]
});

/// `IsTicketID`: exactly 9 characters from `[a-z0-9]`.
pub fn is_ticket_id(s: &str) -> bool {
    TICKET_ID_RE.is_match(s)
}

/// `ValidateBranchName`: non-empty, no metacharacters, no `..` segment,
/// no leading or trailing `/`.
pub fn validate_branch_name(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("branch name must not be empty".to_string());
    }
    if let Some(c) = s.chars().find(|c| METACHARACTERS.contains(c)) {
        return Err(format!("branch name contains forbidden character '{c}'"));
    }
    if s.split('/').any(|segment| segment == "..") {
        return Err("branch name must not contain a '..' path segment".to_string());
    }
    if s.starts_with('/') || s.ends_with('/') {
        return Err("branch name must not start or end with '/'".to_string());
    }
    Ok(())
}

/// `SanitizeInput`: strip the metacharacter set, leave whitespace alone.
/// Used before interpolating user text into anything that may reach a
/// shell or filesystem path.
pub fn sanitize_input(s: &str) -> String {
    s.chars().filter(|c| !METACHARACTERS.contains(c)).collect()
}

/// Lowercase, collapse non-`[a-z0-9]` runs to a single hyphen, trim
/// leading/trailing hyphens, truncate to `MAX_SLUG_GRAPHEMES` graphemes.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut last_was_hyphen = true; // swallow a leading run
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    let trimmed = slug.trim_end_matches('-');
    trimmed
        .graphemes(true)
        .take(MAX_SLUG_GRAPHEMES)
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

/// `GenerateBranchName`. If `prefix` is blank, substitute `username`. If
/// `ticket_id` is blank, emit `prefix/slug` with no ticket segment.
pub fn generate_branch_name(prefix: &str, ticket_id: &str, title: &str, username: &str) -> String {
    let prefix = if prefix.trim().is_empty() { username } else { prefix };
    let slug = slugify(title);
    if ticket_id.trim().is_empty() {
        format!("{prefix}/{slug}")
    } else {
        format!("{prefix}/{ticket_id}/{slug}")
    }
}

/// Recover the ticket ID from a branch produced by [`generate_branch_name`].
/// A ticket-bearing branch always has the shape `prefix/ticket_id/slug`
/// (three segments); the no-ticket form `prefix/slug` has two. Only the
/// middle segment of the three-segment form is ever checked — not `prefix`,
/// which is a username and can itself happen to be 9 lowercase-alnum chars.
pub fn extract_ticket_id(branch: &str) -> Option<String> {
    let segments: Vec<&str> = branch.split('/').collect();
    match segments.as_slice() {
        [_, middle, _] if is_ticket_id(middle) => Some((*middle).to_string()),
        _ => None,
    }
}

/// `ExtractIssueNumberFromBranch`: try each pattern in order, return the
/// first integer match, or `0` if none match.
pub fn extract_issue_number_from_branch(branch: &str) -> u64 {
    for pattern in ISSUE_NUMBER_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(branch) {
            if let Some(m) = caps.get(1) {
                if let Ok(n) = m.as_str().parse::<u64>() {
                    return n;
                }
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_id_accepts_nine_lowercase_alnum() {
        assert!(is_ticket_id("abc123def"));
        assert!(!is_ticket_id("abc123de")); // 8 chars
        assert!(!is_ticket_id("abc123defg")); // 10 chars
        assert!(!is_ticket_id("ABC123DEF")); // uppercase
        assert!(!is_ticket_id("abc-123de")); // punctuation
    }

    #[test]
    fn validate_branch_name_rejects_each_metacharacter() {
        for &c in METACHARACTERS {
            let branch = format!("user/feat{c}ure");
            assert!(
                validate_branch_name(&branch).is_err(),
                "expected rejection for '{c}'"
            );
        }
    }

    #[test]
    fn validate_branch_name_rejects_dotdot_and_slashes() {
        assert!(validate_branch_name("user/../escape").is_err());
        assert!(validate_branch_name("/user/feature").is_err());
        assert!(validate_branch_name("user/feature/").is_err());
        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name("user/feature").is_ok());
    }

    #[test]
    fn sanitize_input_strips_metacharacters_keeps_whitespace() {
        let input = "rm -rf $(whoami); echo done";
        let sanitized = sanitize_input(input);
        assert!(!sanitized.contains(['$', '(', ')', ';']));
        assert!(sanitized.contains(' '));
    }

    #[test]
    fn slugify_collapses_and_truncates() {
        assert_eq!(slugify("Fix the Login Bug!!!"), "fix-the-login-bug");
        assert_eq!(slugify("  leading and trailing  "), "leading-and-trailing");
        let long_title = "a".repeat(100);
        assert_eq!(slugify(&long_title).chars().count(), 50);
    }

    #[test]
    fn generate_branch_name_with_and_without_ticket() {
        let with_ticket = generate_branch_name("rhuot", "abc123def", "Fix login bug", "rhuot");
        assert_eq!(with_ticket, "rhuot/abc123def/fix-login-bug");

        let without_ticket = generate_branch_name("", "", "Fix login bug", "rhuot");
        assert_eq!(without_ticket, "rhuot/fix-login-bug");
    }

    #[test]
    fn generate_then_validate_round_trips() {
        let branch = generate_branch_name("rhuot", "abc123def", "Fix login bug", "rhuot");
        assert!(validate_branch_name(&branch).is_ok());
        assert_eq!(extract_ticket_id(&branch), Some("abc123def".to_string()));
    }

    #[test]
    fn extract_issue_number_from_branch_tries_patterns_in_order() {
        assert_eq!(extract_issue_number_from_branch("fix/123-null-pointer"), 123);
        assert_eq!(extract_issue_number_from_branch("rhuot/issue-456/thing"), 456);
        assert_eq!(extract_issue_number_from_branch("rhuot/no-number-here"), 0);
    }

    proptest::proptest! {
        #[test]
        fn valid_ticket_id_always_produces_valid_branch(
            id in "[a-z0-9]{9}",
            title in "[a-zA-Z0-9 ]{1,80}",
        ) {
            let branch = generate_branch_name("rhuot", &id, &title, "rhuot");
            proptest::prop_assert!(validate_branch_name(&branch).is_ok());
            proptest::prop_assert_eq!(extract_ticket_id(&branch), Some(id));
        }

        /// A `prefix` that itself happens to satisfy `is_ticket_id` must
        /// not shadow the real middle-segment ticket ID.
        #[test]
        fn prefix_that_looks_like_a_ticket_id_does_not_shadow_the_real_one(
            prefix in "[a-z0-9]{9}",
            id in "[a-z0-9]{9}",
            title in "[a-zA-Z0-9 ]{1,80}",
        ) {
            let branch = generate_branch_name(&prefix, &id, &title, "rhuot");
            proptest::prop_assert_eq!(extract_ticket_id(&branch), Some(id));
        }
    }
}
