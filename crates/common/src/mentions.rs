//! Mention token extraction (spec.md §4.7). Scans post/comment bodies for
//! `@name` and `@local@domain` tokens, case-insensitively, skipping fenced
//! code blocks. Resolution against `User.name`/`User.email` happens in
//! `notifications.rs`, which has Store access; this module only tokenizes.

/// A raw mention token pulled out of body text, not yet resolved to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionToken {
    /// `@handle` — compared case-insensitively against `User.name`.
    Name(String),
    /// `@local@domain` — compared case-insensitively against `User.email`.
    Email(String),
}

const NAME_CHARS: fn(char) -> bool = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-';

/// Extract mention tokens from `text`, skipping anything inside fenced code
/// blocks (``` ... ```). Duplicate tokens are not deduplicated here — callers
/// dedup by resolved user (spec.md §4.7: "each resolved user is mentioned at
/// most once" per mutation).
pub fn extract(text: &str) -> Vec<MentionToken> {
    let mut tokens = Vec::new();
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        tokens.extend(extract_line(line));
    }
    tokens
}

fn extract_line(line: &str) -> Vec<MentionToken> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '@' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && NAME_CHARS(chars[j]) {
                j += 1;
            }
            if j > start {
                let handle: String = chars[start..j].iter().collect();
                // `@local@domain` email grammar: a second `@` immediately
                // followed by a domain continues the token as an email.
                if j < chars.len() && chars[j] == '@' {
                    let email_start = j + 1;
                    let mut k = email_start;
                    while k < chars.len() && (chars[k].is_ascii_alphanumeric() || chars[k] == '.' || chars[k] == '-') {
                        k += 1;
                    }
                    let domain: String = chars[email_start..k].iter().collect();
                    if domain.contains('.') {
                        let email = format!("{handle}@{domain}");
                        tokens.push(MentionToken::Email(email));
                        i = k;
                        continue;
                    }
                }
                tokens.push(MentionToken::Name(handle));
                i = j;
                continue;
            }
        }
        i += 1;
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_name_and_email_mentions() {
        let text = "hey @alice and @alice@example.com and @bob";
        let tokens = extract(text);
        assert_eq!(
            tokens,
            vec![
                MentionToken::Name("alice".to_string()),
                MentionToken::Email("alice@example.com".to_string()),
                MentionToken::Name("bob".to_string()),
            ]
        );
    }

    #[test]
    fn test_mentions_inside_fenced_code_block_are_suppressed() {
        let text = "before @alice\n```\n@bob should not be mentioned\n```\nafter @carol";
        let tokens = extract(text);
        assert_eq!(
            tokens,
            vec![
                MentionToken::Name("alice".to_string()),
                MentionToken::Name("carol".to_string()),
            ]
        );
    }

    #[test]
    fn test_bare_at_sign_is_not_a_mention() {
        assert_eq!(extract("look at this @ sign"), vec![]);
    }
}
