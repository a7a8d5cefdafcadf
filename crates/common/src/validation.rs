//! Domain-level field validation shared by AuthBridge, Store, and the HTTP
//! request DTOs. Each function returns `Ok(())` or a human-readable reason.

pub const MIN_NAME_LENGTH: usize = 1;
pub const MAX_NAME_LENGTH: usize = 80;
pub const MIN_POST_TITLE_LENGTH: usize = 3;
pub const MIN_POST_DESCRIPTION_LENGTH: usize = 10;
pub const MIN_COMMENT_DESCRIPTION_LENGTH: usize = 1;

/// Validate a User display name: 1-80 chars, no leading/trailing whitespace,
/// at least one non-whitespace character.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    if trimmed.len() != name.len() {
        return Err("Name cannot have leading or trailing whitespace");
    }
    let len = trimmed.chars().count();
    if len < MIN_NAME_LENGTH {
        return Err("Name cannot be empty");
    }
    if len > MAX_NAME_LENGTH {
        return Err("Name must be 80 characters or less");
    }
    Ok(())
}

/// Case-insensitive key used for uniqueness checks on `User.name`/`User.email`.
pub fn fold_case(s: &str) -> String {
    s.to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let (local, domain) = email.split_once('@').ok_or("Email must contain @")?;
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err("Email is not a valid address");
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

pub fn validate_post_title(title: &str) -> Result<(), &'static str> {
    if title.chars().count() < MIN_POST_TITLE_LENGTH {
        return Err("Title must be at least 3 characters");
    }
    Ok(())
}

pub fn validate_post_description(description: &str) -> Result<(), &'static str> {
    if description.chars().count() < MIN_POST_DESCRIPTION_LENGTH {
        return Err("Description must be at least 10 characters");
    }
    Ok(())
}

pub fn validate_comment_description(description: &str) -> Result<(), &'static str> {
    if description.trim().chars().count() < MIN_COMMENT_DESCRIPTION_LENGTH {
        return Err("Comment cannot be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Alice").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(" Alice").is_err());
        assert!(validate_name(&"a".repeat(81)).is_err());
        assert!(validate_name(&"a".repeat(80)).is_ok());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("alice@localhost").is_err());
    }

    #[test]
    fn test_validate_post_fields() {
        assert!(validate_post_title("hi").is_err());
        assert!(validate_post_title("hello").is_ok());
        assert!(validate_post_description("too short").is_err());
        assert!(validate_post_description("just long enough text").is_ok());
    }
}
