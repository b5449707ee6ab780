//! Row validation
//!
//! Rules are applied in order and stop at the first failure:
//!
//! 1. exactly two fields (`name`, `email`)
//! 2. non-empty name
//! 3. email matches a conservative address grammar (no DNS lookup)

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::message::{Message, Record};

/// Local part, `@`, then dot-separated DNS-style labels of at most 63 characters.
/// Both letter cases are listed explicitly so matching stays ASCII-only.
#[allow(clippy::expect_used)]
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
    )
    .expect("email pattern is a valid regex")
});

/// Why a row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    UnexpectedFieldCount,
    EmptyName,
    InvalidEmail,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::UnexpectedFieldCount => "unexpected field count",
            RejectReason::EmptyName => "empty name",
            RejectReason::InvalidEmail => "invalid email",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ValidationError {
    pub reason: RejectReason,
}

impl From<RejectReason> for ValidationError {
    fn from(reason: RejectReason) -> Self {
        Self { reason }
    }
}

/// Check an email address against the address grammar.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL_PATTERN.is_match(email) {
        Ok(())
    } else {
        Err(RejectReason::InvalidEmail.into())
    }
}

/// Validate a row and build the message it describes.
pub fn validate(record: &Record) -> Result<Message, ValidationError> {
    let [name, email] = record.fields.as_slice() else {
        return Err(RejectReason::UnexpectedFieldCount.into());
    };

    if name.is_empty() {
        return Err(RejectReason::EmptyName.into());
    }

    validate_email(email)?;

    Ok(Message::new(name.as_str(), email.as_str()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(fields: &[&str]) -> Record {
        Record::new(1, fields.iter().map(|f| f.to_string()).collect())
    }

    #[test]
    fn test_valid_emails() {
        for email in [
            "lala@gmail.com",
            "lala@com",
            "123456789@493403.ww",
            "EMAIL+TO+ME@mail.run",
            "email+to+me@mail.run",
            "email+to.m-.-e@mail.run",
            "email+to.m-.-e@mail-me.run",
            "dana@example.co.uk",
        ] {
            assert!(validate_email(email).is_ok(), "expected {email} to be valid");
        }
    }

    #[test]
    fn test_invalid_emails() {
        let long_label = format!("email@{}.com", "a".repeat(64));
        for email in [
            "",
            "emz",
            "@dd",
            "@dd.com",
            "em@",
            "not-an-email",
            "a@-leading.com",
            "a@trailing-.com",
            "a@double..dot",
            long_label.as_str(),
        ] {
            let err = validate_email(email).unwrap_err();
            assert_eq!(err.reason, RejectReason::InvalidEmail, "{email}");
        }
    }

    #[test]
    fn test_label_of_63_chars_is_valid() {
        let email = format!("email@{}.com", "a".repeat(63));
        assert!(validate_email(&email).is_ok());
    }

    #[test]
    fn test_field_count() {
        for fields in [&[][..], &["Alice"][..], &["Alice", "a@b.c", "extra"][..]] {
            let err = validate(&record(fields)).unwrap_err();
            assert_eq!(err.reason, RejectReason::UnexpectedFieldCount);
            assert_eq!(err.to_string(), "unexpected field count");
        }
    }

    #[test]
    fn test_empty_name_checked_before_email() {
        let err = validate(&record(&["", "not-an-email"])).unwrap_err();
        assert_eq!(err.reason, RejectReason::EmptyName);
        assert_eq!(err.to_string(), "empty name");
    }

    #[test]
    fn test_valid_record() {
        let msg = validate(&record(&["Alice", "alice@example.com"])).unwrap();
        assert_eq!(msg, Message::new("Alice", "alice@example.com"));
    }

    proptest! {
        #[test]
        fn prop_valid_pairs_accepted(
            name in "[^\\x00]{1,32}",
            local in "[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]{1,20}",
            labels in prop::collection::vec("[A-Za-z0-9]([A-Za-z0-9-]{0,10}[A-Za-z0-9])?", 1..4),
        ) {
            let email = format!("{}@{}", local, labels.join("."));
            let msg = validate(&Record::new(1, vec![name.clone(), email.clone()]));
            prop_assert_eq!(msg.ok(), Some(Message::new(name, email)));
        }

        #[test]
        fn prop_empty_name_rejected(email in "\\PC*") {
            let err = validate(&Record::new(1, vec![String::new(), email])).unwrap_err();
            prop_assert_eq!(err.reason, RejectReason::EmptyName);
        }

        #[test]
        fn prop_wrong_field_count_rejected(fields in prop::collection::vec("\\PC*", 0..8)) {
            prop_assume!(fields.len() != 2);
            let err = validate(&Record::new(1, fields)).unwrap_err();
            prop_assert_eq!(err.reason, RejectReason::UnexpectedFieldCount);
        }
    }
}
