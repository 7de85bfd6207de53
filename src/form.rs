//! Typed validation of submitted forms
//!
//! A submission either yields the validated value or a map of per-field
//! messages that the client renders next to the offending input.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RecretError;

const REQUIRED: &str = "Required";

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors with a single message on a single field.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(value)` when nothing was recorded.
    pub fn into_submission<T>(self, value: T) -> Submission<T> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// Outcome of validating a form.
pub type Submission<T> = Result<T, FieldErrors>;

/// What the creation form asks the server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Lock the inputs and ask the user to confirm.
    Confirm,
    /// Go back to editing.
    Cancel,
    /// Store the secret.
    Create,
}

impl FromStr for Intent {
    type Err = RecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirm" => Ok(Intent::Confirm),
            "cancel" => Ok(Intent::Cancel),
            "create" => Ok(Intent::Create),
            other => Err(RecretError::malformed_input(format!(
                "Invalid intent \"{}\"",
                other
            ))),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Intent::Confirm => "confirm",
            Intent::Cancel => "cancel",
            Intent::Create => "create",
        })
    }
}

/// Parses an optional intent field. Absence is as invalid as a typo.
pub fn parse_intent(raw: Option<&str>) -> Result<Intent, RecretError> {
    match raw {
        Some(value) => value.parse(),
        None => Err(RecretError::malformed_input("Invalid intent \"null\"")),
    }
}

fn required(errors: &mut FieldErrors, field: &str, value: Option<String>) -> String {
    match value {
        Some(value) if !value.is_empty() => value,
        _ => {
            errors.add(field, REQUIRED);
            String::new()
        }
    }
}

/// Raw body of the creation form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewSecretForm {
    pub message: Option<String>,
    pub code: Option<String>,
    pub intent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSecret {
    pub message: String,
    pub code: String,
}

impl NewSecretForm {
    pub fn validate(self) -> Submission<NewSecret> {
        let mut errors = FieldErrors::new();
        let message = required(&mut errors, "message", self.message);
        let code = required(&mut errors, "code", self.code);
        errors.into_submission(NewSecret { message, code })
    }
}

/// Raw body of the unlock form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UnlockForm {
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unlock {
    pub code: String,
}

impl UnlockForm {
    pub fn validate(self) -> Submission<Unlock> {
        let mut errors = FieldErrors::new();
        let code = required(&mut errors, "code", self.code);
        errors.into_submission(Unlock { code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_intent_parsing() {
        assert_eq!("confirm".parse::<Intent>().unwrap(), Intent::Confirm);
        assert_eq!("cancel".parse::<Intent>().unwrap(), Intent::Cancel);
        assert_eq!("create".parse::<Intent>().unwrap(), Intent::Create);

        let err = "confrim".parse::<Intent>().unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MalformedInput));
        assert_eq!(err.message(), "Invalid intent \"confrim\"");
    }

    #[test]
    fn test_missing_intent() {
        let err = parse_intent(None).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MalformedInput));
        assert_eq!(parse_intent(Some("create")).unwrap(), Intent::Create);
    }

    #[test]
    fn test_intent_display_matches_parse() {
        for intent in [Intent::Confirm, Intent::Cancel, Intent::Create] {
            assert_eq!(intent.to_string().parse::<Intent>().unwrap(), intent);
        }
    }

    #[test]
    fn test_new_secret_valid() {
        let form = NewSecretForm {
            message: Some("launch codes".into()),
            code: Some("swordfish".into()),
            intent: Some("create".into()),
        };

        assert_eq!(
            form.validate(),
            Ok(NewSecret {
                message: "launch codes".into(),
                code: "swordfish".into(),
            })
        );
    }

    #[test]
    fn test_new_secret_missing_fields() {
        let form = NewSecretForm {
            message: Some(String::new()),
            ..Default::default()
        };

        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("message"), Some(&["Required".to_string()][..]));
        assert_eq!(errors.get("code"), Some(&["Required".to_string()][..]));
    }

    #[test]
    fn test_unlock_form() {
        assert_eq!(
            UnlockForm {
                code: Some("x".into())
            }
            .validate(),
            Ok(Unlock { code: "x".into() })
        );

        let errors = UnlockForm::default().validate().unwrap_err();
        assert_eq!(errors.get("code").unwrap().len(), 1);
        assert_eq!(errors.get("message"), None);
    }

    #[test]
    fn test_field_errors_serialize_as_map() {
        let mut errors = FieldErrors::single("code", "Code is wrong");
        errors.add("code", "again");

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({ "code": ["Code is wrong", "again"] }));
    }
}
