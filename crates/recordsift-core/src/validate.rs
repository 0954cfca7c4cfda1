//! Input validators.
//!
//! Every validator returns the ordered list of [`FieldError`]s it found; an
//! empty list means the input is valid. The account validators back user
//! registration; [`validate_upload`] performs the request-shape checks that
//! precede any storage access during ingestion.

use std::collections::HashSet;

use crate::models::FieldError;

/// Minimum password length, in characters.
pub const MIN_PASSWORD_CHARS: usize = 8;
/// Minimum trimmed display-name length, in characters.
pub const MIN_NAME_CHARS: usize = 2;

/// Validate a display name.
///
/// Blank names short-circuit with a single "required" violation. Otherwise
/// digits, characters outside letters (Latin-1 accented letters included),
/// whitespace, hyphen and apostrophe, and names shorter than two trimmed
/// characters are each reported; a digit trips both of the first two rules.
pub fn validate_name(name: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
        return errors;
    }

    if name.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new("name", "Name must not contain numbers"));
    }

    if name.chars().any(|c| !is_name_char(c)) {
        errors.push(FieldError::new(
            "name",
            "Name must not contain special characters or emojis",
        ));
    }

    if name.trim().chars().count() < MIN_NAME_CHARS {
        errors.push(FieldError::new(
            "name",
            "Name must be at least 2 characters long",
        ));
    }

    errors
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphabetic()
        || ('\u{C0}'..='\u{D6}').contains(&c)
        || ('\u{D8}'..='\u{F6}').contains(&c)
        || ('\u{F8}'..='\u{FF}').contains(&c)
        || c.is_whitespace()
        || c == '\''
        || c == '-'
}

/// Validate an email address.
pub fn validate_email(email: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if email.trim().is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
        return errors;
    }

    if !is_email(email) {
        errors.push(FieldError::new("email", "Invalid email format"));
    }

    errors
}

/// Syntactic email check: `local@domain`, where the domain has at least two
/// dot-separated labels and an alphabetic top-level label.
pub fn is_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    is_local_part(local) && is_domain(domain)
}

fn is_local_part(local: &str) -> bool {
    const SPECIALS: &str = "!#$%&'*+/=?^_`{|}~.-";

    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || SPECIALS.contains(c))
}

fn is_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    let tld = labels[labels.len() - 1];
    labels_ok && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

/// Validate a password.
///
/// An empty password short-circuits. Otherwise every failed rule is
/// reported: minimum length, uppercase, lowercase, digit, and a
/// non-alphanumeric character.
pub fn validate_password(password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
        return errors;
    }

    if password.chars().count() < MIN_PASSWORD_CHARS {
        errors.push(FieldError::new(
            "password",
            "Password must be at least 8 characters long",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one number",
        ));
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one special character",
        ));
    }

    errors
}

/// How record names arrived with an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordNames {
    /// A single comma-delimited value, e.g. `"sales, returns"`.
    Delimited(String),
    /// One value per file.
    List(Vec<String>),
}

impl RecordNames {
    /// Build from the raw values of a repeated form field: one value is
    /// treated as comma-delimited, several as a list.
    pub fn from_values(mut values: Vec<String>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(RecordNames::Delimited),
            _ => Some(RecordNames::List(values)),
        }
    }

    fn is_missing(&self) -> bool {
        matches!(self, RecordNames::Delimited(s) if s.is_empty())
    }

    /// Expand into the per-file name list. Delimited input is split on
    /// commas, trimmed, and stripped of empty entries; lists pass through.
    pub fn into_names(self) -> Vec<String> {
        match self {
            RecordNames::Delimited(s) => s
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
            RecordNames::List(names) => names,
        }
    }
}

/// A validated upload: the dataset name and one record name per file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    pub dataset_name: String,
    pub record_names: Vec<String>,
}

/// Check the shape of an upload request, fail-fast in this order: files
/// present, dataset name present, record names present, one name per file,
/// no duplicate names.
pub fn validate_upload(
    file_count: usize,
    dataset_name: Option<&str>,
    record_names: Option<RecordNames>,
) -> Result<UploadPlan, Vec<FieldError>> {
    if file_count == 0 {
        return Err(vec![FieldError::new("files", "No files were uploaded")]);
    }

    let dataset_name = match dataset_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            return Err(vec![FieldError::new(
                "datasetName",
                "Dataset name is required",
            )])
        }
    };

    let record_names = match record_names {
        Some(names) if !names.is_missing() => names.into_names(),
        _ => {
            return Err(vec![FieldError::new(
                "recordNames",
                "Record names must be provided",
            )])
        }
    };

    if record_names.len() != file_count {
        return Err(vec![FieldError::new(
            "recordNames",
            "Record names must be provided and match the number of files",
        )]);
    }

    let duplicates = find_duplicates(&record_names);
    if !duplicates.is_empty() {
        return Err(duplicates
            .into_iter()
            .map(|name| {
                FieldError::new(
                    "recordName",
                    format!("Duplicate record name in request: \"{}\"", name),
                )
            })
            .collect());
    }

    Ok(UploadPlan {
        dataset_name,
        record_names,
    })
}

/// Names that occur more than once, each reported once, in order of their
/// second occurrence. Comparison is exact and case-sensitive.
pub fn find_duplicates(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut duplicates = Vec::new();

    for name in names {
        if !seen.insert(name.as_str()) && reported.insert(name.as_str()) {
            duplicates.push(name.clone());
        }
    }

    duplicates
}
