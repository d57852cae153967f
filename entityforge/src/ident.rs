//! SQL identifier allow-list.
//!
//! Table and column names are spliced into DDL text, so every user-supplied
//! identifier must pass [`validate_identifier`] before it gets anywhere near a
//! statement.

use crate::error::ValidationFailure;

/// PostgreSQL truncates identifiers beyond NAMEDATALEN - 1 bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Column names the synthesizer always emits.
pub const FIXED_COLUMNS: [&str; 4] = ["id", "entity_id", "created_at", "updated_at"];

const RESERVED_KEYWORDS: &[&str] = &[
    "all", "alter", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "both", "case", "cast", "check", "collate", "column", "constraint", "create", "cross",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "delete", "desc", "distinct", "do", "drop", "else", "end",
    "except", "false", "fetch", "for", "foreign", "from", "grant", "group", "having", "in",
    "initially", "insert", "intersect", "into", "join", "lateral", "leading", "limit",
    "localtime", "localtimestamp", "not", "null", "offset", "on", "only", "or", "order",
    "placing", "primary", "references", "returning", "select", "session_user", "some",
    "symmetric", "table", "then", "to", "trailing", "true", "truncate", "union", "unique",
    "update", "user", "using", "variadic", "when", "where", "window", "with",
];

pub fn is_reserved_keyword(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    RESERVED_KEYWORDS.contains(&lowered.as_str())
}

/// Accept `[A-Za-z_][A-Za-z0-9_]*`, at most [`MAX_IDENTIFIER_LEN`] bytes, and
/// not a reserved keyword. `field` names the definition field for the report.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), ValidationFailure> {
    let reject = |reason: &str| ValidationFailure::InvalidIdentifier {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = value.chars();
    match chars.next() {
        None => return Err(reject("identifier is empty")),
        Some(first) if !(first.is_ascii_alphabetic() || first == '_') => {
            return Err(reject("must start with a letter or underscore"));
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(reject("only letters, digits and underscores are allowed"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(reject("longer than 63 bytes"));
    }
    if is_reserved_keyword(value) {
        return Err(reject("reserved SQL keyword"));
    }
    Ok(())
}

/// [`validate_identifier`] for a component column, which additionally must
/// not shadow one of the [`FIXED_COLUMNS`]. Postgres folds unquoted names, so
/// the comparison ignores ASCII case.
pub fn validate_column_name(field: &str, name: &str) -> Result<(), ValidationFailure> {
    validate_identifier(field, name)?;
    if FIXED_COLUMNS
        .iter()
        .any(|fixed| fixed.eq_ignore_ascii_case(name))
    {
        return Err(ValidationFailure::ReservedColumnName {
            name: name.to_string(),
        });
    }
    Ok(())
}
