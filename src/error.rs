//! Engine errors.
//!
//! Every failure the engine can raise is a variant of [`Error`]. Soft failures
//! (an unresolved path, a missing `each` collection or `with` object, a helper
//! returning nothing) are *not* errors: they expand to an empty string.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Which side of a block is missing its partner tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unbalanced {
    /// More open tags than close tags.
    MissingClosingTag,
    /// A close tag with no open tag before it.
    MissingOpeningTag,
}

impl std::fmt::Display for Unbalanced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unbalanced::MissingClosingTag => f.write_str("missing closing tag"),
            Unbalanced::MissingOpeningTag => f.write_str("missing opening tag"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("template name \"{name}\" is not valid: {reason}")]
    InvalidTemplateName { name: String, reason: &'static str },

    #[error("the template \"{0}\" does not exist")]
    UnknownTemplate(String),

    #[error("helper name \"{0}\" is not valid")]
    InvalidHelperName(String),

    #[error("helper \"{0}\" does not exist")]
    UnknownHelper(String),

    #[error("partial \"{0}\" does not exist")]
    UnknownPartial(String),

    /// Open and close tags of a block kind do not pair up.
    #[error("syntax error in {{{{#{kind}}}}} block at byte {offset}: {reason}")]
    UnbalancedBlock { kind: &'static str, reason: Unbalanced, offset: usize },

    #[error("malformed <template> tag: {0}")]
    MalformedTemplateTag(String),

    #[error("cannot replace variable \"{path}\" of type \"{kind}\"")]
    InvalidVariableType { path: String, kind: &'static str },

    #[error("cannot evaluate expression `{expr}`: {message}")]
    Expression { expr: String, message: String },

    #[error("template nesting exceeds the maximum depth of {0}")]
    RecursionLimit(usize),

    /// A user supplied function (helper, computed field, callback) failed.
    #[error("callback failed: {0}")]
    Callback(String),

    #[error("cannot load \"{id}\": {message}")]
    Load { id: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid JSON data: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn expression(expr: &str, message: impl Into<String>) -> Self {
        Error::Expression { expr: expr.to_string(), message: message.into() }
    }
}
