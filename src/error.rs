use crate::{events::EventError, lexer::LexicalError, parser::BETreeParseError, values::ValueKind};
use thiserror::Error;

/// Semantic errors raised while lexing or assembling an expression.
#[derive(Debug, PartialEq, Error)]
pub enum ParserError {
    #[error("failed to lex the expression with {0:?}")]
    Lexical(LexicalError),
    #[error("unknown special expression {0:?}")]
    UnknownFunction(String),
    #[error("invalid arguments for special expression {0:?}")]
    InvalidSpecialArguments(String),
    #[error("unknown frequency cap type {0:?}")]
    InvalidFrequencyType(String),
}

/// Errors raised while checking a parsed expression against the registered
/// attribute domains.
#[derive(Debug, PartialEq, Error)]
pub enum ValidationError {
    #[error("expression refers to non-existing attribute {0:?}")]
    UnknownAttribute(String),
    #[error("string {value:?} exceeds the bounded domain of attribute {name:?}")]
    OutOfBoundsString { name: String, value: String },
    #[error("integer {value} exceeds the bounded enumeration of attribute {name:?}")]
    OutOfBoundsIntegerEnum { name: String, value: i64 },
    #[error("attribute {name:?} of type {kind:?} cannot be used by this expression")]
    MismatchingKinds { name: String, kind: ValueKind },
}

#[derive(Debug, PartialEq, Error)]
pub enum InsertionError {
    #[error("subscription {0} has already been inserted")]
    DuplicateId(u64),
    #[error("no constant named {0:?} was supplied for a frequency cap expression")]
    MissingConstant(String),
}

#[derive(Debug, Error)]
pub enum BETreeError<'a> {
    #[error("failed to parse the expression with {0:?}")]
    Parse(BETreeParseError<'a>),
    #[error("failed to validate the expression with {0}")]
    Validation(ValidationError),
    #[error("failed to insert the subscription with {0}")]
    Insertion(InsertionError),
    #[error("failed with {0:?}")]
    Event(EventError),
}
