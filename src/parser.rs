use crate::{
    ast::{Node, SegmentOp, StringOp},
    error::ParserError,
    lexer::{Lexer, Token},
    values::FrequencyCapKind,
};
use lalrpop_util::{lalrpop_mod, ParseError};

lalrpop_mod!(grammar);

use self::grammar::TreeParser;

pub type BETreeParseError<'a> = ParseError<usize, Token<'a>, ParserError>;

#[inline]
pub(crate) fn parse(input: &str) -> Result<Node, BETreeParseError<'_>> {
    let lexer = Lexer::new(input);
    TreeParser::new().parse(lexer)
}

/// One argument of a `name(...)` special expression call.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SpecialArgument<'input> {
    Integer(i64),
    Float(f64),
    String(&'input str),
    Identifier(&'input str),
}

/// Dispatch a `name(arguments...)` call to the corresponding special
/// expression, checking arity and argument types.
pub(crate) fn build_special_call(
    name: &str,
    arguments: Vec<SpecialArgument>,
) -> Result<Node, ParserError> {
    let invalid = || ParserError::InvalidSpecialArguments(name.to_string());
    match name {
        "segment_within" | "segment_before" => {
            let op = if name == "segment_within" {
                SegmentOp::Within
            } else {
                SegmentOp::Before
            };
            match arguments.as_slice() {
                [SpecialArgument::Identifier(attr), SpecialArgument::Integer(id), SpecialArgument::Integer(seconds)] => {
                    Ok(Node::segment(op, Some(*attr), *id, *seconds))
                }
                [SpecialArgument::Integer(id), SpecialArgument::Integer(seconds)] => {
                    Ok(Node::segment(op, None, *id, *seconds))
                }
                _ => Err(invalid()),
            }
        }
        "within_frequency_cap" => match arguments.as_slice() {
            [SpecialArgument::String(kind), SpecialArgument::String(namespace), SpecialArgument::Integer(value), SpecialArgument::Integer(length)] => {
                let kind = FrequencyCapKind::parse(kind)
                    .ok_or_else(|| ParserError::InvalidFrequencyType(kind.to_string()))?;
                Ok(Node::frequency(kind, namespace, *value, *length))
            }
            _ => Err(invalid()),
        },
        "geo_within_radius" => {
            let numbers: Option<Vec<f64>> = arguments
                .iter()
                .map(|argument| match argument {
                    SpecialArgument::Integer(value) => Some(*value as f64),
                    SpecialArgument::Float(value) => Some(*value),
                    _ => None,
                })
                .collect();
            match numbers.as_deref() {
                Some([latitude, longitude, radius]) => {
                    Ok(Node::geo(*latitude, *longitude, *radius))
                }
                _ => Err(invalid()),
            }
        }
        "contains" | "starts_with" | "ends_with" => {
            let op = match name {
                "contains" => StringOp::Contains,
                "starts_with" => StringOp::StartsWith,
                _ => StringOp::EndsWith,
            };
            match arguments.as_slice() {
                [SpecialArgument::Identifier(attr), SpecialArgument::String(pattern)] => {
                    Ok(Node::string_special(op, attr, pattern))
                }
                _ => Err(invalid()),
            }
        }
        _ => Err(ParserError::UnknownFunction(name.to_string())),
    }
}
