use crate::error::ParserError;
use logos::{Logos, SpannedIter};
use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;

#[derive(Default, Error, Debug, Clone, PartialEq)]
pub enum LexicalError {
    #[default]
    #[error("invalid token")]
    InvalidToken,
    #[error("failed to parse integer: {0:?}")]
    Integer(ParseIntError),
    #[error("failed to parse float: {0:?}")]
    Float(ParseFloatError),
}

#[derive(Clone, Debug, Logos, PartialEq)]
#[logos(skip r"[\s\t\n\f]+", error = LexicalError)]
pub enum Token<'source> {
    #[token("<")]
    LessThan,
    #[token("<=")]
    LessThanEqual,
    #[token(">")]
    GreaterThan,
    #[token(">=")]
    GreaterThanEqual,
    #[token("not")]
    #[token("!")]
    Not,
    #[token("=")]
    Equal,
    #[token("<>")]
    NotEqual,
    #[token("in")]
    In,
    #[token("not in")]
    NotIn,
    #[token("one of")]
    OneOf,
    #[token("none of")]
    NoneOf,
    #[token("all of")]
    AllOf,
    #[token("is null")]
    IsNull,
    #[token("is not null")]
    IsNotNull,
    #[token("is empty")]
    IsEmpty,
    #[token("and")]
    #[token("&&")]
    And,
    #[token("or")]
    #[token("||")]
    Or,
    #[token("(")]
    LeftParenthesis,
    #[token(")")]
    RightParenthesis,
    #[token("[")]
    LeftSquareBracket,
    #[token("]")]
    RightSquareBracket,
    #[token(",")]
    Comma,
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().map_err(LexicalError::Integer))]
    IntegerLiteral(i64),
    #[regex(r#"(\"(\\.|[^"\\])*\"|\'(\\.|[^'\\])*\')"#, |lex| lex.slice().trim_matches(['\'', '"']))]
    StringLiteral(&'source str),
    #[regex(r"-?[0-9]+\.[0-9]*", |lex| lex.slice().parse::<f64>().map_err(LexicalError::Float))]
    FloatLiteral(f64),
    #[token("true", |_| true)]
    #[token("false", |_| false)]
    BooleanLiteral(bool),
    #[regex("[a-zA-Z_][a-zA-Z0-9_-]*", |lex| lex.slice())]
    Identifier(&'source str),
}

impl std::fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Spanned<Tok, Location, Error> = Result<(Location, Tok, Location), Error>;

pub struct Lexer<'input> {
    token_stream: SpannedIter<'input, Token<'input>>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            token_stream: Token::lexer(input).spanned(),
        }
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Spanned<Token<'input>, usize, ParserError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.token_stream.next().map(|(token, span)| {
            let token = token.map(|token| match token {
                // FIXME: This is a bug in Logos where regex take priority over all...
                Token::Identifier("not") => Token::Not,
                other => other,
            });

            Ok((span.start, token.map_err(ParserError::Lexical)?, span.end))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_tokens(input: &str) -> Result<Vec<Token>, ParserError> {
        Lexer::new(input)
            .map(|value| match value {
                Ok((_, token, _)) => Ok(token),
                Err(error) => Err(error),
            })
            .collect()
    }

    #[test]
    fn can_lex_comparison_operators() {
        assert_eq!(vec![Token::LessThan], lex_tokens("<").unwrap());
        assert_eq!(vec![Token::LessThanEqual], lex_tokens("<=").unwrap());
        assert_eq!(vec![Token::GreaterThan], lex_tokens(">").unwrap());
        assert_eq!(vec![Token::GreaterThanEqual], lex_tokens(">=").unwrap());
    }

    #[test]
    fn can_lex_not() {
        let actual = lex_tokens("not").unwrap();
        let other = lex_tokens("!").unwrap();
        assert_eq!(vec![Token::Not], actual);
        assert_eq!(vec![Token::Not], other);
    }

    #[test]
    fn can_lex_equality_operators() {
        assert_eq!(vec![Token::Equal], lex_tokens("=").unwrap());
        assert_eq!(vec![Token::NotEqual], lex_tokens("<>").unwrap());
    }

    #[test]
    fn can_lex_set_operators() {
        assert_eq!(vec![Token::In], lex_tokens("in").unwrap());
        assert_eq!(vec![Token::NotIn], lex_tokens("not in").unwrap());
    }

    #[test]
    fn can_lex_list_operators() {
        assert_eq!(vec![Token::OneOf], lex_tokens("one of").unwrap());
        assert_eq!(vec![Token::NoneOf], lex_tokens("none of").unwrap());
        assert_eq!(vec![Token::AllOf], lex_tokens("all of").unwrap());
    }

    #[test]
    fn can_lex_null_operators() {
        assert_eq!(vec![Token::IsNull], lex_tokens("is null").unwrap());
        assert_eq!(vec![Token::IsNotNull], lex_tokens("is not null").unwrap());
        assert_eq!(vec![Token::IsEmpty], lex_tokens("is empty").unwrap());
    }

    #[test]
    fn can_lex_boolean_operators() {
        assert_eq!(vec![Token::And], lex_tokens("and").unwrap());
        assert_eq!(vec![Token::And], lex_tokens("&&").unwrap());
        assert_eq!(vec![Token::Or], lex_tokens("or").unwrap());
        assert_eq!(vec![Token::Or], lex_tokens("||").unwrap());
    }

    #[test]
    fn can_lex_punctuation() {
        assert_eq!(vec![Token::LeftParenthesis], lex_tokens("(").unwrap());
        assert_eq!(vec![Token::RightParenthesis], lex_tokens(")").unwrap());
        assert_eq!(vec![Token::LeftSquareBracket], lex_tokens("[").unwrap());
        assert_eq!(vec![Token::RightSquareBracket], lex_tokens("]").unwrap());
        assert_eq!(vec![Token::Comma], lex_tokens(",").unwrap());
    }

    #[test]
    fn can_lex_integer() {
        assert_eq!(vec![Token::IntegerLiteral(123)], lex_tokens("123").unwrap());
        assert_eq!(
            vec![Token::IntegerLiteral(-123)],
            lex_tokens("-123").unwrap()
        );
    }

    #[test]
    fn can_lex_float() {
        assert_eq!(
            vec![Token::FloatLiteral(123.123)],
            lex_tokens("123.123").unwrap()
        );
        assert_eq!(vec![Token::FloatLiteral(123.)], lex_tokens("123.").unwrap());
        assert_eq!(vec![Token::FloatLiteral(-1.5)], lex_tokens("-1.5").unwrap());
    }

    #[test]
    fn can_lex_boolean() {
        assert_eq!(vec![Token::BooleanLiteral(true)], lex_tokens("true").unwrap());
        assert_eq!(
            vec![Token::BooleanLiteral(false)],
            lex_tokens("false").unwrap()
        );
    }

    #[test]
    fn can_lex_identifier() {
        assert_eq!(
            vec![Token::Identifier("deal_ids")],
            lex_tokens("deal_ids").unwrap()
        );
    }

    #[test]
    fn can_lex_string() {
        assert_eq!(
            vec![Token::StringLiteral("deal_1")],
            lex_tokens("\"deal_1\"").unwrap()
        );
        assert_eq!(
            vec![Token::StringLiteral("deal_1")],
            lex_tokens("'deal_1'").unwrap()
        );
        assert_eq!(vec![Token::StringLiteral("")], lex_tokens("\"\"").unwrap());
    }

    #[test]
    fn can_lex_a_special_expression_call() {
        let actual = lex_tokens("segment_within(seg, 1, 20)").unwrap();

        assert_eq!(
            vec![
                Token::Identifier("segment_within"),
                Token::LeftParenthesis,
                Token::Identifier("seg"),
                Token::Comma,
                Token::IntegerLiteral(1),
                Token::Comma,
                Token::IntegerLiteral(20),
                Token::RightParenthesis,
            ],
            actual
        );
    }

    #[test]
    fn can_lex_multiple_expressions() {
        let actual = lex_tokens(r#"(not b) or (i = 1 and sl one of ("s1", "s2"))"#);

        assert_eq!(
            Ok(vec![
                Token::LeftParenthesis,
                Token::Not,
                Token::Identifier("b"),
                Token::RightParenthesis,
                Token::Or,
                Token::LeftParenthesis,
                Token::Identifier("i"),
                Token::Equal,
                Token::IntegerLiteral(1),
                Token::And,
                Token::Identifier("sl"),
                Token::OneOf,
                Token::LeftParenthesis,
                Token::StringLiteral("s1"),
                Token::Comma,
                Token::StringLiteral("s2"),
                Token::RightParenthesis,
                Token::RightParenthesis,
            ]),
            actual
        );
    }
}
