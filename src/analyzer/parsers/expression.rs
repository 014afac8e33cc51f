use super::super::{core::*, prelude::*};
use crate::ast::{BinaryOperator, ExpressionNode, UnaryOperator};
use crate::tokenizer::{
    literal::Literal,
    symbol::{Delimiter, Operator},
    token::Token,
};
use crate::types::Value;

/// A whole expression followed by end of input.
pub fn parse_complete_expression() -> impl Parser<Token, ExpressionNode> {
    with_context(
        map(
            tuple2(parse_expression(), as_unit(equal(Token::Eof))),
            |(expression, _)| expression,
        ),
        "complete expression",
    )
}

pub fn parse_expression() -> impl Parser<Token, ExpressionNode> {
    with_context(lazy(parse_logical_or), "expression")
}

/// Left-associative chain `next (op next)*`.
fn binary_chain<N, O>(next: N, operator: O) -> impl Parser<Token, ExpressionNode>
where
    N: Parser<Token, ExpressionNode> + Clone,
    O: Parser<Token, BinaryOperator>,
{
    map(
        tuple2(next.clone(), many(tuple2(operator, next))),
        |(first, rest)| {
            rest.into_iter()
                .fold(first, |left, (op, right)| ExpressionNode::binary(op, left, right))
        },
    )
}

fn parse_logical_or() -> impl Parser<Token, ExpressionNode> {
    with_context(
        binary_chain(lazy(parse_logical_and), operator(&[(Operator::Or, BinaryOperator::Or)])),
        "logical or",
    )
}

fn parse_logical_and() -> impl Parser<Token, ExpressionNode> {
    with_context(
        binary_chain(lazy(parse_equality), operator(&[(Operator::And, BinaryOperator::And)])),
        "logical and",
    )
}

fn parse_equality() -> impl Parser<Token, ExpressionNode> {
    with_context(
        binary_chain(
            lazy(parse_relational),
            operator(&[
                (Operator::EqualEqual, BinaryOperator::Equal),
                (Operator::NotEqual, BinaryOperator::NotEqual),
                (Operator::StrictEqual, BinaryOperator::StrictEqual),
                (Operator::StrictNotEqual, BinaryOperator::StrictNotEqual),
            ]),
        ),
        "equality",
    )
}

fn parse_relational() -> impl Parser<Token, ExpressionNode> {
    with_context(
        binary_chain(
            lazy(parse_additive),
            operator(&[
                (Operator::Less, BinaryOperator::LessThan),
                (Operator::LessEqual, BinaryOperator::LessThanEqual),
                (Operator::Greater, BinaryOperator::GreaterThan),
                (Operator::GreaterEqual, BinaryOperator::GreaterThanEqual),
            ]),
        ),
        "relational",
    )
}

fn parse_additive() -> impl Parser<Token, ExpressionNode> {
    with_context(
        binary_chain(
            lazy(parse_multiplicative),
            operator(&[
                (Operator::Plus, BinaryOperator::Add),
                (Operator::Minus, BinaryOperator::Subtract),
            ]),
        ),
        "additive",
    )
}

fn parse_multiplicative() -> impl Parser<Token, ExpressionNode> {
    with_context(
        binary_chain(
            lazy(parse_unary),
            operator(&[
                (Operator::Multiply, BinaryOperator::Multiply),
                (Operator::Divide, BinaryOperator::Divide),
                (Operator::Modulo, BinaryOperator::Modulo),
            ]),
        ),
        "multiplicative",
    )
}

fn parse_unary() -> impl Parser<Token, ExpressionNode> {
    with_context(
        choice(vec![
            Box::new(map(
                tuple2(parse_unary_operator(), lazy(parse_unary)),
                |(op, operand)| ExpressionNode::unary(op, operand),
            )),
            Box::new(parse_primary()),
        ]),
        "unary",
    )
}

fn parse_primary() -> impl Parser<Token, ExpressionNode> {
    with_context(
        choice(vec![
            Box::new(parse_literal()),
            Box::new(parse_variable()),
            Box::new(parse_parenthesized()),
        ]),
        "primary",
    )
}

fn parse_parenthesized() -> impl Parser<Token, ExpressionNode> {
    with_context(
        delimited(
            as_unit(equal(Token::Delimiter(Delimiter::OpenParen))),
            parse_expression(),
            as_unit(equal(Token::Delimiter(Delimiter::CloseParen))),
        ),
        "parenthesized expression",
    )
}

fn parse_literal() -> impl Parser<Token, ExpressionNode> {
    satisfy(
        |token: &Token| match token {
            Token::Literal(literal) => Some(ExpressionNode::literal(literal_value(literal))),
            _ => None,
        },
        "literal",
    )
}

fn parse_variable() -> impl Parser<Token, ExpressionNode> {
    satisfy(
        |token: &Token| match token {
            Token::Identifier(name) => Some(ExpressionNode::variable(name.as_str())),
            _ => None,
        },
        "identifier",
    )
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Null => Value::Null,
    }
}

fn parse_unary_operator() -> impl Parser<Token, UnaryOperator> {
    satisfy(
        |token: &Token| match token {
            Token::Operator(Operator::Plus) => Some(UnaryOperator::Plus),
            Token::Operator(Operator::Minus) => Some(UnaryOperator::Minus),
            Token::Operator(Operator::Not) => Some(UnaryOperator::Not),
            Token::Operator(Operator::Tilde) => Some(UnaryOperator::BitNot),
            _ => None,
        },
        "unary operator",
    )
}

/// Matches any operator token in `table`, yielding its AST counterpart.
fn operator(table: &'static [(Operator, BinaryOperator)]) -> impl Parser<Token, BinaryOperator> {
    satisfy(
        move |token: &Token| match token {
            Token::Operator(op) => table
                .iter()
                .find(|(candidate, _)| candidate == op)
                .map(|(_, binary)| *binary),
            _ => None,
        },
        "binary operator",
    )
}
