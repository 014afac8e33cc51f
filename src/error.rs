use strum::{Display, EnumString};
use thiserror::Error;

use crate::analyzer::ParseError;
use crate::event::log::LogBusError;
use crate::event::PoolError;
use crate::eval::EvalError;
use crate::parser::ParserError;
use crate::tokenizer::token::TokenizerError;
use crate::trigger::TriggerError;
use crate::types::CoercionError;

/// Failure classes surfaced by the pipeline.
///
/// Every layer error maps onto one of these through its `kind()` method, so
/// callers can react to the class without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum ErrorKind {
    SyntaxError,
    TypeMismatch,
    EvaluationFailed,
    DispatchTaskFailed,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),
    #[error("Coercion error: {0}")]
    Coercion(#[from] CoercionError),
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),
    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("Log bus error: {0}")]
    LogBus(#[from] LogBusError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Tokenizer(_) | Error::Parse(_) => Some(ErrorKind::SyntaxError),
            Error::Parser(e) => Some(e.kind()),
            Error::Coercion(e) => Some(e.kind()),
            Error::Eval(e) => Some(e.kind()),
            Error::Trigger(e) => Some(e.kind()),
            Error::Pool(e) => Some(e.kind()),
            Error::LogBus(_) | Error::Internal(_) => None,
        }
    }
}
