use std::{fmt, sync::atomic::AtomicU64, sync::atomic::Ordering};

use strum::{Display, EnumString};

use crate::types::{Kind, Value};

// 式
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    Literal {
        value: Value,
        static_kind: Kind,
    },
    Variable {
        name: String,
        expected: Option<Kind>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<ExpressionNode>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<ExpressionNode>,
        right: Box<ExpressionNode>,
    },
}

impl ExpressionNode {
    pub fn literal(value: impl Into<Value>) -> Self {
        let value = value.into();
        let static_kind = value.kind();
        ExpressionNode::Literal { value, static_kind }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        ExpressionNode::Variable {
            name: name.into(),
            expected: None,
        }
    }

    pub fn unary(op: UnaryOperator, operand: ExpressionNode) -> Self {
        ExpressionNode::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOperator, left: ExpressionNode, right: ExpressionNode) -> Self {
        ExpressionNode::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Constant `false`, substituted for expressions that fail to parse.
    pub fn constant_false() -> Self {
        Self::literal(false)
    }

    /// Statically known result kind, when the node alone determines it.
    pub fn static_kind(&self) -> Option<Kind> {
        match self {
            ExpressionNode::Literal { static_kind, .. } => Some(*static_kind),
            ExpressionNode::Variable { expected, .. } => *expected,
            ExpressionNode::Unary { op, .. } => match op {
                UnaryOperator::Not => Some(Kind::Boolean),
                _ => None,
            },
            ExpressionNode::Binary { op, .. } => {
                if op.is_relational() || op.is_equality() || op.is_logical() {
                    Some(Kind::Boolean)
                } else {
                    None
                }
            }
        }
    }

    /// Names of all variables referenced by the tree, in first-seen order.
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut Vec<String>) {
        match self {
            ExpressionNode::Literal { .. } => {}
            ExpressionNode::Variable { name, .. } => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            ExpressionNode::Unary { operand, .. } => operand.collect_variables(names),
            ExpressionNode::Binary { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
        }
    }
}

/// Fully parenthesized rendering that parses back to the same tree.
impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExpressionNode::Literal {
                value: Value::String(s),
                ..
            } => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
            ExpressionNode::Literal { value, .. } => write!(f, "{}", value),
            ExpressionNode::Variable { name, .. } => write!(f, "{}", name),
            ExpressionNode::Unary { op, operand } => write!(f, "({}{})", op, operand),
            ExpressionNode::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op, right)
            }
        }
    }
}

// 単項演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum UnaryOperator {
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "~")]
    BitNot,
}

// 二項演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "===")]
    StrictEqual,
    #[strum(serialize = "!==")]
    StrictNotEqual,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = "<=")]
    LessThanEqual,
    #[strum(serialize = ">=")]
    GreaterThanEqual,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

impl BinaryOperator {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
        )
    }

    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            BinaryOperator::LessThan
                | BinaryOperator::GreaterThan
                | BinaryOperator::LessThanEqual
                | BinaryOperator::GreaterThanEqual
        )
    }

    pub fn is_equality(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::StrictEqual
                | BinaryOperator::StrictNotEqual
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

static NEXT_EXPRESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A parsed expression with a process-unique identity.
///
/// The evaluation cache keys on [`CompiledExpression::id`], never on the
/// source text, so two compilations of the same text are distinct entries.
#[derive(Debug)]
pub struct CompiledExpression {
    id: u64,
    source: String,
    root: ExpressionNode,
}

impl CompiledExpression {
    pub fn new(source: impl Into<String>, root: ExpressionNode) -> Self {
        Self {
            id: NEXT_EXPRESSION_ID.fetch_add(1, Ordering::Relaxed),
            source: source.into(),
            root,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &ExpressionNode {
        &self.root
    }
}

impl fmt::Display for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
