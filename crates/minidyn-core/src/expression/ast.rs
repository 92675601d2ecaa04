//! AST types for condition, update and projection expressions.
//!
//! The parser produces these nodes and the evaluator and tree validator
//! consume them. Nodes are immutable once built. Every node can report the
//! token that introduced it ([`Expr::token_literal`]) and renders to a
//! canonical string through `Display`.

use std::fmt;

use super::functions::FunctionName;

/// Expression node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A document path such as `info.rating`, `#name` or `tags[0]`.
    Identifier(AttributePath),
    /// A value placeholder such as `:val`, stored with its prefix.
    Placeholder(String),
    /// `left op right`.
    Comparison {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    /// `operand BETWEEN low AND high`.
    Between {
        operand: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    /// `operand IN (a, b, ...)`.
    In {
        operand: Box<Expr>,
        candidates: Vec<Expr>,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// A call to a built-in function.
    Call {
        function: FunctionName,
        args: Vec<Expr>,
    },
    /// A parenthesized expression.
    Grouped(Box<Expr>),
    /// `left + right` or `left - right`, only valid on the right of `SET`.
    Arithmetic {
        left: Box<Expr>,
        op: ArithmeticOp,
        right: Box<Expr>,
    },
    /// A construct the parser recognized but cannot accept, such as an unknown
    /// function or a call with the wrong number of arguments. Evaluates to an
    /// error value.
    Invalid { literal: String, message: String },
}

impl Expr {
    /// The literal of the token that introduced this node.
    #[must_use]
    pub fn token_literal(&self) -> String {
        match self {
            Self::Identifier(path) => path.to_string(),
            Self::Placeholder(name) => name.clone(),
            Self::Comparison { op, .. } => op.to_string(),
            Self::Between { .. } => "BETWEEN".to_owned(),
            Self::In { .. } => "IN".to_owned(),
            Self::Not(_) => "NOT".to_owned(),
            Self::And(..) => "AND".to_owned(),
            Self::Or(..) => "OR".to_owned(),
            Self::Call { function, .. } => function.as_str().to_owned(),
            Self::Grouped(_) => "(".to_owned(),
            Self::Arithmetic { op, .. } => op.to_string(),
            Self::Invalid { literal, .. } => literal.clone(),
        }
    }

    /// Returns `true` for path and placeholder nodes.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Identifier(_) | Self::Placeholder(_))
    }

    /// Direct sub-expressions in source order.
    #[must_use]
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Identifier(_) | Self::Placeholder(_) | Self::Invalid { .. } => Vec::new(),
            Self::Comparison { left, right, .. } | Self::Arithmetic { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            Self::And(left, right) | Self::Or(left, right) => vec![left.as_ref(), right.as_ref()],
            Self::Between { operand, low, high } => {
                vec![operand.as_ref(), low.as_ref(), high.as_ref()]
            }
            Self::In {
                operand,
                candidates,
            } => std::iter::once(operand.as_ref())
                .chain(candidates.iter())
                .collect(),
            Self::Not(inner) | Self::Grouped(inner) => vec![inner.as_ref()],
            Self::Call { args, .. } => args.iter().collect(),
        }
    }

    /// The message of the first invalid node, in source order.
    #[must_use]
    pub fn first_invalid(&self) -> Option<&str> {
        if let Self::Invalid { message, .. } = self {
            return Some(message);
        }
        self.children().into_iter().find_map(Expr::first_invalid)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(path) => write!(f, "{path}"),
            Self::Placeholder(name) => f.write_str(name),
            Self::Comparison { left, op, right } => write!(f, "{left} {op} {right}"),
            Self::Between { operand, low, high } => {
                write!(f, "{operand} BETWEEN {low} AND {high}")
            }
            Self::In {
                operand,
                candidates,
            } => {
                write!(f, "{operand} IN (")?;
                write_list(f, candidates)?;
                f.write_str(")")
            }
            Self::Not(inner) => write!(f, "NOT {inner}"),
            Self::And(left, right) => write!(f, "{left} AND {right}"),
            Self::Or(left, right) => write!(f, "{left} OR {right}"),
            Self::Call { function, args } => {
                write!(f, "{function}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Self::Grouped(inner) => write!(f, "({inner})"),
            Self::Arithmetic { left, op, right } => write!(f, "{left} {op} {right}"),
            Self::Invalid { literal, .. } => f.write_str(literal),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

/// `+` or `-` in a `SET` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Plus,
    Minus,
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plus => "+",
            Self::Minus => "-",
        })
    }
}

/// A document path consisting of one or more elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath {
    pub elements: Vec<PathElement>,
}

impl AttributePath {
    /// A single top-level attribute.
    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            elements: vec![PathElement::Attribute(name.into())],
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            match element {
                PathElement::Attribute(name) | PathElement::Placeholder(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathElement::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

/// A single element in an attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    /// A literal attribute name.
    Attribute(String),
    /// A `#name` reference, stored with its prefix.
    Placeholder(String),
    /// A list index (`[0]`).
    Index(usize),
}

/// A parsed update expression, clauses grouped by keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateExpression {
    pub set: Vec<SetAction>,
    pub remove: Vec<AttributePath>,
    pub add: Vec<SetAction>,
    pub delete: Vec<SetAction>,
}

impl UpdateExpression {
    /// Every path the expression writes, in clause order.
    pub fn target_paths(&self) -> impl Iterator<Item = &AttributePath> {
        self.set
            .iter()
            .map(|a| &a.path)
            .chain(self.remove.iter())
            .chain(self.add.iter().map(|a| &a.path))
            .chain(self.delete.iter().map(|a| &a.path))
    }

    /// The message of the first invalid node in any value.
    #[must_use]
    pub fn first_invalid(&self) -> Option<&str> {
        self.set
            .iter()
            .chain(self.add.iter())
            .chain(self.delete.iter())
            .find_map(|a| a.value.first_invalid())
    }
}

/// `path = value` in `SET`, or `path value` in `ADD` and `DELETE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAction {
    pub path: AttributePath,
    pub value: Expr,
}
