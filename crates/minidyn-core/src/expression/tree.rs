//! Shape validation for condition expressions.
//!
//! A [`ConditionTree`] is an arena over a parsed [`Expr`], built in one
//! pre-order walk so node IDs are stable for a given expression. The tree is
//! never evaluated; it answers structural questions such as whether a clause
//! is a plain `path op :value` comparison usable for an index lookup.

use std::fmt;

use super::ast::{AttributePath, CompareOp, Expr};
use super::error::ExpressionError;
use super::functions::FunctionName;

/// Index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// What a tree node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Identifier,
    Placeholder,
    Comparator(CompareOp),
    Between,
    In,
    Not,
    And,
    Or,
    Function(FunctionName),
    Group,
    Arithmetic,
    Invalid,
}

impl NodeKind {
    fn of(expr: &Expr) -> Self {
        match expr {
            Expr::Identifier(_) => Self::Identifier,
            Expr::Placeholder(_) => Self::Placeholder,
            Expr::Comparison { op, .. } => Self::Comparator(*op),
            Expr::Between { .. } => Self::Between,
            Expr::In { .. } => Self::In,
            Expr::Not(_) => Self::Not,
            Expr::And(..) => Self::And,
            Expr::Or(..) => Self::Or,
            Expr::Call { function, .. } => Self::Function(*function),
            Expr::Grouped(_) => Self::Group,
            Expr::Arithmetic { .. } => Self::Arithmetic,
            Expr::Invalid { .. } => Self::Invalid,
        }
    }
}

/// A node of a [`ConditionTree`].
#[derive(Debug)]
pub struct TreeNode<'a> {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub expr: &'a Expr,
    pub children: Vec<NodeId>,
}

impl TreeNode<'_> {
    /// The literal of the token that introduced the node.
    #[must_use]
    pub fn literal(&self) -> String {
        self.expr.token_literal()
    }
}

impl fmt::Display for TreeNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

/// Arena tree over a parsed condition.
#[derive(Debug)]
pub struct ConditionTree<'a> {
    nodes: Vec<TreeNode<'a>>,
}

impl<'a> ConditionTree<'a> {
    /// Build the tree. The root is always `NodeId(0)`.
    #[must_use]
    pub fn build(expr: &'a Expr) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.push(expr, None);
        tree
    }

    fn push(&mut self, expr: &'a Expr, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TreeNode {
            id,
            parent,
            kind: NodeKind::of(expr),
            expr,
            children: Vec::new(),
        });
        for child in expr.children() {
            let child_id = self.push(child, Some(id));
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &TreeNode<'a> {
        &self.nodes[id.0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Comparators and `BETWEEN`.
    #[must_use]
    pub fn is_comparator(&self, id: NodeId) -> bool {
        matches!(
            self.node(id).kind,
            NodeKind::Comparator(_) | NodeKind::Between
        )
    }

    /// A comparator or two-argument function over two leaves, or a
    /// `BETWEEN` over three leaves.
    #[must_use]
    pub fn is_valid_condition(&self, id: NodeId) -> bool {
        let node = self.node(id);
        let leaves = node
            .children
            .iter()
            .all(|c| self.node(*c).expr.is_leaf());
        match node.kind {
            NodeKind::Comparator(_) | NodeKind::Function(_) => node.children.len() == 2 && leaves,
            NodeKind::Between => node.children.len() == 3 && leaves,
            _ => false,
        }
    }

    /// Split the condition into key clauses.
    ///
    /// Accepts one or two `AND`-ed clauses, each `path op :value` or
    /// `path BETWEEN :low AND :high`. Anything else is rejected with a
    /// message naming the construct.
    pub fn key_clauses(&self) -> Result<Vec<KeyClause>, ExpressionError> {
        let mut clauses = Vec::new();
        self.collect_clauses(self.root(), &mut clauses)?;
        if clauses.len() > 2 {
            return Err(ExpressionError::InvalidKeyCondition(
                "The expression can only contain two conditions: one on the partition key and one on the sort key".to_owned(),
            ));
        }
        Ok(clauses)
    }

    fn collect_clauses(&self, id: NodeId, out: &mut Vec<KeyClause>) -> Result<(), ExpressionError> {
        let node = self.node(id);
        match node.kind {
            NodeKind::Group | NodeKind::And => {
                for child in &node.children {
                    self.collect_clauses(*child, out)?;
                }
                Ok(())
            }
            _ => {
                out.push(self.key_clause(id)?);
                Ok(())
            }
        }
    }

    fn key_clause(&self, id: NodeId) -> Result<KeyClause, ExpressionError> {
        let node = self.node(id);
        let unsupported = |what: &str| -> Result<KeyClause, ExpressionError> {
            Err(ExpressionError::InvalidKeyCondition(format!(
                "Invalid operator used in KeyConditionExpression: {what}"
            )))
        };
        let operands: Vec<&Expr> = node.children.iter().map(|c| self.node(*c).expr).collect();

        match node.kind {
            NodeKind::Or => unsupported("OR"),
            NodeKind::Not => unsupported("NOT"),
            NodeKind::In => unsupported("IN"),
            NodeKind::Function(function) => unsupported(function.as_str()),
            NodeKind::Comparator(CompareOp::Ne) => unsupported("<>"),
            NodeKind::Comparator(op) if self.is_valid_condition(id) => match operands[..] {
                [Expr::Identifier(path), Expr::Placeholder(value)] => Ok(KeyClause::Compare {
                    path: path.clone(),
                    op,
                    value: value.clone(),
                }),
                _ => Err(shape_error(node)),
            },
            NodeKind::Between if self.is_valid_condition(id) => match operands[..] {
                [
                    Expr::Identifier(path),
                    Expr::Placeholder(low),
                    Expr::Placeholder(high),
                ] => Ok(KeyClause::Between {
                    path: path.clone(),
                    low: low.clone(),
                    high: high.clone(),
                }),
                _ => Err(shape_error(node)),
            },
            NodeKind::Invalid => Err(ExpressionError::Evaluation(
                node.expr.first_invalid().unwrap_or_default().to_owned(),
            )),
            _ => Err(shape_error(node)),
        }
    }
}

fn shape_error(node: &TreeNode<'_>) -> ExpressionError {
    ExpressionError::InvalidKeyCondition(format!(
        "the condition \"{node}\" must compare a key attribute with a value"
    ))
}

/// Indented rendering, one node per line, for debug logs.
impl fmt::Display for ConditionTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            let mut depth = 0;
            let mut parent = node.parent;
            while let Some(p) = parent {
                depth += 1;
                parent = self.node(p).parent;
            }
            writeln!(
                f,
                "{:indent$}#{} {}",
                "",
                node.id.0,
                node.literal(),
                indent = depth * 2
            )?;
        }
        Ok(())
    }
}

/// One clause of a key condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyClause {
    /// `path op :value`
    Compare {
        path: AttributePath,
        op: CompareOp,
        value: String,
    },
    /// `path BETWEEN :low AND :high`
    Between {
        path: AttributePath,
        low: String,
        high: String,
    },
}

impl KeyClause {
    #[must_use]
    pub fn path(&self) -> &AttributePath {
        match self {
            Self::Compare { path, .. } | Self::Between { path, .. } => path,
        }
    }
}

/// Validate a key condition and split it into clauses.
pub fn validate_key_condition(expr: &Expr) -> Result<Vec<KeyClause>, ExpressionError> {
    ConditionTree::build(expr).key_clauses()
}
