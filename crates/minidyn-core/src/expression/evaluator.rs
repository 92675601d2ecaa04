//! Expression evaluator.
//!
//! An [`Environment`] binds an item to its name and value placeholder maps
//! and offers the three evaluations built on the same AST walk: conditions,
//! updates and projections.
//!
//! Missing attributes resolve to [`Value::Undefined`]; function misuse
//! produces [`Value::Error`]. Only unresolved placeholders and invalid update
//! targets abort evaluation with an [`ExpressionError`].

use std::collections::{BTreeSet, HashMap};

use super::ast::{
    ArithmeticOp, AttributePath, CompareOp, Expr, PathElement, UpdateExpression,
};
use super::error::ExpressionError;
use super::functions;
use crate::value::{Item, Value};

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// A resolved path step.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Key(String),
    Index(usize),
}

/// An item plus the placeholder maps of one request.
#[derive(Debug, Clone, Copy)]
pub struct Environment<'a> {
    pub item: &'a Item,
    pub names: &'a HashMap<String, String>,
    pub values: &'a HashMap<String, Value>,
}

impl<'a> Environment<'a> {
    #[must_use]
    pub fn new(
        item: &'a Item,
        names: &'a HashMap<String, String>,
        values: &'a HashMap<String, Value>,
    ) -> Self {
        Self {
            item,
            names,
            values,
        }
    }

    /// Substitute `#name` placeholders in a path.
    pub fn resolve_path(&self, path: &AttributePath) -> Result<Vec<Step>, ExpressionError> {
        path.elements
            .iter()
            .map(|element| match element {
                PathElement::Attribute(name) => Ok(Step::Key(name.clone())),
                PathElement::Placeholder(placeholder) => self
                    .names
                    .get(placeholder)
                    .map(|name| Step::Key(name.clone()))
                    .ok_or_else(|| ExpressionError::UnresolvedName(placeholder.clone())),
                PathElement::Index(index) => Ok(Step::Index(*index)),
            })
            .collect()
    }

    /// Evaluate an expression to a value.
    pub fn eval(&self, expr: &Expr) -> Result<Value, ExpressionError> {
        Ok(match expr {
            Expr::Identifier(path) => {
                let steps = self.resolve_path(path)?;
                lookup(self.item, &steps)
                    .cloned()
                    .unwrap_or(Value::Undefined)
            }
            Expr::Placeholder(name) => self
                .values
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::UnresolvedValue(name.clone()))?,
            Expr::Comparison { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                first_error([&left, &right])
                    .unwrap_or_else(|| Value::Boolean(compare(&left, *op, &right)))
            }
            Expr::Between { operand, low, high } => {
                let value = self.eval(operand)?;
                let low = self.eval(low)?;
                let high = self.eval(high)?;
                first_error([&value, &low, &high]).unwrap_or_else(|| {
                    Value::Boolean(
                        compare(&value, CompareOp::Ge, &low)
                            && compare(&value, CompareOp::Le, &high),
                    )
                })
            }
            Expr::In {
                operand,
                candidates,
            } => self.eval_in(operand, candidates)?,
            Expr::Not(inner) => match truth(self.eval(inner)?, "NOT") {
                Ok(b) => Value::Boolean(!b),
                Err(err) => err,
            },
            Expr::And(left, right) => match truth(self.eval(left)?, "AND") {
                Ok(false) => Value::Boolean(false),
                Ok(true) => truth(self.eval(right)?, "AND").map_or_else(|e| e, Value::Boolean),
                Err(err) => err,
            },
            Expr::Or(left, right) => match truth(self.eval(left)?, "OR") {
                Ok(true) => Value::Boolean(true),
                Ok(false) => truth(self.eval(right)?, "OR").map_or_else(|e| e, Value::Boolean),
                Err(err) => err,
            },
            Expr::Call { function, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                functions::call(*function, &args)
            }
            Expr::Grouped(inner) => self.eval(inner)?,
            Expr::Arithmetic { left, op, right } => {
                arithmetic(&self.eval(left)?, *op, &self.eval(right)?)
            }
            Expr::Invalid { message, .. } => Value::error(message.clone()),
        })
    }

    fn eval_in(&self, operand: &Expr, candidates: &[Expr]) -> Result<Value, ExpressionError> {
        let value = self.eval(operand)?;
        if let Value::Error(_) = value {
            return Ok(value);
        }
        for candidate in candidates {
            let candidate = self.eval(candidate)?;
            if let Value::Error(_) = candidate {
                return Ok(candidate);
            }
            if compare(&value, CompareOp::Eq, &candidate) {
                return Ok(Value::Boolean(true));
            }
        }
        Ok(Value::Boolean(false))
    }

    /// Evaluate a condition. Error values and non-boolean results fail.
    pub fn matches(&self, expr: &Expr) -> Result<bool, ExpressionError> {
        if let Some(message) = expr.first_invalid() {
            return Err(ExpressionError::Evaluation(message.to_owned()));
        }
        match self.eval(expr)? {
            Value::Boolean(b) => Ok(b),
            Value::Error(message) => Err(ExpressionError::Evaluation(message)),
            other => Err(ExpressionError::NotBoolean(other.type_name())),
        }
    }
}

fn first_error<const N: usize>(values: [&Value; N]) -> Option<Value> {
    values
        .into_iter()
        .find(|v| matches!(v, Value::Error(_)))
        .cloned()
}

fn truth(value: Value, operator: &str) -> Result<bool, Value> {
    match value {
        Value::Boolean(b) => Ok(b),
        err @ Value::Error(_) => Err(err),
        other => Err(Value::error(format!(
            "{operator} requires boolean operands, got {}",
            other.type_name()
        ))),
    }
}

/// Compare two values.
///
/// A missing side is never equal, unequal or ordered. Values of different
/// types are only unequal. Ordering is defined for strings and binaries
/// (bytewise) and numbers; other types support equality only.
#[must_use]
pub fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    if left.is_undefined() || right.is_undefined() {
        return false;
    }
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
        (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
        _ => None,
    };
    match (op, ordering) {
        (CompareOp::Eq, _) => left == right,
        (CompareOp::Ne, _) => left != right,
        (CompareOp::Lt, Some(o)) => o.is_lt(),
        (CompareOp::Le, Some(o)) => o.is_le(),
        (CompareOp::Gt, Some(o)) => o.is_gt(),
        (CompareOp::Ge, Some(o)) => o.is_ge(),
        (_, None) => false,
    }
}

fn arithmetic(left: &Value, op: ArithmeticOp, right: &Value) -> Value {
    match (left, right) {
        (Value::Error(_), _) => left.clone(),
        (_, Value::Error(_)) => right.clone(),
        (Value::Undefined, _) | (_, Value::Undefined) => Value::error(
            "The provided expression refers to an attribute that does not exist in the item",
        ),
        (Value::Number(a), Value::Number(b)) => {
            let result = match op {
                ArithmeticOp::Plus => a.checked_add(b),
                ArithmeticOp::Minus => a.checked_sub(b),
            };
            result.map_or_else(|e| Value::error(e.to_string()), Value::Number)
        }
        (Value::Number(_), other) | (other, _) => Value::error(format!(
            "Incorrect operand type for operator or function; operator: {op}, operand type: {}",
            other.type_name()
        )),
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Follow resolved steps through an item.
#[must_use]
pub fn lookup<'v>(item: &'v Item, steps: &[Step]) -> Option<&'v Value> {
    let (Step::Key(name), rest) = steps.split_first()? else {
        return None;
    };
    let mut current = item.get(name)?;
    for step in rest {
        current = match (step, current) {
            (Step::Key(key), Value::Map(map)) => map.get(key)?,
            (Step::Index(index), Value::List(list)) => list.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

fn lookup_mut<'v>(item: &'v mut Item, steps: &[Step]) -> Option<&'v mut Value> {
    let (Step::Key(name), rest) = steps.split_first()? else {
        return None;
    };
    let mut current = item.get_mut(name)?;
    for step in rest {
        current = match (step, current) {
            (Step::Key(key), Value::Map(map)) => map.get_mut(key)?,
            (Step::Index(index), Value::List(list)) => list.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

fn invalid_path() -> ExpressionError {
    ExpressionError::InvalidUpdate(
        "The document path provided in the update expression is invalid for update".to_owned(),
    )
}

fn assign(item: &mut Item, steps: &[Step], value: Value) -> Result<(), ExpressionError> {
    match steps.split_last() {
        Some((Step::Key(name), [])) => {
            item.insert(name.clone(), value);
            Ok(())
        }
        Some((last, parent)) => match (last, lookup_mut(item, parent)) {
            (Step::Key(key), Some(Value::Map(map))) => {
                map.insert(key.clone(), value);
                Ok(())
            }
            (Step::Index(index), Some(Value::List(list))) => {
                if *index < list.len() {
                    list[*index] = value;
                } else {
                    list.push(value);
                }
                Ok(())
            }
            _ => Err(invalid_path()),
        },
        None => Err(invalid_path()),
    }
}

fn remove(item: &mut Item, steps: &[Step]) {
    match steps.split_last() {
        Some((Step::Key(name), [])) => {
            item.remove(name);
        }
        Some((last, parent)) => match (last, lookup_mut(item, parent)) {
            (Step::Key(key), Some(Value::Map(map))) => {
                map.remove(key);
            }
            (Step::Index(index), Some(Value::List(list))) if *index < list.len() => {
                list.remove(*index);
            }
            _ => {}
        },
        None => {}
    }
}

fn overlaps(a: &[Step], b: &[Step]) -> bool {
    let n = a.len().min(b.len());
    a[..n] == b[..n]
}

fn render_steps(steps: &[Step]) -> String {
    let mut out = String::new();
    for (i, step) in steps.iter().enumerate() {
        match step {
            Step::Key(key) if i == 0 => out.push_str(key),
            Step::Key(key) => {
                out.push('.');
                out.push_str(key);
            }
            Step::Index(index) => out.push_str(&format!("[{index}]")),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

fn operand_type_error(operator: &str, operand: &Value, existing: Option<&Value>) -> ExpressionError {
    let mut message = format!(
        "An operand in the update expression has an incorrect data type; operator: {operator}, operand type: {}",
        operand.type_name()
    );
    if let Some(existing) = existing {
        message.push_str(&format!(", attribute type: {}", existing.type_name()));
    }
    ExpressionError::InvalidUpdate(message)
}

fn is_set(value: &Value) -> bool {
    matches!(
        value,
        Value::StringSet(_) | Value::NumberSet(_) | Value::BinarySet(_)
    )
}

fn non_empty<T>(set: BTreeSet<T>, wrap: impl FnOnce(BTreeSet<T>) -> Value) -> Option<Value> {
    (!set.is_empty()).then(|| wrap(set))
}

fn add(item: &mut Item, steps: &[Step], operand: Value) -> Result<(), ExpressionError> {
    if !matches!(operand, Value::Number(_)) && !is_set(&operand) {
        return Err(operand_type_error("ADD", &operand, None));
    }
    let updated = match (lookup(item, steps).cloned(), operand) {
        (None, operand) => operand,
        (Some(Value::Number(a)), Value::Number(b)) => Value::Number(a.checked_add(&b)?),
        (Some(Value::StringSet(mut a)), Value::StringSet(b)) => {
            a.extend(b);
            Value::StringSet(a)
        }
        (Some(Value::NumberSet(mut a)), Value::NumberSet(b)) => {
            a.extend(b);
            Value::NumberSet(a)
        }
        (Some(Value::BinarySet(mut a)), Value::BinarySet(b)) => {
            a.extend(b);
            Value::BinarySet(a)
        }
        (Some(existing), operand) => {
            return Err(operand_type_error("ADD", &operand, Some(&existing)));
        }
    };
    assign(item, steps, updated)
}

fn delete(item: &mut Item, steps: &[Step], operand: Value) -> Result<(), ExpressionError> {
    if !is_set(&operand) {
        return Err(operand_type_error("DELETE", &operand, None));
    }
    let Some(existing) = lookup(item, steps).cloned() else {
        return Ok(());
    };
    let remaining = match (existing, operand) {
        (Value::StringSet(a), Value::StringSet(b)) => {
            non_empty(a.difference(&b).cloned().collect(), Value::StringSet)
        }
        (Value::NumberSet(a), Value::NumberSet(b)) => {
            non_empty(a.difference(&b).copied().collect(), Value::NumberSet)
        }
        (Value::BinarySet(a), Value::BinarySet(b)) => {
            non_empty(a.difference(&b).cloned().collect(), Value::BinarySet)
        }
        (existing, operand) => {
            return Err(operand_type_error("DELETE", &operand, Some(&existing)));
        }
    };
    match remaining {
        Some(value) => assign(item, steps, value),
        None => {
            remove(item, steps);
            Ok(())
        }
    }
}

impl Environment<'_> {
    /// Apply an update expression and return the new item.
    ///
    /// Every right-hand side is evaluated against the original item before
    /// any action runs. Actions are applied to a copy; on error the caller's
    /// item is untouched.
    pub fn apply_update(&self, update: &UpdateExpression) -> Result<Item, ExpressionError> {
        if let Some(message) = update.first_invalid() {
            return Err(ExpressionError::InvalidUpdate(message.to_owned()));
        }

        let mut targets: Vec<Vec<Step>> = Vec::new();
        for path in update.target_paths() {
            let steps = self.resolve_path(path)?;
            if let Some(other) = targets.iter().find(|t| overlaps(t, &steps)) {
                return Err(ExpressionError::InvalidUpdate(format!(
                    "Two document paths overlap with each other; must remove or rewrite one of these paths; path one: [{}], path two: [{}]",
                    render_steps(other),
                    render_steps(&steps)
                )));
            }
            targets.push(steps);
        }

        let evaluate = |value: &Expr| -> Result<Value, ExpressionError> {
            match self.eval(value)? {
                Value::Error(message) => Err(ExpressionError::InvalidUpdate(message)),
                Value::Undefined => Err(ExpressionError::InvalidUpdate(
                    "The provided expression refers to an attribute that does not exist in the item"
                        .to_owned(),
                )),
                value => Ok(value),
            }
        };

        let mut targets = targets.into_iter();
        let mut sets = Vec::with_capacity(update.set.len());
        for action in &update.set {
            sets.push((targets.next().unwrap_or_default(), evaluate(&action.value)?));
        }
        let mut removes: Vec<Vec<Step>> = targets.by_ref().take(update.remove.len()).collect();
        let mut adds = Vec::with_capacity(update.add.len());
        for action in &update.add {
            adds.push((targets.next().unwrap_or_default(), evaluate(&action.value)?));
        }
        let mut deletes = Vec::with_capacity(update.delete.len());
        for action in &update.delete {
            deletes.push((targets.next().unwrap_or_default(), evaluate(&action.value)?));
        }

        let mut working = self.item.clone();
        for (steps, value) in sets {
            assign(&mut working, &steps, value)?;
        }
        // Highest list index first so earlier removals do not shift later ones.
        removes.sort();
        for steps in removes.iter().rev() {
            remove(&mut working, steps);
        }
        for (steps, value) in adds {
            add(&mut working, &steps, value)?;
        }
        for (steps, value) in deletes {
            delete(&mut working, &steps, value)?;
        }
        Ok(working)
    }

    /// Keep only the attributes named by `paths`, preserving nesting.
    pub fn project(&self, paths: &[AttributePath]) -> Result<Item, ExpressionError> {
        let mut out = Item::new();
        for path in paths {
            let steps = self.resolve_path(path)?;
            if let Some(value) = lookup(self.item, &steps) {
                merge_projected(&mut out, &steps, value.clone());
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Projection helpers
// ---------------------------------------------------------------------------

fn empty_container(step: &Step) -> Value {
    match step {
        Step::Key(_) => Value::Map(HashMap::new()),
        Step::Index(_) => Value::List(Vec::new()),
    }
}

fn merge_projected(out: &mut Item, steps: &[Step], value: Value) {
    let Some((Step::Key(name), rest)) = steps.split_first() else {
        return;
    };
    let Some(next) = rest.first() else {
        out.insert(name.clone(), value);
        return;
    };
    let slot = out
        .entry(name.clone())
        .or_insert_with(|| empty_container(next));
    merge_into(slot, rest, value);
}

fn merge_into(target: &mut Value, steps: &[Step], value: Value) {
    let Some((step, rest)) = steps.split_first() else {
        return;
    };
    match (step, target) {
        (Step::Key(key), Value::Map(map)) => match rest.first() {
            None => {
                map.insert(key.clone(), value);
            }
            Some(next) => {
                let slot = map
                    .entry(key.clone())
                    .or_insert_with(|| empty_container(next));
                merge_into(slot, rest, value);
            }
        },
        (Step::Index(_), Value::List(list)) => match rest.first() {
            None => list.push(value),
            Some(next) => {
                list.push(empty_container(next));
                if let Some(slot) = list.last_mut() {
                    merge_into(slot, rest, value);
                }
            }
        },
        _ => {}
    }
}
