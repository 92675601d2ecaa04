//! Interpreter strategies for condition, filter and update expressions.
//!
//! A client holds exactly one active [`Interpreter`]:
//!
//! - [`LanguageInterpreter`] parses the expression language and evaluates it
//!   against the item, caching parsed expressions by text.
//! - [`NativeInterpreter`] skips parsing: it looks up a handler registered
//!   for the exact expression text on the table and runs it. Text with no
//!   handler fails with [`ExpressionError::Unhandled`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::config::InterpreterKind;
use crate::expression::{
    ConditionTree, Environment, Expr, ExpressionError, SyntaxError, UpdateExpression,
    parse_condition, parse_update,
};
use crate::value::{Item, Value};

/// One expression to run against one item.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionInput<'a> {
    pub table_name: &'a str,
    pub expression: &'a str,
    pub item: &'a Item,
    pub names: &'a HashMap<String, String>,
    pub values: &'a HashMap<String, Value>,
}

/// Evaluates condition and update expressions for a client.
pub trait Interpreter: fmt::Debug + Send + Sync {
    /// Which strategy this is.
    fn kind(&self) -> InterpreterKind;

    /// Test a condition or filter expression against `input.item`.
    fn matches(&self, input: &ExpressionInput<'_>) -> Result<bool, ExpressionError>;

    /// Apply an update expression to a copy of `input.item`.
    fn update(&self, input: &ExpressionInput<'_>) -> Result<Item, ExpressionError>;

    /// Turn on logging of parsed expressions, where supported.
    fn set_debug(&self, _on: bool) {}
}

// ---------------------------------------------------------------------------
// LanguageInterpreter
// ---------------------------------------------------------------------------

/// The full expression-language interpreter.
#[derive(Debug, Default)]
pub struct LanguageInterpreter {
    conditions: DashMap<String, Arc<Expr>>,
    updates: DashMap<String, Arc<UpdateExpression>>,
    debug: AtomicBool,
}

impl LanguageInterpreter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a condition, reusing an earlier parse of the same text.
    pub fn condition(&self, text: &str) -> Result<Arc<Expr>, SyntaxError> {
        if let Some(expr) = self.conditions.get(text) {
            return Ok(Arc::clone(expr.value()));
        }
        let expr = Arc::new(parse_condition(text)?);
        if self.debug.load(Ordering::Relaxed) {
            debug!(expression = text, tree = %ConditionTree::build(&expr), "parsed condition");
        }
        self.conditions.insert(text.to_owned(), Arc::clone(&expr));
        Ok(expr)
    }

    /// Parse an update expression, reusing an earlier parse of the same text.
    pub fn update_expression(&self, text: &str) -> Result<Arc<UpdateExpression>, SyntaxError> {
        if let Some(update) = self.updates.get(text) {
            return Ok(Arc::clone(update.value()));
        }
        let update = Arc::new(parse_update(text)?);
        if self.debug.load(Ordering::Relaxed) {
            debug!(expression = text, parsed = ?update, "parsed update");
        }
        self.updates.insert(text.to_owned(), Arc::clone(&update));
        Ok(update)
    }
}

impl Interpreter for LanguageInterpreter {
    fn kind(&self) -> InterpreterKind {
        InterpreterKind::Language
    }

    fn matches(&self, input: &ExpressionInput<'_>) -> Result<bool, ExpressionError> {
        let expr = self.condition(input.expression)?;
        Environment::new(input.item, input.names, input.values).matches(&expr)
    }

    fn update(&self, input: &ExpressionInput<'_>) -> Result<Item, ExpressionError> {
        let update = self.update_expression(input.expression)?;
        Environment::new(input.item, input.names, input.values).apply_update(&update)
    }

    fn set_debug(&self, on: bool) {
        self.debug.store(on, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// NativeInterpreter
// ---------------------------------------------------------------------------

/// Mutates an item in place from the request's value placeholders.
pub type Updater = Arc<dyn Fn(&mut Item, &HashMap<String, Value>) + Send + Sync>;

/// Decides a condition from the item and the value placeholders.
pub type Matcher = Arc<dyn Fn(&Item, &HashMap<String, Value>) -> bool + Send + Sync>;

/// Handlers keyed by `(table, exact expression text)`.
#[derive(Default)]
pub struct NativeInterpreter {
    updaters: DashMap<(String, String), Updater>,
    matchers: DashMap<(String, String), Matcher>,
}

impl fmt::Debug for NativeInterpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeInterpreter")
            .field("updaters", &self.updaters.len())
            .field("matchers", &self.matchers.len())
            .finish()
    }
}

impl NativeInterpreter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for an update expression on `table`.
    pub fn add_updater<F>(&self, table: &str, expression: &str, updater: F)
    where
        F: Fn(&mut Item, &HashMap<String, Value>) + Send + Sync + 'static,
    {
        self.updaters.insert(
            (table.to_owned(), expression.to_owned()),
            Arc::new(updater),
        );
    }

    /// Register the predicate for a condition or filter expression on `table`.
    pub fn add_matcher<F>(&self, table: &str, expression: &str, matcher: F)
    where
        F: Fn(&Item, &HashMap<String, Value>) -> bool + Send + Sync + 'static,
    {
        self.matchers.insert(
            (table.to_owned(), expression.to_owned()),
            Arc::new(matcher),
        );
    }

    fn unhandled(input: &ExpressionInput<'_>) -> ExpressionError {
        ExpressionError::Unhandled {
            table: input.table_name.to_owned(),
            expression: input.expression.to_owned(),
        }
    }

    fn key(input: &ExpressionInput<'_>) -> (String, String) {
        (input.table_name.to_owned(), input.expression.to_owned())
    }
}

impl Interpreter for NativeInterpreter {
    fn kind(&self) -> InterpreterKind {
        InterpreterKind::Native
    }

    fn matches(&self, input: &ExpressionInput<'_>) -> Result<bool, ExpressionError> {
        let matcher = self
            .matchers
            .get(&Self::key(input))
            .map(|m| Arc::clone(m.value()))
            .ok_or_else(|| Self::unhandled(input))?;
        Ok(matcher(input.item, input.values))
    }

    fn update(&self, input: &ExpressionInput<'_>) -> Result<Item, ExpressionError> {
        let updater = self
            .updaters
            .get(&Self::key(input))
            .map(|u| Arc::clone(u.value()))
            .ok_or_else(|| Self::unhandled(input))?;
        let mut item = input.item.clone();
        updater(&mut item, input.values);
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(
        expression: &'a str,
        item: &'a Item,
        values: &'a HashMap<String, Value>,
    ) -> ExpressionInput<'a> {
        static NAMES: std::sync::LazyLock<HashMap<String, String>> =
            std::sync::LazyLock::new(HashMap::new);
        ExpressionInput {
            table_name: "pokemons",
            expression,
            item,
            names: &NAMES,
            values,
        }
    }

    fn values() -> HashMap<String, Value> {
        HashMap::from([(":lvl".to_owned(), Value::from(10))])
    }

    #[test]
    fn test_should_cache_parsed_conditions() {
        let interpreter = LanguageInterpreter::new();
        let first = interpreter.condition("a = :a").unwrap();
        let second = interpreter.condition("a = :a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(interpreter.condition("a = = :a").is_err());
    }

    #[test]
    fn test_should_evaluate_with_language_interpreter() {
        let interpreter = LanguageInterpreter::new();
        interpreter.set_debug(true);
        let item = Item::from([("lvl".to_owned(), Value::from(3))]);
        let values = values();

        assert!(!interpreter.matches(&input("lvl > :lvl", &item, &values)).unwrap());
        let updated = interpreter
            .update(&input("SET lvl = lvl + :lvl", &item, &values))
            .unwrap();
        assert_eq!(updated["lvl"], Value::from(13));
        assert_eq!(item["lvl"], Value::from(3));
    }

    #[test]
    fn test_should_run_registered_native_handlers() {
        let interpreter = NativeInterpreter::new();
        interpreter.add_updater("pokemons", "SET lvl = :lvl", |item, values| {
            item.insert("lvl".to_owned(), values[":lvl"].clone());
        });
        interpreter.add_matcher("pokemons", "lvl > :lvl", |item, values| {
            matches!((item.get("lvl"), values.get(":lvl")), (Some(a), Some(b)) if a != b)
        });
        let item = Item::new();
        let values = values();

        let updated = interpreter
            .update(&input("SET lvl = :lvl", &item, &values))
            .unwrap();
        assert_eq!(updated["lvl"], Value::from(10));
        assert!(!interpreter.matches(&input("lvl > :lvl", &item, &values)).unwrap());
        assert_eq!(interpreter.kind(), InterpreterKind::Native);
    }

    #[test]
    fn test_should_fail_on_unregistered_native_expression() {
        let interpreter = NativeInterpreter::new();
        let item = Item::new();
        let values = values();
        let err = interpreter
            .update(&input("SET other = :lvl", &item, &values))
            .unwrap_err();
        assert_eq!(
            err,
            ExpressionError::Unhandled {
                table: "pokemons".into(),
                expression: "SET other = :lvl".into(),
            }
        );
        assert!(interpreter.matches(&input("x = :lvl", &item, &values)).is_err());
    }
}
