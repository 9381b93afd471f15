//! Condition, filter, key condition, projection and update expressions with
//! generated placeholders.
//!
//! Every expression kind owns a placeholder prefix so that expressions of different
//! kinds can share one request without their placeholders colliding:
//!
//! | kind          | names     | values    |
//! |---------------|-----------|-----------|
//! | condition     | `#CE_`    | `:CE_`    |
//! | filter        | `#FE_`    | `:FE_`    |
//! | key condition | `#KY_CE_` | `:KY_CE_` |
//! | projection    | `#PE_`    | none      |
//! | update        | `#UE_`    | `:UE_`    |

mod builder;
mod input;
mod parser;
mod update;

pub use builder::{CompiledExpression, ExpressionAttributes};
pub use input::{AttributeCondition, ConditionOptions, SortKeyCondition, to_value};
pub use parser::{parse_condition, parse_key_condition, parse_projection, parse_update};
pub use update::{UpdateAction, UpdateBody, UpdateExpression};

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use std::fmt;

use crate::error::Error;

/// Expression kind, decides the placeholder prefix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExpressionKind {
    /// Write condition
    Condition,
    /// Query or scan filter
    Filter,
    /// Query key condition
    KeyCondition,
    /// Projection, names only
    Projection,
    /// Update actions
    Update,
}

impl ExpressionKind {
    fn prefix(&self) -> &'static str {
        match self {
            ExpressionKind::Condition => "CE_",
            ExpressionKind::Filter => "FE_",
            ExpressionKind::KeyCondition => "KY_CE_",
            ExpressionKind::Projection => "PE_",
            ExpressionKind::Update => "UE_",
        }
    }
}

/// Logical operator joining two expressions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogicalOperator {
    /// Both must hold
    #[default]
    And,
    /// Either must hold
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => f.write_str("AND"),
            LogicalOperator::Or => f.write_str("OR"),
        }
    }
}

/// Comparison operator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    /// `=`
    Equals,
    /// `<>`
    NotEquals,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
}

impl Comparator {
    fn symbol(&self) -> &'static str {
        match self {
            Comparator::Equals => "=",
            Comparator::NotEquals => "<>",
            Comparator::LessThan => "<",
            Comparator::LessThanOrEqual => "<=",
            Comparator::GreaterThan => ">",
            Comparator::GreaterThanOrEqual => ">=",
        }
    }
}

/// Expression under construction with its placeholder bindings.
///
/// A placeholder, once bound, keeps its binding for the lifetime of the expression:
/// binding it again to the same name or value returns the same placeholder, binding it
/// to something else fails with [`Error::DuplicateExpressionBinding`].
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    kind: ExpressionKind,
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
    last_name: Option<(usize, usize)>,
}

impl Expression {
    /// Empty expression of `kind`
    pub fn new(kind: ExpressionKind) -> Self {
        Self {
            kind,
            expression: String::new(),
            names: HashMap::new(),
            values: HashMap::new(),
            last_name: None,
        }
    }

    /// Expression kind
    pub fn kind(&self) -> ExpressionKind {
        self.kind
    }

    /// Expression text
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Name placeholders
    pub fn names(&self) -> &HashMap<String, String> {
        &self.names
    }

    /// Value placeholders
    pub fn values(&self) -> &HashMap<String, AttributeValue> {
        &self.values
    }

    /// True while nothing has been emitted
    pub fn is_empty(&self) -> bool {
        self.expression.is_empty()
    }

    /// Bind name placeholders for `path` and return its reference.
    ///
    /// `a.b[1].c` becomes `#P_a.#P_a_b[1].#P_a_b_c`, one placeholder per segment with
    /// list indexes kept literally.
    pub fn add_expression_name(&mut self, path: &str) -> Result<String, Error> {
        let prefix = self.kind.prefix();
        let mut qualified = String::new();
        let mut references = Vec::new();

        for segment in path.split('.') {
            let (name, indexes) = match segment.find('[') {
                Some(position) => segment.split_at(position),
                None => (segment, ""),
            };
            if !qualified.is_empty() {
                qualified.push('_');
            }
            qualified.push_str(name);

            let placeholder = format!("#{prefix}{qualified}");
            bind(&mut self.names, &placeholder, name.to_string())?;
            references.push(format!("{placeholder}{indexes}"));
        }
        Ok(references.join("."))
    }

    /// Bind a value placeholder for `path` and return it
    pub fn add_expression_value(&mut self, path: &str, value: AttributeValue) -> Result<String, Error> {
        self.add_expression_value_with_suffix(path, "", value)
    }

    fn add_expression_value_with_suffix(
        &mut self,
        path: &str,
        suffix: &str,
        value: AttributeValue,
    ) -> Result<String, Error> {
        if self.kind == ExpressionKind::Projection {
            return Err(Error::ProjectionValueUnsupported {
                attribute: path.to_string(),
            });
        }
        let placeholder = format!(":{}{}{suffix}", self.kind.prefix(), value_key(path));
        bind(&mut self.values, &placeholder, value)?;
        Ok(placeholder)
    }

    pub(crate) fn bind_name(&mut self, placeholder: &str, name: &str) -> Result<(), Error> {
        bind(&mut self.names, placeholder, name.to_string())
    }

    pub(crate) fn bind_value(&mut self, placeholder: &str, value: AttributeValue) -> Result<(), Error> {
        bind(&mut self.values, placeholder, value)
    }

    fn push_name(&mut self, path: &str) -> Result<(), Error> {
        let reference = self.add_expression_name(path)?;
        let start = self.expression.len();
        self.expression.push_str(&reference);
        self.last_name = Some((start, self.expression.len()));
        Ok(())
    }

    fn append(&mut self, text: &str) {
        if !self.expression.is_empty() && !self.expression.ends_with(' ') && !self.expression.ends_with('(') {
            self.expression.push(' ');
        }
        self.expression.push_str(text);
    }

    fn append_name(&mut self, path: &str) -> Result<(), Error> {
        self.append("");
        self.push_name(path)
    }

    /// `path <op> value`
    pub fn compare(&mut self, path: &str, comparator: Comparator, value: AttributeValue) -> Result<&mut Self, Error> {
        let value = self.add_expression_value(path, value)?;
        self.append_name(path)?;
        self.expression
            .push_str(&format!(" {} {value}", comparator.symbol()));
        Ok(self)
    }

    /// `path = value`
    pub fn equals(&mut self, path: &str, value: AttributeValue) -> Result<&mut Self, Error> {
        self.compare(path, Comparator::Equals, value)
    }

    fn function(&mut self, function: &str, path: &str, value: Option<AttributeValue>) -> Result<&mut Self, Error> {
        let value = value
            .map(|value| self.add_expression_value(path, value))
            .transpose()?;
        self.append(&format!("{function}("));
        self.push_name(path)?;
        if let Some(value) = value {
            self.expression.push_str(&format!(", {value}"));
        }
        self.expression.push(')');
        Ok(self)
    }

    /// `begins_with(path, value)`
    pub fn begins_with(&mut self, path: &str, value: AttributeValue) -> Result<&mut Self, Error> {
        self.function("begins_with", path, Some(value))
    }

    /// `contains(path, value)`
    pub fn contains(&mut self, path: &str, value: AttributeValue) -> Result<&mut Self, Error> {
        self.function("contains", path, Some(value))
    }

    /// `attribute_exists(path)`
    pub fn attribute_exists(&mut self, path: &str) -> Result<&mut Self, Error> {
        self.function("attribute_exists", path, None)
    }

    /// `attribute_not_exists(path)`
    pub fn attribute_not_exists(&mut self, path: &str) -> Result<&mut Self, Error> {
        self.function("attribute_not_exists", path, None)
    }

    /// `attribute_type(path, type)`
    pub fn attribute_type(&mut self, path: &str, type_code: &str) -> Result<&mut Self, Error> {
        self.function("attribute_type", path, Some(AttributeValue::S(type_code.to_string())))
    }

    /// `path BETWEEN low AND high`, exactly two values
    pub fn between(&mut self, path: &str, values: Vec<AttributeValue>) -> Result<&mut Self, Error> {
        let [low, high]: [AttributeValue; 2] =
            values
                .try_into()
                .map_err(|values: Vec<AttributeValue>| Error::InvalidRangeOperatorArity {
                    operator: "BETWEEN",
                    attribute: path.to_string(),
                    expected: "exactly 2",
                    actual: values.len(),
                })?;
        let low = self.add_expression_value_with_suffix(path, "_start", low)?;
        let high = self.add_expression_value_with_suffix(path, "_end", high)?;
        self.append_name(path)?;
        self.expression
            .push_str(&format!(" BETWEEN {low} AND {high}"));
        Ok(self)
    }

    /// `path IN (v0, v1, ...)`, at least one value
    pub fn in_list(&mut self, path: &str, values: Vec<AttributeValue>) -> Result<&mut Self, Error> {
        if values.is_empty() {
            return Err(Error::InvalidRangeOperatorArity {
                operator: "IN",
                attribute: path.to_string(),
                expected: "at least 1",
                actual: 0,
            });
        }
        let placeholders = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| self.add_expression_value_with_suffix(path, &format!("_{i}"), value))
            .collect::<Result<Vec<_>, _>>()?;
        self.append_name(path)?;
        self.expression
            .push_str(&format!(" IN ({})", placeholders.join(", ")));
        Ok(self)
    }

    /// Wrap the most recently emitted attribute reference in `size(...)`
    pub fn size(&mut self) -> &mut Self {
        if let Some((start, end)) = self.last_name.take() {
            self.expression.insert(end, ')');
            self.expression.insert_str(start, "size(");
            self.last_name = Some((start, end + "size()".len()));
        }
        self
    }

    /// Negate this expression, or AND it with the negation of `other`
    pub fn not(&mut self, other: Option<Expression>) -> Result<&mut Self, Error> {
        match other {
            None => {
                if !self.expression.is_empty() {
                    self.expression = format!("NOT ({})", self.expression);
                    self.last_name = None;
                }
            }
            Some(mut other) => {
                let _ = other.not(None)?;
                let _ = self.merge(other, LogicalOperator::And)?;
            }
        }
        Ok(self)
    }

    /// Combine with `other`, each side parenthesised
    pub fn merge(&mut self, other: Expression, operator: LogicalOperator) -> Result<&mut Self, Error> {
        if other.is_empty() {
            return Ok(self);
        }
        for (placeholder, name) in other.names {
            bind(&mut self.names, &placeholder, name)?;
        }
        for (placeholder, value) in other.values {
            bind(&mut self.values, &placeholder, value)?;
        }
        self.expression = if self.expression.is_empty() {
            other.expression
        } else {
            format!("({}) {operator} ({})", self.expression, other.expression)
        };
        self.last_name = None;
        Ok(self)
    }

    /// Combine with several expressions using one operator
    pub fn merge_many(
        &mut self,
        others: impl IntoIterator<Item = Expression>,
        operator: LogicalOperator,
    ) -> Result<&mut Self, Error> {
        for other in others {
            let _ = self.merge(other, operator)?;
        }
        Ok(self)
    }

    /// Serialize into request fields, `None` when nothing was emitted
    pub fn build(self) -> Option<CompiledExpression> {
        CompiledExpression::from_parts(self.expression, self.names, self.values)
    }
}

fn value_key(path: &str) -> String {
    path.chars()
        .filter_map(|c| match c {
            '.' | '[' => Some('_'),
            ']' => None,
            c => Some(c),
        })
        .collect()
}

fn bind<V>(bindings: &mut HashMap<String, V>, placeholder: &str, value: V) -> Result<(), Error>
where
    V: PartialEq + fmt::Debug,
{
    match bindings.get(placeholder) {
        Some(existing) if *existing == value => Ok(()),
        Some(existing) => Err(Error::DuplicateExpressionBinding {
            placeholder: placeholder.to_string(),
            message: format!("already bound to {existing:?}, requested {value:?}"),
        }),
        None => {
            let _ = bindings.insert(placeholder.to_string(), value);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(value: &str) -> AttributeValue {
        AttributeValue::S(value.to_string())
    }

    fn n(value: &str) -> AttributeValue {
        AttributeValue::N(value.to_string())
    }

    #[test]
    fn test_name_binding_is_idempotent() {
        let mut expression = Expression::new(ExpressionKind::Condition);
        let first = expression.add_expression_name("status").unwrap();
        let second = expression.add_expression_name("status").unwrap();
        assert_eq!(first, "#CE_status");
        assert_eq!(first, second);
        assert_eq!(expression.names().len(), 1);
    }

    #[test]
    fn test_colliding_name_binding_errors() {
        let mut expression = Expression::new(ExpressionKind::Condition);
        let _ = expression.add_expression_name("user_name").unwrap();
        let err = expression.add_expression_name("user.name").unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateExpressionBinding { ref placeholder, .. } if placeholder == "#CE_user_name"
        ));
    }

    #[test]
    fn test_value_rebinding() {
        let mut expression = Expression::new(ExpressionKind::Filter);
        assert_eq!(
            expression.add_expression_value("age", n("1")).unwrap(),
            ":FE_age"
        );
        assert!(expression.add_expression_value("age", n("1")).is_ok());
        assert!(expression.add_expression_value("age", n("2")).is_err());
    }

    #[test]
    fn test_nested_paths_and_list_index() {
        let mut expression = Expression::new(ExpressionKind::Update);
        assert_eq!(
            expression.add_expression_name("profile.address.city").unwrap(),
            "#UE_profile.#UE_profile_address.#UE_profile_address_city"
        );
        assert_eq!(
            expression.add_expression_name("addresses[0].city").unwrap(),
            "#UE_addresses[0].#UE_addresses_city"
        );
        assert_eq!(
            expression.names().get("#UE_profile_address").map(String::as_str),
            Some("address")
        );
        assert_eq!(
            expression.add_expression_value("addresses[0].city", s("x")).unwrap(),
            ":UE_addresses_0_city"
        );
    }

    #[test]
    fn test_projection_has_no_values() {
        let mut expression = Expression::new(ExpressionKind::Projection);
        let err = expression.add_expression_value("id", s("1")).unwrap_err();
        assert!(matches!(err, Error::ProjectionValueUnsupported { .. }));
    }

    #[test]
    fn test_operators() {
        let mut expression = Expression::new(ExpressionKind::Condition);
        let _ = expression.compare("age", Comparator::GreaterThanOrEqual, n("18")).unwrap();
        assert_eq!(expression.expression(), "#CE_age >= :CE_age");

        let mut expression = Expression::new(ExpressionKind::Condition);
        let _ = expression.begins_with("name", s("ab")).unwrap();
        assert_eq!(expression.expression(), "begins_with(#CE_name, :CE_name)");

        let mut expression = Expression::new(ExpressionKind::Condition);
        let _ = expression.attribute_not_exists("PK").unwrap();
        assert_eq!(expression.expression(), "attribute_not_exists(#CE_PK)");
        assert!(expression.values().is_empty());
    }

    #[test]
    fn test_between_and_in() {
        let mut expression = Expression::new(ExpressionKind::Filter);
        let _ = expression.between("age", vec![n("1"), n("9")]).unwrap();
        assert_eq!(
            expression.expression(),
            "#FE_age BETWEEN :FE_age_start AND :FE_age_end"
        );

        let err = Expression::new(ExpressionKind::Filter)
            .between("age", vec![n("1")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRangeOperatorArity { actual: 1, .. }));

        let mut expression = Expression::new(ExpressionKind::Filter);
        let _ = expression.in_list("status", vec![s("a"), s("b")]).unwrap();
        assert_eq!(
            expression.expression(),
            "#FE_status IN (:FE_status_0, :FE_status_1)"
        );
        assert!(Expression::new(ExpressionKind::Filter).in_list("status", vec![]).is_err());
    }

    #[test]
    fn test_size_rewrites_last_name() {
        let mut expression = Expression::new(ExpressionKind::Condition);
        let _ = expression.compare("tags", Comparator::GreaterThan, n("3")).unwrap();
        let _ = expression.size();
        assert_eq!(expression.expression(), "size(#CE_tags) > :CE_tags");
    }

    #[test]
    fn test_merge_and_not() {
        let mut left = Expression::new(ExpressionKind::Condition);
        let _ = left.equals("a", s("1")).unwrap();
        let mut right = Expression::new(ExpressionKind::Condition);
        let _ = right.attribute_exists("b").unwrap();

        let mut empty = Expression::new(ExpressionKind::Condition);
        let _ = empty.merge(left.clone(), LogicalOperator::And).unwrap();
        assert_eq!(empty.expression(), left.expression());
        assert_eq!(empty.names(), left.names());
        assert_eq!(empty.values(), left.values());

        let _ = left.merge(right.clone(), LogicalOperator::Or).unwrap();
        assert_eq!(
            left.expression(),
            "(#CE_a = :CE_a) OR (attribute_exists(#CE_b))"
        );
        assert_eq!(left.names().len(), 2);

        let _ = left.not(None).unwrap();
        assert!(left.expression().starts_with("NOT (("));

        let mut base = Expression::new(ExpressionKind::Condition);
        let _ = base.equals("c", s("x")).unwrap();
        let _ = base.not(Some(right)).unwrap();
        assert_eq!(
            base.expression(),
            "(#CE_c = :CE_c) AND (NOT (attribute_exists(#CE_b)))"
        );
    }

    #[test]
    fn test_merge_conflicting_values_errors() {
        let mut left = Expression::new(ExpressionKind::Condition);
        let _ = left.equals("a", s("1")).unwrap();
        let mut right = Expression::new(ExpressionKind::Condition);
        let _ = right.equals("a", s("2")).unwrap();
        assert!(left.merge(right, LogicalOperator::And).is_err());
    }

    #[test]
    fn test_build_empty() {
        assert!(Expression::new(ExpressionKind::Filter).build().is_none());
    }
}
