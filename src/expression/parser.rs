use aws_sdk_dynamodb::types::AttributeValue;

use super::input::{AttributeCondition, ConditionOptions, SortKeyCondition};
use super::update::{UpdateBody, UpdateExpression};
use super::{Comparator, Expression, ExpressionKind, LogicalOperator};
use crate::error::Error;

/// Compile a condition tree into an expression of `kind`
pub fn parse_condition(kind: ExpressionKind, options: &ConditionOptions) -> Result<Expression, Error> {
    let mut expression = Expression::new(kind);
    match options {
        ConditionOptions::Attr(path, condition) => {
            apply_attribute_condition(&mut expression, path, condition)?;
        }
        ConditionOptions::And(all) => {
            let parsed = all
                .iter()
                .map(|options| parse_condition(kind, options))
                .collect::<Result<Vec<_>, _>>()?;
            let _ = expression.merge_many(parsed, LogicalOperator::And)?;
        }
        ConditionOptions::Or(any) => {
            let parsed = any
                .iter()
                .map(|options| parse_condition(kind, options))
                .collect::<Result<Vec<_>, _>>()?;
            let _ = expression.merge_many(parsed, LogicalOperator::Or)?;
        }
        ConditionOptions::Not(inner) => {
            expression = parse_condition(kind, inner)?;
            let _ = expression.not(None)?;
        }
    }
    Ok(expression)
}

fn apply_attribute_condition(
    expression: &mut Expression,
    path: &str,
    condition: &AttributeCondition,
) -> Result<(), Error> {
    let _ = match condition {
        AttributeCondition::Eq(value) => expression.compare(path, Comparator::Equals, value.clone())?,
        AttributeCondition::Ne(value) => expression.compare(path, Comparator::NotEquals, value.clone())?,
        AttributeCondition::Lt(value) => expression.compare(path, Comparator::LessThan, value.clone())?,
        AttributeCondition::Le(value) => {
            expression.compare(path, Comparator::LessThanOrEqual, value.clone())?
        }
        AttributeCondition::Gt(value) => expression.compare(path, Comparator::GreaterThan, value.clone())?,
        AttributeCondition::Ge(value) => {
            expression.compare(path, Comparator::GreaterThanOrEqual, value.clone())?
        }
        AttributeCondition::BeginsWith(value) => expression.begins_with(path, value.clone())?,
        AttributeCondition::Contains(value) => expression.contains(path, value.clone())?,
        AttributeCondition::Between(values) => expression.between(path, values.clone())?,
        AttributeCondition::In(values) => expression.in_list(path, values.clone())?,
        AttributeCondition::Exists => expression.attribute_exists(path)?,
        AttributeCondition::NotExists => expression.attribute_not_exists(path)?,
        AttributeCondition::Type(type_code) => expression.attribute_type(path, type_code)?,
        AttributeCondition::Size(inner) => {
            apply_attribute_condition(expression, path, inner)?;
            expression.size()
        }
    };
    Ok(())
}

/// Key condition on a partition key value and an optional sort key condition
pub fn parse_key_condition(
    partition_key: &str,
    partition_value: AttributeValue,
    sort_key: Option<(&str, &SortKeyCondition)>,
) -> Result<Expression, Error> {
    let mut expression = Expression::new(ExpressionKind::KeyCondition);
    let _ = expression.equals(partition_key, partition_value)?;

    if let Some((sort_key, condition)) = sort_key {
        let mut sort = Expression::new(ExpressionKind::KeyCondition);
        let _ = match condition {
            SortKeyCondition::Eq(value) => sort.compare(sort_key, Comparator::Equals, value.clone())?,
            SortKeyCondition::Lt(value) => sort.compare(sort_key, Comparator::LessThan, value.clone())?,
            SortKeyCondition::Le(value) => {
                sort.compare(sort_key, Comparator::LessThanOrEqual, value.clone())?
            }
            SortKeyCondition::Gt(value) => sort.compare(sort_key, Comparator::GreaterThan, value.clone())?,
            SortKeyCondition::Ge(value) => {
                sort.compare(sort_key, Comparator::GreaterThanOrEqual, value.clone())?
            }
            SortKeyCondition::BeginsWith(value) => sort.begins_with(sort_key, value.clone())?,
            SortKeyCondition::Between(low, high) => {
                sort.between(sort_key, vec![low.clone(), high.clone()])?
            }
        };
        let _ = expression.merge(sort, LogicalOperator::And)?;
    }
    Ok(expression)
}

/// Projection of attribute paths
pub fn parse_projection<S: AsRef<str>>(paths: &[S]) -> Result<Expression, Error> {
    let mut expression = Expression::new(ExpressionKind::Projection);
    let mut references = Vec::with_capacity(paths.len());
    for path in paths {
        references.push(expression.add_expression_name(path.as_ref())?);
    }
    expression.expression = references.join(", ");
    Ok(expression)
}

/// Compile an update body, at least one action is required
pub fn parse_update(body: &UpdateBody) -> Result<UpdateExpression, Error> {
    if body.is_empty() {
        return Err(Error::EmptyUpdateBody);
    }
    let mut update = UpdateExpression::new();
    for (path, action) in body.actions() {
        let _ = update.apply(path, action)?;
    }
    Ok(update)
}
