use aws_sdk_dynamodb::types::AttributeValue;
use serde::Serialize;

use crate::error::Error;

/// Serialize any value into an attribute value
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<AttributeValue, Error> {
    Ok(serde_dynamo::to_attribute_value::<_, AttributeValue>(value)?)
}

/// Condition on a single attribute
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeCondition {
    /// `=`
    Eq(AttributeValue),
    /// `<>`
    Ne(AttributeValue),
    /// `<`
    Lt(AttributeValue),
    /// `<=`
    Le(AttributeValue),
    /// `>`
    Gt(AttributeValue),
    /// `>=`
    Ge(AttributeValue),
    /// `begins_with`
    BeginsWith(AttributeValue),
    /// `contains`
    Contains(AttributeValue),
    /// `BETWEEN`, exactly two values
    Between(Vec<AttributeValue>),
    /// `IN`, at least one value
    In(Vec<AttributeValue>),
    /// `attribute_exists`
    Exists,
    /// `attribute_not_exists`
    NotExists,
    /// `attribute_type`, type code such as `S` or `N`
    Type(String),
    /// Apply the inner comparison to `size(attribute)`
    Size(Box<AttributeCondition>),
}

/// Condition tree used for write conditions and filters
#[derive(Clone, Debug, PartialEq)]
pub enum ConditionOptions {
    /// Condition on an attribute path
    Attr(String, AttributeCondition),
    /// All must hold
    And(Vec<ConditionOptions>),
    /// Any must hold
    Or(Vec<ConditionOptions>),
    /// Negation
    Not(Box<ConditionOptions>),
}

impl ConditionOptions {
    /// Condition on one attribute path
    pub fn attr(path: impl Into<String>, condition: AttributeCondition) -> Self {
        ConditionOptions::Attr(path.into(), condition)
    }

    /// `path = value`
    pub fn eq(path: impl Into<String>, value: AttributeValue) -> Self {
        Self::attr(path, AttributeCondition::Eq(value))
    }

    /// `attribute_exists(path)`
    pub fn exists(path: impl Into<String>) -> Self {
        Self::attr(path, AttributeCondition::Exists)
    }

    /// `attribute_not_exists(path)`
    pub fn not_exists(path: impl Into<String>) -> Self {
        Self::attr(path, AttributeCondition::NotExists)
    }

    /// Both this and `other`
    pub fn and(self, other: ConditionOptions) -> Self {
        match self {
            ConditionOptions::And(mut all) => {
                all.push(other);
                ConditionOptions::And(all)
            }
            this => ConditionOptions::And(vec![this, other]),
        }
    }

    /// This or `other`
    pub fn or(self, other: ConditionOptions) -> Self {
        match self {
            ConditionOptions::Or(mut any) => {
                any.push(other);
                ConditionOptions::Or(any)
            }
            this => ConditionOptions::Or(vec![this, other]),
        }
    }

    /// Negation of this condition
    pub fn negate(self) -> Self {
        ConditionOptions::Not(Box::new(self))
    }
}

/// Sort key part of a key condition
#[derive(Clone, Debug, PartialEq)]
pub enum SortKeyCondition {
    /// `=`
    Eq(AttributeValue),
    /// `<`
    Lt(AttributeValue),
    /// `<=`
    Le(AttributeValue),
    /// `>`
    Gt(AttributeValue),
    /// `>=`
    Ge(AttributeValue),
    /// `begins_with`
    BeginsWith(AttributeValue),
    /// `BETWEEN`
    Between(AttributeValue, AttributeValue),
}

impl SortKeyCondition {
    /// `begins_with` on a string prefix
    pub fn begins_with(prefix: impl Into<String>) -> Self {
        SortKeyCondition::BeginsWith(AttributeValue::S(prefix.into()))
    }
}
