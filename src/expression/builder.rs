use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

use crate::error::Error;

/// Wire level form of one expression
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledExpression {
    /// Expression text
    pub expression: String,
    /// `ExpressionAttributeNames`, omitted when empty
    pub names: Option<HashMap<String, String>>,
    /// `ExpressionAttributeValues`, omitted when empty
    pub values: Option<HashMap<String, AttributeValue>>,
}

impl CompiledExpression {
    pub(crate) fn from_parts(
        expression: String,
        names: HashMap<String, String>,
        values: HashMap<String, AttributeValue>,
    ) -> Option<Self> {
        if expression.is_empty() {
            return None;
        }
        Some(Self {
            expression,
            names: (!names.is_empty()).then_some(names),
            values: (!values.is_empty()).then_some(values),
        })
    }
}

/// Placeholder maps shared by every expression of one request
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpressionAttributes {
    /// `ExpressionAttributeNames`
    pub names: Option<HashMap<String, String>>,
    /// `ExpressionAttributeValues`
    pub values: Option<HashMap<String, AttributeValue>>,
}

impl ExpressionAttributes {
    /// Add the bindings of `expression` and return its text
    pub fn absorb(&mut self, expression: Option<CompiledExpression>) -> Result<Option<String>, Error> {
        let Some(CompiledExpression {
            expression,
            names,
            values,
        }) = expression
        else {
            return Ok(None);
        };

        for (placeholder, name) in names.into_iter().flatten() {
            absorb_binding(self.names.get_or_insert_with(HashMap::new), placeholder, name)?;
        }
        for (placeholder, value) in values.into_iter().flatten() {
            absorb_binding(self.values.get_or_insert_with(HashMap::new), placeholder, value)?;
        }
        Ok(Some(expression))
    }
}

fn absorb_binding<V: PartialEq + std::fmt::Debug>(
    bindings: &mut HashMap<String, V>,
    placeholder: String,
    value: V,
) -> Result<(), Error> {
    match bindings.get(&placeholder) {
        Some(existing) if *existing != value => Err(Error::DuplicateExpressionBinding {
            message: format!("already bound to {existing:?}, requested {value:?}"),
            placeholder,
        }),
        Some(_) => Ok(()),
        None => {
            let _ = bindings.insert(placeholder, value);
            Ok(())
        }
    }
}
