use aws_sdk_dynamodb::error::BuildError;
use serde_dynamo::Error as SerdeDynamoError;
use std::fmt;

/// Per-item reason attached to a cancelled write transaction.
///
/// `index` is the position of the item in the list that was submitted to the store,
/// which is the only way to attribute a failed condition back to the operation that
/// produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionCancellationReason {
    /// Position of the item in the submitted transaction
    pub index: usize,
    /// Store supplied code, e.g. `ConditionalCheckFailed` or `None`
    pub code: Option<String>,
    /// Store supplied message
    pub message: Option<String>,
    /// Short description of the operation submitted at this position
    pub operation: String,
}

impl TransactionCancellationReason {
    /// True when the store did not report a failure for this item
    pub fn is_none(&self) -> bool {
        matches!(self.code.as_deref(), None | Some("None"))
    }
}

impl fmt::Display for TransactionCancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.index,
            self.operation,
            self.code.as_deref().unwrap_or("None")
        )?;
        if let Some(message) = &self.message {
            write!(f, " ({message})")?;
        }
        Ok(())
    }
}

/// Entity mapping error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serde DynamoDB serialization/deserialization error
    #[error("DynamoDB serialization error: {0}")]
    SerdeDynamo(#[from] SerdeDynamoError),
    /// Error returned by the DynamoDB service or SDK
    #[error("DynamoDB operation error: {0}")]
    DynamoDB(#[from] aws_sdk_dynamodb::Error),
    /// DynamoDB request builder error
    #[error("DynamoDB request builder error: {0}")]
    BuildError(#[from] BuildError),
    /// A key template could not be turned into a regular expression
    #[error("invalid key template pattern: {0}")]
    Regex(#[from] regex::Error),

    // Schema and registration errors, raised while building a connection
    /// Two registered entities share a name
    #[error("entity name \"{name}\" is already registered")]
    DuplicateEntityName {
        /// Offending entity name
        name: String,
    },
    /// Entity declares no table and the connection has no default table
    #[error("entity \"{entity}\" has no table, set one on the entity or as connection default")]
    MissingTableConfig {
        /// Entity name
        entity: String,
    },
    /// Primary key (or index) template shape does not match the table
    #[error("entity \"{entity}\": {message}")]
    KeyShapeMismatch {
        /// Entity name
        entity: String,
        /// What did not match
        message: String,
    },
    /// A key template references an attribute the entity does not declare
    #[error("entity \"{entity}\": key \"{key}\" references unknown attribute \"{attribute}\"")]
    NoSuchAttribute {
        /// Entity name
        entity: String,
        /// Physical key attribute name
        key: String,
        /// Referenced logical attribute
        attribute: String,
    },
    /// A key template references a non scalar attribute
    #[error(
        "entity \"{entity}\": attribute \"{attribute}\" of type {attribute_type} can not be used in key \"{key}\""
    )]
    InvalidKeyAttributeType {
        /// Entity name
        entity: String,
        /// Physical key attribute name
        key: String,
        /// Referenced logical attribute
        attribute: String,
        /// Declared type of the attribute
        attribute_type: String,
    },
    /// Index is not declared on the table
    #[error("no such index \"{index}\" found on table \"{table}\"")]
    NoSuchIndexFound {
        /// Index name
        index: String,
        /// Table name
        table: String,
    },
    /// Index declared on the entity with another type than on the table
    #[error("entity \"{entity}\": index \"{index}\" is declared as {declared} but table defines {expected}")]
    IndexSignatureMismatch {
        /// Entity name
        entity: String,
        /// Index name
        index: String,
        /// Type declared by the entity
        declared: String,
        /// Type declared by the table
        expected: String,
    },

    // Expression build errors
    /// A placeholder was bound twice to different names or values
    #[error("duplicate expression binding for \"{placeholder}\": {message}")]
    DuplicateExpressionBinding {
        /// Placeholder key
        placeholder: String,
        /// Existing and requested bindings
        message: String,
    },
    /// Update expression without any action
    #[error("update body must change at least one attribute")]
    EmptyUpdateBody,
    /// `BETWEEN` or `IN` received the wrong number of operands
    #[error("operator {operator} on \"{attribute}\" expects {expected} values, got {actual}")]
    InvalidRangeOperatorArity {
        /// Operator name
        operator: &'static str,
        /// Attribute path
        attribute: String,
        /// Expected arity description
        expected: &'static str,
        /// Supplied value count
        actual: usize,
    },
    /// Value placeholders requested on a projection expression
    #[error("projection expressions do not support values (\"{attribute}\")")]
    ProjectionValueUnsupported {
        /// Attribute path
        attribute: String,
    },

    // Resolution errors
    /// A key template references an attribute without value
    #[error("unable to resolve \"{template}\": attribute \"{attribute}\" has no value")]
    UnresolvedInterpolation {
        /// Template being interpolated
        template: String,
        /// Attribute without value
        attribute: String,
    },
    /// A key template references an attribute holding a non scalar value
    #[error("attribute \"{attribute}\" can not be interpolated into a key, value is not a string, number or boolean")]
    InvalidKeyAttributeValue {
        /// Attribute name
        attribute: String,
    },
    /// An attribute used by an index was updated with a non literal action
    #[error(
        "attribute \"{attribute}\" is referenced by index key \"{key}\" and can only be updated with a literal value"
    )]
    InvalidDynamicUpdateAttributeValue {
        /// Attribute name
        attribute: String,
        /// Physical key attribute that references it
        key: String,
    },
    /// Update body touches an attribute used by the primary key
    #[error("attribute \"{attribute}\" is part of the primary key of \"{entity}\" and can not be updated")]
    PrimaryKeyAttributeUpdate {
        /// Entity name
        entity: String,
        /// Attribute name
        attribute: String,
    },
    /// A unique attribute was not provided when writing
    #[error("all unique attributes are required, \"{attribute}\" is missing on \"{entity}\"")]
    MissingUniqueAttribute {
        /// Entity name
        entity: String,
        /// Attribute name
        attribute: String,
    },
    /// Entity type was never registered with the connection
    #[error("entity \"{0}\" is not registered with this connection")]
    EntityNotRegistered(String),
    /// Sort key condition requested where no sort key exists
    #[error("sort key condition is not supported, \"{0}\" has no sort key")]
    SortKeyNotSupported(String),
    /// Index exists on the table but the entity does not declare it
    #[error("index \"{index}\" is not declared on entity \"{entity}\"")]
    IndexNotOnEntity {
        /// Index name
        index: String,
        /// Entity name
        entity: String,
    },
    /// Update returned no attributes
    #[error("entity \"{0}\" not found")]
    EntityNotFound(String),

    // Transaction errors
    /// Expanded transaction exceeds the store limit
    #[error(
        "write transaction has {generated_items_count} items (from {original_items_count} requested), limit is {limit}"
    )]
    WriteTransactionItemLimitExceeded {
        /// Items requested by the caller
        original_items_count: usize,
        /// Items after unique attribute expansion
        generated_items_count: usize,
        /// Configured limit
        limit: usize,
    },
    /// Store cancelled the transaction
    #[error("transaction cancelled: {}", display_reasons(.reasons))]
    TransactionCancelled {
        /// One entry per submitted item, in submission order
        reasons: Vec<TransactionCancellationReason>,
    },
}

fn display_reasons(reasons: &[TransactionCancellationReason]) -> String {
    reasons
        .iter()
        .filter(|reason| !reason.is_none())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Check if the error is a DynamoDB ConditionalCheckFailedException, or a cancelled
    /// transaction where at least one item failed its condition.
    pub fn is_conditional_check_failed(&self) -> bool {
        match self {
            Error::DynamoDB(aws_sdk_dynamodb::Error::ConditionalCheckFailedException(_)) => true,
            Error::TransactionCancelled { reasons } => reasons
                .iter()
                .any(|reason| reason.code.as_deref() == Some("ConditionalCheckFailed")),
            _ => false,
        }
    }

    /// Check if the error is a serialization/deserialization error
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Error::SerdeDynamo(_))
    }

    /// Check if the error is a DynamoDB-related error
    pub fn is_dynamodb_error(&self) -> bool {
        matches!(self, Error::DynamoDB(_) | Error::BuildError(_))
    }

    /// Check if the error was raised while compiling entity schemas
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Error::DuplicateEntityName { .. }
                | Error::MissingTableConfig { .. }
                | Error::KeyShapeMismatch { .. }
                | Error::NoSuchAttribute { .. }
                | Error::InvalidKeyAttributeType { .. }
                | Error::NoSuchIndexFound { .. }
                | Error::IndexSignatureMismatch { .. }
        )
    }

    /// Check if the error is a cancelled transaction
    pub fn is_transaction_cancelled(&self) -> bool {
        matches!(self, Error::TransactionCancelled { .. })
    }
}
