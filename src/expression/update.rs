use aws_sdk_dynamodb::types::AttributeValue;
use serde::Serialize;

use super::{CompiledExpression, Expression, ExpressionKind};
use crate::error::Error;

/// Change applied to one attribute path
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateAction {
    /// `SET path = value`
    Set(AttributeValue),
    /// `SET path = path + value`
    Increment(AttributeValue),
    /// `SET path = path - value`
    Decrement(AttributeValue),
    /// `SET path = if_not_exists(path, value)`
    IfNotExists(AttributeValue),
    /// `SET path = list_append(path, value)`
    ListAppend(AttributeValue),
    /// `ADD path value`
    Add(AttributeValue),
    /// `REMOVE path`
    Remove,
    /// `REMOVE path[i], ...`
    RemoveAt(Vec<usize>),
    /// `DELETE path value`
    Delete(AttributeValue),
}

impl UpdateAction {
    /// Literal scalar assigned by this action, the only kind of value that can drive
    /// key and unique record maintenance
    pub fn literal(&self) -> Option<&AttributeValue> {
        match self {
            UpdateAction::Set(value) if crate::schema::is_scalar(value) => Some(value),
            _ => None,
        }
    }

    /// True for `REMOVE path` and `SET path = NULL`, both leave the attribute unset
    pub fn clears_value(&self) -> bool {
        matches!(self, UpdateAction::Remove | UpdateAction::Set(AttributeValue::Null(_)))
    }
}

/// Ordered attribute changes of one update
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateBody {
    actions: Vec<(String, UpdateAction)>,
}

impl UpdateBody {
    /// Empty body
    pub fn new() -> Self {
        Self::default()
    }

    /// Every top level field of `value` becomes a `Set`
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, Error> {
        let item: crate::Item = serde_dynamo::to_item(value)?;
        let mut fields: Vec<_> = item.into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self {
            actions: fields
                .into_iter()
                .map(|(name, value)| (name, UpdateAction::Set(value)))
                .collect(),
        })
    }

    /// Add an action, replacing an earlier action on the same path
    pub fn action(mut self, path: impl Into<String>, action: UpdateAction) -> Self {
        self.push(path.into(), action);
        self
    }

    /// `SET path = value`
    pub fn set(self, path: impl Into<String>, value: AttributeValue) -> Self {
        self.action(path, UpdateAction::Set(value))
    }

    /// `SET path = path + value`
    pub fn increment(self, path: impl Into<String>, value: AttributeValue) -> Self {
        self.action(path, UpdateAction::Increment(value))
    }

    /// `REMOVE path`
    pub fn remove(self, path: impl Into<String>) -> Self {
        self.action(path, UpdateAction::Remove)
    }

    pub(crate) fn push(&mut self, path: String, action: UpdateAction) {
        match self.actions.iter_mut().find(|(existing, _)| *existing == path) {
            Some((_, existing)) => *existing = action,
            None => self.actions.push((path, action)),
        }
    }

    /// Actions in insertion order
    pub fn actions(&self) -> &[(String, UpdateAction)] {
        &self.actions
    }

    /// Action on `path`
    pub fn get(&self, path: &str) -> Option<&UpdateAction> {
        self.actions
            .iter()
            .find(|(existing, _)| existing == path)
            .map(|(_, action)| action)
    }

    /// True when there is no action
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Update expression split into its `SET`, `ADD`, `REMOVE` and `DELETE` clauses
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateExpression {
    bindings: Expression,
    set: Vec<String>,
    add: Vec<String>,
    remove: Vec<String>,
    delete: Vec<String>,
}

impl Default for UpdateExpression {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateExpression {
    /// Empty update
    pub fn new() -> Self {
        Self {
            bindings: Expression::new(ExpressionKind::Update),
            set: Vec::new(),
            add: Vec::new(),
            remove: Vec::new(),
            delete: Vec::new(),
        }
    }

    /// Compile one action on `path` into its clause
    pub fn apply(&mut self, path: &str, action: &UpdateAction) -> Result<&mut Self, Error> {
        let name = self.bindings.add_expression_name(path)?;
        match action {
            UpdateAction::Set(value) => {
                let value = self.bindings.add_expression_value(path, value.clone())?;
                self.set.push(format!("{name} = {value}"));
            }
            UpdateAction::Increment(value) => {
                let value = self.bindings.add_expression_value(path, value.clone())?;
                self.set.push(format!("{name} = {name} + {value}"));
            }
            UpdateAction::Decrement(value) => {
                let value = self.bindings.add_expression_value(path, value.clone())?;
                self.set.push(format!("{name} = {name} - {value}"));
            }
            UpdateAction::IfNotExists(value) => {
                let value = self.bindings.add_expression_value(path, value.clone())?;
                self.set
                    .push(format!("{name} = if_not_exists({name}, {value})"));
            }
            UpdateAction::ListAppend(value) => {
                let value = self.bindings.add_expression_value(path, value.clone())?;
                self.set
                    .push(format!("{name} = list_append({name}, {value})"));
            }
            UpdateAction::Add(value) => {
                let value = self.bindings.add_expression_value(path, value.clone())?;
                self.add.push(format!("{name} {value}"));
            }
            UpdateAction::Remove => self.remove.push(name),
            UpdateAction::RemoveAt(indexes) => {
                for index in indexes {
                    self.remove.push(format!("{name}[{index}]"));
                }
            }
            UpdateAction::Delete(value) => {
                let value = self.bindings.add_expression_value(path, value.clone())?;
                self.delete.push(format!("{name} {value}"));
            }
        }
        Ok(self)
    }

    /// Append the clauses of `other`; same clause items are joined with `,`
    pub fn merge(&mut self, other: UpdateExpression) -> Result<&mut Self, Error> {
        let UpdateExpression {
            bindings,
            set,
            add,
            remove,
            delete,
        } = other;
        for (placeholder, name) in bindings.names() {
            self.bindings.bind_name(placeholder, name)?;
        }
        for (placeholder, value) in bindings.values() {
            self.bindings.bind_value(placeholder, value.clone())?;
        }
        self.set.extend(set);
        self.add.extend(add);
        self.remove.extend(remove);
        self.delete.extend(delete);
        Ok(self)
    }

    /// True when no clause has an item
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.add.is_empty() && self.remove.is_empty() && self.delete.is_empty()
    }

    /// Clause text, `SET ... ADD ... REMOVE ... DELETE ...`
    pub fn expression(&self) -> String {
        [
            ("SET", &self.set),
            ("ADD", &self.add),
            ("REMOVE", &self.remove),
            ("DELETE", &self.delete),
        ]
        .iter()
        .filter(|(_, items)| !items.is_empty())
        .map(|(keyword, items)| format!("{keyword} {}", items.join(", ")))
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Serialize into request fields
    pub fn build(self) -> Result<CompiledExpression, Error> {
        if self.is_empty() {
            return Err(Error::EmptyUpdateBody);
        }
        let expression = self.expression();
        CompiledExpression::from_parts(
            expression,
            self.bindings.names().clone(),
            self.bindings.values().clone(),
        )
        .ok_or(Error::EmptyUpdateBody)
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
    fn test_clause_ordering() {
        let mut update = UpdateExpression::new();
        let _ = update.apply("tags", &UpdateAction::Delete(AttributeValue::Ss(vec!["a".into()]))).unwrap();
        let _ = update.apply("legacy", &UpdateAction::Remove).unwrap();
        let _ = update.apply("visits", &UpdateAction::Add(n("1"))).unwrap();
        let _ = update.apply("name", &UpdateAction::Set(s("x"))).unwrap();
        let _ = update.apply("age", &UpdateAction::Increment(n("2"))).unwrap();

        assert_eq!(
            update.expression(),
            "SET #UE_name = :UE_name, #UE_age = #UE_age + :UE_age ADD #UE_visits :UE_visits REMOVE #UE_legacy DELETE #UE_tags :UE_tags"
        );
    }

    #[test]
    fn test_set_variants() {
        let mut update = UpdateExpression::new();
        let _ = update.apply("count", &UpdateAction::Decrement(n("1"))).unwrap();
        let _ = update.apply("created", &UpdateAction::IfNotExists(n("10"))).unwrap();
        let _ = update
            .apply("log", &UpdateAction::ListAppend(AttributeValue::L(vec![s("e")])))
            .unwrap();
        let _ = update.apply("items", &UpdateAction::RemoveAt(vec![0, 2])).unwrap();
        assert_eq!(
            update.expression(),
            "SET #UE_count = #UE_count - :UE_count, #UE_created = if_not_exists(#UE_created, :UE_created), #UE_log = list_append(#UE_log, :UE_log) REMOVE #UE_items[0], #UE_items[2]"
        );
    }

    #[test]
    fn test_merge_across_clauses() {
        let mut left = UpdateExpression::new();
        let _ = left.apply("a", &UpdateAction::Remove).unwrap();
        let mut right = UpdateExpression::new();
        let _ = right.apply("b", &UpdateAction::Set(s("1"))).unwrap();
        let _ = right.apply("c", &UpdateAction::Set(s("2"))).unwrap();

        let _ = left.merge(right).unwrap();
        assert_eq!(
            left.expression(),
            "SET #UE_b = :UE_b, #UE_c = :UE_c REMOVE #UE_a"
        );
        let compiled = left.build().unwrap();
        assert_eq!(compiled.names.as_ref().map(|n| n.len()), Some(3));
        assert_eq!(compiled.values.as_ref().map(|v| v.len()), Some(2));
    }

    #[test]
    fn test_empty_update_is_an_error() {
        assert!(matches!(
            UpdateExpression::new().build(),
            Err(Error::EmptyUpdateBody)
        ));
    }

    #[test]
    fn test_update_body_replaces_same_path() {
        let body = UpdateBody::new()
            .set("name", s("a"))
            .increment("age", n("1"))
            .set("name", s("b"));
        assert_eq!(body.actions().len(), 2);
        assert_eq!(body.get("name"), Some(&UpdateAction::Set(s("b"))));
        assert_eq!(body.get("name").and_then(UpdateAction::literal), Some(&s("b")));
        assert_eq!(body.get("age").and_then(UpdateAction::literal), None);
    }

    #[test]
    fn test_clears_value() {
        assert!(UpdateAction::Remove.clears_value());
        assert!(UpdateAction::Set(AttributeValue::Null(true)).clears_value());
        assert!(!UpdateAction::Set(s("")).clears_value());
        assert!(!UpdateAction::RemoveAt(vec![0]).clears_value());
    }

    #[test]
    fn test_update_body_from_serialize() {
        #[derive(Serialize)]
        struct Patch {
            name: String,
            age: u32,
        }
        let body = UpdateBody::from_serialize(&Patch {
            name: "x".into(),
            age: 3,
        })
        .unwrap();
        assert_eq!(
            body.actions(),
            &[
                ("age".to_string(), UpdateAction::Set(n("3"))),
                ("name".to_string(), UpdateAction::Set(s("x"))),
            ]
        );
    }
}
