use aws_sdk_dynamodb::types::AttributeValue;
use std::sync::Arc;

use super::entity::EntityTransformer;
use super::lazy::{LazyTransactionWriteItemListLoader, PendingWrite};
use crate::Item;
use crate::client::{
    DeleteItemInput, GetItemInput, KeyRef, PutItemInput, QueryInput, ScanInput,
    TransactWriteOperation, UpdateItemInput,
};
use crate::error::Error;
use crate::expression::{
    AttributeCondition, ConditionOptions, ExpressionAttributes, ExpressionKind, UpdateAction,
    UpdateBody, parse_condition, parse_key_condition, parse_projection, parse_update,
};
use crate::options::{
    CreateOptions, DeleteOptions, FindOneOptions, FindOptions, PartitionKey, ScanOptions,
    SortOrder, UpdateOptions,
};
use crate::schema::{ENTITY_TYPE_ATTRIBUTE, EntityMetadata, InterpolationContext, Table};

/// Turns logical entity operations into store requests
#[derive(Clone, Debug)]
pub struct RequestTransformer {
    metadata: Arc<EntityMetadata>,
}

impl RequestTransformer {
    /// Transformer for one entity
    pub fn new(metadata: Arc<EntityMetadata>) -> Self {
        Self { metadata }
    }

    /// Entity metadata
    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.metadata
    }

    fn entity(&self) -> EntityTransformer<'_> {
        EntityTransformer::new(&self.metadata)
    }

    fn table_name(&self) -> String {
        self.metadata.table.name.clone()
    }

    /// `attribute_not_exists` on every physical primary key attribute
    fn key_not_exists_condition(&self) -> ConditionOptions {
        let table = &self.metadata.table;
        let partition = ConditionOptions::not_exists(table.partition_key.clone());
        match &table.sort_key {
            Some(sort_key) => partition.and(ConditionOptions::not_exists(sort_key.clone())),
            None => partition,
        }
    }

    fn key_exists_condition(&self) -> ConditionOptions {
        ConditionOptions::exists(self.metadata.table.partition_key.clone())
    }

    fn unique_put(&self, key: Item) -> Result<TransactWriteOperation, Error> {
        let mut attributes = ExpressionAttributes::default();
        let condition = attributes.absorb(
            parse_condition(ExpressionKind::Condition, &self.key_not_exists_condition())?.build(),
        )?;
        Ok(TransactWriteOperation::Put(PutItemInput {
            table_name: self.table_name(),
            item: key,
            condition_expression: condition,
            expression_attribute_names: attributes.names,
            expression_attribute_values: attributes.values,
        }))
    }

    fn unique_delete(&self, key: Item) -> TransactWriteOperation {
        TransactWriteOperation::Delete(DeleteItemInput {
            table_name: self.table_name(),
            key,
            ..Default::default()
        })
    }

    /// Writes creating `attributes`: the main put followed by one put per unique attribute
    pub fn to_create(&self, attributes: Item, options: &CreateOptions) -> Result<PendingWrite, Error> {
        let (main, unique_records) = self.create_operations(attributes, options)?;
        let mut operations = Vec::with_capacity(1 + unique_records.len());
        operations.push(TransactWriteOperation::Put(main));
        operations.extend(unique_records);
        Ok(PendingWrite::Direct(operations))
    }

    /// Main put of a create and the puts of its unique enforcement records
    pub(crate) fn create_operations(
        &self,
        attributes: Item,
        options: &CreateOptions,
    ) -> Result<(PutItemInput, Vec<TransactWriteOperation>), Error> {
        let entity = self.entity();
        let item = entity.to_physical(attributes)?;

        let condition = match (options.overwrite_if_exists, &options.r#where) {
            (true, None) => None,
            (true, Some(r#where)) => Some(r#where.clone()),
            (false, None) => Some(self.key_not_exists_condition()),
            (false, Some(r#where)) => Some(self.key_not_exists_condition().and(r#where.clone())),
        };
        let mut expression_attributes = ExpressionAttributes::default();
        let condition_expression = match condition {
            Some(condition) => expression_attributes
                .absorb(parse_condition(ExpressionKind::Condition, &condition)?.build())?,
            None => None,
        };

        let unique_records = entity
            .unique_records(&item)?
            .into_iter()
            .map(|(_, key)| self.unique_put(key))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            entity = %self.metadata.name,
            items = 1 + unique_records.len(),
            "compiled create"
        );
        let main = PutItemInput {
            table_name: self.table_name(),
            item,
            condition_expression,
            expression_attribute_names: expression_attributes.names,
            expression_attribute_values: expression_attributes.values,
        };
        Ok((main, unique_records))
    }

    /// Point read of the item with `primary_key` attributes
    pub fn to_get(&self, primary_key: &Item, options: &FindOneOptions) -> Result<GetItemInput, Error> {
        let key = self.entity().primary_key(primary_key)?;
        let mut attributes = ExpressionAttributes::default();
        let projection_expression = match &options.select {
            Some(select) => attributes.absorb(parse_projection(select)?.build())?,
            None => None,
        };
        Ok(GetItemInput {
            table_name: self.table_name(),
            key,
            projection_expression,
            expression_attribute_names: attributes.names,
            consistent_read: options.consistent_read,
        })
    }

    /// Physical key reference of `primary_key` attributes
    pub fn to_key_ref(&self, primary_key: &Item) -> Result<KeyRef, Error> {
        Ok(KeyRef {
            table_name: self.table_name(),
            key: self.entity().primary_key(primary_key)?,
        })
    }

    /// Writes applying `body` to the item with `primary_key` attributes.
    ///
    /// Updates touching a unique attribute need the current item to release the old
    /// enforcement record.
    pub fn to_update(
        &self,
        primary_key: &Item,
        body: &UpdateBody,
        options: &UpdateOptions,
    ) -> Result<PendingWrite, Error> {
        let entity = self.entity();
        let key = entity.primary_key(primary_key)?;

        for (path, _) in body.actions() {
            let top_level = top_level_name(path);
            if self.metadata.schema.is_primary_key_attribute(top_level) {
                return Err(Error::PrimaryKeyAttributeUpdate {
                    entity: self.metadata.name.clone(),
                    attribute: top_level.to_string(),
                });
            }
        }

        let mut body = body.clone();
        for attribute in &self.metadata.attributes {
            if let Some(auto) = attribute.auto_generate.filter(|auto| auto.auto_update) {
                if body.get(&attribute.name).is_none() {
                    body.push(attribute.name.clone(), UpdateAction::Set(auto.strategy.generate()));
                }
            }
        }

        let mut context = options.nested_key_context.clone();
        context.extend(primary_key.iter().map(|(k, v)| (k.clone(), v.clone())));
        let affected = entity.affected_indexes(&body, &context)?;

        let mut update = parse_update(&body)?;
        for (attribute, value) in affected.set {
            let _ = update.apply(&attribute, &UpdateAction::Set(value))?;
        }
        for attribute in affected.remove {
            let _ = update.apply(&attribute, &UpdateAction::Remove)?;
        }

        let condition = match &options.r#where {
            Some(r#where) => self.key_exists_condition().and(r#where.clone()),
            None => self.key_exists_condition(),
        };

        let mut attributes = ExpressionAttributes::default();
        let update_expression = attributes
            .absorb(Some(update.build()?))?
            .ok_or(Error::EmptyUpdateBody)?;
        let condition_expression =
            attributes.absorb(parse_condition(ExpressionKind::Condition, &condition)?.build())?;

        let main = TransactWriteOperation::Update(UpdateItemInput {
            table_name: self.table_name(),
            key: key.clone(),
            update_expression,
            condition_expression,
            expression_attribute_names: attributes.names,
            expression_attribute_values: attributes.values,
        });

        let mut changed_uniques = Vec::new();
        for unique in &self.metadata.schema.uniques {
            let Some(action) = body.get(&unique.attribute) else {
                continue;
            };
            if action.clears_value() {
                changed_uniques.push((unique.attribute.clone(), None));
            } else if let Some(value) = action.literal() {
                changed_uniques.push((unique.attribute.clone(), Some(value.clone())));
            } else {
                return Err(Error::InvalidDynamicUpdateAttributeValue {
                    attribute: unique.attribute.clone(),
                    key: unique.key.partition.attribute.clone(),
                });
            }
        }

        if changed_uniques.is_empty() {
            return Ok(PendingWrite::Direct(vec![main]));
        }

        let transformer = self.clone();
        let loader = LazyTransactionWriteItemListLoader::new(
            self.metadata.name.clone(),
            KeyRef {
                table_name: self.table_name(),
                key,
            },
            move |prior: Option<&Item>| {
                let entity = transformer.entity();
                let mut operations = vec![main];
                let mut releases = Vec::new();
                for (attribute, new_value) in changed_uniques {
                    let old_value = prior
                        .and_then(|item| item.get(&attribute))
                        .filter(|value| !matches!(value, AttributeValue::Null(_)));
                    if old_value == new_value.as_ref() {
                        continue;
                    }
                    if let Some(new_value) = &new_value {
                        if let Some(key) = entity.unique_record(&attribute, new_value)? {
                            operations.push(transformer.unique_put(key)?);
                        }
                    }
                    if let Some(old_value) = old_value {
                        if let Some(key) = entity.unique_record(&attribute, old_value)? {
                            releases.push(transformer.unique_delete(key));
                        }
                    }
                }
                operations.extend(releases);
                Ok(operations)
            },
        );
        Ok(PendingWrite::NeedsPriorRead(loader))
    }

    /// Writes deleting the item with `primary_key` attributes and its unique records
    pub fn to_delete(&self, primary_key: &Item, options: &DeleteOptions) -> Result<PendingWrite, Error> {
        let key = self.entity().primary_key(primary_key)?;
        let mut attributes = ExpressionAttributes::default();
        let condition_expression = match &options.r#where {
            Some(r#where) => attributes.absorb(parse_condition(ExpressionKind::Condition, r#where)?.build())?,
            None => None,
        };
        let main = TransactWriteOperation::Delete(DeleteItemInput {
            table_name: self.table_name(),
            key: key.clone(),
            condition_expression,
            expression_attribute_names: attributes.names,
            expression_attribute_values: attributes.values,
        });

        if !self.metadata.has_unique_attributes() {
            return Ok(PendingWrite::Direct(vec![main]));
        }

        let transformer = self.clone();
        let loader = LazyTransactionWriteItemListLoader::new(
            self.metadata.name.clone(),
            KeyRef {
                table_name: self.table_name(),
                key,
            },
            move |prior: Option<&Item>| {
                let mut operations = vec![main];
                let Some(prior) = prior else {
                    return Ok(operations);
                };
                let entity = transformer.entity();
                for unique in &transformer.metadata.schema.uniques {
                    let Some(value) = prior
                        .get(&unique.attribute)
                        .filter(|value| !matches!(value, AttributeValue::Null(_)))
                    else {
                        continue;
                    };
                    if let Some(key) = entity.unique_record(&unique.attribute, value)? {
                        operations.push(transformer.unique_delete(key));
                    }
                }
                Ok(operations)
            },
        );
        Ok(PendingWrite::NeedsPriorRead(loader))
    }

    /// Query page request of `find`, `limit` and `cursor` are set by the paginator
    pub fn to_query(&self, partition: &PartitionKey, options: &FindOptions) -> Result<QueryInput, Error> {
        let schema = &self.metadata.schema;
        let table = &self.metadata.table;

        let (index_name, partition_part, sort_attribute) = match &options.query_index {
            Some(index_name) => {
                let (_, sort_attribute) =
                    table
                        .index_key_attributes(index_name)
                        .ok_or_else(|| Error::NoSuchIndexFound {
                            index: index_name.clone(),
                            table: table.name.clone(),
                        })?;
                let index = schema.index(index_name).ok_or_else(|| Error::IndexNotOnEntity {
                    index: index_name.clone(),
                    entity: self.metadata.name.clone(),
                })?;
                let partition_part = index.partition.as_ref().unwrap_or(&schema.primary_key.partition);
                (Some(index_name.clone()), partition_part, Some(sort_attribute.to_string()))
            }
            None => (
                None,
                &schema.primary_key.partition,
                table.sort_key.clone(),
            ),
        };

        let partition_value = match partition {
            PartitionKey::Raw(value) => AttributeValue::S(value.clone()),
            PartitionKey::Attributes(attributes) => partition_part
                .template
                .interpolate(attributes, InterpolationContext::Strict)?,
        };

        let sort = match (&options.key_condition, &sort_attribute) {
            (None, _) => None,
            (Some(condition), Some(sort_attribute)) => Some((sort_attribute.as_str(), condition)),
            (Some(_), None) => {
                return Err(Error::SortKeyNotSupported(
                    index_name.unwrap_or_else(|| table.name.clone()),
                ));
            }
        };

        let mut attributes = ExpressionAttributes::default();
        let key_condition_expression = attributes
            .absorb(parse_key_condition(&partition_part.attribute, partition_value, sort)?.build())?
            .unwrap_or_default();

        let filter = self.entity_filter(options.r#where.as_ref());
        let filter_expression =
            attributes.absorb(parse_condition(ExpressionKind::Filter, &filter)?.build())?;
        let projection_expression = match &options.select {
            Some(select) => attributes.absorb(parse_projection(&with_entity_type(select))?.build())?,
            None => None,
        };

        Ok(QueryInput {
            table_name: table.name.clone(),
            index_name,
            key_condition_expression,
            filter_expression,
            projection_expression,
            expression_attribute_names: attributes.names,
            expression_attribute_values: attributes.values,
            limit: None,
            scan_index_forward: options.order_by == SortOrder::Asc,
            exclusive_start_key: options.cursor.clone(),
            consistent_read: options.consistent_read,
        })
    }

    /// Scan page request limited to this entity
    pub fn to_scan(&self, options: &ScanOptions) -> Result<ScanInput, Error> {
        if let Some(index) = &options.scan_index {
            if self.metadata.schema.index(index).is_none() {
                return Err(Error::IndexNotOnEntity {
                    index: index.clone(),
                    entity: self.metadata.name.clone(),
                });
            }
        }
        let filter = self.entity_filter(options.r#where.as_ref());
        to_scan_input(&self.metadata.table, Some(&filter), options)
    }

    fn entity_filter(&self, r#where: Option<&ConditionOptions>) -> ConditionOptions {
        let entity_type = ConditionOptions::attr(
            ENTITY_TYPE_ATTRIBUTE,
            AttributeCondition::Eq(AttributeValue::S(self.metadata.name.clone())),
        );
        match r#where {
            Some(r#where) => entity_type.and(r#where.clone()),
            None => entity_type,
        }
    }
}

/// Scan page request over a whole table
pub(crate) fn to_scan_input(
    table: &Table,
    filter: Option<&ConditionOptions>,
    options: &ScanOptions,
) -> Result<ScanInput, Error> {
    if let Some(index) = &options.scan_index {
        if table.index(index).is_none() {
            return Err(Error::NoSuchIndexFound {
                index: index.clone(),
                table: table.name.clone(),
            });
        }
    }

    let mut attributes = ExpressionAttributes::default();
    let filter_expression = match filter.or(options.r#where.as_ref()) {
        Some(filter) => attributes.absorb(parse_condition(ExpressionKind::Filter, filter)?.build())?,
        None => None,
    };
    let projection_expression = match &options.select {
        Some(select) => attributes.absorb(parse_projection(&with_entity_type(select))?.build())?,
        None => None,
    };

    Ok(ScanInput {
        table_name: table.name.clone(),
        index_name: options.scan_index.clone(),
        filter_expression,
        projection_expression,
        expression_attribute_names: attributes.names,
        expression_attribute_values: attributes.values,
        limit: None,
        segment: options.segment,
        total_segments: options.total_segments,
        exclusive_start_key: options.cursor.clone(),
    })
}

/// Projections always read the entity type marker so results can be attributed
fn with_entity_type(select: &[String]) -> Vec<String> {
    let mut select = select.to_vec();
    if !select.iter().any(|s| s == ENTITY_TYPE_ATTRIBUTE) {
        select.push(ENTITY_TYPE_ATTRIBUTE.to_string());
    }
    select
}

fn top_level_name(path: &str) -> &str {
    let end = path.find(['.', '[']).unwrap_or(path.len());
    &path[..end]
}
