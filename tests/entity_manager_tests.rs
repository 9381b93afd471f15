/// Entity Manager Tests
///
/// Tests create, read, update, delete, find and count through a connection backed by
/// the in-memory store.
mod helpers;
use helpers::*;

/// Entity keyed on its id only, on a table without indexes
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
struct Account {
    id: String,
    name: String,
}

impl DynamoEntity for Account {
    fn declaration() -> EntityDeclaration {
        EntityDeclaration::new("Account", PrimaryKeyTemplate::composite("USER#{{id}}", "USER#{{id}}"))
            .table(Table::composite("accounts", "PK", "SK"))
            .attribute(AttributeDeclaration::new("id", AttributeType::String))
            .attribute(AttributeDeclaration::new("name", AttributeType::String))
    }
}

fn id(value: &str) -> Item {
    item(&[("id", s(value))])
}

/// Test the physical item and condition of a simple composite key put
#[tokio::test]
async fn test_create_composite_key_put() {
    let store = MockStore::new();
    let connection = Connection::builder(store.clone())
        .entity::<Account>()
        .build()
        .unwrap();

    let account = Account {
        id: "1".into(),
        name: "bar".into(),
    };
    let created = connection
        .entity_manager()
        .create(&account, CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(created, account);

    let recorded = store.recorded();
    assert_eq!(recorded.puts.len(), 1);
    assert!(recorded.transact_writes.is_empty(), "no unique attributes, no transaction");

    let put = &recorded.puts[0];
    assert_eq!(put.table_name, "accounts");
    assert_eq!(
        put.item,
        item(&[
            ("PK", s("USER#1")),
            ("SK", s("USER#1")),
            ("id", s("1")),
            ("name", s("bar")),
            ("__et", s("Account")),
        ])
    );
    assert_eq!(
        put.condition_expression.as_deref(),
        Some("(attribute_not_exists(#CE_PK)) AND (attribute_not_exists(#CE_SK))")
    );
    let names = put.expression_attribute_names.as_ref().unwrap();
    assert_eq!(names.get("#CE_PK").map(String::as_str), Some("PK"));
    assert_eq!(names.get("#CE_SK").map(String::as_str), Some("SK"));
    assert!(put.expression_attribute_values.is_none());
}

/// Test that a create with a unique attribute writes its enforcement record atomically
#[tokio::test]
async fn test_create_with_unique_attribute() {
    let store = MockStore::new();
    let users = connection(&store).entity_manager();

    let _ = users
        .create(&User::new("1", "a@x"), CreateOptions::default())
        .await
        .unwrap();

    let recorded = store.recorded();
    assert!(recorded.puts.is_empty());
    assert_eq!(recorded.transact_writes.len(), 1);

    let operations = &recorded.transact_writes[0];
    assert_eq!(operations.len(), 2);
    let TransactWriteOperation::Put(record) = &operations[1] else {
        panic!("unique record must be put");
    };
    assert_eq!(
        record.item,
        item(&[
            ("PK", s("__UNIQUE#USER.EMAIL#a@x")),
            ("SK", s("__UNIQUE#USER.EMAIL#a@x")),
        ])
    );
    assert!(record.condition_expression.is_some());
}

/// Test create followed by find_one and exists
#[tokio::test]
async fn test_create_and_find_one() {
    let store = MockStore::new();
    let users = connection(&store).entity_manager();
    let user = User {
        age: Some(41),
        ..User::new("1", "a@x")
    };

    let _ = users.create(&user, CreateOptions::default()).await.unwrap();

    let found: Option<User> = users.find_one(&id("1"), FindOneOptions::default()).await.unwrap();
    assert_eq!(found, Some(user));

    let missing: Option<User> = users.find_one(&id("2"), FindOneOptions::default()).await.unwrap();
    assert_eq!(missing, None);

    assert!(users.exists::<User>(&id("1")).await.unwrap());
    assert!(users.exists::<User>(&item(&[("email", s("a@x"))])).await.unwrap());
    assert!(!users.exists::<User>(&item(&[("email", s("b@x"))])).await.unwrap());
}

/// Test that updating an indexed attribute rewrites the index key
#[tokio::test]
async fn test_update_affecting_gsi() {
    let store = MockStore::new();
    let users = connection(&store).entity_manager();
    let _ = users
        .create(
            &User {
                name: "X".into(),
                ..User::new("1", "a@x")
            },
            CreateOptions::default(),
        )
        .await
        .unwrap();

    let updated: User = users
        .update::<User>(
            &id("1"),
            &UpdateBody::new().set("name", s("Y")),
            UpdateOptions {
                nested_key_context: item(&[("org", s("1"))]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Y");

    let recorded = store.recorded();
    assert_eq!(recorded.updates.len(), 1);
    let update = &recorded.updates[0];
    assert_eq!(update.key, item(&[("PK", s("USER#1")), ("SK", s("USER#1"))]));
    assert_eq!(
        update.update_expression,
        "SET #UE_name = :UE_name, #UE_GSI1PK = :UE_GSI1PK, #UE_GSI1SK = :UE_GSI1SK"
    );
    assert_eq!(update.condition_expression.as_deref(), Some("attribute_exists(#CE_PK)"));

    let values = update.expression_attribute_values.as_ref().unwrap();
    assert_eq!(values.get(":UE_name"), Some(&s("Y")));
    assert_eq!(values.get(":UE_GSI1PK"), Some(&s("ORG#1")));
    assert_eq!(values.get(":UE_GSI1SK"), Some(&s("USER#Y")));
    let names = update.expression_attribute_names.as_ref().unwrap();
    assert_eq!(names.get("#UE_GSI1SK").map(String::as_str), Some("GSI1SK"));
}

/// Test that an index update without the values its other key part needs is rejected
#[tokio::test]
async fn test_update_gsi_needs_key_context() {
    let store = MockStore::new();
    let users = connection(&store).entity_manager();

    let result = users
        .update::<User>(
            &id("1"),
            &UpdateBody::new().set("name", s("Y")),
            UpdateOptions::default(),
        )
        .await;
    assert!(
        matches!(result, Err(Error::UnresolvedInterpolation { ref attribute, .. }) if attribute == "org"),
        "{result:?}"
    );
    assert!(store.recorded().updates.is_empty());
}

/// Test that setting the attribute of a sparse index skipped on create fills every key part
#[tokio::test]
async fn test_update_populates_skipped_sparse_index() {
    let store = MockStore::new();
    let users = connection(&store).entity_manager();
    let _ = users
        .create(&User::new("1", "a@x"), CreateOptions::default())
        .await
        .unwrap();
    let created = store.stored("USER#1", "USER#1").unwrap();
    assert!(!created.contains_key("GSI2PK"));
    assert!(!created.contains_key("GSI2SK"));

    let updated: User = users
        .update::<User>(&id("1"), &UpdateBody::new().set("age", n("5")), UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(updated.age, Some(5));

    let stored = store.stored("USER#1", "USER#1").unwrap();
    assert_eq!(stored.get("GSI2PK"), Some(&s("AGE")));
    assert_eq!(stored.get("GSI2SK"), Some(&s("AGE#5")));
}

/// Test that nulling the attribute of a sparse index removes the whole index
#[tokio::test]
async fn test_update_null_clears_sparse_index() {
    let store = MockStore::new();
    let users = connection(&store).entity_manager();
    let user = User {
        age: Some(3),
        ..User::new("1", "a@x")
    };
    let _ = users.create(&user, CreateOptions::default()).await.unwrap();
    let created = store.stored("USER#1", "USER#1").unwrap();
    assert_eq!(created.get("GSI2PK"), Some(&s("AGE")));
    assert_eq!(created.get("GSI2SK"), Some(&s("AGE#3")));

    let updated: User = users
        .update::<User>(
            &id("1"),
            &UpdateBody::new().set("age", AttributeValue::Null(true)),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(updated.age, None);

    let stored = store.stored("USER#1", "USER#1").unwrap();
    assert!(!stored.contains_key("GSI2PK"));
    assert!(!stored.contains_key("GSI2SK"));
    assert!(
        store.recorded().updates[0]
            .update_expression
            .ends_with("REMOVE #UE_GSI2PK, #UE_GSI2SK")
    );
}

/// Test that updating a primary key attribute is rejected before any request
#[tokio::test]
async fn test_update_primary_key_attribute_rejected() {
    let store = MockStore::new();
    let users = connection(&store).entity_manager();

    let result = users
        .update::<User>(
            &id("1"),
            &UpdateBody::new().set("id", s("2")),
            UpdateOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(Error::PrimaryKeyAttributeUpdate { .. })));
    assert!(store.recorded().updates.is_empty());
}

/// Test that changing a unique attribute swaps its enforcement record
#[tokio::test]
async fn test_update_unique_attribute_replaces_record() {
    let store = MockStore::new();
    let users = connection(&store).entity_manager();
    let _ = users
        .create(&User::new("1", "old@x"), CreateOptions::default())
        .await
        .unwrap();

    let updated: User = users
        .update::<User>(
            &id("1"),
            &UpdateBody::new().set("email", s("new@x")),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(updated.email, "new@x");

    let recorded = store.recorded();
    assert_eq!(recorded.transact_writes.len(), 2);
    let operations = &recorded.transact_writes[1];
    assert_eq!(operations.len(), 3);

    assert!(matches!(&operations[0], TransactWriteOperation::Update(update) if update.key["PK"] == s("USER#1")));
    let TransactWriteOperation::Put(put) = &operations[1] else {
        panic!("new unique record must be put");
    };
    assert_eq!(put.item["PK"], s("__UNIQUE#USER.EMAIL#new@x"));
    assert_eq!(
        put.condition_expression.as_deref(),
        Some("(attribute_not_exists(#CE_PK)) AND (attribute_not_exists(#CE_SK))")
    );
    let TransactWriteOperation::Delete(delete) = &operations[2] else {
        panic!("old unique record must be deleted");
    };
    assert_eq!(delete.key["PK"], s("__UNIQUE#USER.EMAIL#old@x"));
    drop(recorded);

    assert!(store.stored("__UNIQUE#USER.EMAIL#new@x", "__UNIQUE#USER.EMAIL#new@x").is_some());
    assert!(store.stored("__UNIQUE#USER.EMAIL#old@x", "__UNIQUE#USER.EMAIL#old@x").is_none());
}

/// Test that a cancelled unique update reports which item failed
#[tokio::test]
async fn test_update_missing_item_is_cancelled() {
    let store = MockStore::new();
    store.script().transact_outcome = Some(TransactWriteOutcome::Cancelled(vec![
        CancellationReason {
            code: Some("ConditionalCheckFailed".into()),
            message: Some("The conditional request failed".into()),
        },
        CancellationReason {
            code: Some("None".into()),
            message: None,
        },
    ]));
    let users = connection(&store).entity_manager();

    let result = users
        .update::<User>(
            &id("9"),
            &UpdateBody::new().set("email", s("new@x")),
            UpdateOptions::default(),
        )
        .await;

    let reasons = match result {
        Err(Error::TransactionCancelled { reasons }) => reasons,
        other => panic!("expected a cancelled transaction, got {other:?}"),
    };
    assert_eq!(reasons.len(), 2);
    assert_eq!(reasons[0].index, 0);
    assert_eq!(reasons[0].code.as_deref(), Some("ConditionalCheckFailed"));
    assert!(reasons[0].operation.starts_with("Update tests_single_table"));
    assert!(reasons[1].is_none());
    assert!(reasons[1].operation.starts_with("Put tests_single_table"));

    // no current item, so only the new unique record is claimed
    let recorded = store.recorded();
    assert_eq!(recorded.transact_writes[0].len(), 2);
    assert!(recorded.gets[0].consistent_read);
}

/// Test that deleting releases the unique records of the current item
#[tokio::test]
async fn test_delete_releases_unique_records() {
    let store = MockStore::new();
    let users = connection(&store).entity_manager();
    let _ = users
        .create(&User::new("1", "a@x"), CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(store.len(), 2);

    users
        .delete::<User>(&id("1"), DeleteOptions::default())
        .await
        .unwrap();
    assert_eq!(store.len(), 0);

    let recorded = store.recorded();
    let operations = recorded.transact_writes.last().unwrap();
    assert_eq!(operations.len(), 2);
    assert!(operations.iter().all(|operation| matches!(operation, TransactWriteOperation::Delete(_))));
}

/// Test that deleting an entity without unique attributes is a single delete
#[tokio::test]
async fn test_delete_without_unique_attributes() {
    let store = MockStore::new();
    let orgs = connection(&store).entity_manager();
    let _ = orgs.create(&Org::new(1), CreateOptions::default()).await.unwrap();

    orgs.delete::<Org>(&id("1"), DeleteOptions::default())
        .await
        .unwrap();
    let recorded = store.recorded();
    assert_eq!(recorded.deletes.len(), 1);
    assert!(recorded.transact_writes.is_empty());
}

/// Test that a capacity meta limit stops pagination early
#[tokio::test]
async fn test_find_stops_at_meta_limit() {
    let store = MockStore::new();
    {
        let mut script = store.script();
        for i in 0..4 {
            script.pages.push_back(page(i * 10, 10, 100.0, true));
        }
    }
    let users = connection(&store).entity_manager();

    let options = FindOptions {
        query_index: Some("GSI1".into()),
        meta_limit: Some(MetaLimit::ConsumedCapacity(200.0)),
        ..Default::default()
    };
    let output = users
        .find::<User>(&PartitionKey::attributes([("org", s("1"))]), options)
        .await
        .unwrap();

    assert_eq!(store.recorded().queries.len(), 2);
    assert_eq!(output.items.len(), 20);
    assert!(output.cursor.is_some(), "more items remain");
    assert_eq!(output.items[0].org, "1");
}

/// Test that find follows cursors and asks each page for the remaining items only
#[tokio::test]
async fn test_find_follows_cursor_until_limit() {
    let store = MockStore::new();
    {
        let mut script = store.script();
        script.pages.push_back(page(0, 10, 1.0, true));
        script.pages.push_back(page(10, 10, 1.0, true));
    }
    let users = connection(&store).entity_manager();

    let options = FindOptions {
        query_index: Some("GSI1".into()),
        limit: Some(15),
        order_by: SortOrder::Desc,
        ..Default::default()
    };
    let output = users
        .find::<User>(&PartitionKey::attributes([("org", s("1"))]), options)
        .await
        .unwrap();
    assert_eq!(output.items.len(), 15);

    let recorded = store.recorded();
    assert_eq!(recorded.queries.len(), 2);
    assert_eq!(recorded.queries[0].limit, Some(15));
    assert_eq!(recorded.queries[1].limit, Some(5));
    assert!(recorded.queries[1].exclusive_start_key.is_some());
    assert!(!recorded.queries[0].scan_index_forward);
    assert_eq!(recorded.queries[0].index_name.as_deref(), Some("GSI1"));
}

/// Test that count stops when the store has no more pages
#[tokio::test]
async fn test_count_until_last_page() {
    let store = MockStore::new();
    {
        let mut script = store.script();
        script.pages.push_back(page(0, 3, 1.0, true));
        script.pages.push_back(page(3, 2, 1.0, false));
    }
    let users = connection(&store).entity_manager();

    let count = users
        .count::<User>(
            &PartitionKey::attributes([("org", s("1"))]),
            FindOptions {
                query_index: Some("GSI1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(count, 5);
    assert_eq!(store.recorded().queries.len(), 2);
}

/// Test that count reads past the default find limit when the caller sets none
#[tokio::test]
async fn test_count_ignores_default_limit() {
    let store = MockStore::new();
    {
        let mut script = store.script();
        script.pages.push_back(page(0, 4, 1.0, true));
        script.pages.push_back(page(4, 4, 1.0, false));
    }
    let config = ConnectionConfig {
        default_query_limit: 3,
        ..Default::default()
    };
    let users = connection_with(&store, config).entity_manager();
    let count = users
        .count::<User>(
            &PartitionKey::attributes([("org", s("1"))]),
            FindOptions {
                query_index: Some("GSI1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(count, 8);
    assert_eq!(store.recorded().queries.len(), 2);
}

/// Test that querying an index the entity does not declare fails
#[tokio::test]
async fn test_find_on_undeclared_index() {
    let store = MockStore::new();
    let orgs = connection(&store).entity_manager();

    let result = orgs
        .find::<Org>(
            &PartitionKey::Raw("ORG#1".into()),
            FindOptions {
                query_index: Some("GSI1".into()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(Error::IndexNotOnEntity { .. })));
    assert!(store.recorded().queries.is_empty());
}
