/// Common test fixtures and data structures
///
/// Defines reusable entities sharing one table and the connection setup used
/// across multiple test files.
use super::{Arc, Deserialize, MockStore, Serialize};
use dynamo_entity::{
    AttributeDeclaration, AttributeType, Connection, ConnectionConfig, DynamoEntity, EntityDeclaration,
    IndexDefinition, IndexTemplate, PrimaryKeyTemplate, Table,
};

/// Single table with two global indexes
pub fn table() -> Table {
    Table::composite("tests_single_table", "PK", "SK")
        .with_index("GSI1", IndexDefinition::global("GSI1PK", "GSI1SK"))
        .with_index("GSI2", IndexDefinition::global("GSI2PK", "GSI2SK"))
}

/// User with a unique email, listed per org on `GSI1` and by age on the sparse `GSI2`
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct User {
    pub id: String,
    pub org: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

impl User {
    #[allow(dead_code)]
    pub fn new(id: &str, email: &str) -> Self {
        Self {
            id: id.to_string(),
            org: "1".to_string(),
            name: format!("user{id}"),
            email: email.to_string(),
            age: None,
        }
    }
}

impl DynamoEntity for User {
    fn declaration() -> EntityDeclaration {
        EntityDeclaration::new("User", PrimaryKeyTemplate::composite("USER#{{id}}", "USER#{{id}}"))
            .index("GSI1", IndexTemplate::global("ORG#{{org}}", "USER#{{name}}"))
            .index("GSI2", IndexTemplate::global("AGE", "AGE#{{age}}"))
            .attribute(AttributeDeclaration::new("id", AttributeType::String))
            .attribute(AttributeDeclaration::new("org", AttributeType::String))
            .attribute(AttributeDeclaration::new("name", AttributeType::String))
            .attribute(AttributeDeclaration::new("email", AttributeType::String).unique())
            .attribute(AttributeDeclaration::new("age", AttributeType::Number))
    }
}

/// Org without unique attributes
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Org {
    pub id: String,
    pub name: String,
}

impl Org {
    #[allow(dead_code)]
    pub fn new(id: usize) -> Self {
        Self {
            id: id.to_string(),
            name: format!("org {id}"),
        }
    }
}

impl DynamoEntity for Org {
    fn declaration() -> EntityDeclaration {
        EntityDeclaration::new("Org", PrimaryKeyTemplate::composite("ORG#{{id}}", "ORG#{{id}}"))
            .attribute(AttributeDeclaration::new("id", AttributeType::String))
            .attribute(AttributeDeclaration::new("name", AttributeType::String))
    }
}

/// Connection over `store` with both entities and the default limits
pub fn connection(store: &Arc<MockStore>) -> Connection {
    connection_with(store, ConnectionConfig::default())
}

/// Connection over `store` with both entities and `config`
pub fn connection_with(store: &Arc<MockStore>, config: ConnectionConfig) -> Connection {
    Connection::builder(store.clone())
        .default_table(table())
        .entity::<User>()
        .entity::<Org>()
        .config(config)
        .build()
        .unwrap()
}
