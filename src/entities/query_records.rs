use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "query_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub query_id: String,
    pub user_id: String,
    pub query_text: String,
    pub state: String,
    pub answer_text: Option<String>,
    pub error_message: Option<String>,
    /// JSON-encoded list of source document ids, set on completion.
    pub sources: Option<String>,
    pub create_time: i64,
    pub ttl: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
