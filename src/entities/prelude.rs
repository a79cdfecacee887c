pub use super::query_records::Entity as QueryRecords;
