pub mod prelude;

pub mod query_records;
