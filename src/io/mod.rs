pub mod query_reader;
pub mod writer;

pub use query_reader::{read_queries, ReadBatch};
pub use writer::write_records;
