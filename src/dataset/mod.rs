pub mod normalize;
pub mod schema;

pub use schema::{
    Ccn, CcnParseError, Dataset, DatasetParseError, FieldValue, Record, Snapshot, Table,
};
