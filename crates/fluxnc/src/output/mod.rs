//! Output model: the encoder-independent schema and its builder.

mod builder;
mod schema;

pub use builder::{BuiltOutput, CONVENTIONS, FILL_VALUE, RunInfo, SchemaBuilder};
pub use schema::{
    AttributeValue, ConvertedDataset, Dimension, OutputSchema, SchemaVariable, ValueKind,
    VariableData,
};
