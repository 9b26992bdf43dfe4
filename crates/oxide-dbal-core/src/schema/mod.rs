//! Schema model, document parser and sanity check.

mod model;
mod parser;
mod sanity;

pub use model::{
    Column, DefaultValue, ForeignKey, ForeignKeyRule, Index, IndexType, Record, Schema, Table,
    TableAttributes, View,
};
pub use parser::{load_file, load_files, parse_str};
