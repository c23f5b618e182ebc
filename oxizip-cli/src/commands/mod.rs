//! Command implementations for OxiZip CLI.

pub mod comment;
pub mod create;
pub mod delete;
pub mod extract;
pub mod list;

pub use comment::cmd_comment;
pub use create::{CompressionLevel, CreateOptions, Zip64Mode, cmd_create};
pub use delete::cmd_delete;
pub use extract::{ExtractOptions, cmd_cat, cmd_extract};
pub use list::{ListOptions, cmd_list};
pub use test::cmd_test;
