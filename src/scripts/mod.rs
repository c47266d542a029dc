pub mod model;
pub mod parsers;
pub mod repository;

pub use model::{Entry, Script};
pub use parsers::{ContentParser, ParserRegistry};
pub use repository::{EntryRef, Repository, ScriptHandle};
