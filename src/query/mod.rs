pub mod ast;
pub mod cache;
pub mod parser;

pub use ast::{Combine, Filter};
pub use cache::FilterCache;
pub use parser::parse_filter;
