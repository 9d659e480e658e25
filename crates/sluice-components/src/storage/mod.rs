//! File I/O components

mod read_content;
mod write_content;

pub use read_content::ReadContent;
pub use write_content::WriteContent;
