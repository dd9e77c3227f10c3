//! CLI commands implementation

pub mod ask;
pub mod check;
pub mod index;
pub mod init;
pub mod status;
pub mod tables;

pub use ask::*;
pub use check::*;
pub use index::*;
pub use init::*;
pub use status::*;
pub use tables::*;
