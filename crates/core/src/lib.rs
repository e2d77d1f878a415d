// crates/core/src/lib.rs
pub mod builder;
pub mod config;
pub mod error;
pub mod extract;
pub mod paths;
pub mod reader;
pub mod row;
pub mod scope;
pub mod tail;
pub mod turns;

pub use builder::*;
pub use config::*;
pub use error::*;
pub use extract::*;
pub use row::*;
pub use scope::*;
pub use tail::*;
pub use turns::*;
