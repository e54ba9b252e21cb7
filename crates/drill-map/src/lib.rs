//! Best-effort discovery of UI components and generation of candidate prop
//! values for brute-force tests.

pub mod analyze;
pub mod component;
pub mod error;
pub mod generate;
pub mod mapper;
pub mod store;

pub use analyze::{is_excluded_file, Analyzer, INTERACTION_HANDLERS};
pub use component::*;
pub use error::*;
pub use generate::*;
pub use mapper::*;
pub use store::*;
