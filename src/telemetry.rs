mod error;
mod flatten;
mod handler;
mod record;
mod topic;

pub use error::*;
pub use flatten::*;
pub use handler::*;
pub use record::*;
pub use topic::*;
