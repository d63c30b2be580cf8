pub mod args;
pub mod op;
pub mod ops;

pub use ops::{HostId, Init, Keys, Record, Subscribe, Thread, Token};
