pub mod document;

pub use document::{DocumentRecord, NewDocument};
