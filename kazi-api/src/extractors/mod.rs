//! Custom request extractors.

mod path_id;

pub use path_id::PathId;
