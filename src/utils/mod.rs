//! Shared infrastructure that is not specific to loop fusion.

pub mod graph;
