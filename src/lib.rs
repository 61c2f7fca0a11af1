pub mod common;
pub mod peloton;
pub mod pipeline;
pub mod warehouse;

pub use pipeline::{EtlJob, EtlReport};
