//! Run data model

pub mod outputs;
pub mod phase;
pub mod request;
