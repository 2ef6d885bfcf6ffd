//! Data model for proximity discovery: what was heard over the air, what has
//! been resolved to a durable identity, and how close it is.

pub mod advertisement;
pub mod config;
pub mod device;
pub mod distance;
pub mod ignored;
pub mod registry;
