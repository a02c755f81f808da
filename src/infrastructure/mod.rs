//! Infrastructure layer: concrete implementations of the domain's store
//! traits (in-memory durable stores, filesystem blob store).

pub mod blob;
pub mod store;
