//! Storage engine: identifier pool, capacity accounting, eviction and the
//! allocation coordinator that composes them.

pub mod allocator;
pub mod capacity;
pub mod eviction;
pub mod id_pool;
pub mod inventory;
pub mod lock;

#[cfg(test)]
mod test_properties;
