//! Active-call cache adapters.

mod memory;
mod redis;

pub use self::redis::RedisCallCache;
pub use memory::InMemoryCallCache;
