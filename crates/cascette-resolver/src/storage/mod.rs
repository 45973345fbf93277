//! Data shard access.
//!
//! Payloads live in numbered `data.NNN` files. Each payload is preceded by
//! a 30-byte [`BlockHeader`]; index entries point at the header.

pub mod block_header;
pub mod shard;

pub use block_header::{BLOCK_HEADER_SIZE, BlockHeader};
pub use shard::{DataShard, shard_filename};
