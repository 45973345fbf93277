#![allow(clippy::expect_used, clippy::panic)]

//! Dump index files and the block headers they point at from a local WoW
//! installation.
//!
//! Usage:
//!   CASCETTE_WOW_PATH=/path/to/wow cargo run --example dump_index \
//!       -p cascette-resolver --features local-install

mod common;

use cascette_resolver::{DEFAULT_MAX_SHARD, IndexStore, StorageConfig};
use cascette_resolver::storage::DataShard;
use std::collections::BTreeMap;

fn main() {
    let config = StorageConfig::new(common::wow_path());
    let data = config.data_path();
    println!("Loading indices from: {}", data.display());

    let store = IndexStore::load_dir(&data, DEFAULT_MAX_SHARD).expect("failed to load indices");
    println!(
        "Loaded {} index files, {} distinct keys\n",
        store.shard_files().len(),
        store.len()
    );

    for (id, path) in store.shard_files() {
        println!(
            "Bucket 0x{:02x} version {:08x}: {}",
            id.bucket,
            id.version,
            path.display()
        );
    }

    // Entries per data shard
    let mut per_shard: BTreeMap<u16, usize> = BTreeMap::new();
    for entry in store.iter() {
        *per_shard.entry(entry.shard).or_default() += 1;
    }
    println!();
    for (shard, count) in &per_shard {
        println!("data.{shard:03}: {count} entries");
    }

    // Peek at a few blocks from the first shard
    let Some((&first, _)) = per_shard.iter().next() else {
        return;
    };
    let shard = DataShard::open(first, config.shard_path(first), true).expect("open shard");
    println!("\n=== Block headers in data.{first:03} ===");
    for entry in store.iter().filter(|e| e.shard == first).take(5) {
        let header = shard.header_at(entry.offset).expect("read block header");
        println!(
            "  key={} offset={:>10} index size={:>8} block size={:>8}",
            entry.key, entry.offset, entry.size, header.block_size
        );
        let block = shard.get_block(entry).expect("read block");
        common::hex_dump(&block.into_bytes(), 32);
    }
}
