//! Hash primitives for CASC content addressing
//!
//! CASC addresses data through two families of hashes:
//!
//! - **Jenkins lookup3** (`hashlittle`/`hashlittle2`): maps normalized
//!   asset paths to the 64-bit filename hashes stored in the root table.
//! - **MD5**: content checksums identifying the logical bytes of a file.
//!
//! Both are pure functions; the storage engine consumes them but never
//! verifies stored data against them.
//!
//! # Examples
//!
//! ```
//! use cascette_crypto::jenkins::Jenkins96;
//!
//! let hash = Jenkins96::hash(b"INTERFACE\\GLUES\\MODELS\\UI_HUMAN.M2");
//! println!("filename hash: {:016x}", hash.hash64);
//! ```
//!
//! ```
//! use cascette_crypto::md5::content_checksum;
//!
//! let checksum = content_checksum(b"Hello, World!");
//! assert_eq!(hex::encode(checksum), "65a8e27d8879283831b664bd8b7f0ad4");
//! ```

#![warn(missing_docs)]

pub mod jenkins;
pub mod md5;

pub use jenkins::{Jenkins96, hashlittle, hashlittle2};
pub use md5::{CHECKSUM_SIZE, content_checksum, content_checksum_hex};
