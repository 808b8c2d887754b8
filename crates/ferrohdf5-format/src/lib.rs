//! Pure-Rust HDF5 binary format structures, v2 superblock family.
//!
//! This crate implements the write path for root-group attributes and its
//! prerequisites: the lookup3 metadata checksum, v2 object headers, the
//! fractal heap, the B-tree v2 name index, and the compact-vs-dense
//! storage planner. Each structure module also carries a parser so the
//! crate can verify its own output.
//!
//! Core modules support `no_std` environments with the `alloc` crate; the
//! file-backed writer requires the `std` feature (on by default).

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod allocator;
pub mod attr_storage;
pub mod attribute;
pub mod attribute_info;
pub mod btree_v2;
pub mod checksum;
pub mod dataspace;
pub mod datatype;
pub mod encoder;
pub mod error;
pub mod fractal_heap;
pub mod message_type;
pub mod object_header;
pub mod signature;
pub mod superblock;

#[cfg(feature = "std")]
pub mod file_writer;
#[cfg(feature = "std")]
pub mod paged_writer;
