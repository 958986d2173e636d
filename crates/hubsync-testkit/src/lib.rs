//! # hubsync testkit
//!
//! Testing utilities for hubsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: owners that mint messages, and wired-up stores and hubs
//! - **Generators**: Proptest strategies for property-based testing
//!
//! Integration tests for the CRDT properties live in `tests/`, and a trie
//! benchmark in `benches/`.
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use hubsync_testkit::generators::{message_from_params, MessageParams};
//!
//! proptest! {
//!     #[test]
//!     fn hash_is_deterministic(params: MessageParams) {
//!         let a = message_from_params(&params);
//!         let b = message_from_params(&params);
//!         prop_assert_eq!(a.hash, b.hash);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use hubsync_testkit::fixtures::TestFixture;
//!
//! let mut owner = TestFixture::new(1);
//! let cast = owner.at(5_000).make_cast_add("hello");
//! assert_eq!(cast.timestamp(), 5_000);
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{connect, memory_stores, multi_party_fixtures, test_hub, TestFixture};
pub use generators::{key_op_message, message_from_params, KeyOp, MessageParams};
