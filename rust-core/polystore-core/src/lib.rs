// SPDX-License-Identifier: PMPL-1.0-or-later
//
// PolyStore core types
//
// This crate holds the pieces shared by every PolyStore backend and by the
// provider: the operation mode word, the key filter and key-copy machinery
// used by listings, the key watcher that lets readers block until a key
// appears, the batch byte views (size arrays, bit fields, output buffers),
// the error taxonomy with its wire codes, and the database identifier.
//
// # Modules
//
// - [`modes`] -- The 32-bit operation mode word and its wire-stable bits.
// - [`filter`] -- Key filters (prefix / suffix / registered predicate) and
//   the key/value emission helpers used by list operations.
// - [`registry`] -- Host-populated registries for named comparators and
//   filter predicates.
// - [`watch`] -- The key watcher rendezvous primitive.
// - [`batch`] -- Views over batched arguments: bit fields, output buffers,
//   size-array codecs, and the in-band size sentinels.
// - [`error`] -- `KvError` and the numeric `ErrorCode` exchanged on the wire.
// - [`id`] -- 128-bit database identifier.

pub mod batch;
pub mod error;
pub mod filter;
pub mod id;
pub mod modes;
pub mod registry;
pub mod watch;

pub use batch::{BitField, OutBuf, KEY_NOT_FOUND, NO_MORE_KEYS, SIZE_TOO_SMALL};
pub use error::{ErrorCode, KvError, KvResult};
pub use filter::{key_copy, val_copy, Filter};
pub use id::DatabaseId;
pub use modes::Mode;
pub use watch::{KeyWatcher, WaitOutcome};
