use std::collections::TryReserveError;
use thiserror::Error;

/// Error yang bisa muncul dari ring buffer.
///
/// Hanya konstruksi yang bisa gagal. `push`/`pop` tidak punya error
/// transient: retry CAS adalah detail internal.
#[derive(Error, Debug)]
pub enum RingError {
    #[error("failed to allocate ring buffer with {capacity} slots")]
    Alloc {
        capacity: usize,
        #[source]
        source: TryReserveError,
    },
}
