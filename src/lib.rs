//! Spinring - Bounded Lock-Free MPMC Ring Buffer
//!
//! Arsitektur:
//! - Lock-Free: CAS pada dua cursor 64-bit, tanpa Mutex
//! - Fixed capacity: slot array dialokasi sekali
//! - Null sentinel: slot kosong = null pointer, payload = `Box<T>`

pub mod core;
pub mod error;

pub use crate::core::RingBuffer;
pub use crate::error::RingError;
