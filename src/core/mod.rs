//! Core module: Lock-Free MPMC Ring Buffer
//!
//! Prinsip desain:
//! - Lock-Free: Hanya atomic operations, tidak ada Mutex/RwLock
//! - No-Allocation: Slot array pre-allocated saat init
//! - Single ownership: Payload pindah dari producer ke satu consumer

mod ring_buffer;

pub use ring_buffer::RingBuffer;
