//! Lock-Free Multi-Producer Multi-Consumer (MPMC) Ring Buffer
//!
//! Dua cursor 64-bit yang terus naik (`high` untuk producer, `low` untuk
//! consumer) di-map ke slot via `cursor % capacity`. Slot kosong ditandai
//! dengan null pointer, jadi tidak ada state field terpisah per slot.
//!
//! Tidak ada Mutex, tidak ada alokasi setelah inisialisasi (selain payload
//! `Box<T>` yang dibawa caller). `push` dan `pop` adalah spin loop lock-free:
//! buffer penuh / kosong berarti retry, bukan blocking.
//!
//! Urutan baca cursor sengaja asimetris:
//! - push: baca `low` dulu, baru `high` -> occupancy tidak pernah under-estimate
//! - pop: baca `high` dulu, baru `low` -> availability tidak pernah over-estimate

use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::time::{Duration, Instant};

#[cfg(not(loom))]
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::error::RingError;

/// Padding untuk cache line isolation (64 bytes pada x86-64)
#[repr(C, align(64))]
struct CacheLinePadded<T> {
    value: T,
}

impl<T> CacheLinePadded<T> {
    fn new(value: T) -> Self {
        Self { value }
    }
}

/// Slot dalam ring buffer: null = kosong, selain itu payload milik buffer
type Slot<T> = AtomicPtr<T>;

/// Hasil satu kali percobaan klaim cursor
enum Attempt<R> {
    Done(R),
    // Admission / availability check gagal: buffer penuh atau kosong
    Blocked,
    // CAS kalah dari thread lain
    Contended,
}

/// Lock-Free MPMC Ring Buffer
///
/// Ownership payload berpindah: producer -> buffer -> consumer yang berhasil
/// `pop`. Buffer sendiri tidak pernah clone atau share payload.
#[repr(C)]
pub struct RingBuffer<T> {
    // Producer side - cache line aligned
    high: CacheLinePadded<AtomicU64>,
    // Consumer side - cache line aligned
    low: CacheLinePadded<AtomicU64>,
    slots: Box<[Slot<T>]>,
    capacity: usize,
    _owns: PhantomData<Box<T>>,
}

// SAFETY: RingBuffer aman untuk Send/Sync karena:
// - Setiap payload hanya dimiliki satu thread pada satu waktu (handoff via CAS)
// - Slot dan cursor hanya diakses lewat atomic operations
// - T hanya perlu Send: buffer tidak pernah memberi &T ke thread lain
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Membuat ring buffer baru dengan `capacity` slot.
    ///
    /// Alokasi hanya terjadi sekali saat inisialisasi. Gagal alokasi
    /// (termasuk overflow ukuran) dikembalikan sebagai [`RingError::Alloc`].
    ///
    /// # Panics
    /// Panic jika `capacity == 0`
    pub fn with_capacity(capacity: usize) -> Result<Self, RingError> {
        assert!(capacity > 0, "capacity must be non-zero");

        let mut slots = Vec::new();
        if let Err(source) = slots.try_reserve_exact(capacity) {
            tracing::warn!(capacity, error = %source, "ring buffer allocation failed");
            return Err(RingError::Alloc { capacity, source });
        }
        slots.extend((0..capacity).map(|_| AtomicPtr::new(ptr::null_mut())));

        tracing::debug!(capacity, "ring buffer created");

        Ok(Self {
            high: CacheLinePadded::new(AtomicU64::new(0)),
            low: CacheLinePadded::new(AtomicU64::new(0)),
            slots: slots.into_boxed_slice(),
            capacity,
            _owns: PhantomData,
        })
    }

    #[inline(always)]
    fn slot(&self, cursor: u64) -> &Slot<T> {
        &self.slots[(cursor % self.capacity as u64) as usize]
    }

    /// Satu putaran algoritma push. Item hanya dikonsumsi kalau `Done`.
    #[inline(always)]
    fn attempt_push(&self, item: *mut T) -> Attempt<()> {
        // Acquire pada load pertama = load-load barrier: `low` pasti dibaca
        // sebelum `high`, jadi window `high - low` tidak pernah lebih kecil
        // dari occupancy sebenarnya.
        let low = self.low.value.load(Ordering::Acquire);
        let high = self.high.value.load(Ordering::Acquire);
        let slot = self.slot(high);

        // Strict `<`: setelah CAS, `high - low` tetap <= capacity. Dengan `<=`
        // producer bisa klaim slot yang producer putaran sebelumnya belum tulis.
        if !slot.load(Ordering::Acquire).is_null() || high.wrapping_sub(low) >= self.capacity as u64
        {
            return Attempt::Blocked;
        }

        if self
            .high
            .value
            .compare_exchange(high, high + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return Attempt::Contended;
        }

        // Slot ini sekarang eksklusif milik kita sampai consumer klaim `high`.
        // Release: payload visible sebelum consumer melihat slot non-null.
        let previous = slot.swap(item, Ordering::Release);
        debug_assert!(previous.is_null(), "producer claimed an occupied slot");
        Attempt::Done(())
    }

    /// Satu putaran algoritma pop.
    #[inline(always)]
    fn attempt_pop(&self) -> Attempt<Box<T>> {
        // Kebalikan push: `high` dulu, baru `low`, supaya consumer tidak
        // pernah mengira ada item yang belum di-publish producer.
        let high = self.high.value.load(Ordering::Acquire);
        let low = self.low.value.load(Ordering::Acquire);
        let slot = self.slot(low);

        if slot.load(Ordering::Acquire).is_null() || high <= low {
            return Attempt::Blocked;
        }

        if self
            .low
            .value
            .compare_exchange(low, low + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return Attempt::Contended;
        }

        // Ambil dan kosongkan dalam satu swap. Release: clear visible sebelum
        // producer putaran berikutnya klaim index ini.
        let item = slot.swap(ptr::null_mut(), Ordering::AcqRel);
        debug_assert!(!item.is_null(), "consumer claimed an empty slot");

        // SAFETY: pointer berasal dari Box::into_raw di push, dan CAS pada
        // `low` menjamin hanya satu consumer yang mengambilnya.
        Attempt::Done(unsafe { Box::from_raw(item) })
    }

    /// Push item ke buffer (Producer side)
    ///
    /// Spin sampai ada slot kosong. Tidak pernah gagal, tidak pernah block
    /// di primitive OS. Lock-free, bukan wait-free.
    pub fn push(&self, item: Box<T>) {
        let item = Box::into_raw(item);
        loop {
            match self.attempt_push(item) {
                Attempt::Done(()) => return,
                Attempt::Blocked => spin(),
                Attempt::Contended => {}
            }
        }
    }

    /// Pop item dari buffer (Consumer side)
    ///
    /// Spin sampai ada item yang sudah di-publish.
    pub fn pop(&self) -> Box<T> {
        loop {
            match self.attempt_pop() {
                Attempt::Done(item) => return item,
                Attempt::Blocked => spin(),
                Attempt::Contended => {}
            }
        }
    }

    /// Push tanpa menunggu ruang kosong.
    ///
    /// Returns `Err(item)` jika buffer terlihat penuh. Kalah CAS tetap retry,
    /// jadi `Err` berarti admission check gagal, bukan contention.
    pub fn try_push(&self, item: Box<T>) -> Result<(), Box<T>> {
        let raw = Box::into_raw(item);
        loop {
            match self.attempt_push(raw) {
                Attempt::Done(()) => return Ok(()),
                // SAFETY: raw belum pernah disimpan ke slot mana pun
                Attempt::Blocked => return Err(unsafe { Box::from_raw(raw) }),
                Attempt::Contended => {}
            }
        }
    }

    /// Pop tanpa menunggu. Returns `None` jika buffer terlihat kosong.
    pub fn try_pop(&self) -> Option<Box<T>> {
        loop {
            match self.attempt_pop() {
                Attempt::Done(item) => return Some(item),
                Attempt::Blocked => return None,
                Attempt::Contended => {}
            }
        }
    }

    /// Push dengan deadline.
    ///
    /// Sama seperti [`push`](Self::push), tapi loop berhenti dan item
    /// dikembalikan setelah `deadline` lewat.
    pub fn push_until(&self, item: Box<T>, deadline: Instant) -> Result<(), Box<T>> {
        let raw = Box::into_raw(item);
        loop {
            match self.attempt_push(raw) {
                Attempt::Done(()) => return Ok(()),
                Attempt::Blocked | Attempt::Contended => {
                    if Instant::now() >= deadline {
                        // SAFETY: raw belum pernah disimpan ke slot mana pun
                        return Err(unsafe { Box::from_raw(raw) });
                    }
                    spin();
                }
            }
        }
    }

    /// Pop dengan deadline. Returns `None` jika `deadline` lewat duluan.
    pub fn pop_until(&self, deadline: Instant) -> Option<Box<T>> {
        loop {
            match self.attempt_pop() {
                Attempt::Done(item) => return Some(item),
                Attempt::Blocked | Attempt::Contended => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    spin();
                }
            }
        }
    }

    /// Push dengan timeout; timeout yang tidak muat di `Instant` = `push` biasa.
    pub fn push_timeout(&self, item: Box<T>, timeout: Duration) -> Result<(), Box<T>> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.push_until(item, deadline),
            None => {
                self.push(item);
                Ok(())
            }
        }
    }

    /// Pop dengan timeout; timeout yang tidak muat di `Instant` = `pop` biasa.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Box<T>> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.pop_until(deadline),
            None => Some(self.pop()),
        }
    }

    /// Jumlah elemen dalam buffer (snapshot, bisa stale saat ada contention)
    #[inline(always)]
    pub fn len(&self) -> usize {
        let high = self.high.value.load(Ordering::Acquire);
        let low = self.low.value.load(Ordering::Acquire);
        high.saturating_sub(low) as usize
    }

    /// Window occupancy dengan urutan baca push (`low` lalu `high`): tidak
    /// pernah under-estimate, jadi cocok untuk cek invariant `<= capacity`.
    #[cfg(all(test, not(loom)))]
    fn occupancy_window(&self) -> u64 {
        let low = self.low.value.load(Ordering::Acquire);
        let high = self.high.value.load(Ordering::Acquire);
        high - low
    }

    /// Cek apakah buffer kosong
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cek apakah buffer penuh
    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Kapasitas buffer
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // &mut self: tidak ada push/pop lain yang masih jalan
        for slot in self.slots.iter_mut() {
            let item = slot.swap(ptr::null_mut(), Ordering::Acquire);
            if !item.is_null() {
                // SAFETY: item non-null di slot selalu berasal dari Box::into_raw
                drop(unsafe { Box::from_raw(item) });
            }
        }
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("high", &self.high.value.load(Ordering::Relaxed))
            .field("low", &self.low.value.load(Ordering::Relaxed))
            .finish()
    }
}

#[inline(always)]
fn spin() {
    #[cfg(not(loom))]
    std::hint::spin_loop();

    // loom tidak bisa lanjut tanpa yield eksplisit
    #[cfg(loom)]
    loom::thread::yield_now();
}
