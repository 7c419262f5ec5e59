use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

/// Largest value, in 32-bit words, a [`SeqCell`] can hold.
pub const MAX_WORDS: usize = 16;

/// A plain value that can be flattened into 32-bit words.
pub trait Packed: Copy {
    const WORDS: usize;

    fn pack(&self, out: &mut [u32]);

    fn unpack(words: &[u32]) -> Self;
}

/// Single-writer sequence cell.
///
/// The writer bumps the sequence to an odd value, stores the words and bumps it back to even.
/// Readers retry until they see the same even sequence before and after copying the words, so
/// a multi-word value is never observed half-written. Writers are never blocked by readers.
///
/// Only one thread may call [`SeqCell::store`] at a time. The device module guarantees this
/// by handing store access only to the owner of the field group.
pub struct SeqCell<T: Packed> {
    seq: AtomicU64,
    words: Box<[AtomicU32]>,
    _marker: PhantomData<T>,
}

impl<T: Packed> SeqCell<T> {
    pub fn new(value: T) -> Self {
        assert!(T::WORDS <= MAX_WORDS, "value does not fit into a SeqCell");
        let mut buf = [0u32; MAX_WORDS];
        value.pack(&mut buf[..T::WORDS]);
        Self {
            seq: AtomicU64::new(0),
            words: buf[..T::WORDS].iter().map(|w| AtomicU32::new(*w)).collect(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn store(&self, value: T) {
        let mut buf = [0u32; MAX_WORDS];
        value.pack(&mut buf[..T::WORDS]);

        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        for (slot, word) in self.words.iter().zip(buf.iter()) {
            slot.store(*word, Ordering::Relaxed);
        }
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    pub fn load(&self) -> T {
        let mut buf = [0u32; MAX_WORDS];
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            for (out, slot) in buf.iter_mut().zip(self.words.iter()) {
                *out = slot.load(Ordering::Relaxed);
            }
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return T::unpack(&buf[..T::WORDS]);
            }
            std::hint::spin_loop();
        }
    }

    /// Number of completed stores since creation.
    pub fn version(&self) -> u64 {
        self.seq.load(Ordering::Acquire) / 2
    }
}

impl<T: Packed + std::fmt::Debug> std::fmt::Debug for SeqCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqCell")
            .field("value", &self.load())
            .field("version", &self.version())
            .finish()
    }
}
