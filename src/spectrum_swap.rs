//! Single-producer/single-consumer spectrum sharing.
//!
//! The audio thread publishes its latest analyzed spectrum through a
//! double buffer with an atomic "current" index; a reader thread (UI)
//! pulls whole snapshots without locking. Handles follow the
//! producer/consumer split of the streaming ring buffer: each side is
//! `Send` but deliberately `!Sync`, so exactly one thread can hold it.

use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::spectrum::SpectrumValue;

/// Relaxed-ordering f32 carried in an `AtomicU32`; used for display-only
/// values such as the detected fundamental
pub struct AtomicF32(AtomicU32);

impl std::fmt::Debug for AtomicF32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicF32").field(&self.load()).finish()
    }
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Shared state of the double buffer. The producer owns the non-current
/// buffer exclusively; the index flip transfers ownership.
struct Inner {
    buffers: [UnsafeCell<Vec<SpectrumValue>>; 2],
    current: AtomicUsize,
}

// Access is split by the atomic index: the producer only touches the
// non-current buffer, the consumer only reads the current one.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

/// Producer handle: stages data into the hidden buffer and publishes it.
/// `Send` but not `Sync`; exactly one producer thread.
pub struct SpectrumProducer {
    inner: Arc<Inner>,
    _not_sync: PhantomData<Cell<()>>,
}

unsafe impl Send for SpectrumProducer {}

impl std::fmt::Debug for SpectrumProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumProducer").finish_non_exhaustive()
    }
}

/// Consumer handle: pulls the latest published snapshot.
/// `Send` but not `Sync`; exactly one consumer thread.
pub struct SpectrumConsumer {
    inner: Arc<Inner>,
    _not_sync: PhantomData<Cell<()>>,
}

unsafe impl Send for SpectrumConsumer {}

impl std::fmt::Debug for SpectrumConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumConsumer").finish_non_exhaustive()
    }
}

/// Create a double-buffered spectrum channel; both buffers reserve
/// `capacity` entries up front so staging never allocates on the audio path
pub fn spectrum_swap(capacity: usize) -> (SpectrumProducer, SpectrumConsumer) {
    let inner = Arc::new(Inner {
        buffers: [
            UnsafeCell::new(Vec::with_capacity(capacity)),
            UnsafeCell::new(Vec::with_capacity(capacity)),
        ],
        current: AtomicUsize::new(0),
    });
    (
        SpectrumProducer {
            inner: inner.clone(),
            _not_sync: PhantomData,
        },
        SpectrumConsumer {
            inner,
            _not_sync: PhantomData,
        },
    )
}

impl SpectrumProducer {
    #[inline]
    fn back_index(&self) -> usize {
        // the producer is the only writer of `current`
        1 - self.inner.current.load(Ordering::Relaxed)
    }

    /// Edit the staged (non-published) buffer in place
    pub fn apply<R>(&mut self, edit: impl FnOnce(&mut Vec<SpectrumValue>) -> R) -> R {
        let back = self.inner.buffers[self.back_index()].get();
        // producer-exclusive: the consumer never touches the back buffer
        edit(unsafe { &mut *back })
    }

    /// Read back the staged buffer (producer side only)
    pub fn staged(&self) -> &[SpectrumValue] {
        let back = self.inner.buffers[self.back_index()].get();
        unsafe { &*back }
    }

    /// Publish the staged buffer; the previously published one becomes the
    /// new staging area
    pub fn push(&mut self) {
        let back = self.back_index();
        self.inner.current.store(back, Ordering::Release);
    }

    /// Publish an empty spectrum
    pub fn clear(&mut self) {
        self.apply(|buffer| buffer.clear());
        self.push();
    }
}

impl SpectrumConsumer {
    /// Latest published snapshot. The returned view stays valid until the
    /// next `pull`; the producer must not publish twice while a view is
    /// held (display-rate reads satisfy this trivially).
    pub fn pull(&mut self) -> &[SpectrumValue] {
        let current = self.inner.current.load(Ordering::Acquire);
        unsafe { &*self.inner.buffers[current].get() }
    }
}
