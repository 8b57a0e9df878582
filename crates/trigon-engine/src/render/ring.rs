//! Rotating pool of per-frame uniform slots.
//!
//! Each slot cycles `Free -> Writing -> Submitted -> Free`. The CPU owns a
//! slot between [`UniformRingBuffer::acquire`] and [`UniformRingBuffer::submit`];
//! the GPU owns it until the returned [`SlotCompletion`] fires. Access to the
//! backing memory is partitioned by this protocol, not by locking the memory.
//!
//! ```text
//! slot_count = 3
//!
//! frame: 0   1   2   3   4   5
//! slot:  0   1   2   0   1   2
//!                    ^ waits for frame 0's completion if it has not fired
//! ```
//!
//! The permit count caps outstanding slots at `slot_count`, which bounds the
//! CPU/GPU skew to `slot_count` frames. Waits are unbounded: if the GPU never
//! reports completion (and the completion token is never dropped), `acquire`
//! never returns.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use bytemuck::Pod;
use parking_lot::{Condvar, Mutex};

use super::error::{RendererError, RendererResult};
use super::types::{align_up, UNIFORM_ALIGNMENT};

/// Ownership state of one ring slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlotState {
    Free,
    /// CPU owns the slot memory.
    Writing,
    /// GPU owns the slot memory; the CPU must not touch it.
    Submitted,
}

/// Proof that the CPU currently owns a slot.
///
/// Not `Clone`: it is consumed by [`UniformRingBuffer::submit`].
#[derive(Debug)]
#[must_use = "an acquired slot must be submitted"]
pub struct SlotHandle {
    slot: usize,
    offset: u64,
}

impl SlotHandle {
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Byte offset of the slot inside the ring's backing memory.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[derive(Debug)]
struct RingState {
    permits: usize,
    slots: Vec<SlotState>,
}

#[derive(Debug)]
struct RingShared {
    state: Mutex<RingState>,
    changed: Condvar,
}

impl RingShared {
    fn release(&self, slot: usize) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.slots[slot], SlotState::Submitted);
        state.slots[slot] = SlotState::Free;
        state.permits += 1;
        drop(state);
        self.changed.notify_all();
        log::trace!("uniform slot {slot} released");
    }
}

/// Completion token for a submitted slot.
///
/// Move it into the GPU completion callback. Completing it (or dropping it)
/// returns the slot to `Free` and releases one permit. It is `Send + 'static`
/// so it can fire on whichever thread observes GPU completion.
#[derive(Debug)]
pub struct SlotCompletion {
    shared: Arc<RingShared>,
    slot: usize,
}

impl SlotCompletion {
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Signals that the GPU finished reading the slot.
    pub fn complete(self) {
        drop(self);
    }
}

impl Drop for SlotCompletion {
    fn drop(&mut self) {
        self.shared.release(self.slot);
    }
}

/// Fixed pool of `slot_count` uniform records, packed at an aligned stride in
/// one CPU-writable region.
///
/// Slot selection is strictly round-robin. The ring is driven from a single
/// render thread; only completions may arrive from other threads.
pub struct UniformRingBuffer<T> {
    shared: Arc<RingShared>,
    staging: Vec<u8>,
    stride: usize,
    next_slot: usize,
    _record: PhantomData<fn(T)>,
}

impl<T: Pod> UniformRingBuffer<T> {
    /// Creates a ring with the default 256-byte slot alignment.
    pub fn new(slot_count: usize) -> RendererResult<Self> {
        Self::with_alignment(slot_count, UNIFORM_ALIGNMENT)
    }

    pub fn with_alignment(slot_count: usize, alignment: usize) -> RendererResult<Self> {
        if slot_count == 0 {
            return Err(RendererError::InvalidConfig(
                "uniform ring needs at least one slot".to_string(),
            ));
        }
        if !alignment.is_power_of_two() {
            return Err(RendererError::InvalidConfig(format!(
                "uniform alignment {alignment} is not a power of two"
            )));
        }

        let stride = align_up(std::mem::size_of::<T>().max(1), alignment);

        Ok(Self {
            shared: Arc::new(RingShared {
                state: Mutex::new(RingState {
                    permits: slot_count,
                    slots: vec![SlotState::Free; slot_count],
                }),
                changed: Condvar::new(),
            }),
            staging: vec![0; stride * slot_count],
            stride,
            next_slot: 0,
            _record: PhantomData,
        })
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.staging.len() / self.stride
    }

    /// Aligned size of one slot in bytes.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Total size of the backing memory.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.staging.len()
    }

    #[inline]
    pub fn offset_of(&self, slot: usize) -> u64 {
        (slot * self.stride) as u64
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.shared.state.lock().slots[slot]
    }

    /// Number of slots not currently `Free`.
    pub fn in_flight(&self) -> usize {
        self.slot_count() - self.shared.state.lock().permits
    }

    /// Slot the next acquire will hand out.
    #[inline]
    pub fn next_slot(&self) -> usize {
        self.next_slot
    }

    /// Takes the next slot in rotation, blocking until it is `Free`.
    ///
    /// This is the only blocking point of the render loop.
    pub fn acquire(&mut self) -> SlotHandle {
        let slot = self.next_slot;
        let mut state = self.shared.state.lock();
        while !can_take(&state, slot) {
            log::trace!("uniform slot {slot} busy; waiting for GPU completion");
            self.shared.changed.wait(&mut state);
        }
        take(&mut state, slot);
        drop(state);
        self.advance(slot)
    }

    /// Like [`acquire`](Self::acquire) but returns `None` instead of waiting.
    pub fn try_acquire(&mut self) -> Option<SlotHandle> {
        let slot = self.next_slot;
        let mut state = self.shared.state.lock();
        if !can_take(&state, slot) {
            return None;
        }
        take(&mut state, slot);
        drop(state);
        Some(self.advance(slot))
    }

    /// Like [`acquire`](Self::acquire) with an upper bound on the wait.
    pub fn acquire_timeout(&mut self, timeout: Duration) -> Option<SlotHandle> {
        let slot = self.next_slot;
        let mut state = self.shared.state.lock();
        while !can_take(&state, slot) {
            let timed_out = self.shared.changed.wait_for(&mut state, timeout).timed_out();
            if timed_out && !can_take(&state, slot) {
                return None;
            }
        }
        take(&mut state, slot);
        drop(state);
        Some(self.advance(slot))
    }

    /// Writes `value` into the slot's region of the backing memory.
    pub fn write(&mut self, handle: &SlotHandle, value: &T) {
        debug_assert_eq!(self.slot_state(handle.slot), SlotState::Writing);
        let start = handle.offset as usize;
        let bytes = bytemuck::bytes_of(value);
        self.staging[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Bytes of the record held by `handle`'s slot.
    pub fn slot_bytes(&self, handle: &SlotHandle) -> &[u8] {
        let start = handle.offset as usize;
        &self.staging[start..start + std::mem::size_of::<T>()]
    }

    /// Reads the record back from a slot.
    pub fn read(&self, handle: &SlotHandle) -> T {
        bytemuck::pod_read_unaligned(self.slot_bytes(handle))
    }

    /// Hands the slot to the GPU.
    ///
    /// The slot stays `Submitted` until the returned token completes.
    pub fn submit(&mut self, handle: SlotHandle) -> SlotCompletion {
        let mut state = self.shared.state.lock();
        debug_assert_eq!(state.slots[handle.slot], SlotState::Writing);
        state.slots[handle.slot] = SlotState::Submitted;
        drop(state);

        SlotCompletion {
            shared: Arc::clone(&self.shared),
            slot: handle.slot,
        }
    }

    /// Blocks until every slot is `Free`.
    pub fn wait_idle(&self) {
        let count = self.slot_count();
        let mut state = self.shared.state.lock();
        while state.permits < count {
            self.shared.changed.wait(&mut state);
        }
    }

    fn advance(&mut self, slot: usize) -> SlotHandle {
        self.next_slot = (slot + 1) % self.slot_count();
        log::trace!("uniform slot {slot} acquired");
        SlotHandle {
            slot,
            offset: self.offset_of(slot),
        }
    }
}

fn can_take(state: &RingState, slot: usize) -> bool {
    // With out-of-order completion a permit may exist while the next slot
    // in rotation is still owned by the GPU.
    state.permits > 0 && state.slots[slot] == SlotState::Free
}

fn take(state: &mut RingState, slot: usize) {
    state.permits -= 1;
    state.slots[slot] = SlotState::Writing;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::types::Uniforms;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;

    const SETTLE: Duration = Duration::from_millis(100);

    fn ring(n: usize) -> UniformRingBuffer<Uniforms> {
        UniformRingBuffer::new(n).unwrap()
    }

    // ── layout ────────────────────────────────────────────────────────────

    #[test]
    fn stride_is_aligned_uniform_size() {
        let r = ring(3);
        assert_eq!(r.stride(), 256);
        assert_eq!(r.byte_len(), 768);
        assert_eq!(
            (0..3).map(|i| r.offset_of(i)).collect::<Vec<_>>(),
            vec![0, 256, 512]
        );
    }

    #[test]
    fn custom_alignment() {
        let r = UniformRingBuffer::<Uniforms>::with_alignment(2, 512).unwrap();
        assert_eq!(r.stride(), 512);
        assert_eq!(r.offset_of(1), 512);
    }

    #[test]
    fn rejects_zero_slots_and_bad_alignment() {
        assert!(matches!(
            UniformRingBuffer::<Uniforms>::new(0),
            Err(RendererError::InvalidConfig(_))
        ));
        assert!(matches!(
            UniformRingBuffer::<Uniforms>::with_alignment(3, 100),
            Err(RendererError::InvalidConfig(_))
        ));
    }

    // ── rotation ──────────────────────────────────────────────────────────

    #[test]
    fn slots_rotate_round_robin() {
        let mut r = ring(3);
        let mut seen = Vec::new();
        for _ in 0..9 {
            let h = r.acquire();
            seen.push(h.slot());
            r.submit(h).complete();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn next_slot_tracks_rotation() {
        let mut r = ring(3);
        for expected in [0, 1, 2, 0] {
            assert_eq!(r.next_slot(), expected);
            let h = r.acquire();
            r.submit(h).complete();
        }
    }

    #[test]
    fn handle_offsets_follow_slots() {
        let mut r = ring(3);
        for i in 0..6 {
            let h = r.acquire();
            assert_eq!(h.offset(), ((i % 3) * 256) as u64);
            r.submit(h).complete();
        }
    }

    #[test]
    fn five_cycles_with_immediate_completion() {
        let mut r = ring(3);
        let mut seen = Vec::new();
        for _ in 0..5 {
            let h = r.try_acquire().expect("slot should be free without blocking");
            r.write(&h, &Uniforms::half_scale());
            seen.push(h.slot());
            r.submit(h).complete();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
        assert_eq!(r.in_flight(), 0);
    }

    // ── state machine ─────────────────────────────────────────────────────

    #[test]
    fn slot_states_follow_protocol() {
        let mut r = ring(2);
        assert_eq!(r.slot_state(0), SlotState::Free);

        let h = r.acquire();
        assert_eq!(r.slot_state(0), SlotState::Writing);
        assert_eq!(r.in_flight(), 1);

        let done = r.submit(h);
        assert_eq!(r.slot_state(0), SlotState::Submitted);
        assert_eq!(r.in_flight(), 1);

        done.complete();
        assert_eq!(r.slot_state(0), SlotState::Free);
        assert_eq!(r.in_flight(), 0);
    }

    #[test]
    fn dropping_completion_releases_slot() {
        let mut r = ring(1);
        let h = r.acquire();
        let done = r.submit(h);
        drop(done);
        assert!(r.try_acquire().is_some());
    }

    #[test]
    fn write_stores_exact_bytes() {
        let mut r = ring(3);
        let value = Uniforms::half_scale();
        for _ in 0..4 {
            let h = r.acquire();
            r.write(&h, &value);
            assert_eq!(r.slot_bytes(&h), bytemuck::bytes_of(&value));
            assert_eq!(r.read(&h), value);
            r.submit(h).complete();
        }
    }

    #[test]
    fn write_does_not_touch_other_slots() {
        let mut r = ring(3);
        let h0 = r.acquire();
        r.write(&h0, &Uniforms::half_scale());
        let d0 = r.submit(h0);

        let h1 = r.acquire();
        r.write(&h1, &Uniforms::default());
        assert_eq!(r.read(&h1), Uniforms::default());
        let d1 = r.submit(h1);

        let h2 = r.acquire();
        assert!(r.slot_bytes(&h2).iter().all(|&b| b == 0));
        let d2 = r.submit(h2);

        d0.complete();
        d1.complete();
        d2.complete();
    }

    // ── blocking ──────────────────────────────────────────────────────────

    #[test]
    fn try_acquire_fails_when_all_submitted() {
        let mut r = ring(3);
        let pending: Vec<_> = (0..3).map(|_| {
            let h = r.acquire();
            r.submit(h)
        }).collect();

        assert!(r.try_acquire().is_none());
        assert!(r.acquire_timeout(Duration::from_millis(20)).is_none());

        drop(pending);
        assert!(r.try_acquire().is_some());
    }

    #[test]
    fn fourth_acquire_blocks_until_completion() {
        let mut r = ring(3);
        let mut pending: Vec<_> = (0..3).map(|_| {
            let h = r.acquire();
            r.submit(h)
        }).collect();

        let acquired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&acquired);
        let (tx, rx) = mpsc::channel();

        let worker = thread::spawn(move || {
            let h = r.acquire();
            flag.store(true, Ordering::SeqCst);
            tx.send(h.slot()).unwrap();
            r.submit(h).complete();
        });

        thread::sleep(SETTLE);
        assert!(!acquired.load(Ordering::SeqCst), "acquire returned with all slots submitted");

        pending.remove(0).complete();

        let slot = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(slot, 0);
        worker.join().unwrap();
    }

    #[test]
    fn out_of_order_completion_does_not_hand_out_busy_slot() {
        let mut r = ring(3);
        let mut pending: Vec<_> = (0..3).map(|_| {
            let h = r.acquire();
            r.submit(h)
        }).collect();

        // Slot 1 finishes first; slot 0 (next in rotation) is still busy.
        let d1 = pending.remove(1);
        d1.complete();
        assert!(r.try_acquire().is_none());
        assert_eq!(r.slot_state(0), SlotState::Submitted);

        let d0 = pending.remove(0);
        d0.complete();
        let h = r.try_acquire().unwrap();
        assert_eq!(h.slot(), 0);
        r.submit(h).complete();

        drop(pending);
    }

    #[test]
    fn completion_may_fire_on_another_thread() {
        let mut r = ring(3);
        for _ in 0..12 {
            let h = r.acquire();
            r.write(&h, &Uniforms::half_scale());
            let done = r.submit(h);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(2));
                done.complete();
            });
        }
        r.wait_idle();
        assert_eq!(r.in_flight(), 0);
    }

    #[test]
    fn single_slot_blocks_until_gpu_wait() {
        let mut r = ring(1);
        let h = r.acquire();
        r.write(&h, &Uniforms::half_scale());
        let done = r.submit(h);

        let (gpu_tx, gpu_rx) = mpsc::channel::<()>();
        let gpu = thread::spawn(move || {
            // Completion is only signalled once the explicit wait is requested.
            gpu_rx.recv().unwrap();
            done.complete();
        });

        let acquired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&acquired);
        let cpu = thread::spawn(move || {
            let h = r.acquire();
            flag.store(true, Ordering::SeqCst);
            r.submit(h).complete();
        });

        thread::sleep(SETTLE);
        assert!(!acquired.load(Ordering::SeqCst));

        gpu_tx.send(()).unwrap();
        gpu.join().unwrap();
        cpu.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn wait_idle_returns_after_all_completions() {
        let mut r = ring(2);
        let d0 = {
            let h = r.acquire();
            r.submit(h)
        };
        let d1 = {
            let h = r.acquire();
            r.submit(h)
        };

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            d1.complete();
            thread::sleep(Duration::from_millis(20));
            d0.complete();
        });

        r.wait_idle();
        assert_eq!(r.in_flight(), 0);
        releaser.join().unwrap();
    }
}
