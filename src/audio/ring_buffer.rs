//! Jitter-absorbing byte ring buffer: non-blocking drop-oldest writes,
//! timed-blocking silence-insert reads, target-fill startup gating
//! (spec.md §4.6).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

struct State {
    data: VecDeque<u8>,
    capacity: usize,
    has_reached_target: bool,
    underrun_count: u64,
    overrun_count: u64,
}

pub struct AudioRingBuffer {
    state: Mutex<State>,
    notify: Notify,
    target_fill_bytes: usize,
}

impl AudioRingBuffer {
    /// `capacity` and `target_fill_bytes` are both in bytes; callers derive
    /// them from `sample_rate * bytes_per_sample * {buffer_ms, target_latency_ms}`.
    pub fn new(capacity: usize, target_fill_bytes: usize) -> Self {
        Self {
            state: Mutex::new(State {
                data: VecDeque::with_capacity(capacity),
                capacity,
                has_reached_target: false,
                underrun_count: 0,
                overrun_count: 0,
            }),
            notify: Notify::new(),
            target_fill_bytes,
        }
    }

    /// Always succeeds. On overflow, discards the oldest bytes needed to
    /// make room and increments `overrun_count`.
    pub fn write(&self, bytes: &[u8]) {
        {
            let mut state = self.state.lock().expect("ring buffer mutex poisoned");
            let capacity = state.capacity;
            if state.data.len() + bytes.len() > capacity {
                let overflow = state.data.len() + bytes.len() - capacity;
                for _ in 0..overflow.min(state.data.len()) {
                    state.data.pop_front();
                }
                state.overrun_count += 1;
            }
            state.data.extend(bytes.iter().copied());
            if !state.has_reached_target && state.data.len() >= self.target_fill_bytes {
                state.has_reached_target = true;
            }
        }
        self.notify.notify_waiters();
    }

    /// Blocks up to `timeout` for at least `min_read` bytes to become
    /// available, then drains up to `out.len()` bytes into `out`. Returns
    /// the number of bytes actually read; `0` on a timed-out underrun
    /// (caller inserts silence and counts it).
    pub async fn read(&self, out: &mut [u8], min_read: usize, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock().expect("ring buffer mutex poisoned");
                if state.data.len() >= min_read.min(out.len()).max(1) && !state.data.is_empty() {
                    let n = out.len().min(state.data.len());
                    for slot in out.iter_mut().take(n) {
                        *slot = state.data.pop_front().expect("checked len above");
                    }
                    return n;
                }
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                let mut state = self.state.lock().expect("ring buffer mutex poisoned");
                state.underrun_count += 1;
                return 0;
            }
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    pub fn has_reached_target(&self) -> bool {
        self.state.lock().expect("ring buffer mutex poisoned").has_reached_target
    }

    /// Resets startup gating, e.g. on session disconnect/reconnect.
    pub fn reset_target_gate(&self) {
        self.state.lock().expect("ring buffer mutex poisoned").has_reached_target = false;
    }

    pub fn available(&self) -> usize {
        self.state.lock().expect("ring buffer mutex poisoned").data.len()
    }

    pub fn underrun_count(&self) -> u64 {
        self.state.lock().expect("ring buffer mutex poisoned").underrun_count
    }

    pub fn overrun_count(&self) -> u64 {
        self.state.lock().expect("ring buffer mutex poisoned").overrun_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_available_tracks_bytes() {
        let rb = AudioRingBuffer::new(1024, 100);
        rb.write(&[1, 2, 3, 4]);
        assert_eq!(rb.available(), 4);
    }

    #[test]
    fn overflow_drops_oldest_and_counts_overrun() {
        let rb = AudioRingBuffer::new(4, 100);
        rb.write(&[1, 2, 3, 4]);
        rb.write(&[5, 6]);
        assert_eq!(rb.available(), 4);
        assert_eq!(rb.overrun_count(), 1);
    }

    #[test]
    fn has_reached_target_latches_and_resets() {
        let rb = AudioRingBuffer::new(1024, 10);
        assert!(!rb.has_reached_target());
        rb.write(&[0u8; 10]);
        assert!(rb.has_reached_target());
        rb.reset_target_gate();
        assert!(!rb.has_reached_target());
    }

    #[tokio::test]
    async fn read_drains_available_bytes() {
        let rb = AudioRingBuffer::new(1024, 10);
        rb.write(&[1, 2, 3, 4, 5]);
        let mut out = [0u8; 3];
        let n = rb.read(&mut out, 1, Duration::from_millis(50)).await;
        assert_eq!(n, 3);
        assert_eq!(&out, &[1, 2, 3]);
        assert_eq!(rb.available(), 2);
    }

    #[tokio::test]
    async fn read_times_out_and_counts_underrun() {
        let rb = AudioRingBuffer::new(1024, 10);
        let mut out = [0u8; 3];
        let n = rb.read(&mut out, 1, Duration::from_millis(20)).await;
        assert_eq!(n, 0);
        assert_eq!(rb.underrun_count(), 1);
    }

    #[test]
    fn counters_are_monotonic_non_decreasing() {
        let rb = AudioRingBuffer::new(2, 1);
        let mut last_overrun = 0;
        for _ in 0..5 {
            rb.write(&[1, 2, 3]);
            assert!(rb.overrun_count() >= last_overrun);
            last_overrun = rb.overrun_count();
        }
    }
}
