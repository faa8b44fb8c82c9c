//! Rolling busy/idle load estimate (spec.md §4.3, ported from
//! `thread/load_counter.h`'s `ThreadLoadCounterImpl`).
//!
//! Private to one executor; mutated only on that executor's own thread
//! via [`LoadCounter::going_idle`]/[`LoadCounter::going_busy`]. Reads
//! (`load`) may happen from any thread and need not be sequentially
//! consistent — callers get the freshest estimate, never a torn one,
//! since the whole ring lives behind one mutex.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Sample {
    dur: Duration,
    busy: bool,
}

struct State {
    samples: VecDeque<Sample>,
    busy_sum: Duration,
    idle_sum: Duration,
    phase_busy: bool,
    phase_start: Instant,
}

/// Bounded ring of (duration, phase) samples plus the in-progress
/// phase. `load()` returns the busy percentage over the retained
/// window; `max_samples`/`max_duration` bound how much history is kept.
pub struct LoadCounter {
    max_samples: usize,
    max_duration: Duration,
    state: Mutex<State>,
}

impl LoadCounter {
    pub fn new(max_samples: usize, max_duration: Duration) -> Self {
        LoadCounter {
            max_samples,
            max_duration,
            state: Mutex::new(State {
                samples: VecDeque::new(),
                busy_sum: Duration::ZERO,
                idle_sum: Duration::ZERO,
                phase_busy: false,
                phase_start: Instant::now(),
            }),
        }
    }

    /// Record that the executor is about to block waiting for work.
    /// Call immediately before `epoll_wait`/queue `pop`.
    pub fn going_idle(&self) {
        self.transition(false);
    }

    /// Record that the executor has woken up with work to do. Call
    /// immediately after the blocking wait returns.
    pub fn going_busy(&self) {
        self.transition(true);
    }

    fn transition(&self, next_busy: bool) {
        let mut s = self.state.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(s.phase_start);
        let was_busy = s.phase_busy;
        s.phase_busy = next_busy;
        s.phase_start = now;

        if was_busy {
            s.busy_sum += elapsed;
        } else {
            s.idle_sum += elapsed;
        }
        s.samples.push_back(Sample {
            dur: elapsed,
            busy: was_busy,
        });
        self.evict(&mut s);
    }

    fn evict(&self, s: &mut State) {
        while s.samples.len() > self.max_samples
            || (s.busy_sum + s.idle_sum) > self.max_duration
        {
            let Some(oldest) = s.samples.pop_front() else {
                break;
            };
            if oldest.busy {
                s.busy_sum -= oldest.dur;
            } else {
                s.idle_sum -= oldest.dur;
            }
        }
    }

    /// Integer percentage `busy / (busy + idle)` in `0..=100`, over the
    /// retained window plus the current in-progress phase. Returns 0
    /// when the total is zero (fresh counter, never transitioned).
    pub fn load(&self) -> u32 {
        let mut s = self.state.lock().unwrap();
        let now = Instant::now();
        let in_progress = now.duration_since(s.phase_start);

        let (mut busy, mut idle) = (s.busy_sum, s.idle_sum);
        if s.phase_busy {
            busy += in_progress;
        } else {
            idle += in_progress;
        }

        self.evict(&mut s);

        let total_us = (busy + idle).as_micros();
        if total_us == 0 {
            return 0;
        }
        (busy.as_micros() * 100 / total_us) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn fresh_counter_reports_zero() {
        let lc = LoadCounter::new(32, Duration::from_secs(2));
        assert_eq!(lc.load(), 0);
    }

    #[test]
    fn load_is_always_in_bounds() {
        let lc = LoadCounter::new(32, Duration::from_secs(2));
        lc.going_busy();
        sleep(Duration::from_millis(5));
        lc.going_idle();
        sleep(Duration::from_millis(5));
        let l = lc.load();
        assert!(l <= 100);
    }

    #[test]
    fn mostly_busy_reports_high_load() {
        let lc = LoadCounter::new(32, Duration::from_secs(10));
        for _ in 0..5 {
            lc.going_busy();
            sleep(Duration::from_millis(10));
            lc.going_idle();
            sleep(Duration::from_millis(1));
        }
        lc.going_busy();
        assert!(lc.load() > 50);
    }

    #[test]
    fn window_evicts_old_samples_by_count() {
        let lc = LoadCounter::new(2, Duration::from_secs(60));
        for _ in 0..10 {
            lc.going_busy();
            lc.going_idle();
        }
        let s = lc.state.lock().unwrap();
        assert!(s.samples.len() <= 2);
    }
}
