//! Reconstructed-sample queue shared between the collector thread and the
//! fill path.
//!
//! Ordering is strict head-newest / tail-oldest: the collector only ever
//! prepends, the consumer reads from the head forward and prunes the stale
//! tail. The consumer takes a snapshot copy under the mutex and convolves
//! without holding it, so the collector is never blocked behind a frame's
//! worth of kernel evaluations.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::errors::FlowStatus;

/// One reclocked sample. `t` is the PLL's reconstructed instant, `dt` its
/// period estimate at the time of emission, both in nanoseconds; the two
/// channels are normalised to [0, 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedSample {
    pub t: u64,
    pub dt: i64,
    pub scl: f32,
    pub ppg: f32,
}

/// (t1 - t0) / dt
pub(crate) fn sample_diff(t1: u64, t0: u64, dt: i64) -> f64 {
    (t1 as i64).wrapping_sub(t0 as i64) as f64 / dt as f64
}

/// How many sample periods separate the newest queued sample from `t`;
/// -1 if the queue is empty.
pub(crate) fn look_ahead(samples: &VecDeque<QueuedSample>, t: u64) -> i64 {
    match samples.front() {
        Some(newest) => sample_diff(newest.t, t, newest.dt).round() as i64,
        None => -1,
    }
}

#[derive(Debug)]
struct Inner {
    /// Newest at the front, oldest at the back.
    samples: VecDeque<QueuedSample>,
    status: FlowStatus,
}

/// Mutex-and-condvar guarded queue; the condvar signals both "data arrived"
/// and "the collector stopped".
#[derive(Debug)]
pub struct SampleQueue {
    inner: Mutex<Inner>,
    data_avail: Condvar,
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                samples: VecDeque::new(),
                status: FlowStatus::Ok,
            }),
            data_avail: Condvar::new(),
        }
    }

    /// Prepend one sample and wake any waiting consumer.
    pub fn push(&self, sample: QueuedSample) {
        let mut inner = self.inner.lock().unwrap();
        inner.samples.push_front(sample);
        self.data_avail.notify_all();
    }

    /// Record why the stream stopped and wake the consumer so it can observe
    /// the status.
    pub fn finish(&self, status: FlowStatus) {
        let mut inner = self.inner.lock().unwrap();
        inner.status = status;
        self.data_avail.notify_all();
    }

    pub fn status(&self) -> FlowStatus {
        self.inner.lock().unwrap().status
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all samples, keeping the terminal status.
    pub fn clear(&self) {
        self.inner.lock().unwrap().samples.clear();
    }

    /// Drop all samples and reset the status for a fresh acquisition.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.samples.clear();
        inner.status = FlowStatus::Ok;
    }

    /// Block until the newest sample is at least `required` periods past
    /// `t_target` or the collector has stopped, then return the status and a
    /// head-to-tail snapshot of the samples.
    pub fn wait_snapshot(&self, t_target: u64, required: i64) -> (FlowStatus, Vec<QueuedSample>) {
        let mut inner = self.inner.lock().unwrap();
        while inner.status == FlowStatus::Ok && look_ahead(&inner.samples, t_target) < required {
            inner = self.data_avail.wait(inner).unwrap();
        }
        (inner.status, inner.samples.iter().copied().collect())
    }

    /// Drop samples from the tail that have fallen more than `horizon`
    /// periods behind `t`; neither this nor any later output instant can
    /// reach them.
    pub fn prune(&self, t: u64, horizon: i64) {
        let mut inner = self.inner.lock().unwrap();
        while let Some(oldest) = inner.samples.back() {
            if sample_diff(oldest.t, t, oldest.dt) < -(horizon as f64) {
                inner.samples.pop_back();
            } else {
                break;
            }
        }
    }
}
