//! WildDevine acquisition element.
//!
//! The sensor captures skin conductance and photoplethysmograph samples on an
//! internal uniform clock (about 30 Hz) but delivers them over USB with
//! millisecond-quantized arrival jitter. A collector thread reads the
//! interrupt endpoint, parses the textual record stream, reclocks each sample
//! through the software PLL, and prepends it to the shared queue. The
//! consumer-side [`WildDevine::fill`] interpolates the reclocked samples onto
//! an integer-rate grid with a truncated sinc kernel, emitting back-to-back
//! frames of two interleaved 32-bit float channels.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{error, info, warn};

use crate::errors::{DriverError, FlowError, FlowStatus, Result};
use crate::parser::RecordBuffer;
use crate::pll::Pll;
use crate::queue::{sample_diff, QueuedSample, SampleQueue};
use crate::usb::{PacketSource, ReadOutcome, UsbTransport, PACKET_SIZE};

// ============================================================================
// Constants
// ============================================================================

/// Output sample rate in Hz.
///
/// This is the rate of the interpolated output grid, not of the device; the
/// hardware's own capture rate is close to 30 Hz and is hidden by the
/// resampler. Earlier hardware revisions shipped with a 30 Hz output grid;
/// 50 Hz is the supported configuration.
pub const RATE: u64 = 50;

/// Bytes per output sample: two interleaved little-endian 32-bit floats,
/// channel 0 skin conductance, channel 1 photoplethysmograph.
pub const UNIT_SIZE: usize = 8;

/// Support of the interpolation kernel in samples; the sinc is truncated at
/// plus/minus half of this.
pub const KERNEL_LENGTH: i64 = 10;

/// Recommended `fill` size: 100 ms of output.
pub const BLOCKSIZE: usize = (RATE as usize / 10) * UNIT_SIZE;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// `version`/`serial` value meaning "not reported by the device yet".
const UNSEEN: u64 = u64::MAX;

// ============================================================================
// Data Types
// ============================================================================

/// Metadata for one emitted frame, in the style of a media-pipeline buffer.
///
/// `offset` counts output samples from stream start; frames are back-to-back
/// in offset space, so `offset_end` of one frame equals `offset` of the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    pub offset: u64,
    pub offset_end: u64,
    /// Presentation timestamp in nanoseconds, `offset` scaled by the rate.
    pub pts: u64,
    pub dts: u64,
    pub duration: u64,
}

/// Observer for the element's readable properties. Callbacks run on the
/// collector thread and fire on transitions only.
pub trait DeviceListener: Send + Sync {
    fn on_version(&self, _version: u64) {}
    fn on_serial(&self, _serial: u64) {}
    fn on_pll_locked(&self, _locked: bool) {}
}

/// Counters the collector updates as it runs. Readable at any time.
#[derive(Debug, Default)]
pub struct CollectStats {
    packets: AtomicU64,
    samples: AtomicU64,
    dropped: AtomicU64,
}

impl CollectStats {
    /// Packets successfully read from the device.
    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    /// Samples reclocked and queued.
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Samples discarded because the PLL had no period estimate yet.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// State shared between the element and its collector thread.
struct Shared {
    queue: SampleQueue,
    stop_requested: AtomicBool,
    version: AtomicU64,
    serial: AtomicU64,
    pll_locked: AtomicBool,
    stats: CollectStats,
    listener: Mutex<Option<Arc<dyn DeviceListener>>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            queue: SampleQueue::new(),
            stop_requested: AtomicBool::new(false),
            version: AtomicU64::new(UNSEEN),
            serial: AtomicU64::new(UNSEEN),
            pll_locked: AtomicBool::new(false),
            stats: CollectStats::default(),
            listener: Mutex::new(None),
        }
    }

    fn notify(&self, f: impl FnOnce(&dyn DeviceListener)) {
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            f(listener.as_ref());
        }
    }
}

// ============================================================================
// Element
// ============================================================================

/// The acquisition element: owns the device for the duration of an
/// acquisition and exposes the start/stop/unlock/fill surface a pull-based
/// host drives.
///
/// # Example
/// ```ignore
/// let mut element = WildDevine::new();
/// element.start()?;
/// let mut frame = vec![0u8; BLOCKSIZE];
/// loop {
///     match element.fill(&mut frame) {
///         Ok(meta) => consume(&frame, meta),
///         Err(_) => break,
///     }
/// }
/// element.stop()?;
/// ```
pub struct WildDevine {
    shared: Arc<Shared>,
    collect_thread: Option<JoinHandle<UsbTransport>>,
    /// Owned by the fill path; counts emitted output samples.
    next_offset: u64,
}

impl Default for WildDevine {
    fn default() -> Self {
        Self::new()
    }
}

impl WildDevine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            collect_thread: None,
            next_offset: 0,
        }
    }

    /// Register the observer for property transitions. Replaces any previous
    /// listener.
    pub fn set_listener(&self, listener: Arc<dyn DeviceListener>) {
        *self.shared.listener.lock().unwrap() = Some(listener);
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Open and claim the device, then spawn the collector thread. On any
    /// failure nothing is left claimed and no thread runs.
    pub fn start(&mut self) -> Result<()> {
        if self.collect_thread.is_some() {
            return Err(DriverError::AlreadyStarted);
        }

        let mut transport = UsbTransport::open()?;
        transport.claim()?;

        self.next_offset = 0;
        self.shared.queue.reset();
        self.shared.stop_requested.store(false, Ordering::Relaxed);
        self.shared.pll_locked.store(false, Ordering::Relaxed);

        let shared = Arc::clone(&self.shared);
        self.collect_thread = Some(
            thread::Builder::new()
                .name("wilddevine-collect".into())
                .spawn(move || collect_loop(transport, shared))?,
        );
        Ok(())
    }

    /// Stop the collector, drain the queue, and release the device.
    pub fn stop(&mut self) -> Result<()> {
        let thread = self.collect_thread.take().ok_or(DriverError::NotStarted)?;
        self.shared.stop_requested.store(true, Ordering::Relaxed);
        let mut transport = thread.join().map_err(|_| DriverError::CollectorPanicked)?;
        self.shared.queue.clear();
        transport.release();
        Ok(())
    }

    /// Cancel a blocked [`fill`](Self::fill). The collector notices the flag
    /// within one transport timeout, reports end-of-stream, and wakes the
    /// consumer.
    pub fn unlock(&self) {
        self.shared.stop_requested.store(true, Ordering::Relaxed);
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Hardware version number, once the device has reported one.
    pub fn version(&self) -> Option<u64> {
        match self.shared.version.load(Ordering::Relaxed) {
            UNSEEN => None,
            v => Some(v),
        }
    }

    /// Hardware serial number, once the device has reported one.
    pub fn serial(&self) -> Option<u64> {
        match self.shared.serial.load(Ordering::Relaxed) {
            UNSEEN => None,
            v => Some(v),
        }
    }

    /// Whether the sample-clock reconstruction is currently stable.
    pub fn pll_locked(&self) -> bool {
        self.shared.pll_locked.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> &CollectStats {
        &self.shared.stats
    }

    // ------------------------------------------------------------------------
    // Fill
    // ------------------------------------------------------------------------

    /// Produce the next frame of output.
    ///
    /// `out` must hold a whole number of samples ([`UNIT_SIZE`] bytes each).
    /// Blocks until the queue holds enough lookahead past the end of the
    /// frame for the right half of the kernel, then convolves each output
    /// instant with the queued samples and prunes the part of the queue no
    /// future instant can reach. If the collector has stopped, returns its
    /// status unchanged and writes nothing.
    pub fn fill(&mut self, out: &mut [u8]) -> std::result::Result<FrameMeta, FlowError> {
        assert_eq!(
            out.len() % UNIT_SIZE,
            0,
            "fill size must be a whole number of samples"
        );
        let length = (out.len() / UNIT_SIZE) as u64;

        let offset = self.next_offset;
        self.next_offset += length;
        let pts = scale_round(offset, NANOS_PER_SEC, RATE);
        let duration = scale_round(offset + length, NANOS_PER_SEC, RATE) - pts;
        let meta = FrameMeta {
            offset,
            offset_end: self.next_offset,
            pts,
            dts: pts,
            duration,
        };

        // After this the snapshot can be used without the lock: the collector
        // only prepends ahead of what we copied.
        let (status, snapshot) = self
            .shared
            .queue
            .wait_snapshot(pts + duration, KERNEL_LENGTH / 2);
        match status {
            FlowStatus::Ok => {}
            FlowStatus::Eos => return Err(FlowError::Eos),
            FlowStatus::Error => return Err(FlowError::Error),
        }

        let half = (KERNEL_LENGTH / 2) as f64;
        for (i, frame) in out.chunks_exact_mut(UNIT_SIZE).enumerate() {
            let t = pts + scale_round(i as u64, NANOS_PER_SEC, RATE);
            let mut scl = 0.0f64;
            let mut ppg = 0.0f64;
            for q in &snapshot {
                let dn = sample_diff(q.t, t, q.dt);
                if dn > half {
                    // too new for this output instant
                    continue;
                }
                if dn < -half {
                    // the rest of the snapshot is older still
                    break;
                }
                let kernel = sinc(dn);
                scl += kernel * q.scl as f64;
                ppg += kernel * q.ppg as f64;
            }
            frame[..4].copy_from_slice(&(scl as f32).to_le_bytes());
            frame[4..].copy_from_slice(&(ppg as f32).to_le_bytes());
        }

        if length > 0 {
            let t_last = pts + scale_round(length - 1, NANOS_PER_SEC, RATE);
            self.shared.queue.prune(t_last, KERNEL_LENGTH / 2);
        }
        Ok(meta)
    }
}

impl Drop for WildDevine {
    fn drop(&mut self) {
        if self.collect_thread.is_some() {
            // The interface must be released on every exit path.
            if let Err(e) = self.stop() {
                warn!("stopping on drop failed: {e}");
            }
        }
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Body of the collector thread: read packets, parse records, reclock samples
/// through the PLL, prepend them to the queue. Writes the terminal status and
/// wakes the consumer on every exit path, and hands the packet source back
/// for release.
fn collect_loop<S: PacketSource>(mut source: S, shared: Arc<Shared>) -> S {
    let base_time = Instant::now();
    let mut buffer = RecordBuffer::new();
    let mut pll = Pll::new();

    let status = loop {
        if shared.stop_requested.load(Ordering::Relaxed) {
            break FlowStatus::Eos;
        }

        let mut packet = [0u8; PACKET_SIZE];
        let t = match source.read_packet(&mut packet) {
            ReadOutcome::Packet => base_time.elapsed().as_nanos() as u64,
            ReadOutcome::Short(n) => {
                error!("read {n} bytes, expected {PACKET_SIZE}");
                break FlowStatus::Error;
            }
            ReadOutcome::Timeout => {
                // The device sends keepalive packets; silence means trouble.
                error!("timeout");
                break FlowStatus::Error;
            }
            ReadOutcome::Halted => {
                error!("transfer halted");
                break FlowStatus::Eos;
            }
            ReadOutcome::Overflow => {
                error!("transfer overflow");
                break FlowStatus::Error;
            }
            ReadOutcome::Unplugged => {
                error!("unplugged");
                break FlowStatus::Eos;
            }
            ReadOutcome::Unknown => {
                error!("unknown transport error");
                break FlowStatus::Error;
            }
        };
        shared.stats.packets.fetch_add(1, Ordering::Relaxed);

        // The first byte gives the number of remaining bytes that carry data.
        let count = (packet[0] as usize).min(PACKET_SIZE - 1);
        buffer.extend(&packet[1..1 + count]);

        if let Some(version) = buffer.version() {
            if shared.version.swap(version, Ordering::Relaxed) != version {
                info!("version = {version}");
                shared.notify(|l| l.on_version(version));
            }
        }

        if let Some(serial) = buffer.serial() {
            if shared.serial.swap(serial, Ordering::Relaxed) != serial {
                info!("serial = {serial}");
                shared.notify(|l| l.on_serial(serial));
            }
        }

        // All samples in one packet share the packet's arrival instant; the
        // PLL smooths the burstiness.
        for raw in buffer.drain_raw() {
            let (t_rec, locked) = pll.correct(t);
            let dt = pll.period();
            if dt > 0 {
                shared.queue.push(QueuedSample {
                    t: t_rec,
                    dt,
                    scl: raw.scl as f32 / 65536.0,
                    ppg: raw.ppg as f32 / 65536.0,
                });
                shared.stats.samples.fetch_add(1, Ordering::Relaxed);
            } else {
                warn!("dropping sample, no period estimate yet");
                shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            if shared.pll_locked.swap(locked, Ordering::Relaxed) != locked {
                info!("PLL {}", if locked { "locked" } else { "unlocked" });
                shared.notify(|l| l.on_pll_locked(locked));
            }
        }
    };

    shared.queue.finish(status);
    source
}

// ============================================================================
// Interpolation helpers
// ============================================================================

/// `round(value * num / den)` without intermediate overflow.
fn scale_round(value: u64, num: u64, den: u64) -> u64 {
    ((value as u128 * num as u128 + (den / 2) as u128) / den as u128) as u64
}

/// Normalised sinc, `sin(pi x) / (pi x)` with `sinc(0) = 1`.
fn sinc(x: f64) -> f64 {
    let x = x * std::f64::consts::PI;
    if x != 0.0 {
        x.sin() / x
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};

    use super::*;

    /// 50 Hz device period so sample instants land on the output grid.
    const P: u64 = 20_000_000;

    fn dc_sample(t: u64, level: f32) -> QueuedSample {
        QueuedSample {
            t,
            dt: P as i64,
            scl: level,
            ppg: level,
        }
    }

    fn decode(frame: &[u8]) -> Vec<(f32, f32)> {
        frame
            .chunks_exact(UNIT_SIZE)
            .map(|c| {
                (
                    f32::from_le_bytes(c[..4].try_into().unwrap()),
                    f32::from_le_bytes(c[4..].try_into().unwrap()),
                )
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Scripted packet source
    // ------------------------------------------------------------------------

    enum Step {
        /// Sleep, then deliver a packet carrying the payload bytes.
        After(Duration, &'static [u8]),
        /// Deliver a packet immediately.
        Data(&'static [u8]),
        /// Report a transport outcome.
        Fail(ReadOutcome),
    }

    struct Script {
        steps: VecDeque<Step>,
    }

    impl Script {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl PacketSource for Script {
        fn read_packet(&mut self, buf: &mut [u8; PACKET_SIZE]) -> ReadOutcome {
            match self.steps.pop_front() {
                Some(Step::After(delay, payload)) => {
                    std::thread::sleep(delay);
                    encode(buf, payload);
                    ReadOutcome::Packet
                }
                Some(Step::Data(payload)) => {
                    encode(buf, payload);
                    ReadOutcome::Packet
                }
                Some(Step::Fail(outcome)) => outcome,
                None => ReadOutcome::Unplugged,
            }
        }
    }

    fn encode(buf: &mut [u8; PACKET_SIZE], payload: &[u8]) {
        assert!(payload.len() < PACKET_SIZE);
        buf[0] = payload.len() as u8;
        buf[1..1 + payload.len()].copy_from_slice(payload);
    }

    /// Split one record across as many packets as it needs, sleeping before
    /// the first so consecutive records get distinct arrival instants.
    fn record(bytes: &'static [u8], delay: Duration) -> Vec<Step> {
        bytes
            .chunks(PACKET_SIZE - 1)
            .enumerate()
            .map(|(i, chunk)| {
                if i == 0 {
                    Step::After(delay, chunk)
                } else {
                    Step::Data(chunk)
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Collector
    // ------------------------------------------------------------------------

    #[test]
    fn collector_parses_records_and_reclocks_samples() {
        let mut steps = Vec::new();
        steps.extend(record(br"<VER>2A<\VER>", Duration::from_millis(1)));
        steps.extend(record(br"<SER>BEEF<\SER>", Duration::from_millis(1)));
        for _ in 0..3 {
            steps.extend(record(br"<RAW>8000 4000<\RAW>", Duration::from_millis(5)));
        }

        let element = WildDevine::new();
        let shared = Arc::clone(&element.shared);
        collect_loop(Script::new(steps), Arc::clone(&shared));

        // Script exhaustion reads as an unplug.
        assert_eq!(shared.queue.status(), FlowStatus::Eos);
        assert_eq!(element.version(), Some(0x2a));
        assert_eq!(element.serial(), Some(0xbeef));
        // The first sample predates any period estimate and is dropped.
        assert_eq!(element.stats().dropped(), 1);
        assert_eq!(element.stats().samples(), 2);
        let (_, snapshot) = shared.queue.wait_snapshot(0, -1);
        assert_eq!(snapshot.len(), 2);
        assert!((snapshot[0].scl - 0.5).abs() < 1e-6);
        assert!((snapshot[0].ppg - 0.25).abs() < 1e-6);
        assert!(snapshot[0].t > snapshot[1].t);
    }

    #[test]
    fn short_read_is_a_stream_error() {
        let steps = vec![
            Step::Data(br"<RAW>80"),
            Step::Fail(ReadOutcome::Short(7)),
        ];
        let mut element = WildDevine::new();
        let shared = Arc::clone(&element.shared);
        collect_loop(Script::new(steps), shared);

        assert_eq!(element.shared.queue.status(), FlowStatus::Error);
        let mut frame = vec![0u8; BLOCKSIZE];
        assert_eq!(element.fill(&mut frame), Err(FlowError::Error));
    }

    #[test]
    fn unplug_ends_the_stream() {
        let mut steps = record(br"<RAW>8000 4000<\RAW>", Duration::from_millis(1));
        steps.push(Step::Fail(ReadOutcome::Unplugged));
        let mut element = WildDevine::new();
        collect_loop(Script::new(steps), Arc::clone(&element.shared));

        let mut frame = vec![0u8; BLOCKSIZE];
        assert_eq!(element.fill(&mut frame), Err(FlowError::Eos));
    }

    #[test]
    fn timeout_is_a_stream_error() {
        let steps = vec![Step::Fail(ReadOutcome::Timeout)];
        let element = WildDevine::new();
        collect_loop(Script::new(steps), Arc::clone(&element.shared));
        assert_eq!(element.shared.queue.status(), FlowStatus::Error);
    }

    #[test]
    fn stop_request_ends_the_collector_before_it_reads() {
        let element = WildDevine::new();
        element.unlock();
        collect_loop(Script::new(Vec::new()), Arc::clone(&element.shared));
        assert_eq!(element.shared.queue.status(), FlowStatus::Eos);
    }

    struct Recorder {
        events: Mutex<Vec<(String, u64)>>,
    }

    impl DeviceListener for Recorder {
        fn on_version(&self, version: u64) {
            self.events.lock().unwrap().push(("version".into(), version));
        }
        fn on_serial(&self, serial: u64) {
            self.events.lock().unwrap().push(("serial".into(), serial));
        }
    }

    #[test]
    fn listener_fires_on_transition_only() {
        let mut steps = Vec::new();
        steps.extend(record(br"<VER>2A<\VER>", Duration::from_millis(1)));
        // The version record stays in the buffer (nothing consumes it until
        // RAW data overtakes it) and is seen again on the next read; the
        // listener must not fire twice.
        steps.extend(record(br"<RAW>8000 4000<\RAW>", Duration::from_millis(1)));
        steps.extend(record(br"<SER>1F<\SER>", Duration::from_millis(1)));

        let element = WildDevine::new();
        let recorder = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });
        element.set_listener(recorder.clone());
        collect_loop(Script::new(steps), Arc::clone(&element.shared));

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![("version".to_string(), 0x2a), ("serial".to_string(), 0x1f)]
        );
    }

    // ------------------------------------------------------------------------
    // Fill
    // ------------------------------------------------------------------------

    #[test]
    fn frames_are_contiguous_in_offset_and_time() {
        let mut element = WildDevine::new();
        for i in 0..32 {
            element.shared.queue.push(dc_sample(i * P, 0.5));
        }

        let mut frame = vec![0u8; BLOCKSIZE];
        let a = element.fill(&mut frame).unwrap();
        let b = element.fill(&mut frame).unwrap();

        assert_eq!(a.offset, 0);
        assert_eq!(a.offset_end - a.offset, (BLOCKSIZE / UNIT_SIZE) as u64);
        assert_eq!(b.offset, a.offset_end);
        assert_eq!(a.pts, 0);
        assert_eq!(a.duration, 100_000_000);
        assert_eq!(b.pts, a.pts + a.duration);
        assert_eq!(a.dts, a.pts);
    }

    #[test]
    fn constant_input_reproduces_the_constant() {
        let mut element = WildDevine::new();
        for i in 0..32 {
            element.shared.queue.push(dc_sample(i * P, 0.5));
        }

        let mut frame = vec![0u8; BLOCKSIZE];
        let mut outputs = Vec::new();
        for _ in 0..3 {
            element.fill(&mut frame).unwrap();
            outputs.extend(decode(&frame));
        }
        // Sample instants coincide with the output grid, so every kernel tap
        // but the center lands on a sinc zero.
        for &(scl, ppg) in &outputs {
            assert!((scl - 0.5).abs() < 1e-6, "scl = {scl}");
            assert!((ppg - 0.5).abs() < 1e-6, "ppg = {ppg}");
        }
    }

    #[test]
    fn resampler_matches_the_direct_sinc_sum() {
        // Device-realistic period off the output grid.
        let dp: u64 = 33_333_333;
        let values = |i: u64| (i % 7) as f32 / 7.0;

        let mut element = WildDevine::new();
        for i in 0..24 {
            element.shared.queue.push(QueuedSample {
                t: i * dp,
                dt: dp as i64,
                scl: values(i),
                ppg: 1.0 - values(i),
            });
        }

        let mut frame = vec![0u8; BLOCKSIZE];
        element.fill(&mut frame).unwrap();

        for (k, &(scl, ppg)) in decode(&frame).iter().enumerate() {
            let tau = scale_round(k as u64, NANOS_PER_SEC, RATE);
            let mut want_scl = 0.0f64;
            let mut want_ppg = 0.0f64;
            for i in 0..24u64 {
                let dn = sample_diff(i * dp, tau, dp as i64);
                if dn.abs() <= (KERNEL_LENGTH / 2) as f64 {
                    want_scl += sinc(dn) * values(i) as f64;
                    want_ppg += sinc(dn) * (1.0 - values(i)) as f64;
                }
            }
            assert!((scl as f64 - want_scl).abs() < 1e-6, "sample {k}");
            assert!((ppg as f64 - want_ppg).abs() < 1e-6, "sample {k}");
        }
    }

    #[test]
    fn fill_prunes_samples_behind_the_kernel() {
        let mut element = WildDevine::new();
        for i in 0..16 {
            element.shared.queue.push(dc_sample(i * P, 0.5));
        }

        let mut frame = vec![0u8; BLOCKSIZE];
        element.fill(&mut frame).unwrap();
        // Frame 0 ends at t = 80 ms; nothing is 5 periods behind that yet.
        assert_eq!(element.shared.queue.len(), 16);
        element.fill(&mut frame).unwrap();
        // Frame 1 ends at t = 180 ms; samples 0..=3 are beyond the kernel.
        assert_eq!(element.shared.queue.len(), 12);
    }

    #[test]
    fn fill_blocks_until_the_lookahead_arrives() {
        let mut element = WildDevine::new();
        let shared = Arc::clone(&element.shared);
        let started = Instant::now();
        let delay = Duration::from_millis(50);
        let producer = std::thread::spawn(move || {
            std::thread::sleep(delay);
            for i in 0..16 {
                shared.queue.push(dc_sample(i * P, 0.5));
            }
        });

        let mut frame = vec![0u8; BLOCKSIZE];
        let meta = element.fill(&mut frame).unwrap();
        assert!(started.elapsed() >= delay, "fill returned before the data");
        assert_eq!(meta.offset, 0);
        producer.join().unwrap();
    }

    #[test]
    fn scale_round_rounds_to_nearest() {
        assert_eq!(scale_round(0, NANOS_PER_SEC, RATE), 0);
        assert_eq!(scale_round(1, NANOS_PER_SEC, RATE), 20_000_000);
        assert_eq!(scale_round(1, 2, 3), 1);
        assert_eq!(scale_round(1, 1, 3), 0);
        // No overflow near u64 limits.
        assert_eq!(scale_round(u64::MAX / 2, 2, 1), u64::MAX - 1);
    }

    #[test]
    fn sinc_is_one_at_zero_and_zero_at_integers() {
        assert_eq!(sinc(0.0), 1.0);
        for n in 1..=5 {
            assert!(sinc(n as f64).abs() < 1e-15);
            assert!(sinc(-(n as f64)).abs() < 1e-15);
        }
    }
}
