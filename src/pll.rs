//! Software phase-locked loop reconstructing the sensor's sample clock.
//!
//! The device captures samples on an internal uniform clock, but the instants
//! at which they reach the host are quantized and jittered by the USB
//! transfer (residuals are small integer multiples of 1 ms around the
//! expected time of arrival). The loop below tracks phase and period in
//! integer nanoseconds and emits one reconstructed instant per sample; a
//! downstream interpolator maps the reclocked samples onto an integer-rate
//! grid.
//!
//! The loop-filter gains are deliberately integer shifts. They set the lock
//! time and residual jitter the interpolator is designed around; do not
//! replace them with floating-point smoothing.

/// Phase gain divisor of the loop filter.
const PHASE_GAIN: i64 = 128;
/// Frequency gain divisor.
const FREQ_GAIN: i64 = 1024;

/// Phase/period state. `t` is the reconstructed instant of the most recent
/// sample, `dt` the period estimate; both in nanoseconds.
#[derive(Debug, Default)]
pub struct Pll {
    t: Option<u64>,
    dt: i64,
}

impl Pll {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one arrival instant into the loop and return the reconstructed
    /// instant of the sample it carried, plus the lock indicator.
    ///
    /// The first call primes the phase and reports unlocked. The second call
    /// seeds the period from the first interval (arrivals must not go
    /// backwards). From then on the estimated period is applied and the
    /// residual error trimmed into phase and period by the loop filter. The
    /// loop is "locked" while the residual stays below half a period.
    pub fn correct(&mut self, arrival: u64) -> (u64, bool) {
        let Some(mut t) = self.t else {
            self.t = Some(arrival);
            return (arrival, false);
        };

        if self.dt == 0 {
            debug_assert!(arrival >= t, "arrival instants must be monotonic");
            self.dt = arrival.saturating_sub(t) as i64;
        }
        t = t.wrapping_add_signed(self.dt);

        let error = arrival.wrapping_sub(t) as i64;
        let locked = self.dt >= 2 * error.abs();

        t = t.wrapping_add_signed(error / PHASE_GAIN);
        self.dt += error / FREQ_GAIN;
        self.t = Some(t);
        (t, locked)
    }

    /// Current period estimate in nanoseconds; zero until the second sample.
    /// A non-positive value after that means the arrival sequence violated
    /// its monotonicity contract and the sample must be discarded.
    pub fn period(&self) -> i64 {
        self.dt
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    /// Nominal device period for these tests: 50 Hz arrivals.
    const P: u64 = 20_000_000;

    /// Roughly normal jitter: sum of twelve uniform draws, zero mean,
    /// sigma about `scale` nanoseconds, bounded by `6 * scale`.
    fn jitter(rng: &mut StdRng, scale: i64) -> i64 {
        (0..12).map(|_| rng.gen_range(-scale / 2..=scale / 2)).sum()
    }

    #[test]
    fn first_sample_primes_without_locking() {
        let mut pll = Pll::new();
        let (t, locked) = pll.correct(1_000);
        assert_eq!(t, 1_000);
        assert!(!locked);
        assert_eq!(pll.period(), 0);
    }

    #[test]
    fn second_sample_seeds_the_period() {
        let mut pll = Pll::new();
        pll.correct(0);
        let (t, locked) = pll.correct(P);
        assert_eq!(t, P);
        assert!(locked);
        assert_eq!(pll.period(), P as i64);
    }

    #[test]
    fn reconstructed_timeline_is_strictly_increasing() {
        // Millisecond-scale jitter, the worst the USB scheduling produces.
        let mut rng = StdRng::seed_from_u64(7);
        let mut pll = Pll::new();
        let mut last = None;
        for i in 0..1_000u64 {
            let arrival = (i * P).saturating_add_signed(jitter(&mut rng, 500_000));
            let (t, _) = pll.correct(arrival);
            if let Some(prev) = last {
                assert!(t > prev, "t regressed at sample {i}: {prev} -> {t}");
                assert!(pll.period() > 0);
            }
            last = Some(t);
        }
    }

    #[test]
    fn converges_on_jittered_arrivals_and_locks() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pll = Pll::new();
        let mut locked_at = None;
        for i in 0..1_000u64 {
            let arrival = (i * P).saturating_add_signed(jitter(&mut rng, 1_000));
            let (_, locked) = pll.correct(arrival);
            if i >= 200 {
                let err = (pll.period() - P as i64).abs();
                assert!(err < P as i64 / 100, "period off by {err} ns at sample {i}");
            }
            if locked && locked_at.is_none() {
                locked_at = Some(i);
            }
            if i >= 300 {
                assert!(locked, "lock lost at sample {i}");
            }
        }
        assert!(locked_at.unwrap() < 300);
    }

    #[test]
    fn uniform_arrivals_track_exactly() {
        let mut pll = Pll::new();
        for i in 0..100u64 {
            let (t, _) = pll.correct(i * P);
            assert_eq!(t, i * P);
        }
        assert_eq!(pll.period(), P as i64);
    }

    #[test]
    fn burst_with_repeated_arrival_yields_non_positive_period() {
        // Two samples in the same USB packet share one arrival instant; the
        // period seed comes out zero and the caller must drop the sample.
        let mut pll = Pll::new();
        pll.correct(5_000);
        pll.correct(5_000);
        assert_eq!(pll.period(), 0);
    }
}
