//! VarDiff EMA difficulty calculator. Deliberately free of I/O and locks —
//! a worker's session state is owned by the caller, seeded once from the
//! reconnect-memory cache, and threaded through on every retarget tick so
//! this component stays trivially unit-testable.

const ALPHA: f64 = 0.3;
const DEAD_BAND_LOW: f64 = 0.8;
const DEAD_BAND_HIGH: f64 = 1.2;
const FAST_RAMP_WINDOW: u32 = 3;
const FAST_RAMP_RATIO_THRESHOLD: f64 = 4.0;
const DAMPENING_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct VarDiffConfig {
    pub mindiff: i64,
    pub maxdiff: i64,
    pub target_shares_per_minute: f64,
    pub fast_ramp_max_jump: f64,
    pub default_difficulty: i64,
}

#[derive(Debug, Clone)]
pub struct VarDiffSession {
    pub current_difficulty: i64,
    pub ema_hashrate: Option<f64>,
    pub adjustment_count: u32,
    pub stable_count: u32,
    config: VarDiffConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DifficultyAction {
    Unchanged { difficulty: i64 },
    Adjusted { difficulty: i64, fast_ramp: bool },
}

impl DifficultyAction {
    pub fn difficulty(&self) -> i64 {
        match self {
            Self::Unchanged { difficulty } | Self::Adjusted { difficulty, .. } => *difficulty,
        }
    }
}

impl VarDiffSession {
    /// Seeds a fresh session. `reconnect_difficulty` should come from the
    /// worker's last persisted entry in the reconnect-memory cache if one
    /// exists and has not expired; otherwise pass `None` and the configured
    /// default is used. `ema_hashrate` and `adjustment_count` never persist
    /// across reconnects.
    pub fn new(config: VarDiffConfig, reconnect_difficulty: Option<i64>) -> Self {
        Self {
            current_difficulty: reconnect_difficulty.unwrap_or(config.default_difficulty),
            ema_hashrate: None,
            adjustment_count: 0,
            stable_count: 0,
            config,
        }
    }

    /// Folds in a freshly measured shares-per-minute sample and returns the
    /// recommended difficulty action.
    pub fn sample(&mut self, measured_shares_per_minute: f64) -> DifficultyAction {
        let ema = match self.ema_hashrate {
            None => measured_shares_per_minute,
            Some(prev) => ALPHA * measured_shares_per_minute + (1.0 - ALPHA) * prev,
        };
        self.ema_hashrate = Some(ema);

        let ratio = ema / self.config.target_shares_per_minute;

        if (DEAD_BAND_LOW..=DEAD_BAND_HIGH).contains(&ratio) {
            self.stable_count = self.stable_count.saturating_add(1);
            return DifficultyAction::Unchanged {
                difficulty: self.current_difficulty,
            };
        }

        let fast_ramp_eligible =
            self.adjustment_count < FAST_RAMP_WINDOW && ratio > FAST_RAMP_RATIO_THRESHOLD;

        let raw_new_difficulty = if fast_ramp_eligible {
            let direct = self.current_difficulty as f64 * ratio;
            let capped = self.current_difficulty as f64 * self.config.fast_ramp_max_jump;
            direct.min(capped)
        } else {
            self.current_difficulty as f64 * (1.0 + (ratio - 1.0) * DAMPENING_FACTOR)
        };

        let clamped = raw_new_difficulty
            .round()
            .clamp(self.config.mindiff as f64, self.config.maxdiff as f64) as i64;

        self.current_difficulty = clamped;
        self.adjustment_count = self.adjustment_count.saturating_add(1);

        DifficultyAction::Adjusted {
            difficulty: clamped,
            fast_ramp: fast_ramp_eligible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VarDiffConfig {
        VarDiffConfig {
            mindiff: 1,
            maxdiff: 1_000_000,
            target_shares_per_minute: 1.5,
            fast_ramp_max_jump: 8.0,
            default_difficulty: 2048,
        }
    }

    #[test]
    fn first_measurement_seeds_ema_directly() {
        let mut session = VarDiffSession::new(config(), None);
        session.sample(1.0);
        assert_eq!(session.ema_hashrate, Some(1.0));
    }

    #[test]
    fn ema_smoothing_matches_expected_sequence() {
        let mut session = VarDiffSession::new(config(), None);
        session.sample(1.0);
        assert!((session.ema_hashrate.unwrap() - 1.0).abs() < 1e-9);
        session.sample(2.0);
        assert!((session.ema_hashrate.unwrap() - 1.3).abs() < 1e-9);
        session.sample(2.0);
        assert!((session.ema_hashrate.unwrap() - 1.51).abs() < 0.01);
    }

    #[test]
    fn dead_band_leaves_difficulty_unchanged_and_counts_stable() {
        let mut session = VarDiffSession::new(config(), Some(4096));
        // ratio = ema / 1.5; choose a measurement landing inside [0.8, 1.2].
        let action = session.sample(1.5);
        assert_eq!(action, DifficultyAction::Unchanged { difficulty: 4096 });
        assert_eq!(session.stable_count, 1);
        assert_eq!(session.adjustment_count, 0);
    }

    #[test]
    fn dampened_adjustment_applies_half_the_correction() {
        let mut session = VarDiffSession::new(config(), Some(1000));
        // ema = 3.0 on first sample, ratio = 2.0, outside dead-band and below
        // the fast-ramp threshold of 4.0.
        let action = session.sample(3.0);
        let expected = (1000.0 * (1.0 + (2.0 - 1.0) * 0.5)).round() as i64;
        assert_eq!(action, DifficultyAction::Adjusted { difficulty: expected, fast_ramp: false });
        assert_eq!(session.adjustment_count, 1);
    }

    #[test]
    fn fast_ramp_triggers_within_first_three_adjustments_above_threshold() {
        let mut session = VarDiffSession::new(config(), Some(100));
        // ema = 9.0, ratio = 6.0 > 4.0, within first 3 adjustments.
        let action = session.sample(9.0);
        match action {
            DifficultyAction::Adjusted { difficulty, fast_ramp } => {
                assert!(fast_ramp);
                // capped at fast_ramp_max_jump (8.0x) rather than the raw 6x jump... actually
                // 6x < 8x cap here, so the direct jump applies.
                assert_eq!(difficulty, 600);
            }
            other => panic!("expected an adjustment, got {other:?}"),
        }
    }

    #[test]
    fn fast_ramp_jump_is_capped_by_fast_ramp_max_jump() {
        let mut cfg = config();
        cfg.fast_ramp_max_jump = 3.0;
        let mut session = VarDiffSession::new(cfg, Some(100));
        // ratio = 6.0, which would imply a 6x jump, but the cap is 3x.
        let action = session.sample(9.0);
        assert_eq!(action.difficulty(), 300);
    }

    #[test]
    fn fast_ramp_window_closes_after_three_adjustments() {
        let mut session = VarDiffSession::new(config(), Some(100));
        for _ in 0..FAST_RAMP_WINDOW {
            session.sample(9.0);
        }
        assert_eq!(session.adjustment_count, FAST_RAMP_WINDOW);
        let action = session.sample(9.0);
        match action {
            DifficultyAction::Adjusted { fast_ramp, .. } => assert!(!fast_ramp),
            other => panic!("expected an adjustment, got {other:?}"),
        }
    }

    #[test]
    fn result_is_always_clamped_to_configured_range() {
        let mut cfg = config();
        cfg.maxdiff = 500;
        let mut session = VarDiffSession::new(cfg, Some(100));
        let action = session.sample(9.0);
        assert!(action.difficulty() <= 500);
    }

    #[test]
    fn seeds_from_reconnect_difficulty_when_present() {
        let session = VarDiffSession::new(config(), Some(8192));
        assert_eq!(session.current_difficulty, 8192);
    }

    #[test]
    fn falls_back_to_default_difficulty_when_no_reconnect_entry() {
        let session = VarDiffSession::new(config(), None);
        assert_eq!(session.current_difficulty, config().default_difficulty);
    }
}
