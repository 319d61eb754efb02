//! Learning rate schedules
//!
//! - `StepDecay` - multiply by gamma every `step_size` epochs
//! - `Cosine` - cosine decay from the base rate to `eta_min` over `t_max` epochs
//! - `Plateau` - multiply by `factor` once validation loss stops improving
//!
//! The first two are driven by the epoch counter alone; `Plateau` consumes the
//! validation loss. Which kind a run uses is fixed when the schedule is built.

use std::f64::consts::PI;
use std::fmt;

use crate::{LabError, Result};

/// Smallest learning-rate change the plateau schedule will apply
const MIN_LR_CHANGE: f64 = 1e-8;

/// Declarative schedule recipe, turned into fresh state by [`ScheduleKind::build`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleKind {
    StepDecay {
        step_size: usize,
        gamma: f64,
    },
    Cosine {
        t_max: usize,
        eta_min: f64,
    },
    Plateau {
        factor: f64,
        patience: usize,
        /// Relative improvement required to reset patience
        threshold: f64,
        min_lr: f64,
    },
}

impl ScheduleKind {
    pub fn step_decay(step_size: usize, gamma: f64) -> Self {
        ScheduleKind::StepDecay { step_size, gamma }
    }

    pub fn cosine(t_max: usize) -> Self {
        ScheduleKind::Cosine {
            t_max,
            eta_min: 0.0,
        }
    }

    pub fn plateau(factor: f64, patience: usize) -> Self {
        ScheduleKind::Plateau {
            factor,
            patience,
            threshold: 1e-4,
            min_lr: 0.0,
        }
    }

    /// Build fresh schedule state starting at `base_lr`
    pub fn build(&self, base_lr: f64) -> Result<Schedule> {
        if !(base_lr.is_finite() && base_lr > 0.0) {
            return Err(LabError::Configuration(format!(
                "{} needs a positive base learning rate, got {}",
                self, base_lr
            )));
        }

        match *self {
            ScheduleKind::StepDecay { step_size, gamma } => {
                if step_size == 0 || !(gamma > 0.0 && gamma.is_finite()) {
                    return Err(LabError::Configuration(format!(
                        "step decay needs step_size >= 1 and gamma > 0, got {} and {}",
                        step_size, gamma
                    )));
                }
                Ok(Schedule::Epoch(EpochSchedule {
                    rule: EpochRule::StepDecay { step_size, gamma },
                    base_lr,
                    epoch: 0,
                }))
            }
            ScheduleKind::Cosine { t_max, eta_min } => {
                if t_max == 0 || !(0.0..=base_lr).contains(&eta_min) {
                    return Err(LabError::Configuration(format!(
                        "cosine decay needs t_max >= 1 and 0 <= eta_min <= {}, got {} and {}",
                        base_lr, t_max, eta_min
                    )));
                }
                Ok(Schedule::Epoch(EpochSchedule {
                    rule: EpochRule::Cosine { t_max, eta_min },
                    base_lr,
                    epoch: 0,
                }))
            }
            ScheduleKind::Plateau {
                factor,
                patience,
                threshold,
                min_lr,
            } => {
                if !(factor > 0.0 && factor < 1.0) || threshold < 0.0 || min_lr < 0.0 {
                    return Err(LabError::Configuration(format!(
                        "plateau needs 0 < factor < 1 and non-negative threshold/min_lr, got {}, {}, {}",
                        factor, threshold, min_lr
                    )));
                }
                Ok(Schedule::Feedback(PlateauSchedule {
                    lr: base_lr,
                    factor,
                    patience,
                    threshold,
                    min_lr,
                    best: f64::INFINITY,
                    bad_epochs: 0,
                }))
            }
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleKind::StepDecay { step_size, gamma } => {
                write!(f, "StepLR(step_size={}, gamma={})", step_size, gamma)
            }
            ScheduleKind::Cosine { t_max, eta_min } => {
                write!(f, "CosineAnnealing(t_max={}, eta_min={})", t_max, eta_min)
            }
            ScheduleKind::Plateau {
                factor, patience, ..
            } => write!(f, "ReduceLROnPlateau(factor={}, patience={})", factor, patience),
        }
    }
}

/// Live schedule state for one training run
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Advances on the epoch counter alone
    Epoch(EpochSchedule),
    /// Advances on observed validation loss
    Feedback(PlateauSchedule),
}

impl Schedule {
    /// Learning rate for the next epoch's training steps
    pub fn current_lr(&self) -> f64 {
        match self {
            Schedule::Epoch(s) => s.current_lr(),
            Schedule::Feedback(s) => s.lr,
        }
    }

    pub fn consumes_loss(&self) -> bool {
        matches!(self, Schedule::Feedback(_))
    }

    /// Advance once, after an epoch's evaluation. Returns the new rate.
    ///
    /// Epoch-driven schedules ignore `val_loss`; a feedback-driven schedule
    /// without one is a configuration error.
    pub fn step(&mut self, val_loss: Option<f64>) -> Result<f64> {
        match self {
            Schedule::Epoch(s) => {
                s.epoch += 1;
                Ok(s.current_lr())
            }
            Schedule::Feedback(s) => {
                let loss = val_loss.ok_or_else(|| {
                    LabError::Configuration(
                        "plateau schedule stepped without a validation loss".to_string(),
                    )
                })?;
                Ok(s.observe(loss))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum EpochRule {
    StepDecay { step_size: usize, gamma: f64 },
    Cosine { t_max: usize, eta_min: f64 },
}

/// Closed-form schedule over the number of completed epochs
#[derive(Debug, Clone)]
pub struct EpochSchedule {
    rule: EpochRule,
    base_lr: f64,
    epoch: usize,
}

impl EpochSchedule {
    pub fn current_lr(&self) -> f64 {
        match self.rule {
            EpochRule::StepDecay { step_size, gamma } => {
                self.base_lr * gamma.powi((self.epoch / step_size) as i32)
            }
            EpochRule::Cosine { t_max, eta_min } => {
                let progress = self.epoch as f64 / t_max as f64;
                eta_min + (self.base_lr - eta_min) * (1.0 + (PI * progress).cos()) / 2.0
            }
        }
    }
}

/// Reduce-on-plateau state (minimizing the observed loss)
#[derive(Debug, Clone)]
pub struct PlateauSchedule {
    lr: f64,
    factor: f64,
    patience: usize,
    threshold: f64,
    min_lr: f64,
    best: f64,
    bad_epochs: usize,
}

impl PlateauSchedule {
    fn observe(&mut self, loss: f64) -> f64 {
        if loss < self.best * (1.0 - self.threshold) {
            self.best = loss;
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.bad_epochs > self.patience {
            let reduced = (self.lr * self.factor).max(self.min_lr);
            if self.lr - reduced > MIN_LR_CHANGE {
                log::debug!("Plateau: reducing learning rate {:.6} -> {:.6}", self.lr, reduced);
                self.lr = reduced;
            }
            self.bad_epochs = 0;
        }

        self.lr
    }

    /// Best loss observed so far
    pub fn best(&self) -> f64 {
        self.best
    }

    /// Consecutive non-improving epochs since the last improvement or reduction
    pub fn bad_epochs(&self) -> usize {
        self.bad_epochs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_step_decay_closed_form() {
        let base = 0.05;
        let mut schedule = ScheduleKind::step_decay(5, 0.1).build(base).unwrap();
        assert!(!schedule.consumes_loss());

        for epoch in 0..20 {
            let expected = base * 0.1f64.powi((epoch / 5) as i32);
            assert_relative_eq!(schedule.current_lr(), expected, max_relative = 1e-12);
            schedule.step(Some(1.0)).unwrap();
        }
    }

    #[test]
    fn test_step_decay_ignores_loss() {
        let mut with_loss = ScheduleKind::step_decay(2, 0.5).build(1.0).unwrap();
        let mut without = ScheduleKind::step_decay(2, 0.5).build(1.0).unwrap();
        for loss in [3.0, 0.1, 9.0, f64::NAN] {
            assert_eq!(with_loss.step(Some(loss)).unwrap(), without.step(None).unwrap());
        }
        assert_relative_eq!(with_loss.current_lr(), 0.25);
    }

    #[test]
    fn test_cosine_endpoints() {
        let mut schedule = ScheduleKind::cosine(10).build(0.05).unwrap();
        assert_relative_eq!(schedule.current_lr(), 0.05);

        let mut previous = schedule.current_lr();
        for _ in 0..5 {
            let lr = schedule.step(None).unwrap();
            assert!(lr < previous);
            previous = lr;
        }
        assert_relative_eq!(schedule.current_lr(), 0.025, max_relative = 1e-12);

        for _ in 0..5 {
            schedule.step(None).unwrap();
        }
        assert!(schedule.current_lr().abs() < 1e-15);
    }

    #[test]
    fn test_plateau_waits_for_patience() {
        let mut schedule = ScheduleKind::plateau(0.5, 2).build(0.1).unwrap();
        assert!(schedule.consumes_loss());

        // Improvements keep the rate
        assert_eq!(schedule.step(Some(1.0)).unwrap(), 0.1);
        assert_eq!(schedule.step(Some(0.9)).unwrap(), 0.1);
        // Two non-improving epochs are within patience
        assert_eq!(schedule.step(Some(0.95)).unwrap(), 0.1);
        assert_eq!(schedule.step(Some(0.9)).unwrap(), 0.1);
        // Third one exceeds it
        assert_relative_eq!(schedule.step(Some(0.92)).unwrap(), 0.05);
        // Counter restarts after a reduction
        assert_relative_eq!(schedule.step(Some(0.93)).unwrap(), 0.05);
        assert_relative_eq!(schedule.step(Some(0.93)).unwrap(), 0.05);
        assert_relative_eq!(schedule.step(Some(0.93)).unwrap(), 0.025);
    }

    #[test]
    fn test_plateau_never_increases() {
        let mut schedule = ScheduleKind::plateau(0.5, 1).build(0.2).unwrap();
        let losses = [2.0, 1.0, 1.5, 1.5, 0.5, 3.0, 3.0, 0.1, 0.1, 0.1, 5.0];

        let mut previous = schedule.current_lr();
        for loss in losses {
            let lr = schedule.step(Some(loss)).unwrap();
            assert!(lr <= previous, "lr rose from {} to {}", previous, lr);
            previous = lr;
        }
        assert!(previous < 0.2);
    }

    #[test]
    fn test_plateau_relative_threshold() {
        let mut schedule = ScheduleKind::plateau(0.5, 0).build(1.0).unwrap();
        schedule.step(Some(1.0)).unwrap();
        // A sub-threshold improvement counts as a bad epoch
        assert_relative_eq!(schedule.step(Some(0.99999)).unwrap(), 0.5);
        if let Schedule::Feedback(state) = &schedule {
            assert_eq!(state.best(), 1.0);
            assert_eq!(state.bad_epochs(), 0);
        } else {
            panic!("plateau must be feedback-driven");
        }
    }

    #[test]
    fn test_plateau_respects_min_lr() {
        let kind = ScheduleKind::Plateau {
            factor: 0.1,
            patience: 0,
            threshold: 1e-4,
            min_lr: 0.01,
        };
        let mut schedule = kind.build(0.05).unwrap();
        schedule.step(Some(1.0)).unwrap();
        assert_relative_eq!(schedule.step(Some(1.0)).unwrap(), 0.01);
        assert_relative_eq!(schedule.step(Some(1.0)).unwrap(), 0.01);
    }

    #[test]
    fn test_plateau_without_loss_is_configuration_error() {
        let mut schedule = ScheduleKind::plateau(0.5, 2).build(0.1).unwrap();
        let err = schedule.step(None).unwrap_err();
        assert!(matches!(err, LabError::Configuration(_)));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(ScheduleKind::step_decay(0, 0.1).build(0.1).is_err());
        assert!(ScheduleKind::step_decay(5, 0.0).build(0.1).is_err());
        assert!(ScheduleKind::cosine(0).build(0.1).is_err());
        assert!(ScheduleKind::plateau(1.5, 2).build(0.1).is_err());
        assert!(ScheduleKind::plateau(0.5, 2).build(0.0).is_err());
    }
}
