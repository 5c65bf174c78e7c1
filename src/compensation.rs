//! Bowden extrusion compensation.
//!
//! The filament in a bowden tube lags differently depending on where the
//! carriage is on X and which way it last moved. Each move gets two terms:
//!
//! - a position term, the change of a quadratic curve `f(x)` fitted to
//!   measurements, between the start and end X of the move
//! - a settling term, a bounded accumulator that grows on rightwise moves
//!   and decays on leftwise moves
//!
//! Their sum is scaled by `Δx / 180` and added to the requested extrusion.

use crate::settings::{CurveSettings, Settings, SettlingSettings};

/// Normalization from curve units to a per-move extrusion quantity (mm of X).
pub const CHARACTERISTIC_LENGTH: f64 = 180.0;

pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

impl CurveSettings {
    pub fn eval(&self, x: f64) -> f64 {
        self.a + self.b * x + self.c * x * x
    }
}

/// Settling accumulator, threaded through the whole program.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Settling(pub f64);

impl Settling {
    pub fn advance(self, model: &SettlingSettings, dx: f64) -> Settling {
        let Settling(current) = self;
        if dx > 0.0 {
            Settling(f64::min(
                current + model.positive_rate * dx,
                model.max_positive,
            ))
        } else if dx < 0.0 {
            Settling(f64::max(current + model.negative_rate * dx, 0.0))
        } else {
            self
        }
    }

    pub fn in_bounds(self, model: &SettlingSettings) -> bool {
        (0.0..=model.max_positive).contains(&self.0)
    }
}

/// The part of a move the compensation looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveInput {
    pub x_prev: f64,
    pub x_new: f64,
    /// The move came from a `G0`.
    pub travel: bool,
    /// Requested extrusion (`E`), if the move has one.
    pub extrusion: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compensation {
    /// Accumulator after this move.
    pub settling: Settling,
    /// `f(x_new) - f(x_prev)`
    pub position_delta: f64,
    pub dx: f64,
    /// Extrusion added to the move, after clamping.
    pub adjustment: f64,
    /// New `E` value. `None` leaves the move as it is.
    pub extrusion: Option<f64>,
    /// The move had no `E` and one was created.
    pub synthesized: bool,
    /// Set when the accumulator left `[0, max_positive]` on this move.
    pub out_of_bounds: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct Compensator {
    pub curve: CurveSettings,
    pub settling: SettlingSettings,
    pub hardlimit: f64,
    pub synthesize_travel: bool,
    pub freeze_settling_on_travel: bool,
}

impl Compensator {
    pub fn new(settings: &Settings) -> Compensator {
        Compensator {
            curve: settings.curve,
            settling: settings.settling,
            hardlimit: settings.hardlimit,
            synthesize_travel: settings.travel.enabled,
            freeze_settling_on_travel: settings.travel.freeze_settling,
        }
    }

    /// Computes the corrected extrusion for one move.
    ///
    /// An accumulator outside its bound is reported and carried forward as is.
    pub fn compensate(&self, settling: Settling, input: MoveInput) -> Compensation {
        let position_delta = self.curve.eval(input.x_new) - self.curve.eval(input.x_prev);
        let dx = input.x_new - input.x_prev;

        let mut out_of_bounds = None;
        let settling = if input.travel && self.freeze_settling_on_travel {
            settling
        } else {
            let next = settling.advance(&self.settling, dx);
            if !next.in_bounds(&self.settling) {
                out_of_bounds = Some(next.0);
            }
            next
        };

        let mut adjustment = (position_delta + settling.0) / CHARACTERISTIC_LENGTH * dx;

        let (extrusion, synthesized) = match input.extrusion {
            Some(e) => {
                let limit = e.abs() * self.hardlimit;
                adjustment = adjustment.min(limit).max(-limit);
                (Some(round_to(e + adjustment, 5)), false)
            }
            None if self.synthesize_travel => (Some(round_to(adjustment, 5)), true),
            None => (None, false),
        };

        Compensation {
            settling,
            position_delta,
            dx,
            adjustment,
            extrusion,
            synthesized,
            out_of_bounds,
        }
    }
}
