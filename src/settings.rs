//! Compensation settings.
//!
//! Defaults are the calibration measured on a Prusa Mini bowden setup. A TOML
//! file may override any subset of them:
//!
//! ```toml
//! hardlimit = 0.8
//!
//! [settling]
//! max_positive = 0.2
//!
//! [travel]
//! freeze_settling = true
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, WackError};

/// Quadratic extrusion correction `a + b*x + c*x²`, curve-fit from dial
/// indicator measurements of leftwise movement.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CurveSettings {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for CurveSettings {
    fn default() -> Self {
        Self {
            a: -0.6137273,
            b: 0.007144318,
            c: -0.00002054924,
        }
    }
}

/// Direction-dependent settling of the filament in the bowden tube.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettlingSettings {
    /// Rightwise settling, mm of extrusion per mm of X movement.
    pub positive_rate: f64,
    /// Leftwise settling, mm of extrusion per mm of X movement.
    pub negative_rate: f64,
    /// Upper bound of the settling accumulator.
    pub max_positive: f64,
}

impl Default for SettlingSettings {
    fn default() -> Self {
        Self {
            positive_rate: 0.01,
            negative_rate: 0.01,
            max_positive: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TravelSettings {
    /// Track `G0` moves, rewrite them to `G1` and give them an extrusion amount.
    pub enabled: bool,
    /// Leave the settling accumulator untouched on `G0` moves.
    pub freeze_settling: bool,
}

impl Default for TravelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            freeze_settling: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    /// Drop `;WIDTH` comment lines so viewers recompute width from geometry.
    pub remove_width_comments: bool,
    /// Emit a `;TRAVEL` line before moves that received a synthesized extrusion.
    pub annotate_travel: bool,
    /// Emit the intermediate compensation terms before each corrected move.
    pub verbose: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            remove_width_comments: true,
            annotate_travel: true,
            verbose: false,
        }
    }
}

/// All settings consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Limit the adjustment to this factor of the requested extrusion.
    ///
    /// Low values keep moves after arcs sane but let error accumulate.
    pub hardlimit: f64,
    /// Rewrite every `M221` to `S100`.
    pub force_full_flow: bool,
    /// Layer height assumed before the first extruding move.
    pub default_layer_height: f64,
    pub curve: CurveSettings,
    pub settling: SettlingSettings,
    pub travel: TravelSettings,
    pub output: OutputSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hardlimit: 5.0,
            force_full_flow: false,
            default_layer_height: 0.2,
            curve: CurveSettings::default(),
            settling: SettlingSettings::default(),
            travel: TravelSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| WackError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Rejects values the arithmetic cannot use. Physical sanity is the caller's concern.
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("hardlimit", self.hardlimit),
            ("default_layer_height", self.default_layer_height),
            ("curve.a", self.curve.a),
            ("curve.b", self.curve.b),
            ("curve.c", self.curve.c),
            ("settling.positive_rate", self.settling.positive_rate),
            ("settling.negative_rate", self.settling.negative_rate),
            ("settling.max_positive", self.settling.max_positive),
        ];

        if let Some((name, value)) = values.into_iter().find(|(_, v)| !v.is_finite()) {
            return Err(WackError::InvalidSetting { name, value });
        }
        if self.hardlimit < 0.0 {
            return Err(WackError::InvalidSetting {
                name: "hardlimit",
                value: self.hardlimit,
            });
        }
        Ok(())
    }
}
