//! Rendering commands back to G-code text.
//!
//! Numbers use the compact form firmware accepts: fixed precision, trailing
//! zeros dropped, no leading zero (`0.125` -> `.125`).

use std::fmt;

use crate::parser::{Command, ParamValue, Parameter};

pub const AXIS_PRECISION: usize = 3;
pub const EXTRUSION_PRECISION: usize = 5;

pub fn format_number(value: f64, precision: usize) -> String {
    let s = format!("{value:.precision$}");
    let s = s.trim_end_matches('0').trim_end_matches('.');

    if s == "-0" {
        "0".to_string()
    } else if let Some(rest) = s.strip_prefix("0.") {
        format!(".{rest}")
    } else if let Some(rest) = s.strip_prefix("-0.") {
        format!("-.{rest}")
    } else {
        s.to_string()
    }
}

/// Whole reals keep their point (`F1500.0`) so they read back as reals.
/// Only used for values without source text.
fn format_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn precision_for(name: &str) -> Option<usize> {
    match name {
        "X" | "Y" | "Z" => Some(AXIS_PRECISION),
        "E" => Some(EXTRUSION_PRECISION),
        _ => None,
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = &self.name;
        match (self.value, precision_for(name), &self.raw) {
            (ParamValue::Flag, _, _) => write!(f, "{name}"),
            (value, Some(precision), _) => {
                let n = value.as_f64().unwrap_or_default();
                write!(f, "{name}{}", format_number(n, precision))
            }
            (_, None, Some(raw)) => write!(f, "{name}{raw}"),
            (ParamValue::Int(i), None, None) => write!(f, "{name}{i}"),
            (ParamValue::Real(r), None, None) => write!(f, "{name}{}", format_real(r)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut empty = true;

        if let Some(word) = &self.word {
            write!(f, "{word}")?;
            empty = word.is_empty();
            for param in &self.parameters {
                write!(f, " {param}")?;
            }
        }

        // single-character comments are dropped
        match &self.comment {
            Some(comment) if comment.chars().count() > 1 => {
                if empty {
                    write!(f, "; {comment}")
                } else {
                    write!(f, " ; {comment}")
                }
            }
            _ => Ok(()),
        }
    }
}
