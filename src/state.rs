//! Machine state threaded from line to line.

use crate::parser::{Command, CommandKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Positioning {
    #[default]
    Absolute,
    Relative,
}

/// Coordinate (G90/G91) and extrusion (M82/M83) interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modes {
    pub position: Positioning,
    pub extrusion: Positioning,
}

impl Modes {
    /// Modes after `kind` executes. Only the four mode commands change anything.
    pub fn after(self, kind: CommandKind) -> Modes {
        match kind {
            CommandKind::PositionAbsolute => Modes {
                position: Positioning::Absolute,
                ..self
            },
            CommandKind::PositionRelative => Modes {
                position: Positioning::Relative,
                ..self
            },
            CommandKind::ExtrudeAbsolute => Modes {
                extrusion: Positioning::Absolute,
                ..self
            },
            CommandKind::ExtrudeRelative => Modes {
                extrusion: Positioning::Relative,
                ..self
            },
            _ => self,
        }
    }
}

/// Snapshot of the machine between two lines.
///
/// Axes are `None` until something sets them; readers treat unknown as the
/// machine origin.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineState {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub e: Option<f64>,
    pub f: Option<f64>,
    pub modes: Modes,
    pub layer_height: f64,
}

impl MachineState {
    /// State before the first line: all axes at zero, both modes absolute.
    pub fn origin(layer_height: f64) -> MachineState {
        MachineState {
            x: Some(0.0),
            y: Some(0.0),
            z: Some(0.0),
            e: Some(0.0),
            f: None,
            modes: Modes::default(),
            layer_height,
        }
    }

    pub fn x_or_origin(&self) -> f64 {
        self.x.unwrap_or(0.0)
    }

    pub fn z_or_origin(&self) -> f64 {
        self.z.unwrap_or(0.0)
    }

    pub fn e_or_origin(&self) -> f64 {
        self.e.unwrap_or(0.0)
    }
}

fn apply(axis: &mut Option<f64>, value: f64, positioning: Positioning) {
    *axis = match positioning {
        Positioning::Absolute => Some(value),
        Positioning::Relative => Some(axis.unwrap_or(0.0) + value),
    };
}

/// Derives the state after each command.
#[derive(Debug, Clone, Copy)]
pub struct StateTracker {
    /// Whether `G0` moves update the position like `G1`.
    pub track_rapid_moves: bool,
}

impl StateTracker {
    pub fn is_tracked_motion(&self, kind: CommandKind) -> bool {
        match kind {
            CommandKind::LinearMove | CommandKind::ArcMove => true,
            CommandKind::RapidMove => self.track_rapid_moves,
            _ => false,
        }
    }

    pub fn next_state(&self, command: &Command, prior: &MachineState) -> MachineState {
        let mut state = prior.clone();

        if self.is_tracked_motion(command.kind) {
            let modes = command.modes;
            for param in &command.parameters {
                let Some(value) = param.value.as_f64() else {
                    continue;
                };
                match param.name.as_str() {
                    "X" => apply(&mut state.x, value, modes.position),
                    "Y" => apply(&mut state.y, value, modes.position),
                    "Z" => apply(&mut state.z, value, modes.position),
                    "E" => apply(&mut state.e, value, modes.extrusion),
                    "F" => state.f = Some(value),
                    _ => (),
                }
            }
        }

        state.modes = command.modes.after(command.kind);
        state
    }
}

const Z_EPSILON: f64 = 1e-6;

/// Best-effort Z-hop bookkeeping.
///
/// Lifting above the Z of the last extruding move without extruding is taken
/// as a Z-hop: the layer height is set aside (and reads as zero) until the
/// nozzle comes back down or extrudes again.
#[derive(Debug, Clone)]
pub struct LayerTracker {
    baseline_z: f64,
    layer_height: f64,
    saved_layer_height: Option<f64>,
}

impl LayerTracker {
    pub fn new(layer_height: f64) -> LayerTracker {
        LayerTracker {
            baseline_z: 0.0,
            layer_height,
            saved_layer_height: None,
        }
    }

    pub fn observe(&mut self, prior: &MachineState, next: &MachineState) -> f64 {
        let z = next.z_or_origin();
        let extruding = next.e_or_origin() > prior.e_or_origin();

        if !extruding && z > self.baseline_z + Z_EPSILON {
            if self.saved_layer_height.is_none() {
                self.saved_layer_height = Some(self.layer_height);
                self.layer_height = 0.0;
            }
        } else {
            if let Some(saved) = self.saved_layer_height.take() {
                self.layer_height = saved;
            }
            if extruding {
                self.baseline_z = z;
            }
        }

        self.layer_height
    }
}
