//! Bowden extrusion compensation for sliced G-code.
//!
//! Rewrites the `E` amount of every move according to the carriage's X
//! position and direction of travel, compensating for filament lag in a
//! bowden tube (see prusa3d/Prusa-Firmware-Buddy#2997).
//!
//! # Example
//!
//! ```
//! use bowden_wack::{process_str, Settings};
//!
//! let processed = process_str("G1 X10 E0.5\n", &Settings::default()).unwrap();
//! assert_eq!(processed.render("\n"), "G1 X10 E.50385\n");
//! ```

pub mod compensation;
pub mod error;
pub mod format;
pub mod parser;
pub mod pipeline;
pub mod settings;
pub mod state;

pub use compensation::{Compensation, Compensator, MoveInput, Settling};
pub use error::{Result, WackError};
pub use parser::{Command, CommandKind, ParamValue, Parameter, Tokenizer};
pub use pipeline::{process_str, render_lines, Diagnostic, OutputLine, Processed, Processor};
pub use settings::Settings;
pub use state::{LayerTracker, MachineState, Modes, Positioning, StateTracker};
