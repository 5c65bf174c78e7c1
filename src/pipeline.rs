//! The per-line fold: tokenize, track state, compensate.

use std::fmt;

use crate::compensation::{Compensation, Compensator, MoveInput, Settling};
use crate::error::Result;
use crate::parser::{Command, CommandKind, ParamValue, Tokenizer};
use crate::settings::Settings;
use crate::state::{LayerTracker, MachineState, StateTracker};

/// Something worth telling the user about. Never fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    SettlingOutOfBounds { line: usize, value: f64 },
    FullFlowForced { line: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SettlingOutOfBounds { line, value } => write!(
                f,
                "line {line}: settling out of bounds: {value} (settling rates must both be positive)"
            ),
            Diagnostic::FullFlowForced { line } => {
                write!(f, "line {line}: forcing full flow, M221 changed to S100")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Command(Command),
    /// Comment line generated by the compensation.
    Annotation(String),
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputLine::Command(command) => write!(f, "{command}"),
            OutputLine::Annotation(text) => f.write_str(text),
        }
    }
}

pub struct Processor<'a> {
    settings: &'a Settings,
    tokenizer: Tokenizer,
    tracker: StateTracker,
    compensator: Compensator,
    state: MachineState,
    settling: Settling,
    layers: LayerTracker,
    next_index: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Processor<'a> {
    pub fn new(settings: &'a Settings) -> Result<Processor<'a>> {
        Ok(Processor {
            settings,
            tokenizer: Tokenizer::new()?,
            tracker: StateTracker {
                track_rapid_moves: settings.travel.enabled,
            },
            compensator: Compensator::new(settings),
            state: MachineState::origin(settings.default_layer_height),
            settling: Settling::default(),
            layers: LayerTracker::new(settings.default_layer_height),
            next_index: 1,
            diagnostics: Vec::new(),
        })
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn settling(&self) -> Settling {
        self.settling
    }

    /// Takes the diagnostics collected so far.
    pub fn drain_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Processes one input line, appending its output (annotations first).
    pub fn process_line(&mut self, line: &str, out: &mut Vec<OutputLine>) {
        let mut command = self.tokenizer.parse(line, &self.state, self.next_index);

        if command.kind == CommandKind::FlowOverride && self.settings.force_full_flow {
            command.set_param("S", ParamValue::Int(100));
            self.diagnostics.push(Diagnostic::FullFlowForced {
                line: command.index,
            });
        }

        if self.settings.output.remove_width_comments && command.is_width_annotation() {
            return;
        }

        self.next_index += 1;

        let mut next = self.tracker.next_state(&command, &self.state);
        let travel = command.kind == CommandKind::RapidMove && self.settings.travel.enabled;

        if self.tracker.is_tracked_motion(command.kind) {
            next.layer_height = self.layers.observe(&self.state, &next);

            if command.value("X").is_some() {
                let input = MoveInput {
                    x_prev: self.state.x_or_origin(),
                    x_new: next.x_or_origin(),
                    travel,
                    extrusion: command.value("E"),
                };
                let comp = self.compensator.compensate(self.settling, input);
                self.apply(&mut command, &comp, out);
            }
        }

        if travel {
            command.word = Some("G1".to_string());
        }

        self.state = next;
        out.push(OutputLine::Command(command));
    }

    fn apply(&mut self, command: &mut Command, comp: &Compensation, out: &mut Vec<OutputLine>) {
        self.settling = comp.settling;

        if let Some(value) = comp.out_of_bounds {
            self.diagnostics.push(Diagnostic::SettlingOutOfBounds {
                line: command.index,
                value,
            });
        }

        if let Some(e) = comp.extrusion {
            command.set_param("E", ParamValue::Real(e));
        }

        if comp.synthesized && self.settings.output.annotate_travel {
            out.push(OutputLine::Annotation(";TRAVEL".to_string()));
        }

        if self.settings.output.verbose {
            out.push(OutputLine::Annotation(format!(
                ";ABS E adj:{:.5} settl:{:.5} Δx:{:.3}",
                comp.position_delta, comp.settling.0, comp.dx
            )));
            out.push(OutputLine::Annotation(format!(
                ";REL E adj:{:.5}",
                comp.adjustment
            )));
        }
    }
}

pub struct Processed {
    pub lines: Vec<OutputLine>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Processed {
    pub fn render(&self, line_sep: &str) -> String {
        render_lines(&self.lines, line_sep)
    }
}

/// Joins output lines into a program, each one terminated by `line_sep`.
pub fn render_lines(lines: &[OutputLine], line_sep: &str) -> String {
    let mut s = String::new();
    for line in lines {
        s.push_str(&line.to_string());
        s.push_str(line_sep);
    }
    s
}

pub fn process_str(source: &str, settings: &Settings) -> Result<Processed> {
    let mut processor = Processor::new(settings)?;
    let mut lines = Vec::new();

    for line in source.lines() {
        processor.process_line(line, &mut lines);
    }

    Ok(Processed {
        lines,
        diagnostics: processor.drain_diagnostics(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compensation::round_to;
    use crate::settings::CurveSettings;
    use crate::state::Positioning;

    fn run(source: &str, settings: &Settings) -> Vec<String> {
        process_str(source, settings)
            .unwrap()
            .lines
            .iter()
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn test_compensated_extrusion() {
        let settings = Settings::default();
        let curve = CurveSettings::default();

        let adj = (curve.eval(10.0) - curve.eval(0.0)) / 180.0 * 10.0;
        let limit = 0.5 * settings.hardlimit;
        let expected = round_to(0.5 + adj.clamp(-limit, limit), 5);

        let processed = process_str("M82\nG1 X10 E0.5\n", &settings).unwrap();
        let OutputLine::Command(cmd) = &processed.lines[1] else {
            panic!("expected a command");
        };
        assert_eq!(cmd.value("E"), Some(expected));
        assert_eq!(processed.lines[1].to_string(), "G1 X10 E.50385");
    }

    #[test]
    fn test_relative_positioning() {
        let settings = Settings::default();
        let mut processor = Processor::new(&settings).unwrap();
        let mut out = Vec::new();

        for line in ["G90", "G1 X10", "G91"] {
            processor.process_line(line, &mut out);
        }
        assert_eq!(processor.state().modes.position, Positioning::Relative);

        processor.process_line("G1 X5", &mut out);
        assert_eq!(processor.state().x, Some(15.0));
    }

    #[test]
    fn test_relative_move_compensated_by_displacement() {
        let out = run("G1 X100 E.5\nG91\nG1 X10 E.5", &Settings::default());
        assert_eq!(out[1], "G91");
        assert_eq!(out[2], "G1 X10 E.50157");
    }

    #[test]
    fn test_arc_move_compensated() {
        let out = run("G2 X10 Y0 I5 J0 E0.5", &Settings::default());
        assert_eq!(out, vec!["G2 X10 Y0 I5 J0 E.50385"]);

        let out = run("G1 X10 E.5\nG3 X0 Y0 I-5 J0 E.5", &Settings::default());
        assert_eq!(out[1], "G3 X0 Y0 I-5 J0 E.50385");
    }

    #[test]
    fn test_non_finite_extrusion_word_kept_as_flag() {
        let out = run("G1 X10 ENaN", &Settings::default());
        assert_eq!(out, vec![";TRAVEL", "G1 X10 ENaN E.00385"]);
    }

    #[test]
    fn test_force_full_flow() {
        let settings = Settings {
            force_full_flow: true,
            ..Default::default()
        };
        let processed = process_str("M221 S95", &settings).unwrap();
        assert_eq!(processed.render("\n"), "M221 S100\n");
        assert_eq!(
            processed.diagnostics,
            vec![Diagnostic::FullFlowForced { line: 1 }]
        );

        assert_eq!(run("M221 S95", &Settings::default()), vec!["M221 S95"]);
    }

    #[test]
    fn test_travel_move_synthesis() {
        let out = run("G0 X20", &Settings::default());
        assert_eq!(out, vec![";TRAVEL", "G1 X20 E.01496"]);

        let mut settings = Settings::default();
        settings.output.annotate_travel = false;
        assert_eq!(run("G0 X20 F9000", &settings), vec!["G1 X20 F9000 E.01496"]);
    }

    #[test]
    fn test_travel_disabled() {
        let mut settings = Settings::default();
        settings.travel.enabled = false;

        let out = run("G0 X20\nG1 X30 F600\nG1 X40 E1", &settings);
        assert_eq!(out[0], "G0 X20");
        assert_eq!(out[1], "G1 X30 F600");
        assert!(out[2].starts_with("G1 X40 E1.0"), "{}", out[2]);
    }

    #[test]
    fn test_width_comment_removed() {
        let out = run("G1 X1 E.1\n;WIDTH:0.45\nG1 X2 E.1", &Settings::default());
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|l| !l.starts_with(";WIDTH")));

        let mut settings = Settings::default();
        settings.output.remove_width_comments = false;
        let out = run(";WIDTH:0.45", &settings);
        assert_eq!(out, vec![";WIDTH:0.45"]);
    }

    #[test]
    fn test_lines_preserved() {
        let source = "; generated\n\nM104 S210\nG28 X Y\nEXCLUDE_OBJECT_START NAME=a\nG92 E0\nG1 Z.2 F600\nG1 E-.8\n";
        let out = run(source, &Settings::default());
        assert_eq!(
            out,
            vec![
                "; generated",
                "",
                "M104 S210",
                "G28 X Y",
                "EXCLUDE_OBJECT_START NAME=a",
                "G92 E0",
                "G1 Z.2 F600",
                "G1 E-.8",
            ]
        );
    }

    #[test]
    fn test_non_synthesized_line_count() {
        let source = "G90\nM83\n;LAYER_CHANGE\nG0 X10 Y10\nG1 X20 E.5\n\nG0 X5\nG1 X50 Y3 E1.2\nG1 Y40 E.3\n";
        let processed = process_str(source, &Settings::default()).unwrap();
        let commands = processed
            .lines
            .iter()
            .filter(|l| matches!(l, OutputLine::Command(_)))
            .count();
        assert_eq!(commands, source.lines().count());
        assert_eq!(processed.lines.len(), commands + 2);
    }

    #[test]
    fn test_no_lateral_move_keeps_extrusion() {
        let out = run("G1 X10 E.5\nG1 Y40 E.31234\nG1 E-.8 F2100", &Settings::default());
        assert_eq!(out[1], "G1 Y40 E.31234");
        assert_eq!(out[2], "G1 E-.8 F2100");
    }

    #[test]
    fn test_verbose_annotations() {
        let mut settings = Settings::default();
        settings.output.verbose = true;
        let out = run("G1 X10 E0.5", &settings);
        assert_eq!(out.len(), 3);
        assert!(out[0].starts_with(";ABS E adj:0.06939 settl:0.00000 Δx:10.000"));
        assert_eq!(out[1], ";REL E adj:0.00385");
        assert_eq!(out[2], "G1 X10 E.50385");
    }

    #[test]
    fn test_settling_threaded_across_lines() {
        let mut settings = Settings::default();
        settings.settling.max_positive = 0.2;

        let mut processor = Processor::new(&settings).unwrap();
        let mut out = Vec::new();
        processor.process_line("G1 X10 E.5", &mut out);
        assert!((processor.settling().0 - 0.1).abs() < 1e-12);
        processor.process_line("G1 X40 E.5", &mut out);
        assert_eq!(processor.settling(), Settling(0.2));
        processor.process_line("G1 X30 E.5", &mut out);
        assert!((processor.settling().0 - 0.1).abs() < 1e-12);
        assert!(processor.drain_diagnostics().is_empty());
    }

    #[test]
    fn test_out_of_bounds_reported() {
        let mut settings = Settings::default();
        settings.settling.positive_rate = -0.01;

        let processed = process_str("G1 X10 E.5\nG1 X20 E.5", &settings).unwrap();
        assert_eq!(processed.diagnostics.len(), 2);
        assert!(matches!(
            processed.diagnostics[1],
            Diagnostic::SettlingOutOfBounds { line: 2, value } if (value + 0.2).abs() < 1e-12
        ));
    }

    #[test]
    fn test_line_index_and_prior_state() {
        let settings = Settings::default();
        let mut processor = Processor::new(&settings).unwrap();
        let mut out = Vec::new();
        for line in ["G1 X10 E.5", ";WIDTH:0.4", "G1 X20 E.5"] {
            processor.process_line(line, &mut out);
        }
        let OutputLine::Command(last) = out.last().unwrap() else {
            panic!("expected a command");
        };
        assert_eq!(last.index, 2);
        assert_eq!(last.prior.x, Some(10.0));
    }
}
