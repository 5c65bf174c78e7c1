use fancy_regex::Regex;

use crate::error::Result;
use crate::state::{MachineState, Modes};

// https://reprap.org/wiki/G-code#Fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Flag,
    Int(i64),
    Real(f64),
}

impl ParamValue {
    /// Parses the part of a word after its letter. `None` means the word is not
    /// numeric; `NaN` and `inf` don't count as numbers.
    fn parse(text: &str) -> Option<ParamValue> {
        if let Ok(i) = text.parse::<i64>() {
            Some(ParamValue::Int(i))
        } else {
            match text.parse::<f64>() {
                Ok(f) if f.is_finite() => Some(ParamValue::Real(f)),
                _ => None,
            }
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ParamValue::Flag => None,
            ParamValue::Int(i) => Some(i as f64),
            ParamValue::Real(f) => Some(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Usually a single letter. Non-numeric words keep their whole text here.
    pub name: String,
    pub value: ParamValue,
    /// Source text of the value, rendered back as is until the value changes.
    pub raw: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Parameter {
        Parameter {
            name: name.into(),
            value,
            raw: None,
        }
    }

    fn from_word(word: &str) -> Parameter {
        let mut chars = word.chars();
        let letter = chars.next().map(String::from).unwrap_or_default();
        let text = chars.as_str();
        match ParamValue::parse(text) {
            Some(value) => Parameter {
                raw: Some(text.to_string()),
                ..Parameter::new(letter, value)
            },
            None => Parameter::new(word, ParamValue::Flag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// G90
    PositionAbsolute,
    /// G91
    PositionRelative,
    /// M82
    ExtrudeAbsolute,
    /// M83
    ExtrudeRelative,
    /// G1
    LinearMove,
    /// G2, G3
    ArcMove,
    /// G0
    RapidMove,
    /// M221
    FlowOverride,
    Other,
}

impl CommandKind {
    fn from_word(word: &str) -> CommandKind {
        match word {
            "G90" => CommandKind::PositionAbsolute,
            "G91" => CommandKind::PositionRelative,
            "M82" => CommandKind::ExtrudeAbsolute,
            "M83" => CommandKind::ExtrudeRelative,
            "G1" => CommandKind::LinearMove,
            "G2" | "G3" => CommandKind::ArcMove,
            "G0" => CommandKind::RapidMove,
            "M221" => CommandKind::FlowOverride,
            _ => CommandKind::Other,
        }
    }
}

/// One line of the program.
///
/// Blank lines have no `word`. Comment lines and lines that don't start with a
/// letter+digits command keep their text in `word` and have no parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub word: Option<String>,
    pub kind: CommandKind,
    pub parameters: Vec<Parameter>,
    pub comment: Option<String>,
    /// Modes in effect when this command executes.
    pub modes: Modes,
    /// Machine state before this command.
    pub prior: MachineState,
    pub index: usize,
}

impl Command {
    fn blank(prior: &MachineState, index: usize) -> Command {
        Command {
            word: None,
            kind: CommandKind::Other,
            parameters: Vec::new(),
            comment: None,
            modes: prior.modes,
            prior: prior.clone(),
            index,
        }
    }

    /// `;WIDTH:0.45` style annotations written by the slicer.
    pub fn is_width_annotation(&self) -> bool {
        self.word.as_deref().is_some_and(|w| w.starts_with(";WIDTH"))
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Numeric value of the first parameter called `name`.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.param(name).and_then(|p| p.value.as_f64())
    }

    /// Replaces the first parameter called `name`, or appends it.
    pub fn set_param(&mut self, name: &str, value: ParamValue) {
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(p) => {
                p.value = value;
                p.raw = None;
            }
            None => self.parameters.push(Parameter::new(name, value)),
        }
    }
}

pub struct Tokenizer {
    command_pat: Regex,
}

impl Tokenizer {
    pub fn new() -> Result<Tokenizer> {
        Ok(Tokenizer {
            command_pat: Regex::new(r"^[A-Za-z][0-9]+$")?,
        })
    }

    fn is_command_word(&self, word: &str) -> bool {
        // only a backtrack limit can make this fail; treat it as not a command
        self.command_pat.is_match(word).unwrap_or(false)
    }

    pub fn parse(&self, line: &str, prior: &MachineState, index: usize) -> Command {
        let mut command = Command::blank(prior, index);

        let line = line.trim();
        if line.is_empty() {
            return command;
        }

        if line.starts_with(';') {
            command.word = Some(line.replace(['\r', '\n'], ""));
            return command;
        }

        let (code, comment) = match line.split_once(';') {
            Some((code, comment)) => (code, Some(comment)),
            None => (line, None),
        };
        command.comment = comment.map(|c| c.replace(['\r', '\n', ';'], "").trim().to_string());

        let mut words = code.split_whitespace();
        let first = words.next().unwrap_or_default();

        if !self.is_command_word(first) {
            // vendor commands like EXCLUDE_OBJECT_START pass through untouched
            command.word = Some(code.to_string());
            return command;
        }

        command.word = Some(first.to_string());
        command.kind = CommandKind::from_word(first);
        command.parameters = words.map(Parameter::from_word).collect();

        command
    }
}
