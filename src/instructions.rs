//! Constraint instructions: what the generation stage emits and the
//! assembler interprets.
//!
//! Each instruction is a typed record. They also have a one-line text form so
//! knowledge base templates and the remote service can produce them:
//!
//! ```text
//! # comment
//! visit_count_cap max=4
//! time_window priority=A
//! priority_disjunction priority=A penalty=1000
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::error::InstructionError;
use crate::model::Priority;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// At most `max_visits` customers per agent and day.
    VisitCountCap { max_visits: i64 },
    /// Customers of `priority` must start service inside their own window.
    PriorityTimeWindow { priority: Priority },
    /// Customers of `priority` may be dropped, at `penalty` each.
    PriorityDisjunction { priority: Priority, penalty: i64 },
}

impl Instruction {
    pub fn keyword(&self) -> &'static str {
        match self {
            Instruction::VisitCountCap { .. } => "visit_count_cap",
            Instruction::PriorityTimeWindow { .. } => "time_window",
            Instruction::PriorityDisjunction { .. } => "priority_disjunction",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::VisitCountCap { max_visits } => {
                write!(f, "visit_count_cap max={}", max_visits)
            }
            Instruction::PriorityTimeWindow { priority } => {
                write!(f, "time_window priority={}", priority)
            }
            Instruction::PriorityDisjunction { priority, penalty } => {
                write!(f, "priority_disjunction priority={} penalty={}", priority, penalty)
            }
        }
    }
}

/// Parses instruction text. Blank lines and `#` comments are skipped, as are
/// markdown code fences around the block.
pub fn parse_instructions(text: &str) -> Result<Vec<Instruction>, InstructionError> {
    let mut instructions = Vec::new();
    for (offset, raw) in text.lines().enumerate() {
        let line = offset + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() || content.starts_with("```") {
            continue;
        }
        instructions.push(parse_line(line, content)?);
    }
    Ok(instructions)
}

fn parse_line(line: usize, content: &str) -> Result<Instruction, InstructionError> {
    let mut tokens = content.split_whitespace();
    let keyword = tokens.next().unwrap_or_default();

    let mut arguments = BTreeMap::new();
    for token in tokens {
        let (key, value) = token
            .split_once('=')
            .filter(|(key, value)| !key.is_empty() && !value.is_empty())
            .ok_or_else(|| InstructionError::Syntax {
                line,
                token: token.to_string(),
            })?;
        arguments.insert(key, value);
    }
    let arguments = Arguments { line, keyword, values: arguments };

    match keyword {
        "visit_count_cap" => Ok(Instruction::VisitCountCap {
            max_visits: arguments.integer("max")?,
        }),
        "time_window" => Ok(Instruction::PriorityTimeWindow {
            priority: arguments.priority()?,
        }),
        "priority_disjunction" => Ok(Instruction::PriorityDisjunction {
            priority: arguments.priority()?,
            penalty: arguments.integer("penalty")?,
        }),
        other => Err(InstructionError::UnknownInstruction {
            line,
            keyword: other.to_string(),
        }),
    }
}

struct Arguments<'a> {
    line: usize,
    keyword: &'a str,
    values: BTreeMap<&'a str, &'a str>,
}

impl Arguments<'_> {
    fn required(&self, parameter: &str) -> Result<&str, InstructionError> {
        self.values
            .get(parameter)
            .copied()
            .ok_or_else(|| InstructionError::MissingParameter {
                line: self.line,
                keyword: self.keyword.to_string(),
                parameter: parameter.to_string(),
            })
    }

    fn integer(&self, parameter: &str) -> Result<i64, InstructionError> {
        let value = self.required(parameter)?;
        value.parse().map_err(|_| self.invalid(parameter, value))
    }

    fn priority(&self) -> Result<Priority, InstructionError> {
        let value = self.required("priority")?;
        value.parse().map_err(|_| self.invalid("priority", value))
    }

    fn invalid(&self, parameter: &str, value: &str) -> InstructionError {
        InstructionError::InvalidValue {
            line: self.line,
            parameter: parameter.to_string(),
            value: value.to_string(),
        }
    }
}

/// Which generation tier produced a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramOrigin {
    KnowledgeBase,
    Remote,
    /// Minimal fallback because remote generation was not available.
    FallbackUnavailable,
    /// Minimal fallback because remote generation failed. Such a program is
    /// not applied; the assembler uses its default constraints instead.
    FallbackFailed,
}

/// The generated constraints for one request: the instruction records plus
/// the commented listing shown to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintProgram {
    instructions: Vec<Instruction>,
    listing: Vec<String>,
    origin: ProgramOrigin,
}

impl ConstraintProgram {
    pub fn new(origin: ProgramOrigin) -> Self {
        Self {
            instructions: Vec::new(),
            listing: Vec::new(),
            origin,
        }
    }

    /// Parses instruction text, keeping its comments in the listing.
    pub fn parse(text: &str, origin: ProgramOrigin) -> Result<Self, InstructionError> {
        let mut program = Self::new(origin);
        program.extend_from_text(text)?;
        Ok(program)
    }

    pub fn comment(&mut self, text: impl AsRef<str>) {
        self.listing.push(format!("# {}", text.as_ref()));
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.listing.push(instruction.to_string());
        self.instructions.push(instruction);
    }

    /// Appends parsed text. Nothing is appended when parsing fails.
    pub fn extend_from_text(&mut self, text: &str) -> Result<(), InstructionError> {
        let parsed = parse_instructions(text)?;
        let mut parsed = parsed.into_iter();
        for raw in text.lines() {
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.starts_with("```") {
                continue;
            }
            if content.is_empty() {
                if let Some(comment) = raw.trim().strip_prefix('#') {
                    self.comment(comment.trim());
                }
                continue;
            }
            if let Some(instruction) = parsed.next() {
                self.push(instruction);
            }
        }
        Ok(())
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn origin(&self) -> ProgramOrigin {
        self.origin
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn is_hard_failure(&self) -> bool {
        self.origin == ProgramOrigin::FallbackFailed
    }

    pub fn listing(&self) -> String {
        self.listing.join("\n")
    }
}

impl fmt::Display for ConstraintProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.listing())
    }
}
