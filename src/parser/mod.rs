//! Instruction compiler.
//!
//! Turns the ordered source lines of one node into a compiled program:
//! the opcode sequence, the label table, and the opcode-to-source-line
//! map. Compilation is all-or-nothing: any error aborts the whole
//! attempt, and callers only replace a node's program on success.
//!
//! # Source format
//!
//! ```text
//! # comments run to end of line
//! LOOP: ADD 1        labels may share a line with an instruction
//! RETRY:             or stand alone, attaching to the next instruction
//!   MOV UP, ACC      operands split on whitespace and commas
//!   JMP LOOP
//! ```
//!
//! Lines are uppercase-normalized before tokenizing, so `add 1` and
//! `ADD 1` compile identically. Blank and comment-only lines emit no
//! opcode but still count for line numbering, so reported errors and the
//! line map match what the author sees.

use std::collections::HashMap;

use thiserror::Error;

use crate::machine::location::DataLocation;
use crate::machine::opcode::{JumpCond, Opcode};

/// Compile-time error for one node's program.
///
/// Each variant is fatal to the compilation attempt and reports the
/// 1-based source line plus the offending token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A mnemonic got fewer operands than it requires.
    #[error("line {line}: too few operands for {mnemonic} (expected {expected}, found {found})")]
    TooFewOperands {
        line: usize,
        mnemonic: String,
        expected: usize,
        found: usize,
    },

    /// A mnemonic got more operands than it requires.
    #[error("line {line}: too many operands for {mnemonic} (expected {expected}, found {found})")]
    TooManyOperands {
        line: usize,
        mnemonic: String,
        expected: usize,
        found: usize,
    },

    /// The first token of an instruction is not a known mnemonic.
    #[error("line {line}: invalid opcode '{token}'")]
    InvalidOpcode { line: usize, token: String },

    /// An operand is neither a named data location nor a number.
    #[error("line {line}: invalid data location '{token}'")]
    InvalidLocation { line: usize, token: String },
}

/// A compiled program: opcode sequence plus its compilation artifacts.
///
/// The label table and line map are part of the program value, not
/// separate mutable state.
#[derive(Debug, Clone, Default)]
pub struct CompiledProgram {
    ops: Vec<Opcode>,
    labels: HashMap<String, usize>,
    /// 1-based source line of each opcode.
    lines: Vec<usize>,
}

impl CompiledProgram {
    /// Build a program for the internal stream opcodes; not reachable
    /// from user source.
    pub(crate) fn internal(ops: Vec<Opcode>) -> Self {
        let lines = (1..=ops.len()).collect();
        Self {
            ops,
            labels: HashMap::new(),
            lines,
        }
    }

    /// Number of opcodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the program contains no opcodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The opcode sequence.
    #[inline]
    pub fn ops(&self) -> &[Opcode] {
        &self.ops
    }

    /// The opcode at `index`, if in range.
    #[inline]
    pub fn op(&self, index: usize) -> Option<&Opcode> {
        self.ops.get(index)
    }

    /// The opcode index a label is bound to.
    #[inline]
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// All labels and their opcode indices.
    #[inline]
    pub fn labels(&self) -> &HashMap<String, usize> {
        &self.labels
    }

    /// The 1-based source line an opcode came from.
    #[inline]
    pub fn line_of(&self, index: usize) -> Option<usize> {
        self.lines.get(index).copied()
    }
}

/// Operand count each mnemonic requires, or `None` for unknown
/// mnemonics. The internal stream opcodes are deliberately absent: they
/// are not user-programmable.
fn operand_count(mnemonic: &str) -> Option<usize> {
    match mnemonic {
        "NOP" | "SWP" | "SAV" | "NEG" => Some(0),
        "ADD" | "SUB" | "JRO" | "JMP" | "JEZ" | "JNZ" | "JGZ" | "JLZ" => Some(1),
        "MOV" => Some(2),
        _ => None,
    }
}

fn parse_location(token: &str, line: usize) -> Result<DataLocation, CompileError> {
    DataLocation::from_token(token).ok_or_else(|| CompileError::InvalidLocation {
        line,
        token: token.to_string(),
    })
}

/// Compile the ordered source lines of one node.
pub fn compile<S: AsRef<str>>(source_lines: &[S]) -> Result<CompiledProgram, CompileError> {
    let mut ops = Vec::new();
    let mut labels = HashMap::new();
    let mut lines = Vec::new();
    // Labels on their own line attach to the next emitted opcode.
    let mut pending_labels: Vec<String> = Vec::new();

    for (index, raw) in source_lines.iter().enumerate() {
        let line_no = index + 1;

        // Strip comments, then normalize.
        let text = raw.as_ref();
        let text = text.split('#').next().unwrap_or("");
        let mut text = text.trim().to_uppercase();
        if text.is_empty() {
            continue;
        }

        // A leading `LABEL:` binds to this line's instruction, or to the
        // next one if nothing follows the colon.
        if let Some(colon) = text.find(':') {
            let label = text[..colon].trim().to_string();
            if !label.is_empty() {
                pending_labels.push(label);
            }
            text = text[colon + 1..].trim().to_string();
            if text.is_empty() {
                continue;
            }
        }

        let tokens: Vec<&str> = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect();
        let (mnemonic, operands) = match tokens.split_first() {
            Some(split) => split,
            None => continue,
        };

        let expected = operand_count(mnemonic).ok_or_else(|| CompileError::InvalidOpcode {
            line: line_no,
            token: mnemonic.to_string(),
        })?;

        if operands.len() < expected {
            return Err(CompileError::TooFewOperands {
                line: line_no,
                mnemonic: mnemonic.to_string(),
                expected,
                found: operands.len(),
            });
        }
        if operands.len() > expected {
            return Err(CompileError::TooManyOperands {
                line: line_no,
                mnemonic: mnemonic.to_string(),
                expected,
                found: operands.len(),
            });
        }

        let op = match *mnemonic {
            "NOP" => Opcode::Nop,
            "SWP" => Opcode::Swp,
            "SAV" => Opcode::Sav,
            "NEG" => Opcode::Neg,
            "ADD" => Opcode::Add(parse_location(operands[0], line_no)?),
            "SUB" => Opcode::Sub(parse_location(operands[0], line_no)?),
            "JRO" => Opcode::Jro(parse_location(operands[0], line_no)?),
            "MOV" => Opcode::Mov {
                src: parse_location(operands[0], line_no)?,
                dst: parse_location(operands[1], line_no)?,
            },
            "JMP" | "JEZ" | "JNZ" | "JGZ" | "JLZ" => {
                let cond = match *mnemonic {
                    "JMP" => JumpCond::Always,
                    "JEZ" => JumpCond::Zero,
                    "JNZ" => JumpCond::NotZero,
                    "JGZ" => JumpCond::Positive,
                    _ => JumpCond::Negative,
                };
                Opcode::Jump {
                    cond,
                    label: operands[0].to_string(),
                }
            }
            _ => unreachable!("mnemonic validated by operand_count"),
        };

        for label in pending_labels.drain(..) {
            labels.insert(label, ops.len());
        }
        ops.push(op);
        lines.push(line_no);
    }

    // Trailing labels bind one past the last opcode; jumping there wraps
    // back to opcode 0 through the normal post-increment wrap.
    for label in pending_labels {
        labels.insert(label, ops.len());
    }

    Ok(CompiledProgram { ops, labels, lines })
}

/// Compile a whole source text, splitting it into lines.
pub fn compile_str(source: &str) -> Result<CompiledProgram, CompileError> {
    let source_lines: Vec<&str> = source.lines().collect();
    compile(&source_lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_with_trailing_instruction() {
        let program = compile_str("LOOP: ADD 1\nJMP LOOP").unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program.label("LOOP"), Some(0));
        assert_eq!(program.op(0), Some(&Opcode::Add(DataLocation::Constant(1))));
        assert_eq!(
            program.op(1),
            Some(&Opcode::Jump {
                cond: JumpCond::Always,
                label: "LOOP".to_string()
            })
        );
    }

    #[test]
    fn test_standalone_label_attaches_to_next_instruction() {
        let program = compile_str("NOP\nHERE:\n\n# comment\nSUB 2").unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program.label("HERE"), Some(1));
    }

    #[test]
    fn test_blank_and_comment_lines_keep_line_numbers() {
        let program = compile_str("# header\n\nADD 1\n\nSUB 2").unwrap();
        assert_eq!(program.line_of(0), Some(3));
        assert_eq!(program.line_of(1), Some(5));
    }

    #[test]
    fn test_lowercase_and_commas_accepted() {
        let program = compile_str("mov up, acc").unwrap();
        assert_eq!(
            program.op(0),
            Some(&Opcode::Mov {
                src: DataLocation::Up,
                dst: DataLocation::Acc
            })
        );
    }

    #[test]
    fn test_too_few_operands() {
        let err = compile_str("NOP\nADD").unwrap_err();
        assert_eq!(
            err,
            CompileError::TooFewOperands {
                line: 2,
                mnemonic: "ADD".to_string(),
                expected: 1,
                found: 0
            }
        );
    }

    #[test]
    fn test_too_many_operands() {
        let err = compile_str("ADD 1 2").unwrap_err();
        assert_eq!(
            err,
            CompileError::TooManyOperands {
                line: 1,
                mnemonic: "ADD".to_string(),
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_invalid_opcode_names_the_token() {
        let err = compile_str("FROB 1").unwrap_err();
        assert_eq!(
            err,
            CompileError::InvalidOpcode {
                line: 1,
                token: "FROB".to_string()
            }
        );
    }

    #[test]
    fn test_internal_opcodes_are_not_parseable() {
        assert!(matches!(
            compile_str("_PROVIDE").unwrap_err(),
            CompileError::InvalidOpcode { .. }
        ));
    }

    #[test]
    fn test_invalid_location_names_the_token() {
        let err = compile_str("ADD NORTH").unwrap_err();
        assert_eq!(
            err,
            CompileError::InvalidLocation {
                line: 1,
                token: "NORTH".to_string()
            }
        );
    }

    #[test]
    fn test_negative_constants() {
        let program = compile_str("ADD -11").unwrap();
        assert_eq!(
            program.op(0),
            Some(&Opcode::Add(DataLocation::Constant(-11)))
        );
    }

    #[test]
    fn test_trailing_label_binds_past_end() {
        let program = compile_str("ADD 1\nEND:").unwrap();
        assert_eq!(program.len(), 1);
        assert_eq!(program.label("END"), Some(1));
    }

    #[test]
    fn test_empty_source_compiles_to_empty_program() {
        let program = compile_str("").unwrap();
        assert!(program.is_empty());
        let program = compile_str("\n# only comments\n\n").unwrap();
        assert!(program.is_empty());
    }

    #[test]
    fn test_bak_parses_but_is_runtime_checked() {
        // BAK is a valid token at compile time; legality is an execution
        // concern.
        let program = compile_str("MOV BAK ACC").unwrap();
        assert_eq!(
            program.op(0),
            Some(&Opcode::Mov {
                src: DataLocation::Bak,
                dst: DataLocation::Acc
            })
        );
    }
}
