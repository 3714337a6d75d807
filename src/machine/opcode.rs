//! The opcode set.
//!
//! An opcode is one mnemonic instance bound to its operands: a resumable
//! unit of work. Each tick the owning node calls `attempt(t)` with the
//! number of attempts already spent; the opcode either reports
//! [`ExecuteResult::Complete`] or [`ExecuteResult::Pending`], in which
//! case the same opcode is re-attempted on the next pass with `t + 1`.
//!
//! Opcodes never touch neighbors directly: every port access goes through
//! the grid's port primitives, which resolve neighbors by coordinate.
//!
//! # Partial completion
//!
//! A `MOV` toward a directional port spans several attempts: it declares
//! its destination on the first attempt, captures the source value once
//! available, and only completes after a neighbor has drained the value.
//! The internal stream opcodes follow the same shape.

use std::fmt;

use thiserror::Error;

use super::grid::Grid;
use super::location::DataLocation;

/// Execution-time addressing error.
///
/// Raised at the moment of the offending access, never at compile time.
/// An `ANY`/`LAST` resolution finding nothing is *not* an error; that is
/// ordinary [`ExecuteResult::Pending`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// Probing or reading `BAK` or `NONE` is always illegal.
    #[error("Cannot address register '{0}'")]
    IllegalLocation(DataLocation),

    /// A consuming read found no value. Opcodes gate reads behind
    /// `has_data`, so this surfaces only on misuse of the primitives.
    #[error("No data available")]
    NoData,

    /// A jump referenced a label the program does not define.
    #[error("Label {0} is not defined")]
    UndefinedLabel(String),

    /// MOV toward a destination that is neither instantaneous nor a
    /// direction.
    #[error("Cannot move to '{0}'")]
    IllegalDestination(DataLocation),
}

/// Result of one opcode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteResult {
    /// The opcode finished; the node advances.
    Complete,
    /// Not done yet; retry on the next pass with an incremented count.
    Pending,
}

/// Condition guarding a jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpCond {
    /// JMP: always taken.
    Always,
    /// JEZ: taken when ACC == 0.
    Zero,
    /// JNZ: taken when ACC != 0.
    NotZero,
    /// JGZ: taken when ACC > 0.
    Positive,
    /// JLZ: taken when ACC < 0.
    Negative,
}

impl JumpCond {
    /// Whether the condition holds for the given ACC value.
    pub fn satisfied(self, acc: i32) -> bool {
        match self {
            JumpCond::Always => true,
            JumpCond::Zero => acc == 0,
            JumpCond::NotZero => acc != 0,
            JumpCond::Positive => acc > 0,
            JumpCond::Negative => acc < 0,
        }
    }
}

/// One compiled instruction with its operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opcode {
    /// No operation. Defined as ADD against NIL.
    Nop,
    /// Exchange ACC and BAK.
    Swp,
    /// Copy ACC into BAK.
    Sav,
    /// ACC = -ACC.
    Neg,
    /// ACC += source.
    Add(DataLocation),
    /// ACC -= source.
    Sub(DataLocation),
    /// Move a value from source to destination.
    Mov {
        src: DataLocation,
        dst: DataLocation,
    },
    /// Conditional or unconditional jump to a label.
    Jump { cond: JumpCond, label: String },
    /// Jump relative by the value read from source, clamped to the
    /// program bounds.
    Jro(DataLocation),
    /// Internal: fetch one host input value and offer it downward.
    /// Not user-programmable.
    Provide,
    /// Internal: drain one value from above and deliver it to the host.
    /// Not user-programmable.
    Consume,
}

impl Opcode {
    /// Attempt the opcode. `t` is the number of attempts already spent on
    /// it (0 on the first attempt).
    pub(crate) fn attempt(
        &self,
        grid: &mut Grid,
        id: usize,
        t: u32,
    ) -> Result<ExecuteResult, ExecError> {
        match self {
            // NOP is ADD against NIL.
            Opcode::Nop => arith(grid, id, DataLocation::Nil, false),
            Opcode::Add(src) => arith(grid, id, *src, false),
            Opcode::Sub(src) => arith(grid, id, *src, true),

            Opcode::Swp => {
                let node = &mut grid.nodes[id];
                let (acc, bak) = (node.acc(), node.bak());
                node.set_acc_and_bak(bak, acc);
                Ok(ExecuteResult::Complete)
            }

            Opcode::Sav => {
                let node = &mut grid.nodes[id];
                node.set_bak(node.acc());
                Ok(ExecuteResult::Complete)
            }

            Opcode::Neg => {
                let node = &mut grid.nodes[id];
                node.set_acc(-node.acc());
                Ok(ExecuteResult::Complete)
            }

            Opcode::Mov { src, dst } => mov(grid, id, *src, *dst, t),

            Opcode::Jump { cond, label } => {
                let acc = grid.nodes[id].acc();
                if cond.satisfied(acc) {
                    grid.nodes[id].jump_to(label)?;
                }
                Ok(ExecuteResult::Complete)
            }

            Opcode::Jro(src) => {
                if !grid.has_data(id, *src)? {
                    return Ok(ExecuteResult::Pending);
                }
                let offset = grid.read(id, *src)?;
                let node = &mut grid.nodes[id];
                let len = node.program.len() as i32;
                // One before the clamped target; the normal increment
                // lands exactly on it.
                node.currentop = node.currentop.saturating_add(offset).clamp(0, len - 1) - 1;
                Ok(ExecuteResult::Complete)
            }

            Opcode::Provide => provide(grid, id, t),
            Opcode::Consume => consume(grid, id),
        }
    }

    /// Commit hook, invoked once during the node's commit phase after the
    /// opcode completed, with the final attempt count.
    pub(crate) fn commit(&self, grid: &mut Grid, id: usize, stalls: u32) {
        if let Opcode::Consume = self {
            log::trace!("consume at node {} committing after {} stalls", id, stalls);
            grid.deliver_output(id);
        }
    }
}

/// ADD/SUB/NOP: complete only once the source has data.
fn arith(
    grid: &mut Grid,
    id: usize,
    src: DataLocation,
    negate: bool,
) -> Result<ExecuteResult, ExecError> {
    if !grid.has_data(id, src)? {
        return Ok(ExecuteResult::Pending);
    }
    let value = grid.read(id, src)?;
    let delta = if negate { value.saturating_neg() } else { value };
    let node = &mut grid.nodes[id];
    node.set_acc(node.acc().saturating_add(delta));
    Ok(ExecuteResult::Complete)
}

fn mov(
    grid: &mut Grid,
    id: usize,
    src: DataLocation,
    dst: DataLocation,
    t: u32,
) -> Result<ExecuteResult, ExecError> {
    if dst.is_directional() {
        return mov_port(grid, id, src, dst, t);
    }

    match dst {
        DataLocation::Acc | DataLocation::Nil | DataLocation::None => {}
        other => return Err(ExecError::IllegalDestination(other)),
    }

    // Instantaneous destination: once the source is ready, write through
    // and complete in the same attempt.
    if !grid.has_data(id, src)? {
        return Ok(ExecuteResult::Pending);
    }
    let value = grid.read(id, src)?;
    if dst == DataLocation::Acc {
        grid.nodes[id].set_acc(value);
    }
    Ok(ExecuteResult::Complete)
}

/// MOV toward a directional port.
///
/// Declares the destination on the first attempt, captures the source
/// value once available, then completes only after a neighbor drained the
/// value in a strictly earlier sub-pass.
fn mov_port(
    grid: &mut Grid,
    id: usize,
    src: DataLocation,
    dst: DataLocation,
    t: u32,
) -> Result<ExecuteResult, ExecError> {
    if t == 0 {
        // Declare the commitment before any data exists.
        grid.nodes[id].queued.dest = dst;
    }

    if !has_captured(grid, id) {
        if !grid.has_data(id, src)? {
            return Ok(ExecuteResult::Pending);
        }
        let value = grid.read(id, src)?;
        stage_outgoing(grid, id, value);
        return Ok(ExecuteResult::Pending);
    }

    drained_progress(grid, id, t)
}

/// Internal stream provider: one host value offered downward per
/// completion. Stalls (forever, if need be) while the host has no input.
fn provide(grid: &mut Grid, id: usize, t: u32) -> Result<ExecuteResult, ExecError> {
    if t == 0 {
        grid.nodes[id].queued.dest = DataLocation::Down;
    }

    if !has_captured(grid, id) {
        let value = match grid.fetch_input(id) {
            Some(value) => value,
            None => return Ok(ExecuteResult::Pending),
        };
        stage_outgoing(grid, id, value);
        return Ok(ExecuteResult::Pending);
    }

    drained_progress(grid, id, t)
}

/// Internal stream consumer: drain one value from above per completion.
/// Delivery to the host happens in the commit hook.
fn consume(grid: &mut Grid, id: usize) -> Result<ExecuteResult, ExecError> {
    if !grid.has_data(id, DataLocation::Up)? {
        return Ok(ExecuteResult::Pending);
    }
    let value = grid.read(id, DataLocation::Up)?;
    grid.nodes[id].pending_output = Some(value);
    Ok(ExecuteResult::Complete)
}

/// Whether this node's outgoing value has been captured already: still
/// queued, already committed to the latch, or drained by a neighbor.
fn has_captured(grid: &Grid, id: usize) -> bool {
    let node = &grid.nodes[id];
    node.queued.value.is_some() || node.latch.value.is_some() || node.consumed_pass.is_some()
}

fn stage_outgoing(grid: &mut Grid, id: usize, value: i32) {
    let pass = grid.pass;
    let node = &mut grid.nodes[id];
    node.queued.value = Some(value);
    node.queued_pass = pass;
}

/// Completion check for port writes: done once the latch and queue are
/// both empty on a later attempt, and the drain happened in a strictly
/// earlier sub-pass (keeps completion independent of iteration order).
fn drained_progress(grid: &Grid, id: usize, t: u32) -> Result<ExecuteResult, ExecError> {
    let node = &grid.nodes[id];
    let drained = node.queued.value.is_none() && node.latch.value.is_none();
    if t != 0 && drained {
        if let Some(pass) = node.consumed_pass {
            if pass < grid.pass {
                return Ok(ExecuteResult::Complete);
            }
        }
    }
    Ok(ExecuteResult::Pending)
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Nop => write!(f, "NOP"),
            Opcode::Swp => write!(f, "SWP"),
            Opcode::Sav => write!(f, "SAV"),
            Opcode::Neg => write!(f, "NEG"),
            Opcode::Add(src) => write!(f, "ADD {}", src),
            Opcode::Sub(src) => write!(f, "SUB {}", src),
            Opcode::Mov { src, dst } => write!(f, "MOV {} {}", src, dst),
            Opcode::Jump { cond, label } => {
                let mnemonic = match cond {
                    JumpCond::Always => "JMP",
                    JumpCond::Zero => "JEZ",
                    JumpCond::NotZero => "JNZ",
                    JumpCond::Positive => "JGZ",
                    JumpCond::Negative => "JLZ",
                };
                write!(f, "{} {}", mnemonic, label)
            }
            Opcode::Jro(src) => write!(f, "JRO {}", src),
            Opcode::Provide => write!(f, "_PROVIDE"),
            Opcode::Consume => write!(f, "_CONSUME"),
        }
    }
}
