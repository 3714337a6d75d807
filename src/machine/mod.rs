//! The machine: grid, nodes, opcodes, and data locations.
//!
//! This module provides:
//! - The closed `DataLocation` operand type
//! - Node state (registers, ports, stack, execution state machine)
//! - The resumable opcode set
//! - The grid, which owns all nodes and drives the tick protocol
//!
//! # Architecture Overview
//!
//! A default machine is a 4 x 3 array of tiles, with hidden stream tiles
//! above and below the columns that carry input/output streams:
//!
//! ```text
//!             IN.A
//!              |
//!   +--------+--------+--------+--------+
//! 0 | Proc   | Proc   | Proc   | Proc   |
//!   +--------+--------+--------+--------+
//! 1 | Proc   | Damaged| Proc   | Stack  |
//!   +--------+--------+--------+--------+
//! 2 | Proc   | Proc   | Proc   | Proc   |
//!   +--------+--------+--------+--------+
//!              |
//!             OUT.A
//! ```
//!
//! Every cell runs "simultaneously": each tick makes two execution
//! sub-passes over all nodes, then one commit pass. The sub-pass rules
//! (see `grid`) make results independent of the order nodes are visited
//! in, so programs behave as if truly concurrent.
//!
//! # Example
//!
//! ```
//! use tis_emu::machine::{Grid, NodeKind};
//!
//! let mut grid = Grid::new(
//!     "EXAMPLE",
//!     Vec::new(),
//!     Vec::new(),
//!     vec![NodeKind::Processor; 12],
//!     None,
//!     None,
//! )
//! .unwrap();
//!
//! grid.compile_and_install(0, 0, "MOV 7 ACC").unwrap();
//! grid.tick(); // power-on
//! grid.tick(); // first execution tick
//! assert_eq!(grid.node(0, 0).unwrap().acc(), 7);
//! ```

pub mod grid;
pub mod location;
pub mod node;
pub mod opcode;

pub use grid::{Grid, GridError, InstallError, DEFAULT_HEIGHT, DEFAULT_WIDTH};
pub use location::{DataLocation, ANY_READ_ORDER};
pub use node::{Node, NodeFault, NodeKind, PortLatch, REG_MAX, REG_MIN, STACK_CAPACITY};
pub use opcode::{ExecError, ExecuteResult, JumpCond, Opcode};
