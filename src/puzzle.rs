//! Puzzle definitions.
//!
//! A puzzle is plain data: name, description lines, stream list, and a
//! width x height layout of tile kinds, optionally with initial per-node
//! programs. The scripting host that authors puzzles is out of scope;
//! this module carries the data model plus a TOML loader so puzzles are
//! files, not code.
//!
//! # Puzzle File Format
//!
//! ```toml
//! [puzzle]
//! name = "SELF-TEST DIAGNOSTIC"
//! description = ["READ A VALUE FROM IN.A", "WRITE THE VALUE TO OUT.A"]
//! layout = [
//!     "processor", "processor", "processor", "processor",
//!     "processor", "damaged",   "processor", "processor",
//!     "processor", "processor", "stack",     "processor",
//! ]
//!
//! [[streams]]
//! kind = "input"
//! name = "IN.A"
//! column = 0
//! values = [1, 2, 3]
//!
//! [[streams]]
//! kind = "output"
//! name = "OUT.A"
//! column = 0
//!
//! [[programs]]
//! x = 0
//! y = 0
//! source = """
//! MOV UP DOWN
//! """
//! ```

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::machine::grid::Grid;
use crate::machine::node::NodeKind;
use crate::stream::BufferedStreams;

/// Kind of a stream attached to the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Values fed into the grid from above.
    Input,
    /// Values the grid must emit below.
    Output,
    /// Image output; collected like an output stream, never rendered
    /// here.
    Image,
}

/// One stream: kind, display name, grid column, and its ordered values.
#[derive(Debug, Clone)]
pub struct Stream {
    pub kind: StreamKind,
    pub name: String,
    pub column: usize,
    pub values: Vec<i32>,
}

/// An initial program for one node.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgramDef {
    pub x: i32,
    pub y: i32,
    pub source: String,
}

/// A loaded puzzle definition.
#[derive(Debug, Clone)]
pub struct Puzzle {
    pub name: String,
    pub description: Vec<String>,
    pub streams: Vec<Stream>,
    pub layout: Vec<NodeKind>,
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub programs: Vec<ProgramDef>,
}

#[derive(Debug, Deserialize)]
struct PuzzleFile {
    puzzle: PuzzleInfo,
    #[serde(default)]
    streams: Vec<StreamDef>,
    #[serde(default)]
    programs: Vec<ProgramDef>,
}

#[derive(Debug, Deserialize)]
struct PuzzleInfo {
    name: String,
    #[serde(default)]
    description: Vec<String>,
    width: Option<usize>,
    height: Option<usize>,
    layout: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDef {
    kind: String,
    name: String,
    column: usize,
    #[serde(default)]
    values: Vec<i32>,
}

/// Map a layout tag to a tile kind. The stream tiles are internal and
/// cannot appear in a layout.
fn tile_from_tag(tag: &str) -> Option<NodeKind> {
    match tag {
        "processor" | "compute" => Some(NodeKind::Processor),
        "stack" | "memory" | "stack_memory" => Some(NodeKind::StackMemory),
        "damaged" => Some(NodeKind::Damaged),
        _ => None,
    }
}

fn stream_kind_from_tag(tag: &str) -> Option<StreamKind> {
    match tag {
        "input" => Some(StreamKind::Input),
        "output" => Some(StreamKind::Output),
        "image" => Some(StreamKind::Image),
        _ => None,
    }
}

impl Puzzle {
    /// Parse a puzzle from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: PuzzleFile = toml::from_str(text).context("Failed to parse puzzle TOML")?;

        let mut layout = Vec::with_capacity(file.puzzle.layout.len());
        for tag in &file.puzzle.layout {
            match tile_from_tag(tag) {
                Some(kind) => layout.push(kind),
                None => bail!("Unknown tile kind '{}' in layout", tag),
            }
        }

        let mut streams = Vec::with_capacity(file.streams.len());
        for def in file.streams {
            let kind = match stream_kind_from_tag(&def.kind) {
                Some(kind) => kind,
                None => bail!("Unknown stream kind '{}' for stream '{}'", def.kind, def.name),
            };
            streams.push(Stream {
                kind,
                name: def.name,
                column: def.column,
                values: def.values,
            });
        }

        Ok(Self {
            name: file.puzzle.name,
            description: file.puzzle.description,
            streams,
            layout,
            width: file.puzzle.width,
            height: file.puzzle.height,
            programs: file.programs,
        })
    }

    /// Load a puzzle from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read puzzle file {}", path.display()))?;
        let puzzle = Self::from_toml_str(&text)
            .with_context(|| format!("Failed to load puzzle {}", path.display()))?;
        log::info!("Loaded puzzle '{}' from {}", puzzle.name, path.display());
        Ok(puzzle)
    }

    /// Build a grid from this definition: construct the nodes, bind a
    /// buffered stream host, and install any initial programs.
    ///
    /// Returns the grid plus a handle on the host so callers can inspect
    /// collected outputs while the grid holds the binding.
    pub fn build(&self) -> Result<(Grid, Rc<RefCell<BufferedStreams>>)> {
        let host = Rc::new(RefCell::new(BufferedStreams::from_streams(&self.streams)));

        let mut grid = Grid::new(
            self.name.clone(),
            self.description.clone(),
            self.streams.clone(),
            self.layout.clone(),
            self.width,
            self.height,
        )?;
        grid.bind_streams(Box::new(Rc::clone(&host)));

        for program in &self.programs {
            grid.compile_and_install(program.x, program.y, &program.source)
                .with_context(|| {
                    format!("Failed to install program on node ({}, {})", program.x, program.y)
                })?;
        }

        Ok((grid, host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIAGNOSTIC: &str = r#"
[puzzle]
name = "SELF-TEST DIAGNOSTIC"
description = ["READ A VALUE FROM IN.A", "WRITE THE VALUE TO OUT.A"]
layout = [
    "processor", "processor", "processor", "processor",
    "processor", "damaged",   "processor", "processor",
    "processor", "processor", "stack",     "processor",
]

[[streams]]
kind = "input"
name = "IN.A"
column = 0
values = [1, 2, 3]

[[streams]]
kind = "output"
name = "OUT.A"
column = 0

[[programs]]
x = 0
y = 0
source = "MOV UP DOWN"
"#;

    #[test]
    fn test_parse_diagnostic_puzzle() {
        let puzzle = Puzzle::from_toml_str(DIAGNOSTIC).unwrap();
        assert_eq!(puzzle.name, "SELF-TEST DIAGNOSTIC");
        assert_eq!(puzzle.description.len(), 2);
        assert_eq!(puzzle.layout.len(), 12);
        assert_eq!(puzzle.layout[5], NodeKind::Damaged);
        assert_eq!(puzzle.layout[10], NodeKind::StackMemory);
        assert_eq!(puzzle.streams.len(), 2);
        assert_eq!(puzzle.streams[0].kind, StreamKind::Input);
        assert_eq!(puzzle.streams[0].values, vec![1, 2, 3]);
        assert_eq!(puzzle.programs.len(), 1);
    }

    #[test]
    fn test_unknown_tile_kind_rejected() {
        let text = r#"
[puzzle]
name = "BAD"
width = 1
height = 1
layout = ["granite"]
"#;
        assert!(Puzzle::from_toml_str(text).is_err());
    }

    #[test]
    fn test_unknown_stream_kind_rejected() {
        let text = r#"
[puzzle]
name = "BAD"
width = 1
height = 1
layout = ["processor"]

[[streams]]
kind = "sideways"
name = "IN.A"
column = 0
"#;
        assert!(Puzzle::from_toml_str(text).is_err());
    }

    #[test]
    fn test_build_wires_grid_and_streams() {
        let puzzle = Puzzle::from_toml_str(DIAGNOSTIC).unwrap();
        let (grid, host) = puzzle.build().unwrap();

        assert_eq!(grid.width(), 4);
        assert_eq!(grid.height(), 3);
        // Stream nodes exist just outside the grid.
        assert!(grid.node(0, -1).is_some());
        assert!(grid.node(0, 3).is_some());
        // The initial program was installed.
        assert_eq!(grid.node(0, 0).unwrap().program().len(), 1);
        assert_eq!(host.borrow().remaining_inputs(0), 3);
    }
}
