//! Test runner that executes puzzle tests defined by TOML manifests.
//!
//! A manifest names a puzzle, the programs to install, how many execution
//! ticks to run, and what to expect afterwards: node register values
//! and/or collected stream outputs. This is the minimal host contract:
//! construct a grid from a puzzle definition, install programs through
//! the compiler, tick a fixed number of times, inspect.
//!
//! # Example Manifest
//!
//! ```toml
//! [test]
//! name = "diagnostic"
//! puzzle = "01_diagnostic.toml"
//! cycles = 3
//!
//! [[programs]]
//! x = 0
//! y = 0
//! source = """
//! ADD 112
//! ADD -11
//! MOV ACC DOWN
//! """
//!
//! [[expected.nodes]]
//! x = 0
//! y = 1
//! acc = 101
//!
//! [expected.outputs]
//! 0 = [1, 2, 3]
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::puzzle::Puzzle;

/// Test manifest defining a single puzzle test.
#[derive(Debug, Clone, Deserialize)]
pub struct TestManifest {
    pub test: TestInfo,
    #[serde(default)]
    pub programs: Vec<ProgramEntry>,
    #[serde(default)]
    pub expected: ExpectedDef,
}

/// Basic test metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct TestInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Puzzle file, relative to the manifest. Optional when the caller
    /// supplies the puzzle directly.
    pub puzzle: Option<String>,
    /// Execution ticks to run after the power-on tick.
    pub cycles: u64,
}

/// A program to install on one node before running.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgramEntry {
    pub x: i32,
    pub y: i32,
    pub source: String,
}

/// Expected state after the run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpectedDef {
    #[serde(default)]
    pub nodes: Vec<NodeExpect>,
    /// Expected collected outputs, keyed by column.
    #[serde(default)]
    pub outputs: HashMap<String, Vec<i32>>,
}

/// Expected register values for one node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeExpect {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub acc: Option<i32>,
    #[serde(default)]
    pub bak: Option<i32>,
}

/// Outcome of one manifest run.
#[derive(Debug)]
pub struct TestReport {
    pub name: String,
    pub cycles_run: u64,
    pub failures: Vec<String>,
}

impl TestReport {
    /// Whether every expectation held.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

impl TestManifest {
    /// Parse a manifest from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse test manifest")
    }

    /// Load a manifest from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::from_toml_str(&text)
    }
}

/// Run one manifest against a puzzle.
///
/// Builds the grid, installs the manifest's programs on top of the
/// puzzle's initial ones, runs the power-on tick plus the declared number
/// of execution ticks, then checks every expectation.
pub fn run_test(puzzle: &Puzzle, manifest: &TestManifest) -> Result<TestReport> {
    let (mut grid, host) = puzzle.build()?;

    for program in &manifest.programs {
        grid.compile_and_install(program.x, program.y, &program.source)
            .with_context(|| {
                format!(
                    "Failed to install test program on node ({}, {})",
                    program.x, program.y
                )
            })?;
    }

    for _ in 0..=manifest.test.cycles {
        grid.tick();
    }

    let mut failures = Vec::new();

    for expect in &manifest.expected.nodes {
        let node = match grid.node(expect.x, expect.y) {
            Some(node) => node,
            None => {
                failures.push(format!("no node at ({}, {})", expect.x, expect.y));
                continue;
            }
        };
        if let Some(acc) = expect.acc {
            if node.acc() != acc {
                failures.push(format!(
                    "node ({}, {}): ACC = {}, expected {}",
                    expect.x,
                    expect.y,
                    node.acc(),
                    acc
                ));
            }
        }
        if let Some(bak) = expect.bak {
            if node.bak() != bak {
                failures.push(format!(
                    "node ({}, {}): BAK = {}, expected {}",
                    expect.x,
                    expect.y,
                    node.bak(),
                    bak
                ));
            }
        }
    }

    let host = host.borrow();
    for (column, expected) in &manifest.expected.outputs {
        let column: i32 = column
            .parse()
            .with_context(|| format!("Non-numeric output column '{}'", column))?;
        let actual = host.outputs(column);
        if actual != expected.as_slice() {
            failures.push(format!(
                "column {}: outputs {:?}, expected {:?}",
                column, actual, expected
            ));
        }
    }

    Ok(TestReport {
        name: manifest.test.name.clone(),
        cycles_run: manifest.test.cycles,
        failures,
    })
}

/// Load and run a manifest file. The puzzle path is resolved relative to
/// the manifest's directory.
pub fn run_manifest_file(path: impl AsRef<Path>) -> Result<TestReport> {
    let path = path.as_ref();
    let manifest = TestManifest::from_file(path)?;

    let puzzle_rel = match &manifest.test.puzzle {
        Some(puzzle) => puzzle,
        None => bail!("Manifest {} names no puzzle file", path.display()),
    };
    let puzzle_path = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(puzzle_rel);
    let puzzle = Puzzle::from_file(&puzzle_path)?;

    run_test(&puzzle, &manifest)
}
