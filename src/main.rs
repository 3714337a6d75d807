//! tis-emu: deterministic emulator for TIS-100-style processor grids.

use std::env;

use anyhow::{bail, Context, Result};

use tis_emu::config::Config;
use tis_emu::machine::{Grid, NodeKind};
use tis_emu::puzzle::{Puzzle, StreamKind};
use tis_emu::stream::BufferedStreams;
use tis_emu::testing;

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut cycles: Option<u64> = None;
    let mut test_mode = false;
    let mut path: Option<String> = None;

    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--cycles" | "-c" => {
                let value = iter.next().context("--cycles needs a value")?;
                cycles = Some(value.parse().context("--cycles expects a number")?);
            }
            "--test" | "-t" => test_mode = true,
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other if !other.starts_with('-') => path = Some(other.to_string()),
            other => bail!("Unknown option: {}", other),
        }
    }

    let path = match path {
        Some(path) => path,
        None => {
            print_usage();
            return Ok(());
        }
    };

    if test_mode {
        let report = testing::run_manifest_file(&path)?;
        println!("Test: {}", report.name);
        println!("Cycles: {}", report.cycles_run);
        if report.passed() {
            println!("Result: PASS");
            return Ok(());
        }
        println!("Result: FAIL");
        for failure in &report.failures {
            println!("  {}", failure);
        }
        bail!("{} expectation(s) failed", report.failures.len());
    }

    println!("Loading: {}", path);
    let puzzle = Puzzle::from_file(&path)?;
    let (mut grid, host) = puzzle.build()?;

    let cycles = cycles.unwrap_or_else(|| Config::get().max_cycles());
    for _ in 0..cycles {
        grid.tick();
    }

    print_summary(&grid, &host.borrow());
    Ok(())
}

fn print_usage() {
    println!("tis-emu: emulator for TIS-100-style processor grids");
    println!();
    println!("Usage:");
    println!("  tis-emu [--cycles N] <puzzle.toml>   run a puzzle and dump state");
    println!("  tis-emu --test <manifest.toml>       run a test manifest");
}

fn print_summary(grid: &Grid, host: &BufferedStreams) {
    println!();
    println!("Puzzle: {}", grid.name());
    for line in grid.description() {
        println!("  {}", line);
    }
    println!("Cycle: {}", grid.cycle());

    println!();
    println!("Node Status:");
    for y in 0..grid.height() as i32 {
        for x in 0..grid.width() as i32 {
            let node = match grid.node(x, y) {
                Some(node) => node,
                None => continue,
            };
            match node.kind() {
                NodeKind::Processor => {
                    print!(
                        "  ({},{}) ACC={:4} BAK={:4} active={}",
                        x,
                        y,
                        node.acc(),
                        node.bak(),
                        node.active_cycles()
                    );
                    if node.stalled() > 0 {
                        print!(" stalls={}", node.stalled());
                    }
                    let op = node.current_op();
                    if op >= 0 {
                        if let Some(op) = node.program().op(op as usize) {
                            print!(" op: {}", op);
                        }
                    }
                    if let Some(fault) = node.fault() {
                        print!(" FAULT: {}", fault.error);
                    }
                    println!();
                }
                NodeKind::StackMemory => {
                    println!("  ({},{}) stack: {:?}", x, y, node.stack());
                }
                NodeKind::Damaged => println!("  ({},{}) damaged", x, y),
                _ => {}
            }
        }
    }

    let outputs: Vec<_> = grid
        .streams()
        .iter()
        .filter(|s| s.kind != StreamKind::Input)
        .collect();
    if !outputs.is_empty() {
        println!();
        println!("Outputs:");
        for stream in outputs {
            println!(
                "  {} (col {}): {:?}",
                stream.name,
                stream.column,
                host.outputs(stream.column as i32)
            );
        }
    }
}
