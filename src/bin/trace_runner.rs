use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use nescore::nes::System;
use nescore::nes::bus::BusStats;
use nescore::nes::cpu::Registers;
use nescore::nes::trace::TraceState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Config {
    rom: PathBuf,
    instructions: u64,
    start_pc: Option<u16>,
    compare: Option<PathBuf>,
    json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rom: PathBuf::from("roms/nestest.nes"),
            instructions: 8991,
            start_pc: None,
            compare: None,
            json: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct Mismatch {
    line: usize,
    fields: Vec<String>,
    expected: String,
    actual: String,
}

#[derive(Debug, Serialize)]
struct Summary {
    rom: String,
    instructions: u64,
    total_cycles: u64,
    halted: bool,
    registers: Registers,
    compared_lines: usize,
    mismatch: Option<Mismatch>,
    bus: BusStats,
    elapsed_secs: f32,
}

fn parse_hex_u16(value: &str) -> Result<u16> {
    let digits = value
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .trim_start_matches('$');
    u16::from_str_radix(digits, 16).with_context(|| format!("invalid address: {value}"))
}

fn load_config_file(path: &str) -> Result<Config> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse config {path}"))
}

fn parse_args() -> Result<Config> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // A config file is the base layer; every other flag overrides it.
    let mut cfg = match args.iter().position(|arg| arg == "--config") {
        Some(i) => {
            let path = args
                .get(i + 1)
                .context("--config requires a path, e.g. --config trace.json")?;
            load_config_file(path)?
        }
        None => Config::default(),
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                args.next();
            }
            "--rom" => {
                let value = args
                    .next()
                    .context("--rom requires a path, e.g. --rom roms/nestest.nes")?;
                cfg.rom = PathBuf::from(value);
            }
            "--instructions" => {
                let value = args
                    .next()
                    .context("--instructions requires an integer, e.g. --instructions 8991")?;
                cfg.instructions = value
                    .parse::<u64>()
                    .with_context(|| format!("invalid --instructions value: {value}"))?;
            }
            "--start-pc" => {
                let value = args
                    .next()
                    .context("--start-pc requires a hex address, e.g. --start-pc C000")?;
                cfg.start_pc = Some(
                    parse_hex_u16(&value)
                        .with_context(|| format!("invalid --start-pc value: {value}"))?,
                );
            }
            "--compare" => {
                let value = args
                    .next()
                    .context("--compare requires a log path, e.g. --compare roms/nestest.log")?;
                cfg.compare = Some(PathBuf::from(value));
            }
            "--json" => cfg.json = true,
            "--help" | "-h" => {
                println!(
                    "trace_runner\n\n\
Usage:\n\
  cargo run --release --bin trace_runner -- [options]\n\n\
Options:\n\
  --rom <path>           ROM path (default roms/nestest.nes)\n\
  --instructions <n>     Instructions to execute (default 8991)\n\
  --start-pc <hex>       Jump here after reset, e.g. C000 for nestest automation\n\
  --compare <log>        Check every line against a reference trace\n\
  --json                 Print a JSON summary instead of trace lines\n\
  --config <file.json>   Load options from JSON; flags override it\n\
  -h, --help             Show this help\n"
                );
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(cfg)
}

fn load_reference(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read reference trace {}", path.display()))?;
    Ok(text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

fn main() -> Result<()> {
    let cfg = parse_args()?;
    let start = Instant::now();

    let reference = match cfg.compare.as_ref() {
        Some(path) => Some(load_reference(path)?),
        None => None,
    };

    let mut system = System::new();
    system
        .load_rom_from_path(&cfg.rom)
        .with_context(|| format!("failed to load ROM {}", cfg.rom.display()))?;
    system.step_instruction();
    if let Some(pc) = cfg.start_pc {
        let regs = system.cpu().registers();
        system.cpu_mut().set_registers(Registers { pc, ..regs });
    }

    let mut executed = 0u64;
    let mut compared = 0usize;
    let mut mismatch = None;

    while executed < cfg.instructions && !system.cpu().halted() {
        let line = system.trace_line();
        if let Some(reference) = reference.as_ref() {
            let Some(expected_line) = reference.get(executed as usize) else {
                break;
            };
            let expected = TraceState::parse(expected_line)
                .with_context(|| format!("bad reference line {}", executed + 1))?;
            let fields = TraceState::from_cpu(system.cpu()).mismatches(&expected);
            compared += 1;
            if !fields.is_empty() {
                mismatch = Some(Mismatch {
                    line: executed as usize + 1,
                    fields,
                    expected: expected_line.clone(),
                    actual: line,
                });
                break;
            }
        }
        if !cfg.json {
            println!("{line}");
        }
        system.step_instruction();
        executed += 1;
    }

    let summary = Summary {
        rom: cfg.rom.display().to_string(),
        instructions: executed,
        total_cycles: system.cpu().total_cycles(),
        halted: system.cpu().halted(),
        registers: system.cpu().registers(),
        compared_lines: compared,
        mismatch,
        bus: system.bus_stats(),
        elapsed_secs: start.elapsed().as_secs_f32(),
    };

    if cfg.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!();
        println!("Trace Summary");
        println!("- rom: {}", summary.rom);
        println!("- instructions: {}", summary.instructions);
        println!("- total cycles: {}", summary.total_cycles);
        println!("- halted: {}", summary.halted);
        println!("- bus reads/writes: {}/{}", summary.bus.reads, summary.bus.writes);
        if reference.is_some() {
            println!("- compared lines: {}", summary.compared_lines);
        }
        println!("- elapsed: {:.2}s", summary.elapsed_secs);
        if let Some(event) = system.event_log().last_error() {
            println!("- last error: {event}");
        }
    }

    if let Some(mismatch) = summary.mismatch {
        eprintln!("mismatch at line {}: {}", mismatch.line, mismatch.fields.join(", "));
        eprintln!("  expected: {}", mismatch.expected);
        eprintln!("  actual:   {}", mismatch.actual);
        anyhow::bail!("trace diverged from reference at line {}", mismatch.line);
    }
    Ok(())
}
