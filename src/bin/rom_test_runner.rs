use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use nescore::nes::System;
use nescore::nes::cpu::Registers;
use quick_xml::Reader;
use quick_xml::events::Event;
use sha1::{Digest, Sha1};

#[derive(Debug, Clone)]
struct SuiteTest {
    rom: String,
    instructions: u64,
    start_pc: Option<u16>,
    tracesha1: String,
}

#[derive(Debug, Clone)]
struct RunResult {
    digest: String,
    executed: u64,
    pc: u16,
    halted: bool,
    total_cycles: u64,
    last_line: String,
    last_error: Option<String>,
}

#[derive(Debug, Clone)]
struct Config {
    suite: PathBuf,
    rom_root: PathBuf,
    max_tests: usize,
    contains: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            suite: PathBuf::from("roms/cpu_tests.xml"),
            rom_root: PathBuf::from("roms"),
            max_tests: 80,
            contains: Vec::new(),
        }
    }
}

fn parse_args() -> Result<Config> {
    let mut cfg = Config::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--suite" => {
                let value = args
                    .next()
                    .context("--suite requires a path, e.g. --suite roms/cpu_tests.xml")?;
                cfg.suite = PathBuf::from(value);
            }
            "--rom-root" => {
                let value = args
                    .next()
                    .context("--rom-root requires a path, e.g. --rom-root roms")?;
                cfg.rom_root = PathBuf::from(value);
            }
            "--max-tests" => {
                let value = args
                    .next()
                    .context("--max-tests requires an integer, e.g. --max-tests 120")?;
                cfg.max_tests = value
                    .parse::<usize>()
                    .with_context(|| format!("invalid --max-tests value: {value}"))?;
            }
            "--contains" => {
                let value = args
                    .next()
                    .context("--contains requires a substring, e.g. --contains nestest")?;
                cfg.contains.push(value.to_lowercase());
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("unknown argument: {other}\nUse --help to view supported options.");
            }
        }
    }

    Ok(cfg)
}

fn print_help() {
    println!(
        "CPU trace suite runner\n\n\
Usage:\n\
  cargo run --bin rom_test_runner -- [options]\n\n\
Options:\n\
  --suite <path>                 Path to the XML manifest\n\
  --rom-root <path>              Root path containing ROM files\n\
  --max-tests <n>                Maximum number of tests to run (default 80)\n\
  --contains <substr>            Only run tests whose ROM path contains this text (repeatable)\n\
  -h, --help                     Show this help\n\n\
Manifest entries look like:\n\
  <test rom=\"nestest.nes\" instructions=\"8991\" start-pc=\"C000\">\n\
    <tracesha1>base64 SHA-1 of the trace</tracesha1>\n\
  </test>\n"
    );
}

fn parse_hex_u16(value: &str) -> Result<u16> {
    let digits = value.trim_start_matches("0x").trim_start_matches('$');
    u16::from_str_radix(digits, 16).with_context(|| format!("invalid address: {value}"))
}

fn parse_suite_xml(path: &Path) -> Result<Vec<SuiteTest>> {
    let xml = fs::read_to_string(path)
        .with_context(|| format!("failed to read suite XML: {}", path.display()))?;

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);

    let mut tests = Vec::new();
    let mut current: Option<SuiteTest> = None;
    let mut reading_sha1 = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                if name.as_ref() == b"test" {
                    let mut test = SuiteTest {
                        rom: String::new(),
                        instructions: 0,
                        start_pc: None,
                        tracesha1: String::new(),
                    };

                    for attr in e.attributes().flatten() {
                        let value = attr
                            .decode_and_unescape_value(reader.decoder())
                            .map(|v| v.to_string())
                            .unwrap_or_default();
                        match attr.key.as_ref() {
                            b"rom" => test.rom = value,
                            b"instructions" => {
                                test.instructions = value.parse::<u64>().with_context(|| {
                                    format!("invalid instructions attribute: {value}")
                                })?
                            }
                            b"start-pc" => test.start_pc = Some(parse_hex_u16(&value)?),
                            _ => {}
                        }
                    }

                    current = Some(test);
                } else if name.as_ref() == b"tracesha1" {
                    reading_sha1 = true;
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .decode()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|_| String::new());
                if let Some(test) = current.as_mut() {
                    if reading_sha1 {
                        test.tracesha1.push_str(&text);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                if name.as_ref() == b"tracesha1" {
                    reading_sha1 = false;
                } else if name.as_ref() == b"test" {
                    if let Some(mut test) = current.take() {
                        test.tracesha1 = test.tracesha1.trim().to_string();
                        tests.push(test);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                anyhow::bail!("failed to parse suite XML: {err}");
            }
            _ => {}
        }
    }

    Ok(tests)
}

fn should_run(test: &SuiteTest, cfg: &Config) -> bool {
    if cfg.contains.is_empty() {
        return true;
    }
    let lower = test.rom.to_lowercase();
    cfg.contains.iter().any(|f| lower.contains(f))
}

fn hash_trace(trace: &str) -> String {
    BASE64_STANDARD.encode(Sha1::digest(trace.as_bytes()))
}

fn run_single(test: &SuiteTest, cfg: &Config) -> Result<RunResult> {
    let rom_path = cfg.rom_root.join(&test.rom);
    let mut system = System::new();
    system
        .load_rom_from_path(&rom_path)
        .with_context(|| format!("failed to load ROM {}", rom_path.display()))?;
    system.step_instruction();
    if let Some(pc) = test.start_pc {
        let regs = system.cpu().registers();
        system.cpu_mut().set_registers(Registers { pc, ..regs });
    }

    let mut trace = String::new();
    let mut last_line = String::new();
    let mut executed = 0u64;
    while executed < test.instructions && !system.cpu().halted() {
        last_line = system.trace_line();
        trace.push_str(&last_line);
        trace.push('\n');
        system.step_instruction();
        executed += 1;
    }

    Ok(RunResult {
        digest: hash_trace(&trace),
        executed,
        pc: system.cpu().pc(),
        halted: system.cpu().halted(),
        total_cycles: system.cpu().total_cycles(),
        last_line,
        last_error: system
            .event_log()
            .last_error()
            .map(|event| event.to_string()),
    })
}

fn main() -> Result<()> {
    let cfg = parse_args()?;

    let start = Instant::now();
    let tests = parse_suite_xml(&cfg.suite)?;

    let selected: Vec<SuiteTest> = tests
        .into_iter()
        .filter(|t| should_run(t, &cfg))
        .take(cfg.max_tests)
        .collect();

    println!(
        "Running {} test(s) from {}",
        selected.len(),
        cfg.suite.display()
    );

    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;

    for (idx, test) in selected.iter().enumerate() {
        let label = format!("[{}/{}] {}", idx + 1, selected.len(), test.rom);
        match run_single(test, &cfg) {
            Ok(result) if result.digest == test.tracesha1 => {
                passed += 1;
                println!("PASS {label} ({} instructions)", result.executed);
            }
            Ok(result) => {
                failed += 1;
                println!(
                    "FAIL {label}\n  expected: {}\n  got     : {}\n  executed={} pc=${:04X} halted={} cycles={}\n  last: {}",
                    test.tracesha1,
                    result.digest,
                    result.executed,
                    result.pc,
                    result.halted,
                    result.total_cycles,
                    result.last_line
                );
                if let Some(event) = result.last_error {
                    println!("  event: {event}");
                }
            }
            Err(err) => {
                skipped += 1;
                println!("SKIP {label} -> {err:#}");
            }
        }
    }

    let elapsed = start.elapsed().as_secs_f32();
    println!();
    println!("Summary:");
    println!("- Passed: {passed}");
    println!("- Failed: {failed}");
    println!("- Skipped: {skipped}");
    println!("- Runtime: {:.2}s", elapsed);

    if failed > 0 {
        anyhow::bail!("{failed} trace digest(s) did not match");
    }
    Ok(())
}
