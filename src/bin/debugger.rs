use anyhow::Result;
use nescore::nes::{
    FLAG_CARRY, FLAG_DECIMAL, FLAG_INTERRUPT, FLAG_NEGATIVE, FLAG_OVERFLOW, FLAG_ZERO, System,
};
use std::path::Path;

fn print_help() {
    println!("Commands:");
    println!("  step, s [n]  - Step n instructions (default 1), printing a trace line each");
    println!("  run, r <n>   - Run n instructions quietly");
    println!("  clock, c     - Advance a single clock");
    println!("  regs         - Show CPU registers");
    println!("  mem <addr>   - Show 16 bytes at address (hex)");
    println!("  stack        - Dump the stack page");
    println!("  reset        - Reset the CPU");
    println!("  irq / nmi    - Raise an interrupt");
    println!("  mapper       - Show mapper state");
    println!("  bus          - Show bus access counters");
    println!("  events [n]   - Show the n most recent events (default 16)");
    println!("  quit, q      - Exit debugger");
}

fn parse_addr(text: &str) -> Option<u16> {
    u16::from_str_radix(text.trim_start_matches("0x").trim_start_matches('$'), 16).ok()
}

fn print_regs(system: &System) {
    let regs = system.cpu().registers();
    let p = regs.p;
    println!("A: ${:02X}  X: ${:02X}  Y: ${:02X}", regs.a, regs.x, regs.y);
    println!("P: {:08b} (NVUBDIZC)", p);
    println!("SP: ${:02X}  PC: ${:04X}", regs.sp, regs.pc);
    println!(
        "Flags: N={} V={} D={} I={} Z={} C={}",
        (p & FLAG_NEGATIVE) != 0,
        (p & FLAG_OVERFLOW) != 0,
        (p & FLAG_DECIMAL) != 0,
        (p & FLAG_INTERRUPT) != 0,
        (p & FLAG_ZERO) != 0,
        (p & FLAG_CARRY) != 0
    );
    println!(
        "Cycles: {}  halted: {}",
        system.cpu().total_cycles(),
        system.cpu().halted()
    );
}

fn main() -> Result<()> {
    println!("nescore 6502 Debugger");
    println!("=====================");
    println!();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        println!("Usage: nescore_debug <rom.nes>");
        println!();
        print_help();
        return Ok(());
    }

    let rom_path = &args[1];
    println!("Loading ROM: {}", rom_path);

    let mut system = System::new();
    system.load_rom_from_path(Path::new(rom_path))?;

    println!("ROM loaded successfully!");
    if let Some(cart) = system.cartridge() {
        println!("Cartridge: {}", cart.describe());
    }
    println!();

    println!("Initial state:");
    print_regs(&system);

    println!();
    println!("Type 'help' for commands");

    loop {
        print!("> ");
        std::io::Write::flush(&mut std::io::stdout()).ok();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "help" => print_help(),
            "step" | "s" => {
                let count = parts
                    .get(1)
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(1);
                for _ in 0..count {
                    if system.cpu().halted() {
                        println!("CPU is halted; use 'reset'");
                        break;
                    }
                    println!("{}", system.trace_line());
                    system.step_instruction();
                }
            }
            "run" | "r" => {
                let Some(count) = parts.get(1).and_then(|v| v.parse::<u64>().ok()) else {
                    println!("Usage: run <instructions>");
                    continue;
                };
                let mut executed = 0u64;
                while executed < count && !system.cpu().halted() {
                    system.step_instruction();
                    executed += 1;
                }
                println!("Ran {executed} instruction(s)");
                println!("{}", system.trace_line());
            }
            "clock" | "c" => {
                system.clock();
                println!(
                    "cycles={} remaining={}",
                    system.cpu().total_cycles(),
                    system.cpu().cycles_left()
                );
            }
            "regs" => print_regs(&system),
            "mem" => {
                let Some(addr) = parts.get(1).and_then(|v| parse_addr(v)) else {
                    println!("Usage: mem <addr>");
                    continue;
                };
                println!("Memory ${:04X}-${:04X}:", addr, addr.wrapping_add(15));
                let mut s = String::new();
                for i in 0..16 {
                    let a = addr.wrapping_add(i);
                    if i % 8 == 0 {
                        if i > 0 {
                            println!("{}", s);
                            s = String::new();
                        }
                        s.push_str(&format!("{:04X}: ", a));
                    }
                    s.push_str(&format!("{:02X} ", system.peek(a)));
                }
                println!("{}", s);
            }
            "stack" => print!("{}", system.dump_stack()),
            "reset" => {
                system.reset();
                print_regs(&system);
            }
            "irq" => {
                let serviced = system.irq();
                println!("IRQ {}", if serviced { "serviced" } else { "masked" });
            }
            "nmi" => {
                let serviced = system.nmi();
                println!("NMI {}", if serviced { "serviced" } else { "ignored" });
            }
            "mapper" => {
                println!("Mapper: {}", system.debug_mapper_state());
            }
            "bus" => {
                let stats = system.bus_stats();
                println!(
                    "reads={} writes={} ram={}/{} ppu={}/{} cart={}/{} unmapped={}/{}",
                    stats.reads,
                    stats.writes,
                    stats.ram_reads,
                    stats.ram_writes,
                    stats.ppu_reads,
                    stats.ppu_writes,
                    stats.cart_reads,
                    stats.cart_writes,
                    stats.unmapped_reads,
                    stats.unmapped_writes
                );
            }
            "events" => {
                let limit = parts
                    .get(1)
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(16);
                for event in system.event_log().recent(limit) {
                    println!("{event}");
                }
            }
            "quit" | "q" => {
                println!("Goodbye!");
                break;
            }
            _ => {
                println!(
                    "Unknown command: {}. Type 'help' for available commands.",
                    parts[0]
                );
            }
        }
    }

    Ok(())
}
