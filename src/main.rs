use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use classfile_inspector::code_attribute::DisassemblyPolicy;
use classfile_inspector::interpreter::{SessionSnapshot, StopReason, Value};
use classfile_inspector::{Engine, EngineConfig, EngineError};

#[derive(Parser)]
#[command(name = "classfile-inspector", about = "Inspect, decompile and step through JVM class files")]
struct Cli {
    /// Show unknown opcodes as raw bytes instead of failing
    #[arg(long, global = true)]
    raw_fallback: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the class header, fields and methods
    Info {
        /// Path to the .class file
        input: PathBuf,
    },
    /// Disassemble one method, or every method
    Disasm {
        input: PathBuf,
        /// Method name or name:descriptor
        #[arg(short, long)]
        method: Option<String>,
    },
    /// Decompile one method, or the whole class
    Decompile {
        input: PathBuf,
        #[arg(short, long)]
        method: Option<String>,
        /// Prefix block labels with their bytecode offset
        #[arg(long)]
        offsets: bool,
        /// Decompile methods on worker threads
        #[arg(long)]
        parallel: bool,
    },
    /// Execute a method under the debugger
    Debug {
        input: PathBuf,
        #[arg(short, long)]
        method: String,
        /// Argument value, in parameter order
        #[arg(long = "arg")]
        args: Vec<String>,
        /// Source line to stop at
        #[arg(long = "break")]
        breakpoints: Vec<u32>,
        /// Single-step this many instructions instead of running
        #[arg(long)]
        steps: Option<u64>,
        /// Instruction bound for one run
        #[arg(long)]
        max_iterations: Option<u64>,
    },
    /// List classes referenced outside java/lang
    Deps { input: PathBuf },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = EngineConfig::default();
    if cli.raw_fallback {
        config.disassembly = DisassemblyPolicy::RawFallback;
    }

    let result = match cli.command {
        Commands::Info { input } => open(&input, config).and_then(|e| cmd_info(&e)),
        Commands::Disasm { input, method } => open(&input, config).and_then(|e| cmd_disasm(&e, method.as_deref())),
        Commands::Decompile {
            input,
            method,
            offsets,
            parallel,
        } => {
            config.decompile.render.show_offsets = offsets;
            config.decompile.parallel = parallel;
            open(&input, config).and_then(|e| cmd_decompile(&e, method.as_deref()))
        }
        Commands::Debug {
            input,
            method,
            args,
            breakpoints,
            steps,
            max_iterations,
        } => {
            if let Some(max) = max_iterations {
                config.session.max_iterations = max;
            }
            open(&input, config).and_then(|e| cmd_debug(&e, &method, &args, &breakpoints, steps))
        }
        Commands::Deps { input } => open(&input, config).map(|e| {
            for dep in e.dependencies() {
                println!("{}", dep);
            }
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn open(path: &Path, config: EngineConfig) -> Result<Engine, EngineError> {
    let bytes = fs::read(path).map_err(classfile_inspector::ParseError::from)?;
    Engine::open(&bytes, config)
}

fn cmd_info(engine: &Engine) -> Result<(), EngineError> {
    let class = engine.class();
    println!("=== Class File Info ===");
    println!("Class:            {}", class.this_class_name()?);
    println!("Super:            {}", class.super_class_name()?.unwrap_or("-"));
    println!("Interfaces:       {}", class.interface_names()?.join(", "));
    println!("Version:          {}.{}", class.major_version, class.minor_version);
    println!("Access:           {:?}", class.access_flags);
    println!("Constant pool:    {} entries", class.const_pool.count());
    if let Some(source) = class.source_file()? {
        println!("Source file:      {}", source);
    }

    println!("\nFields:");
    for field in &class.fields {
        println!(
            "  {} {} {}",
            field.access_flags.modifiers().join(" "),
            field.descriptor(&class.const_pool)?,
            field.name(&class.const_pool)?
        );
    }
    println!("\nMethods:");
    for method in engine.methods()? {
        let size = method.code.as_ref().map_or(0, |c| c.code.len());
        println!(
            "  {} {}{} ({} bytes)",
            method.access_flags.modifiers().join(" "),
            method.name,
            method.descriptor,
            size
        );
    }
    Ok(())
}

fn cmd_disasm(engine: &Engine, method: Option<&str>) -> Result<(), EngineError> {
    let keys = match method {
        Some(m) => vec![m.to_string()],
        None => engine.methods()?.iter().map(|m| m.key()).collect(),
    };
    for key in keys {
        println!("{}:", key);
        print!("{}", engine.listing(&key)?);
        println!();
    }
    Ok(())
}

fn cmd_decompile(engine: &Engine, method: Option<&str>) -> Result<(), EngineError> {
    let text = match method {
        Some(m) => engine.decompile(m)?,
        None => engine.decompile_class()?,
    };
    println!("{}", text);
    Ok(())
}

fn cmd_debug(
    engine: &Engine,
    method: &str,
    raw_args: &[String],
    breakpoints: &[u32],
    steps: Option<u64>,
) -> Result<(), EngineError> {
    let descriptor = engine.method(method)?;
    let mut args = Vec::with_capacity(raw_args.len());
    for (raw, ty) in raw_args.iter().zip(&descriptor.signature.params) {
        let value = Value::parse(raw, ty).ok_or_else(|| {
            EngineError::Session(classfile_inspector::SessionError::Fault {
                pc: 0,
                reason: format!("argument {:?} is not a valid {}", raw, ty),
            })
        })?;
        args.push(value);
    }

    let mut session = engine.start_session(method, args)?;
    for line in breakpoints {
        session.set_breakpoint(*line)?;
    }

    match steps {
        Some(n) => {
            for _ in 0..n {
                let snapshot = session.step()?;
                print_position(&snapshot);
                if snapshot.stop_reason == Some(StopReason::Terminated) {
                    break;
                }
            }
        }
        None => loop {
            let snapshot = session.run()?;
            print_position(&snapshot);
            match snapshot.stop_reason {
                Some(StopReason::Breakpoint { .. }) => print_frame(&snapshot, &session),
                _ => break,
            }
        },
    }

    let last = session.snapshot();
    if !last.output.is_empty() {
        println!("--- output ---\n{}", last.output.trim_end());
    }
    if let Some(value) = &last.return_value {
        println!("returned {}", session.describe_value(value));
    }
    if let Some(exception) = &last.uncaught_exception {
        println!("uncaught {}", exception);
    }
    Ok(())
}

fn print_position(snapshot: &SessionSnapshot) {
    let line = snapshot.line.map_or_else(|| "?".to_string(), |l| l.to_string());
    let pc = snapshot.pc.map_or_else(|| "-".to_string(), |p| p.to_string());
    println!(
        "[{:?}] {} pc={} line={} ({:?})",
        snapshot.state, snapshot.method, pc, line, snapshot.stop_reason
    );
}

fn print_frame(snapshot: &SessionSnapshot, session: &classfile_inspector::interpreter::DebugSession<'_>) {
    let Some(frame) = snapshot.top() else {
        return;
    };
    for local in &frame.locals {
        let name = local.name.clone().unwrap_or_else(|| format!("#{}", local.slot));
        println!("    {} = {}", name, session.describe_value(&local.value));
    }
    let stack: Vec<String> = frame.stack.iter().map(|v| session.describe_value(v)).collect();
    println!("    stack: [{}]", stack.join(", "));
}
