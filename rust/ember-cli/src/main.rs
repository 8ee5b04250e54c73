//! Ember CLI — run line-IR programs on the Ember VM.

use clap::Parser as ClapParser;
use ember_vm::program::Program;
use ember_vm::vm::{TraceEvent, Vm};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

// ANSI color helpers
fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}

#[derive(ClapParser)]
#[command(name = "ember", version, about = "The Ember IR virtual machine")]
struct Cli {
    /// Path to the IR file
    file: PathBuf,

    /// Optional argument exposed to the program via sys.argv
    script_arg: Option<String>,

    /// Write a JSONL execution trace to the given file
    #[arg(long)]
    trace: Option<PathBuf>,
}

fn main() {
    // Usage errors exit 1 like every other fatal path; help and version
    // output stay successful.
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    });

    let source = std::fs::read_to_string(&cli.file).unwrap_or_else(|e| {
        eprintln!(
            "{} cannot read file '{}': {}",
            red("error:"),
            bold(&cli.file.display().to_string()),
            e
        );
        std::process::exit(1);
    });

    let program = Program::parse(&source).unwrap_or_else(|e| {
        eprintln!("{} {}", red("error:"), e);
        std::process::exit(1);
    });

    let mut vm = Vm::new(program);
    if let Err(e) = vm.inject_sys(&cli.file.display().to_string(), cli.script_arg.as_deref()) {
        eprintln!("{} {}", red("error:"), e);
        std::process::exit(1);
    }

    if let Some(ref path) = cli.trace {
        let file = std::fs::File::create(path).unwrap_or_else(|e| {
            eprintln!(
                "{} cannot create trace file '{}': {}",
                red("error:"),
                path.display(),
                e
            );
            std::process::exit(1);
        });
        let mut sink = BufWriter::new(file);
        vm.set_trace_sink(Box::new(move |event: &TraceEvent| {
            if let Ok(line) = serde_json::to_string(event) {
                let _ = writeln!(sink, "{}", line);
            }
        }));
    }

    if let Err(e) = vm.run() {
        eprintln!("{} {}", red("runtime error:"), e);
        std::process::exit(1);
    }
}
