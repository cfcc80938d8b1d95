//! Mica Compiler CLI
//!
//! Command-line interface for compiling .mica programs to bytecode and
//! inspecting compiled artifacts.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use micac::CompilerConfig;

#[derive(ClapParser)]
#[command(name = "micac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mica compiler - compile .mica programs to bytecode", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .mica file to a bytecode artifact
    Build {
        /// Input .mica source file
        input: PathBuf,

        /// Output artifact path (defaults to the input with a .mbc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the compiled program's disassembly after building
        #[arg(long)]
        dump: bool,

        /// Disable constant folding
        #[arg(long)]
        no_fold: bool,
    },

    /// Decode a bytecode artifact and print its constants and functions
    Disasm {
        /// Compiled .mbc artifact
        input: PathBuf,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            dump,
            no_fold,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("mbc"));
            run_build(&input, &output, dump, no_fold);
        }
        Commands::Disasm { input } => {
            run_disasm(&input);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "micac", &mut io::stdout());
        }
    }
}

fn run_build(input: &Path, output: &Path, dump: bool, no_fold: bool) {
    let config = CompilerConfig::new().with_constant_folding(!no_fold);

    match micac::compile_file(input, output, &config) {
        Ok(program) => {
            println!(
                "Compiled {} constant(s), {} function(s) -> {}",
                program.constants.len(),
                program.functions.len(),
                output.display()
            );
            if dump {
                print_program(&program.constants, &program.functions);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_disasm(input: &Path) {
    let bytes = match fs::read(input) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    match mica_bytecode::decode_from_slice(&bytes) {
        Ok((constants, functions)) => {
            print_program(&constants, &functions);
        }
        Err(e) => {
            eprintln!("Error decoding {}: {}", input.display(), e);
            process::exit(1);
        }
    }
}

fn print_program(constants: &[mica_bytecode::Value], functions: &[mica_bytecode::Function]) {
    println!("constants ({}):", constants.len());
    for (idx, constant) in constants.iter().enumerate() {
        println!("  [{}] {}", idx, constant);
    }
    println!("functions ({}):", functions.len());
    for (idx, function) in functions.iter().enumerate() {
        print!("[{}] {}", idx, function);
    }
}
