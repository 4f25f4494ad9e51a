//! `cilly` - run Cilly programs and bytecode images.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cilly::bytecode::disasm::print_bc;
use cilly::bytecode::image;
use cilly::bytecode::ir::ProgramBc;
use cilly::config::VmConfig;
use cilly::frontend::token_dumper::TokenDumper;
use cilly::pipeline;
use cilly::runtime::{Externals, turtle};

#[derive(Parser, Debug)]
#[command(name = "cilly", version, about = "Compile and run Cilly programs on a bytecode VM")]
struct Cli {
    /// Source file (.cilly) or bytecode image (.cbc)
    file: PathBuf,

    /// Print the token stream and stop
    #[arg(long)]
    tokens: bool,

    /// Disable ANSI colors in --tokens output
    #[arg(long)]
    no_color: bool,

    /// Show source text instead of token debug names in --tokens output
    #[arg(long)]
    pretty: bool,

    /// Print the parsed AST and stop
    #[arg(long)]
    ast: bool,

    /// Print the disassembly before running
    #[arg(long)]
    dis: bool,

    /// Write a bytecode image instead of running
    #[arg(long, value_name = "OUT.cbc")]
    emit: Option<PathBuf>,

    /// Print stack statistics after the run
    #[arg(long)]
    stats: bool,

    #[arg(long, default_value_t = VmConfig::default().max_call_depth)]
    max_call_depth: usize,

    #[arg(long, default_value_t = VmConfig::default().max_stack_size)]
    max_stack_size: usize,

    /// Increase log verbosity (-v debug, -vv trace); overrides RUST_LOG
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> VmConfig {
        VmConfig::default()
            .with_max_call_depth(self.max_call_depth)
            .with_max_stack_size(self.max_stack_size)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::from_default_env(),
        1 => EnvFilter::new("cilly=debug"),
        _ => EnvFilter::new("cilly=trace"),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn report(e: &anyhow::Error) {
    match e.downcast_ref::<pipeline::Error>() {
        Some(err) => {
            eprintln!("{} error: {}", err.kind(), err);
            if let pipeline::Error::Compile(c) = err {
                if let Some(hint) = c.hint() {
                    eprintln!("  hint: {}", hint);
                }
            }
        }
        None => eprintln!("error: {:#}", e),
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut externals = Externals::new();
    turtle::register(&mut externals, true);

    let bytes =
        fs::read(&cli.file).with_context(|| format!("failed to read '{}'", cli.file.display()))?;

    let bc = if image::is_image(&bytes) || has_extension(&cli.file, "cbc") {
        if cli.tokens || cli.ast {
            bail!("--tokens and --ast need a source file, not a bytecode image");
        }
        pipeline::load_image(&cli.file, &externals)?
    } else {
        ensure_extension(&cli.file)?;
        let source = String::from_utf8(bytes)
            .with_context(|| format!("'{}' is not valid UTF-8", cli.file.display()))?;

        if cli.tokens {
            return dump_tokens(&source, cli.no_color, cli.pretty);
        }
        if cli.ast {
            println!("{:#?}", pipeline::parse(&source)?);
            return Ok(());
        }
        pipeline::compile(&source, &externals)?
    };

    if let Some(out) = &cli.emit {
        image::save(out, &bc).map_err(pipeline::Error::from)?;
        eprintln!("wrote {}", out.display());
        return Ok(());
    }

    run_program(cli, &bc, &externals)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

fn ensure_extension(path: &Path) -> anyhow::Result<()> {
    if !has_extension(path, "cilly") {
        bail!("expected a .cilly or .cbc file, got {}", path.display());
    }
    Ok(())
}

fn dump_tokens(source: &str, no_color: bool, pretty: bool) -> anyhow::Result<()> {
    let tokens = pipeline::tokenize(source)?;

    let mut dumper = TokenDumper::new();
    if no_color {
        dumper = dumper.no_color();
    }
    if pretty {
        dumper = dumper.pretty();
    }
    dumper.dump(&tokens);
    Ok(())
}

fn run_program(cli: &Cli, bc: &ProgramBc, externals: &Externals) -> anyhow::Result<()> {
    if cli.dis {
        print_bc(bc);
    }

    let stdout = std::io::stdout();
    let stats = pipeline::run(bc, externals, cli.config(), stdout.lock())?;

    if cli.stats {
        eprintln!("{}", stats);
    }
    Ok(())
}
