//! Command-line surface for `ilc` (SPEC_FULL §0, §1 "Configuration").
//!
//! Grounded on `examples/other_examples/fc822528_shuklaayush-rvr__crates-
//! rvr-src-cli.rs.rs`'s `clap::Parser`/`Subcommand` shape — the closest
//! pack example of a compiler-toolchain CLI with a `run`/`compile`-style
//! subcommand split — since the teacher's own `tidec::main` is a hand-rolled
//! demo rather than a real argument parser.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use il_vm::{DispatchMode, TraceMode};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "ilc")]
#[command(about = "IL core toolchain: verify, link, optimise, and run IL modules")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging (equivalent to IL_FILTER=debug).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and verify one or more IL modules without running them.
    Verify {
        /// IL source files to verify.
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Parse, verify, and interpret a module with the VM.
    Run {
        /// IL source file to execute.
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Function to call as the entry point.
        #[arg(long, default_value = "main")]
        func: String,

        /// Comma-separated argument literals for the entry function
        /// (integers, floats, or `true`/`false`, matched against each
        /// parameter's declared type).
        #[arg(long, value_delimiter = ',')]
        args: Vec<String>,

        /// Dispatch strategy (spec §4.6); all three must agree.
        #[arg(long, value_enum, default_value = "table")]
        dispatch: DispatchArg,

        /// Execution trace mode.
        #[arg(long, value_enum, default_value = "off")]
        trace: TraceArg,

        /// Register a `.loc` file id for source-mode tracing, as `ID:PATH`.
        /// May be repeated.
        #[arg(long = "trace-file", value_name = "ID:PATH")]
        trace_files: Vec<String>,

        /// Maximum call-stack depth before a recursion trap fires.
        #[arg(long)]
        max_recursion_depth: Option<usize>,

        /// Instructions between cooperative interrupt checks.
        #[arg(long)]
        interrupt_interval: Option<u64>,

        /// Pause execution whenever this block label is entered. May be
        /// repeated.
        #[arg(long = "break-label", value_name = "LABEL")]
        break_labels: Vec<String>,

        /// Pause execution at `FILE_ID:LINE`. May be repeated.
        #[arg(long = "break-line", value_name = "FILE_ID:LINE")]
        break_lines: Vec<String>,
    },
    /// Merge several IL modules into one per the linker's rules (spec
    /// §4.5).
    Link {
        /// IL source files, in link order. The entry module is whichever
        /// one defines a non-import `main`.
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,

        /// Where to write the merged module's IL text. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print externs in sorted (canonical) order.
        #[arg(long)]
        canonical: bool,
    },
    /// Parse a module and re-emit its canonical IL text (round-trip, spec
    /// §4.1/§8).
    EmitIl {
        /// IL source file to re-emit.
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Where to write the re-emitted text. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print externs in sorted (canonical) order.
        #[arg(long)]
        canonical: bool,
    },
    /// Run the transform pipeline (spec §4.4) over a module and emit the
    /// result.
    Opt {
        /// IL source file to optimise.
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Where to write the transformed module's IL text. Defaults to
        /// stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip constant folding.
        #[arg(long)]
        no_const_fold: bool,

        /// Skip peephole simplification.
        #[arg(long)]
        no_peephole: bool,

        /// Skip dead store elimination.
        #[arg(long)]
        no_dse: bool,

        /// Skip SimplifyCFG.
        #[arg(long)]
        no_simplify_cfg: bool,

        /// Maximum fixed-point rounds.
        #[arg(long, default_value = "16")]
        max_iterations: usize,

        /// Print per-pass change counters to stderr.
        #[arg(long)]
        stats: bool,
    },
    /// Print the CFG, dominator tree, and loop forest of one function
    /// (spec §4.3).
    DumpCfg {
        /// IL source file to analyse.
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Function to analyse.
        #[arg(long)]
        func: String,
    },
}

/// CLI-facing mirror of [`il_vm::DispatchMode`] (clap's `ValueEnum` can't be
/// derived on a type from another crate).
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum DispatchArg {
    #[default]
    Table,
    Switch,
    Threaded,
}

impl From<DispatchArg> for DispatchMode {
    fn from(arg: DispatchArg) -> Self {
        match arg {
            DispatchArg::Table => DispatchMode::Table,
            DispatchArg::Switch => DispatchMode::Switch,
            DispatchArg::Threaded => DispatchMode::Threaded,
        }
    }
}

/// CLI-facing mirror of [`il_vm::TraceMode`].
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum TraceArg {
    #[default]
    Off,
    Il,
    Src,
}

impl From<TraceArg> for TraceMode {
    fn from(arg: TraceArg) -> Self {
        match arg {
            TraceArg::Off => TraceMode::Off,
            TraceArg::Il => TraceMode::Il,
            TraceArg::Src => TraceMode::Src,
        }
    }
}

/// Parses a repeated `ID:PATH` argument list into `(file_id, path)` pairs.
pub fn parse_trace_files(items: &[String]) -> Result<Vec<(u32, String)>, String> {
    items
        .iter()
        .map(|item| {
            let (id, path) = item
                .split_once(':')
                .ok_or_else(|| format!("invalid --trace-file `{item}`, expected ID:PATH"))?;
            let id: u32 = id
                .parse()
                .map_err(|_| format!("invalid file id `{id}` in --trace-file `{item}`"))?;
            Ok((id, path.to_string()))
        })
        .collect()
}

/// Parses a repeated `FILE_ID:LINE` breakpoint list.
pub fn parse_break_lines(items: &[String]) -> Result<Vec<(u32, u32)>, String> {
    items
        .iter()
        .map(|item| {
            let (file, line) = item
                .split_once(':')
                .ok_or_else(|| format!("invalid --break-line `{item}`, expected FILE_ID:LINE"))?;
            let file: u32 = file
                .parse()
                .map_err(|_| format!("invalid file id `{file}` in --break-line `{item}`"))?;
            let line: u32 = line
                .parse()
                .map_err(|_| format!("invalid line `{line}` in --break-line `{item}`"))?;
            Ok((file, line))
        })
        .collect()
}
