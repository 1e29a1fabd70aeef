//! The CLI driver that assembles the IL core's library crates into a
//! runnable tool (SPEC_FULL §0): parse → verify → (link) → (transform) →
//! run/emit, grounded on `tidec`'s `main.rs` as "the thing that wires the
//! library crates together", with `clap` standing in for that file's
//! hand-rolled demo argument handling.

mod cli;

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use il_analysis::AnalysisManager;
use il_core::{Diagnostic, Module, Ty};
use il_io::{parse, serialize, SerializeOptions};
use il_transform::{PassManager, PipelineConfig};
use il_vm::{
    DebugAction, DebugController, PauseReason, RunOutcome, Slot, SourceManager, TraceConfig,
    TraceMode, TraceSink, Vm, VmOptions,
};
use il_verify::verify;

use cli::{Cli, Commands, EXIT_FAILURE, EXIT_SUCCESS};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let _ = il_log::Logger::init_logger(il_log::LoggerConfig {
        log_writer: il_log::LogWriter::Stderr,
        filter: Ok(filter.to_string()),
        color: std::env::var("IL_COLOR"),
        line_numbers: std::env::var("IL_LINE_NUMBERS"),
    });

    let code = match run(cli.command) {
        Ok(()) => EXIT_SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            EXIT_FAILURE
        }
    };
    ExitCode::from(code as u8)
}

fn run(command: Commands) -> Result<(), String> {
    match command {
        Commands::Verify { inputs } => cmd_verify(&inputs),
        Commands::Run {
            input,
            func,
            args,
            dispatch,
            trace,
            trace_files,
            max_recursion_depth,
            interrupt_interval,
            break_labels,
            break_lines,
        } => cmd_run(
            &input,
            &func,
            &args,
            dispatch.into(),
            trace.into(),
            &trace_files,
            max_recursion_depth,
            interrupt_interval,
            &break_labels,
            &break_lines,
        ),
        Commands::Link { inputs, output, canonical } => cmd_link(&inputs, output.as_deref(), canonical),
        Commands::EmitIl { input, output, canonical } => cmd_emit_il(&input, output.as_deref(), canonical),
        Commands::Opt {
            input,
            output,
            no_const_fold,
            no_peephole,
            no_dse,
            no_simplify_cfg,
            max_iterations,
            stats,
        } => cmd_opt(
            &input,
            output.as_deref(),
            PipelineConfig {
                const_fold: !no_const_fold,
                peephole: !no_peephole,
                dse: !no_dse,
                simplify_cfg: !no_simplify_cfg,
                max_iterations,
            },
            stats,
        ),
        Commands::DumpCfg { input, func } => cmd_dump_cfg(&input, &func),
    }
}

/// Reads an IL source file, parses it, and fails with every diagnostic the
/// parser collected, joined into one message (spec §7: the parser itself
/// fails fast on the first error within a function, but the CLI surfaces
/// whatever the parser returns verbatim).
fn load_module(path: &Path) -> Result<Module, String> {
    let src = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    parse(&src).map_err(|diags| render_diagnostics(path, &diags))
}

fn load_and_verify(path: &Path) -> Result<Module, String> {
    let module = load_module(path)?;
    verify(&module).map_err(|d| render_diagnostics(path, std::slice::from_ref(&d)))?;
    Ok(module)
}

fn render_diagnostics(path: &Path, diags: &[Diagnostic]) -> String {
    diags
        .iter()
        .map(|d| format!("{}: {d}", path.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn cmd_verify(inputs: &[std::path::PathBuf]) -> Result<(), String> {
    let mut failed = false;
    for path in inputs {
        match load_and_verify(path) {
            Ok(module) => {
                println!(
                    "{}: ok ({} function(s), {} extern(s), {} global(s))",
                    path.display(),
                    module.functions.len(),
                    module.externs.len(),
                    module.globals.len()
                );
            }
            Err(message) => {
                eprintln!("{message}");
                failed = true;
            }
        }
    }
    if failed {
        Err("verification failed".to_string())
    } else {
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    input: &Path,
    func_name: &str,
    arg_literals: &[String],
    dispatch_mode: il_vm::DispatchMode,
    trace_mode: TraceMode,
    trace_files: &[String],
    max_recursion_depth: Option<usize>,
    interrupt_interval: Option<u64>,
    break_labels: &[String],
    break_lines: &[String],
) -> Result<(), String> {
    let module = load_and_verify(input)?;

    let func = module
        .function(func_name)
        .ok_or_else(|| format!("no function named `{func_name}` in {}", input.display()))?;
    if func.params.len() != arg_literals.len() {
        return Err(format!(
            "`{func_name}` takes {} argument(s), {} given",
            func.params.len(),
            arg_literals.len()
        ));
    }
    let ret_ty = func.ret_ty;
    let arg_slots = func
        .params
        .iter()
        .zip(arg_literals)
        .map(|(p, lit)| parse_arg(lit, p.ty))
        .collect::<Result<Vec<_>, _>>()?;

    let mut options = VmOptions::default();
    if let Some(d) = max_recursion_depth {
        options.max_recursion_depth = d;
    }
    if let Some(i) = interrupt_interval {
        options.interrupt_check_interval = i;
    }
    options.dispatch_mode = dispatch_mode;

    let mut vm = Vm::new(&module, options);

    if trace_mode != TraceMode::Off {
        let mut source_manager = SourceManager::new();
        for (id, path) in cli::parse_trace_files(trace_files)? {
            source_manager.register_file(id, path);
        }
        vm.with_trace(TraceSink::new(TraceConfig::new(trace_mode, source_manager)));
    }

    let has_breakpoints = !break_labels.is_empty() || !break_lines.is_empty();
    if has_breakpoints {
        let mut debug = DebugController::new();
        for label in break_labels {
            debug.break_on_label(label.clone());
        }
        for (file, line) in cli::parse_break_lines(break_lines)? {
            debug.break_at_source(file, line);
        }
        vm.with_debug(debug);
    }

    let mut outcome = vm.run(func_name, arg_slots).map_err(|d| format!("{d}"))?;
    loop {
        match outcome {
            RunOutcome::Completed(result) => {
                match result {
                    Some(slot) => println!("{}", format_slot(slot, ret_ty)),
                    None => println!("(void)"),
                }
                return Ok(());
            }
            RunOutcome::Paused(reason) => {
                eprintln!("paused: {}", describe_pause(reason));
                outcome = vm.resume(DebugAction::Continue).map_err(|d| format!("{d}"))?;
            }
        }
    }
}

fn describe_pause(reason: PauseReason) -> &'static str {
    match reason {
        PauseReason::Breakpoint => "breakpoint hit",
        PauseReason::StepBudget => "step budget exhausted",
        PauseReason::Interrupted => "interrupted",
    }
}

fn parse_arg(literal: &str, ty: Ty) -> Result<Slot, String> {
    match ty {
        Ty::I1 => match literal {
            "true" | "1" => Ok(Slot::from_bool(true)),
            "false" | "0" => Ok(Slot::from_bool(false)),
            other => Err(format!("cannot parse `{other}` as i1")),
        },
        Ty::I32 | Ty::I64 => literal
            .parse::<i64>()
            .map(Slot::from_i64)
            .map_err(|_| format!("cannot parse `{literal}` as an integer")),
        Ty::F64 => literal
            .parse::<f64>()
            .map(Slot::from_f64)
            .map_err(|_| format!("cannot parse `{literal}` as a float")),
        other => Err(format!("arguments of type `{other}` are not supported from the CLI")),
    }
}

fn format_slot(slot: Slot, ty: Ty) -> String {
    match ty {
        Ty::I1 => slot.as_bool().to_string(),
        Ty::I32 | Ty::I64 => slot.as_i64().to_string(),
        Ty::F64 => slot.as_f64().to_string(),
        _ => slot.as_i64().to_string(),
    }
}

fn cmd_link(inputs: &[std::path::PathBuf], output: Option<&Path>, canonical: bool) -> Result<(), String> {
    let mut modules = Vec::with_capacity(inputs.len());
    for path in inputs {
        modules.push(load_and_verify(path)?);
    }

    let merged = il_link::link(modules).map_err(|diags| {
        diags.iter().map(|d| d.to_string()).collect::<Vec<_>>().join("\n")
    })?;
    verify(&merged).map_err(|d| format!("linked module failed verification: {d}"))?;

    let text = serialize(&merged, &SerializeOptions { canonical });
    write_output(output, &text)
}

fn cmd_emit_il(input: &Path, output: Option<&Path>, canonical: bool) -> Result<(), String> {
    let module = load_and_verify(input)?;
    let text = serialize(&module, &SerializeOptions { canonical });
    write_output(output, &text)
}

fn cmd_opt(
    input: &Path,
    output: Option<&Path>,
    config: PipelineConfig,
    print_stats: bool,
) -> Result<(), String> {
    let mut module = load_and_verify(input)?;

    let manager = PassManager::new(config);
    let stats = manager.run(&mut module);
    verify(&module).map_err(|d| format!("pass pipeline produced an invalid module: {d}"))?;

    if print_stats {
        eprintln!("{stats:#?}");
    }

    let text = serialize(&module, &SerializeOptions::default());
    write_output(output, &text)
}

fn cmd_dump_cfg(input: &Path, func_name: &str) -> Result<(), String> {
    let module = load_and_verify(input)?;
    let func = module
        .function(func_name)
        .ok_or_else(|| format!("no function named `{func_name}` in {}", input.display()))?;
    if func.is_import() {
        return Err(format!("`{func_name}` is an import; it has no body to analyse"));
    }

    let analyses = AnalysisManager::new();
    let cfg = analyses.cfg(func);
    let dom = analyses.dominators(func);
    let loops = analyses.loops(func);

    println!("cfg for @{func_name}:");
    for &block in &cfg.rpo {
        let label = &func.blocks[block].label;
        let preds: Vec<&str> = cfg.predecessors(block).iter().map(|&b| func.blocks[b].label.as_str()).collect();
        let succs: Vec<&str> = cfg.successors(block).iter().map(|&b| func.blocks[b].label.as_str()).collect();
        let idom = dom.idom(block).map(|b| func.blocks[b].label.as_str()).unwrap_or("<none>");
        println!("  {label}: preds=[{}] succs=[{}] idom={idom}", preds.join(", "), succs.join(", "));
    }

    if loops.loops().is_empty() {
        println!("loops: none");
    } else {
        println!("loops:");
        for l in loops.loops() {
            let header = &func.blocks[l.header].label;
            let mut members: Vec<&str> = l.blocks.iter().map(|&b| func.blocks[b].label.as_str()).collect();
            members.sort_unstable();
            println!("  header={header} blocks=[{}]", members.join(", "));
        }
    }

    Ok(())
}

fn write_output(output: Option<&Path>, text: &str) -> Result<(), String> {
    match output {
        Some(path) => fs::write(path, text).map_err(|e| format!("{}: {e}", path.display())),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}
