//! file: cli/src/main.rs
//! description: command-line interface for the Sluice toolchain.
//!
//! This binary wires the `sluice_core` APIs together and exposes the
//! developer workflows: running the expected-diagnostics test suite,
//! building a script with stage dumps, and executing a script against the
//! built-in tester runtime.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, ArgMatches, Command};
use console::style;
use log::{error, Level};
use sluice_cli::{disassembler, harness, tester};
use sluice_core::diagnostics::Report;
use sluice_core::vm::RunResult;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format(|buf, record| {
            let lvl = match record.level() {
                Level::Error => style("error").red().bold(),
                Level::Warn => style("warn").yellow().bold(),
                Level::Info => style("info").green().bold(),
                Level::Debug => style("debug").cyan(),
                Level::Trace => style("trace").magenta(),
            };
            writeln!(buf, "{}: {}", lvl, record.args())
        })
        .init();

    let cli = Command::new("sluice")
        .version("0.1.0")
        .about("Compiler, VM and test harness for the Sluice routing DSL")
        .subcommand_required(true)
        .subcommand(
            Command::new("test")
                .about("Run script files with embedded expected diagnostics")
                .arg(
                    Arg::new("path")
                        .help("A .sl file or a directory searched recursively")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            Command::new("build")
                .about("Compile a script and optionally dump a stage")
                .arg(Arg::new("file").help("The script to compile").required(true).index(1))
                .arg(
                    Arg::new("dump")
                        .help("Stage to dump: tokens, ast, ir, bc")
                        .short('d')
                        .long("dump")
                        .value_name("STAGE"),
                )
                .arg(
                    Arg::new("level")
                        .help("Optimization level (0-2)")
                        .short('O')
                        .long("optimize")
                        .value_name("LEVEL")
                        .default_value("2"),
                )
                .arg(
                    Arg::new("json")
                        .help("Print diagnostics as JSON")
                        .long("json")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Compile, link and execute a script's handlers")
                .arg(Arg::new("file").help("The script to run").required(true).index(1))
                .arg(
                    Arg::new("path")
                        .help("Request path visible through req.path")
                        .short('p')
                        .long("path")
                        .value_name("PATH")
                        .default_value("/"),
                )
                .arg(
                    Arg::new("level")
                        .help("Optimization level (0-2)")
                        .short('O')
                        .long("optimize")
                        .value_name("LEVEL")
                        .default_value("2"),
                ),
        );

    let matches = cli.get_matches();
    let code = match matches.subcommand() {
        Some(("test", sub)) => cmd_test(sub),
        Some(("build", sub)) => cmd_build(sub),
        Some(("run", sub)) => cmd_run(sub),
        _ => unreachable!("subcommand required"),
    };
    std::process::exit(code);
}

fn cmd_test(matches: &ArgMatches) -> i32 {
    let path = PathBuf::from(matches.get_one::<String>("path").unwrap());
    let runtime = tester::tester_runtime();

    let outcomes = match harness::run_suite(&path, &runtime) {
        Ok(outcomes) => outcomes,
        Err(e) => {
            error!("cannot read {}: {}", path.display(), e);
            return 2;
        }
    };
    if outcomes.is_empty() {
        error!("no .sl files under {}", path.display());
        return 2;
    }

    let mut failures = 0;
    for outcome in &outcomes {
        if outcome.passed() {
            println!("{} {}", style("PASS").green().bold(), outcome.file);
        } else {
            failures += 1;
            println!("{} {}", style("FAIL").red().bold(), outcome.file);
            for message in &outcome.missing {
                println!("  {} {}", style("missing:").yellow(), message);
            }
            for message in &outcome.superfluous {
                println!("  {} {}", style("superfluous:").yellow(), message);
            }
        }
    }
    println!(
        "{} file(s), {} failure(s)",
        outcomes.len(),
        failures
    );
    if failures == 0 {
        0
    } else {
        1
    }
}

fn opt_level(matches: &ArgMatches) -> u8 {
    matches
        .get_one::<String>("level")
        .and_then(|s| s.parse().ok())
        .map(|l: u8| l.min(2))
        .unwrap_or(2)
}

fn cmd_build(matches: &ArgMatches) -> i32 {
    let file = matches.get_one::<String>("file").unwrap();
    let source = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot read {}: {}", file, e);
            return 2;
        }
    };
    let runtime = tester::tester_runtime();
    let level = opt_level(matches);
    let dump = matches.get_one::<String>("dump").map(|s| s.as_str());
    let mut report = Report::new();

    let exit = 'build: {
        if dump == Some("tokens") {
            let tokens = sluice_core::lexer::tokenize(&source, file, &mut report);
            for token in &tokens {
                println!("{:?} [{}] {:?}", token.kind, token.span, token.text(&source));
            }
            break 'build 0;
        }

        let Some(unit) = sluice_core::parse(&source, file, &runtime, &mut report) else {
            break 'build 1;
        };
        if dump == Some("ast") {
            println!("{:#?}", unit);
            break 'build 0;
        }

        let Some(mut ir) = sluice_core::lower(&unit, &["setup", "main"], &mut report) else {
            break 'build 1;
        };
        if !runtime.verify_native_calls(&mut ir, &mut report) {
            break 'build 1;
        }
        sluice_core::optimize(&mut ir, level);
        if dump == Some("ir") {
            print!("{}", ir);
            break 'build 0;
        }

        let mut program = sluice_core::codegen(&ir);
        if !program.link(&runtime, &mut report) {
            break 'build 1;
        }
        if dump == Some("bc") {
            print!("{}", disassembler::disassemble(&program));
        }
        0
    };

    if matches.get_flag("json") {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => error!("cannot serialize report: {}", e),
        }
    } else {
        report.print_all_pretty(&source);
    }
    exit
}

fn cmd_run(matches: &ArgMatches) -> i32 {
    let file = matches.get_one::<String>("file").unwrap();
    let source = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot read {}: {}", file, e);
            return 2;
        }
    };
    let runtime = tester::tester_runtime();
    let mut report = Report::new();

    let program = sluice_core::compile(&source, file, &runtime, opt_level(matches), &mut report);
    let Some(mut program) = program else {
        report.print_all_pretty(&source);
        return 1;
    };
    if !program.link(&runtime, &mut report) {
        report.print_all_pretty(&source);
        return 1;
    }
    report.print_all_pretty(&source);

    let mut context =
        tester::TesterContext::with_path(matches.get_one::<String>("path").unwrap());

    // The setup phase is optional.
    if let Some(setup) = program.handler("setup") {
        match setup.run(&runtime, &mut context) {
            RunResult::Error(e) => {
                error!("setup failed: {}", e);
                return 1;
            }
            _ => {}
        }
    }

    let Some(main_handler) = program.handler("main") else {
        error!("script defines no 'main' handler");
        return 1;
    };

    let mut outcome = main_handler.run(&runtime, &mut context);
    loop {
        match outcome {
            RunResult::Suspended(runner) => {
                // The host scheduler: wait out the requested delay, resume.
                let seconds = runner.sleep_duration().unwrap_or(0);
                std::thread::sleep(Duration::from_secs(seconds));
                outcome = runner.resume(&mut context);
            }
            RunResult::Success(done) => {
                print!("{}", context.output);
                println!("{} (handled: {})", style("finished").green(), done);
                return 0;
            }
            RunResult::Error(e) => {
                print!("{}", context.output);
                error!("main failed: {}", e);
                return 1;
            }
        }
    }
}
