//! Fiddle CLI.
//!
//! Compiles C# snippets in-process, runs them and prints diagnostics.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use fiddle_compiler::config::CONFIG_FILE;
use fiddle_compiler::reference::{core_library_bytes, BootManifest, CORE_LIBRARY_UNIT, MANIFEST_FILE};
use fiddle_compiler::{
    classify, format_with, CompileOutcome, CompilerConfig, CompilerError, DirectorySource, FormatterConfig,
    LanguageVersion, MemorySource, OutputKind, ReferenceCatalog, Session, Value,
};

mod ui;

#[derive(Parser)]
#[command(name = "fiddle")]
#[command(about = "Fiddle - compile and run C# snippets in-process")]
struct Cli {
    /// Log pipeline events (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a file and run its entry point or one method
    Run {
        /// Source file
        file: PathBuf,

        /// Method to invoke instead of the entry point (e.g. `M.Add`)
        #[arg(short, long)]
        invoke: Option<String>,

        /// Arguments for --invoke (ints, longs, doubles, true/false, null, strings)
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Compile a file and report diagnostics without running it
    Check {
        /// Source file
        file: PathBuf,

        /// Accept top-level statements
        #[arg(long)]
        console: bool,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Compile a library file into a module image usable as a reference unit
    Build {
        /// Source file
        file: PathBuf,

        /// Output image (defaults to `<stem>.dll` next to the source)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Reformat a file
    Format {
        /// Source file
        file: PathBuf,

        /// Rewrite the file in place instead of printing
        #[arg(short, long)]
        write: bool,

        /// Exit with an error if the file is not formatted
        #[arg(long, conflicts_with = "write")]
        check: bool,

        /// Spaces per indentation level
        #[arg(long, default_value_t = 4)]
        indent: usize,

        /// Indent with tabs
        #[arg(long)]
        tabs: bool,
    },

    /// Write the base runtime unit and a boot manifest into a directory
    Corelib {
        /// Target directory (created if it doesn't exist)
        #[arg(default_value = "refs")]
        dir: PathBuf,
    },
}

/// Options shared by every command that compiles.
#[derive(Args)]
struct SessionArgs {
    /// Directory of reference units (boot.json or every *.dll)
    #[arg(short, long)]
    refs: Option<PathBuf>,

    /// Config file (defaults to ./fiddle.json when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Language version (e.g. 6, 10, latest, preview)
    #[arg(long)]
    lang_version: Option<String>,

    /// Assembly name of the compiled unit
    #[arg(long)]
    name: Option<String>,

    /// Instruction budget per invocation
    #[arg(long)]
    max_steps: Option<u64>,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            file,
            invoke,
            args,
            session,
        } => run(&file, invoke.as_deref(), &args, &session).await?,

        Commands::Check { file, console, session } => check(&file, console, &session).await?,

        Commands::Build { file, output, session } => build(&file, output, &session).await?,

        Commands::Format {
            file,
            write,
            check,
            indent,
            tabs,
        } => format_file(&file, write, check, indent, tabs)?,

        Commands::Corelib { dir } => write_corelib(&dir)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "off" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

// =============================================================================
// Session setup
// =============================================================================

fn load_config(args: &SessionArgs, file: &Path) -> miette::Result<CompilerConfig> {
    let mut config = match &args.config {
        Some(path) => CompilerConfig::load(path)?,
        None if Path::new(CONFIG_FILE).is_file() => CompilerConfig::load(Path::new(CONFIG_FILE))?,
        None => CompilerConfig::default(),
    };

    if let Some(version) = &args.lang_version {
        config = config.with_language_version(version.parse::<LanguageVersion>()?);
    }
    match &args.name {
        Some(name) => config = config.with_assembly_name(name.clone()),
        None if config.assembly_name == CompilerConfig::default().assembly_name => {
            if let Some(stem) = file.file_stem() {
                config = config.with_assembly_name(stem.to_string_lossy());
            }
        }
        None => {}
    }
    if let Some(steps) = args.max_steps {
        config = config.with_max_steps(steps);
    }
    config.validate()?;
    Ok(config)
}

async fn open_session(config: CompilerConfig, refs: Option<&Path>) -> miette::Result<Session> {
    let session = Session::new(config)?;
    let spinner = ui::spinner("Loading reference units...");
    let catalog = match refs {
        Some(dir) => session.populate(&DirectorySource::new(dir)).await,
        None => session.populate(&MemorySource::new()).await,
    };
    spinner.finish_and_clear();
    let catalog = catalog?;
    log::debug!("catalog: {}", catalog.names().join(", "));
    Ok(session)
}

fn read_source(file: &Path) -> miette::Result<String> {
    std::fs::read_to_string(file).map_err(|e| CompilerError::io(file, e.to_string()).into())
}

/// Compiles `file` and prints its diagnostics.
async fn compile_file(
    file: &Path,
    config: CompilerConfig,
    refs: Option<&Path>,
) -> miette::Result<CompileOutcome> {
    let source = read_source(file)?;
    let session = open_session(config, refs).await?;

    let start = Instant::now();
    let outcome = session.compile(&source)?;
    ui::diagnostics(&file.display().to_string(), outcome.diagnostics());
    log::debug!("compiled {} in {}ms", file.display(), start.elapsed().as_millis());
    Ok(outcome)
}

fn compilation_failed(outcome: &CompileOutcome) -> miette::Report {
    let errors = outcome.errors().count();
    ui::nope_header();
    miette::miette!("compilation failed with {} error(s)", errors)
}

// =============================================================================
// Commands
// =============================================================================

async fn run(file: &Path, invoke: Option<&str>, args: &[String], session: &SessionArgs) -> miette::Result<()> {
    let mut config = load_config(session, file)?;
    if invoke.is_none() {
        config = config.with_output_kind(OutputKind::ConsoleApplication);
    }

    let outcome = compile_file(file, config, session.refs.as_deref()).await?;
    let Some(unit) = outcome.unit() else {
        return Err(compilation_failed(&outcome));
    };

    let start = Instant::now();
    let invocation = match invoke {
        Some(symbol) => {
            let values: Vec<Value> = args.iter().map(|a| parse_arg(a)).collect();
            unit.invoke(symbol, &values)?
        }
        None => unit.run_entry_point()?,
    };

    ui::program_output(&invocation.output);
    if invocation.value != Value::Void {
        ui::success(&format!("returned {}", display_value(&invocation.value)));
    }
    ui::timing("Ran", start.elapsed().as_millis());
    Ok(())
}

async fn check(file: &Path, console: bool, session: &SessionArgs) -> miette::Result<()> {
    let mut config = load_config(session, file)?;
    if console {
        config = config.with_output_kind(OutputKind::ConsoleApplication);
    }

    let outcome = compile_file(file, config, session.refs.as_deref()).await?;
    let classified = classify(outcome.diagnostics());
    if !outcome.is_success() {
        ui::summary(&classified);
        return Err(compilation_failed(&outcome));
    }
    ui::looking_good();
    println!();
    ui::summary(&classified);
    Ok(())
}

async fn build(file: &Path, output: Option<PathBuf>, session: &SessionArgs) -> miette::Result<()> {
    let config = load_config(session, file)?;
    let suffix = config.reference_suffix.clone();

    let outcome = compile_file(file, config, session.refs.as_deref()).await?;
    let Some(unit) = outcome.unit() else {
        return Err(compilation_failed(&outcome));
    };

    let output = output.unwrap_or_else(|| {
        let name = format!("{}{}", unit.name(), suffix);
        file.parent().map_or_else(|| PathBuf::from(&name), |dir| dir.join(&name))
    });
    std::fs::write(&output, unit.bytes()).map_err(|e| CompilerError::io(&output, e.to_string()))?;
    ui::success(&format!(
        "Wrote {} ({} bytes, {} type(s))",
        output.display(),
        unit.bytes().len(),
        unit.image().types.len()
    ));
    Ok(())
}

fn format_file(file: &Path, write: bool, check: bool, indent: usize, tabs: bool) -> miette::Result<()> {
    let source = read_source(file)?;
    let config = FormatterConfig::default().with_indent_width(indent).with_tabs(tabs);
    let formatted = format_with(&source, &config);

    if check {
        if formatted != source {
            return Err(miette::miette!("{} is not formatted", file.display()));
        }
        ui::looking_good();
    } else if write {
        if formatted != source {
            std::fs::write(file, &formatted).map_err(|e| CompilerError::io(file, e.to_string()))?;
            ui::success(&format!("Formatted {}", file.display()));
        } else {
            ui::dim(&format!("{} already formatted", file.display()));
        }
    } else {
        print!("{}", formatted);
    }
    Ok(())
}

fn write_corelib(dir: &Path) -> miette::Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| CompilerError::io(dir, e.to_string()))?;

    let unit_path = dir.join(CORE_LIBRARY_UNIT);
    std::fs::write(&unit_path, core_library_bytes()).map_err(|e| CompilerError::io(&unit_path, e.to_string()))?;

    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest = BootManifest {
        assembly_references: vec![CORE_LIBRARY_UNIT.to_string()],
    };
    let json = serde_json::to_string_pretty(&manifest).map_err(|e| miette::miette!("{}", e))?;
    std::fs::write(&manifest_path, json).map_err(|e| CompilerError::io(&manifest_path, e.to_string()))?;

    let catalog = ReferenceCatalog::core_only();
    ui::success(&format!("Wrote {} and {}", unit_path.display(), manifest_path.display()));
    for unit in catalog.iter() {
        ui::info(&format!("{} exports {} type(s)", unit.name(), unit.image().types.len()));
    }
    Ok(())
}

// =============================================================================
// Values
// =============================================================================

/// Parses a command-line argument into the narrowest fitting value.
fn parse_arg(text: &str) -> Value {
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(v) = text.parse::<i32>() {
        Value::Int(v)
    } else if let Ok(v) = text.parse::<i64>() {
        Value::Long(v)
    } else if let Ok(v) = text.parse::<f64>() {
        Value::Double(v)
    } else {
        Value::string(text.trim_matches('"'))
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Str(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg_picks_narrowest_type() {
        assert_eq!(parse_arg("5"), Value::Int(5));
        assert_eq!(parse_arg("-5"), Value::Int(-5));
        assert_eq!(parse_arg("5000000000"), Value::Long(5_000_000_000));
        assert_eq!(parse_arg("2.5"), Value::Double(2.5));
        assert_eq!(parse_arg("true"), Value::Bool(true));
        assert_eq!(parse_arg("null"), Value::Null);
        assert_eq!(parse_arg("hello"), Value::string("hello"));
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&Value::Int(5)), "5");
        assert_eq!(display_value(&Value::Null), "null");
        assert_eq!(display_value(&Value::string("a")), "\"a\"");
    }

    #[test]
    fn test_cli_parses_run_with_args() {
        let cli = Cli::try_parse_from(["fiddle", "run", "a.cs", "--invoke", "M.Add", "--arg", "2", "--arg", "-3"])
            .unwrap();
        match cli.command {
            Commands::Run { invoke, args, .. } => {
                assert_eq!(invoke.as_deref(), Some("M.Add"));
                assert_eq!(args, vec!["2", "-3"]);
            }
            _ => panic!("expected run"),
        }
    }
}
