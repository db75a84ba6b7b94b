use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::EnvFilter;

use stackprint::topology::{SIMPLE_JS_URL, simple_registry, simple_scenarios, simple_scope_index};
use stackprint::{
    DeclarationLookup, EngineDialect, Harness, HarnessReport, NormalizedChain, ScopeIndex,
    StackprintConfig, Symbolicator, compare, extract_declarations, normalize_minified_trace,
    normalize_trace,
};

#[derive(Parser, Debug)]
#[command(name = "stackprint", version)]
#[command(about = "Normalize and compare JavaScript stack traces across engines")]
struct Cli {
    /// Config file (defaults to ./stackprint.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the normalized chain of a captured trace
    Normalize {
        /// Trace file, `-` for stdin
        trace: PathBuf,
        /// JavaScript source the trace points into, for declaration metadata
        #[arg(long)]
        source: Option<PathBuf>,
        /// Source map of a minified `--source`
        #[arg(long, requires = "source")]
        source_map: Option<PathBuf>,
    },
    /// Compare two captured traces frame by frame
    Compare {
        expected: PathBuf,
        actual: PathBuf,
        /// Tolerate async boundaries present on one side only
        #[arg(long)]
        lenient: bool,
        #[arg(long)]
        source: Option<PathBuf>,
        #[arg(long, requires = "source")]
        source_map: Option<PathBuf>,
    },
    /// List the function scopes declared in a JavaScript file
    Scopes { file: PathBuf },
    /// Run the built-in call-chain scenarios
    Scenarios {
        #[arg(short, long, value_enum, default_value_t = EngineArg::All)]
        engine: EngineArg,
        /// Classify with scopes extracted from the fixture source instead of the registry
        #[arg(long)]
        static_scopes: bool,
        /// Tolerate async boundaries an engine does not mark
        #[arg(long)]
        lenient: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineArg {
    V8,
    Spidermonkey,
    Jsc,
    All,
}

impl EngineArg {
    fn dialects(self) -> Vec<EngineDialect> {
        match self {
            EngineArg::V8 => vec![EngineDialect::V8],
            EngineArg::Spidermonkey => vec![EngineDialect::SpiderMonkey],
            EngineArg::Jsc => vec![EngineDialect::JavaScriptCore],
            EngineArg::All => EngineDialect::ALL.to_vec(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = StackprintConfig::load_or_default(cli.config.as_deref());

    let ok = match cli.command {
        Commands::Normalize {
            trace,
            source,
            source_map,
        } => {
            let metadata = Metadata::load(source.as_deref(), source_map.as_deref())?;
            run_normalize(&trace, &metadata, &config, cli.json)?
        }
        Commands::Compare {
            expected,
            actual,
            lenient,
            source,
            source_map,
        } => {
            let config = if lenient { config.lenient(true) } else { config };
            let metadata = Metadata::load(source.as_deref(), source_map.as_deref())?;
            run_compare(&expected, &actual, &metadata, &config, cli.json)?
        }
        Commands::Scopes { file } => run_scopes(&file, cli.json)?,
        Commands::Scenarios {
            engine,
            static_scopes,
            lenient,
        } => {
            let config = if lenient { config.lenient(true) } else { config };
            run_scenarios(engine, static_scopes, config, cli.json).await?
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn load_scopes(path: &Path) -> Result<ScopeIndex> {
    let src = read_input(path)?;
    Ok(extract_declarations(&file_name(path), &src)?)
}

/// What classification can consult besides the trace text
enum Metadata {
    None,
    Scopes(ScopeIndex),
    SourceMap(Symbolicator),
}

impl Metadata {
    fn load(source: Option<&Path>, source_map: Option<&Path>) -> Result<Self> {
        match (source, source_map) {
            (Some(source), Some(map)) => {
                let src = read_input(source)?;
                let map = std::fs::read(map)
                    .with_context(|| format!("reading {}", map.display()))?;
                let symbolicator = Symbolicator::new(&file_name(source), &src, &map)?;
                Ok(Metadata::SourceMap(symbolicator))
            }
            (Some(source), None) => Ok(Metadata::Scopes(load_scopes(source)?)),
            (None, _) => Ok(Metadata::None),
        }
    }

    fn normalize(&self, raw: &str, config: &StackprintConfig) -> Option<NormalizedChain> {
        match self {
            Metadata::None => normalize_trace(raw, None, config),
            Metadata::Scopes(scopes) => {
                normalize_trace(raw, Some(scopes as &dyn DeclarationLookup), config)
            }
            Metadata::SourceMap(symbolicator) => {
                normalize_minified_trace(raw, symbolicator, config)
            }
        }
    }
}

fn run_normalize(
    trace: &Path,
    metadata: &Metadata,
    config: &StackprintConfig,
    json: bool,
) -> Result<bool> {
    let raw = read_input(trace)?;
    let Some(chain) = metadata.normalize(&raw, config) else {
        eprintln!("{}: no frame lines in {}", "error".red().bold(), trace.display());
        return Ok(false);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&chain)?);
    } else {
        print!("{}", chain);
    }
    Ok(true)
}

fn run_compare(
    expected: &Path,
    actual: &Path,
    metadata: &Metadata,
    config: &StackprintConfig,
    json: bool,
) -> Result<bool> {
    let expected_raw = read_input(expected)?;
    let actual_raw = read_input(actual)?;
    let expected_chain = metadata
        .normalize(&expected_raw, config)
        .with_context(|| format!("no frame lines in {}", expected.display()))?;
    let actual_chain = metadata
        .normalize(&actual_raw, config)
        .with_context(|| format!("no frame lines in {}", actual.display()))?;

    let result = compare(&expected_chain, &actual_chain, config);

    if json {
        let value = serde_json::json!({
            "expected": expected_chain,
            "actual": actual_chain,
            "result": result,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if result.is_equal() {
        println!("{}", "equal".green().bold());
    } else {
        println!("{}", result.to_string().red());
        println!("{}", "expected:".cyan());
        print!("{}", expected_chain);
        println!("{}", "actual:".cyan());
        print!("{}", actual_chain);
    }
    Ok(result.is_equal())
}

fn run_scopes(file: &Path, json: bool) -> Result<bool> {
    let index = load_scopes(file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(index.declarations())?);
    } else {
        for decl in index.declarations() {
            println!("{}", decl);
        }
    }
    Ok(true)
}

async fn run_scenarios(
    engine: EngineArg,
    static_scopes: bool,
    config: StackprintConfig,
    json: bool,
) -> Result<bool> {
    let mut harness = Harness::new(simple_registry(SIMPLE_JS_URL)?, config);
    if static_scopes {
        harness = harness.with_scopes(simple_scope_index()?);
    }

    let results = harness.run_all(&simple_scenarios(), &engine.dialects()).await;
    let report = HarnessReport::from_results(&results);

    if json {
        println!("{}", report.to_json()?);
    } else {
        report.print_summary();
    }
    Ok(report.all_passed())
}
