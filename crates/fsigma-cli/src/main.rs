mod report;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use fsigma_eval::ingest::DEFAULT_BATCH_SIZE;
use fsigma_eval::{
    CacheConfig, CompilerOptions, DEFAULT_CACHE_PATH, DEFAULT_FIELD, DEFAULT_RULES_DIR, Engine,
    Ingest, IngestConfig, InputShape, RuleCache, compile_directory,
};
use fsigma_parser::parse_rule_file;

use crate::report::{Reporter, summary_line};

/// Read buffer for scan input.
const INPUT_BUFFER: usize = 1 << 20;

#[derive(Parser)]
#[command(name = "fsigma")]
#[command(about = "Match JSON logs against Sigma-style detection rules")]
#[command(version)]
struct Cli {
    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan log records and report the rules each one matches
    ///
    /// Input is a JSON object, a JSON array of objects, or NDJSON. Rules are
    /// loaded from the cache artifact when present, otherwise compiled from
    /// the rules directory and cached.
    Scan {
        /// Log file to scan, or `-` for stdin
        input: PathBuf,

        #[command(flatten)]
        rules: RuleArgs,

        /// Cache artifact location
        #[arg(long, default_value = DEFAULT_CACHE_PATH)]
        cache: PathBuf,

        /// Compile the rules directory and skip the cache entirely
        #[arg(long)]
        no_cache: bool,

        /// Recompile the rules directory and overwrite the cache
        #[arg(long, conflicts_with = "no_cache")]
        rebuild_cache: bool,

        /// Worker threads for NDJSON input (0 = one per CPU)
        #[arg(short, long, default_value_t = 0)]
        workers: usize,

        /// NDJSON lines handed to the workers at a time
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Input format
        #[arg(long, value_enum, default_value_t = InputFormat::Auto)]
        format: InputFormat,

        /// Print one JSON object per matching record instead of the report
        #[arg(long)]
        json: bool,
    },

    /// Compile every rule in a directory (recursive) and report skipped documents
    Validate {
        /// Directory containing rule YAML files
        path: PathBuf,

        /// Attribute matched by bare keyword entries
        #[arg(long, default_value = DEFAULT_FIELD)]
        default_field: String,
    },

    /// Compile a rules directory and write the cache artifact
    Compile {
        /// Directory containing rule YAML files
        path: PathBuf,

        /// Cache artifact location
        #[arg(long, default_value = DEFAULT_CACHE_PATH)]
        cache: PathBuf,

        /// Attribute matched by bare keyword entries
        #[arg(long, default_value = DEFAULT_FIELD)]
        default_field: String,
    },

    /// Parse a rule file and print its documents as JSON
    Parse {
        /// Rule YAML file
        path: PathBuf,

        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },
}

#[derive(clap::Args)]
struct RuleArgs {
    /// Directory of rule YAML files
    #[arg(short, long = "rules", default_value = DEFAULT_RULES_DIR)]
    rules_dir: PathBuf,

    /// Attribute matched by bare keyword entries
    #[arg(long, default_value = DEFAULT_FIELD)]
    default_field: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Detect from the first bytes of the input
    Auto,
    /// One JSON object or array
    Json,
    /// Newline-delimited JSON objects
    Jsonl,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Scan {
            input,
            rules,
            cache,
            no_cache,
            rebuild_cache,
            workers,
            batch_size,
            format,
            json,
        } => {
            let engine = load_engine(&rules, &cache, no_cache, rebuild_cache);
            let config = IngestConfig {
                workers,
                batch_size,
            };
            cmd_scan(&engine, &input, config, format, json);
        }
        Commands::Validate {
            path,
            default_field,
        } => cmd_validate(&path, default_field),
        Commands::Compile {
            path,
            cache,
            default_field,
        } => cmd_compile(path, cache, default_field),
        Commands::Parse { path, pretty } => cmd_parse(&path, pretty),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_scan(engine: &Engine, input: &Path, config: IngestConfig, format: InputFormat, json: bool) {
    let mut reader = open_input(input);
    let (shape, head) = match format {
        InputFormat::Json => (InputShape::Single, Vec::new()),
        InputFormat::Jsonl => (InputShape::Lines, Vec::new()),
        InputFormat::Auto => match InputShape::sniff(&mut reader) {
            Ok(sniffed) => sniffed,
            Err(e) => fail(format_args!("cannot read {}: {e}", input.display())),
        },
    };
    log::info!("input {} read as {shape:?}", input.display());
    let reader = io::Cursor::new(head).chain(reader);

    let mut reporter = Reporter::new(io::BufWriter::new(io::stdout().lock()), json);
    let mut write_error = None;
    let result = Ingest::new(engine, config).run(shape, reader, |record, matches| {
        if write_error.is_none()
            && let Err(e) = reporter.record(record, matches)
        {
            write_error = Some(e);
        }
    });

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => fail(format_args!("{}: {e}", input.display())),
    };
    if let Some(e) = write_error {
        fail(format_args!("writing report: {e}"));
    }
    if let Err(e) = reporter.finish() {
        fail(format_args!("writing report: {e}"));
    }
    eprintln!("{}", summary_line(&summary));
}

fn cmd_validate(path: &Path, default_field: String) {
    let options = CompilerOptions { default_field };
    let outcome = match compile_directory(path, &options) {
        Ok(outcome) => outcome,
        Err(e) => fail(e),
    };

    println!("Compiled {} rules from {}", outcome.rules.len(), path.display());
    println!("  Skipped documents: {}", outcome.skipped.len());
    if !outcome.skipped.is_empty() {
        println!("\nSkipped:");
        for skipped in &outcome.skipped {
            println!("  - {skipped}");
        }
        process::exit(1);
    }
}

fn cmd_compile(path: PathBuf, cache: PathBuf, default_field: String) {
    let rule_cache = RuleCache::new(CacheConfig {
        path: cache,
        rules_dir: path,
        compiler: CompilerOptions { default_field },
    });
    let config = rule_cache.config();

    let outcome = match compile_directory(&config.rules_dir, &config.compiler) {
        Ok(outcome) => outcome,
        Err(e) => fail(e),
    };
    if let Err(e) = rule_cache.write(&outcome.rules) {
        fail(format_args!("writing {}: {e}", config.path.display()));
    }
    println!(
        "Wrote {} rules to {} ({} skipped)",
        outcome.rules.len(),
        config.path.display(),
        outcome.skipped.len()
    );
}

fn cmd_parse(path: &Path, pretty: bool) {
    let collection = match parse_rule_file(path) {
        Ok(collection) => collection,
        Err(e) => fail(format_args!("parsing {}: {e}", path.display())),
    };
    if !collection.errors.is_empty() {
        eprintln!("Warnings:");
        for err in &collection.errors {
            eprintln!("  - {err}");
        }
    }
    print_json(&collection.documents, pretty);
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_engine(args: &RuleArgs, cache: &Path, no_cache: bool, rebuild: bool) -> Engine {
    let compiler = CompilerOptions {
        default_field: args.default_field.clone(),
    };
    let rules = if no_cache {
        compile_directory(&args.rules_dir, &compiler).map(|outcome| outcome.rules)
    } else {
        let rule_cache = RuleCache::new(CacheConfig {
            path: cache.to_path_buf(),
            rules_dir: args.rules_dir.clone(),
            compiler,
        });
        if rebuild {
            rule_cache.rebuild().map(|outcome| outcome.rules)
        } else {
            rule_cache.load()
        }
    };

    match rules {
        Ok(rules) => {
            eprintln!("Loaded {} rules", rules.len());
            Engine::new(rules)
        }
        Err(e) => fail(e),
    }
}

fn open_input(path: &Path) -> Box<dyn BufRead> {
    if path.as_os_str() == "-" {
        return Box::new(BufReader::with_capacity(INPUT_BUFFER, io::stdin().lock()));
    }
    match File::open(path) {
        Ok(file) => Box::new(BufReader::with_capacity(INPUT_BUFFER, file)),
        Err(e) => fail(format_args!("cannot open {}: {e}", path.display())),
    }
}

fn print_json(value: &impl serde::Serialize, pretty: bool) {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match json {
        Ok(j) => println!("{j}"),
        Err(e) => fail(format_args!("JSON serialization error: {e}")),
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    process::exit(1);
}
