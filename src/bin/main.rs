//! dataprovider CLI - run selections against configured backends
//!
//! Usage:
//!   dataprovider query --config <file> [--domain d] [--criteria <text>] <path>...
//!   dataprovider explain --config <file> [--domain d] [--criteria <text>] <path>...
//!   dataprovider parse-selection <text>
//!   dataprovider parse-criteria <text>
//!
//! Examples:
//!   dataprovider query -c dataprovider.toml "alert.classification.text/group_by" "count(1)/order_desc"
//!   dataprovider explain -c dataprovider.toml --criteria "log.host == 'www'" log.message

use std::path::PathBuf;
use std::process::ExitCode;

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dataprovider::config::Settings;
use dataprovider::criterion::Criterion;
use dataprovider::selection::SelectionObject;
use dataprovider::{DataProviderError, DataProviderManager};

#[derive(Parser)]
#[command(name = "dataprovider")]
#[command(about = "Query typed paths across relational and search backends")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a selection and print one JSON array per row
    Query(QueryArgs),

    /// Print the native query without running it
    Explain(QueryArgs),

    /// Parse a selection and print its structure
    ParseSelection {
        /// Selection text, e.g. "count(alert.messageid)/group_by"
        text: String,
    },

    /// Parse criteria and print the canonical and flattened forms
    ParseCriteria {
        /// Criteria text, e.g. "alert.messageid = 'x' && !log.host"
        text: String,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Settings file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Domain to query; guessed from the paths when omitted
    #[arg(short, long)]
    domain: Option<String>,

    /// Filter expression
    #[arg(long)]
    criteria: Option<String>,

    /// Maximum number of rows, negative for no limit
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    limit: i64,

    #[arg(long, default_value_t = 0)]
    offset: i64,

    /// Drop duplicate rows
    #[arg(long)]
    distinct: bool,

    /// Selected paths
    #[arg(required = true)]
    paths: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Query(args) => cmd_query(args, false),
        Commands::Explain(args) => cmd_query(args, true),
        Commands::ParseSelection { text } => cmd_parse_selection(&text),
        Commands::ParseCriteria { text } => cmd_parse_criteria(&text),
    }
}

/// Print an error, pointing at the offending offset of `source` for parse errors.
fn report(error: &DataProviderError, source: Option<&str>) -> ExitCode {
    match (error.position(), source) {
        (Some(position), Some(text)) => {
            let start = position.min(text.len());
            let end = (start + 1).min(text.len()).max(start);
            let printed = Report::build(ReportKind::Error, ("input", start..end))
                .with_message(error.to_string())
                .with_label(
                    Label::new(("input", start..end))
                        .with_message("here")
                        .with_color(Color::Red),
                )
                .finish()
                .eprint(("input", Source::from(text)));
            if printed.is_err() {
                eprintln!("Error: {}", error);
            }
        }
        _ => eprintln!("Error: {}", error),
    }
    ExitCode::FAILURE
}

fn cmd_query(args: QueryArgs, explain: bool) -> ExitCode {
    let settings = match Settings::from_file(&args.config) {
        Ok(s) => s,
        Err(e) => return report(&e.into(), None),
    };
    let manager = match DataProviderManager::from_settings(&settings) {
        Ok(m) => m,
        Err(e) => return report(&e, None),
    };

    let criteria = match args.criteria.as_deref().map(Criterion::parse).transpose() {
        Ok(c) => c,
        Err(e) => return report(&e, args.criteria.as_deref()),
    };
    let paths: Vec<&str> = args.paths.iter().map(String::as_str).collect();
    let domain = args.domain.as_deref();

    if explain {
        return match manager.explain(&paths, criteria, args.distinct, args.limit, args.offset, domain) {
            Ok(native) => {
                println!("{}", native);
                ExitCode::SUCCESS
            }
            Err(e) => report(&e, None),
        };
    }

    let rows = match manager.query(&paths, criteria, args.distinct, args.limit, args.offset, domain) {
        Ok(rows) => rows,
        Err(e) => return report(&e, None),
    };
    for row in rows.iter() {
        let printed = row.and_then(|r| serde_json::to_string(r).map_err(DataProviderError::from));
        match printed {
            Ok(line) => println!("{}", line),
            Err(e) => return report(&e, None),
        }
    }
    eprintln!(
        "{} row(s), {} total, {:.3}s",
        rows.len(),
        rows.total_count(),
        rows.duration().as_secs_f64()
    );
    ExitCode::SUCCESS
}

fn cmd_parse_selection(text: &str) -> ExitCode {
    match SelectionObject::parse(text) {
        Ok(selection) => {
            println!("{}", selection);
            println!("{:#?}", selection);
            ExitCode::SUCCESS
        }
        Err(e) => report(&e, Some(text)),
    }
}

fn cmd_parse_criteria(text: &str) -> ExitCode {
    match Criterion::parse(text) {
        Ok(criteria) => {
            println!("{}", criteria);
            println!("{:#?}", criteria.flatten());
            ExitCode::SUCCESS
        }
        Err(e) => report(&e, Some(text)),
    }
}
