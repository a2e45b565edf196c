use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tracing::Level;

use fjs_tooltip::{Context, FormContext, FormFields, Pipeline, PipelineConfig, TooltipExtension};

/// Render a tooltip field to HTML: pass the field schema and form data as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Field schema, e.g. '{"type":"tooltip","id":"t1","text":"**Hi** {{name}}"}'
    #[arg(long)]
    field: String,
    /// Form data (JSON object)
    #[arg(long, default_value = "{}")]
    data: String,
    /// Form id used to prefix the binding id
    #[arg(long)]
    form_id: Option<String>,
    /// Pipeline config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print a JSON report with diagnostics instead of bare HTML
    #[arg(long)]
    json: bool,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_json(what: &str, raw: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Invalid {what} JSON: {e}");
            std::process::exit(1);
        }
    }
}

fn main() {
    // Parse CLI arguments.
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration.
    let config = match args.config.as_ref().map(PipelineConfig::load).transpose() {
        Ok(cfg) => cfg.unwrap_or_default(),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let field = parse_json("field", &args.field);
    let context = match Context::from_value(parse_json("data", &args.data)) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let mut fields = FormFields::new();
    TooltipExtension::register(&mut fields, Arc::new(Pipeline::new(&config)));
    let form = FormContext::new(args.form_id, context);

    let rendered = match fields.render(&field, &form) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    // Output result.
    if args.json {
        match serde_json::to_string_pretty(&rendered) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
    } else {
        println!("{}", rendered.html);
    }
    if rendered.failed {
        std::process::exit(3);
    }
}
