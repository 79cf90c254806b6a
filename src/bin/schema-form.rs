//! Schema Form CLI
//!
//! Command-line access to the form engine: defaults, effective schemas,
//! field ids and mapped validation errors.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use schema_form::{
    build_id_tree, default_form_state, load_schema, load_schema_auto, parse_pointer, resolve_at,
    FormConfig, FormStateStore, JsonSchemaValidator,
};

#[derive(Parser)]
#[command(name = "schema-form")]
#[command(about = "Resolve JSON Schema form state: defaults, ids and errors")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the initial form data: given data merged over schema defaults
    Defaults {
        #[command(flatten)]
        form: FormArgs,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Print the effective schema at a data path
    Resolve {
        #[command(flatten)]
        form: FormArgs,

        /// JSON Pointer into the form data (e.g. /tasks/0)
        #[arg(long, default_value = "")]
        path: String,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Print the field id tree
    Ids {
        #[command(flatten)]
        form: FormArgs,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Validate form data and report errors per field id
    Validate {
        #[command(flatten)]
        form: FormArgs,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct FormArgs {
    /// Schema source: file path or URL (http:// or https://)
    schema: String,

    /// Form data file
    #[arg(long)]
    data: Option<PathBuf>,

    /// UI hints file
    #[arg(long)]
    ui: Option<PathBuf>,

    /// Form configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root id prefix (overrides the config file)
    #[arg(long)]
    id_prefix: Option<String>,

    /// Id separator (overrides the config file)
    #[arg(long)]
    id_separator: Option<String>,
}

#[derive(Args)]
struct OutputArgs {
    /// Output file (stdout if not specified)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

/// Everything loaded from the command line for one run.
struct Session {
    schema: Value,
    data: Option<Value>,
    hints: Value,
    config: FormConfig,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Defaults { form, out } => run_defaults(&form, &out),
        Commands::Resolve { form, path, out } => run_resolve(&form, &path, &out),
        Commands::Ids { form, out } => run_ids(&form, &out),
        Commands::Validate { form, json } => run_validate(&form, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_defaults(form: &FormArgs, out: &OutputArgs) -> Result<(), u8> {
    let session = load_session(form)?;
    let defaults = default_form_state(
        &session.schema,
        &session.schema,
        session.data.as_ref(),
        &session.config,
    )
    .map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    write_output(&defaults.unwrap_or(Value::Null), out)
}

fn run_resolve(form: &FormArgs, pointer: &str, out: &OutputArgs) -> Result<(), u8> {
    let session = load_session(form)?;
    let path = parse_pointer(pointer);
    let effective = resolve_at(&session.schema, &session.schema, session.data.as_ref(), &path)
        .map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;

    match effective {
        Some(effective) => write_output(&effective, out),
        None => {
            eprintln!("Error: no schema describes path '{}'", pointer);
            Err(2)
        }
    }
}

fn run_ids(form: &FormArgs, out: &OutputArgs) -> Result<(), u8> {
    let session = load_session(form)?;
    let data = default_form_state(
        &session.schema,
        &session.schema,
        session.data.as_ref(),
        &session.config,
    )
    .map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let ids = build_id_tree(
        &session.schema,
        &session.schema,
        data.as_ref(),
        &session.hints,
        &session.config,
    );
    write_output(&ids, out)
}

fn run_validate(form: &FormArgs, json_output: bool) -> Result<(), u8> {
    let session = load_session(form)?;
    let mut store = FormStateStore::new(session.schema, session.hints, session.data, session.config)
        .map_err(|e| {
            report_error(json_output, &e.to_string());
            e.exit_code() as u8
        })?;

    let errors = store.validate(&JsonSchemaValidator).map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })?;

    if errors.is_empty() {
        if json_output {
            println!(r#"{{"valid":true}}"#);
        } else {
            println!("Valid");
        }
        return Ok(());
    }

    if json_output {
        let output = serde_json::json!({
            "valid": false,
            "errors": errors,
        });
        println!("{}", output);
    } else {
        eprintln!("Validation failed:");
        for (id, field_errors) in &errors.by_id {
            for error in field_errors {
                eprintln!("  {}: {}", id, error.message);
            }
        }
        for error in &errors.orphans {
            eprintln!("  {}", error);
        }
    }
    Err(1)
}

fn load_session(form: &FormArgs) -> Result<Session, u8> {
    let schema = load_schema_auto(&form.schema).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    let data = form.data.as_deref().map(load_json).transpose()?;
    let hints = form
        .ui
        .as_deref()
        .map(load_json)
        .transpose()?
        .unwrap_or(Value::Null);

    let mut config = match &form.config {
        Some(path) => serde_json::from_value(load_json(path)?).map_err(|e| {
            eprintln!("Error: invalid config {}: {}", path.display(), e);
            2u8
        })?,
        None => FormConfig::default(),
    };
    if let Some(prefix) = &form.id_prefix {
        config = config.id_prefix(prefix.clone());
    }
    if let Some(separator) = &form.id_separator {
        config = config.id_separator(separator.clone());
    }

    Ok(Session {
        schema,
        data,
        hints,
        config,
    })
}

fn load_json(path: &Path) -> Result<Value, u8> {
    load_schema(path).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn write_output<T: Serialize>(value: &T, out: &OutputArgs) -> Result<(), u8> {
    let json_output = if out.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match &out.output {
        Some(path) => {
            std::fs::write(path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
