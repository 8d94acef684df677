//! RIS Monolith CLI
//!
//! Capture a Redfish/RIS service into a snapshot and query snapshots offline.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use ris_monolith::{
    ApiDialect, MonolithConfig, MonolithSnapshot, ResourceMonolith, SchemaDialect, ValidateError,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ris-monolith")]
#[command(about = "Crawl and cache Redfish/RIS REST resources")]
#[command(version)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true, env = "RIS_MONOLITH_CONFIG")]
    config: Option<PathBuf>,

    /// API dialect (overrides the configuration file)
    #[arg(long, global = true, value_enum)]
    api: Option<ApiArg>,

    /// Schema dialect (overrides the configuration file)
    #[arg(long, global = true, value_enum)]
    schema_dialect: Option<SchemaArg>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ApiArg {
    Redfish,
    Legacy,
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaArg {
    Generic,
    Redfish,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a live service and write a snapshot
    Capture {
        /// Service base URL (e.g., https://10.0.0.1)
        #[arg(env = "RIS_URL")]
        url: String,

        /// Basic auth user name
        #[arg(long, env = "RIS_USER", requires = "password")]
        user: Option<String>,

        /// Basic auth password
        #[arg(long, env = "RIS_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Existing session token (X-Auth-Token)
        #[arg(long, env = "RIS_SESSION_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Only paths, headers and bodies
        #[arg(long)]
        reduced: bool,
    },

    /// List the resource types of a snapshot
    Types {
        snapshot: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one cached resource
    Show {
        snapshot: PathBuf,

        /// Resource path (e.g., /redfish/v1/Systems/1/)
        path: String,
    },

    /// Mark a resource and its dependents modified
    Modified {
        snapshot: PathBuf,

        path: String,

        /// Write the updated snapshot back
        #[arg(long)]
        write: bool,
    },

    /// Inline $ref/anyOf of a cached schema document
    Resolve {
        snapshot: PathBuf,

        /// Schema document path
        path: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a cached resource against a cached schema document
    Validate {
        snapshot: PathBuf,

        /// Resource path
        #[arg(long)]
        resource: String,

        /// Schema document path
        #[arg(long)]
        schema: String,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(code) => return ExitCode::from(code),
    };

    let result = match cli.command {
        Commands::Capture {
            url,
            user,
            password,
            token,
            output,
            pretty,
            reduced,
        } => run_capture(
            config,
            CaptureArgs {
                url,
                user,
                password,
                token,
                output,
                pretty,
                reduced,
            },
        ),
        Commands::Types { snapshot, json } => run_types(config, &snapshot, json),
        Commands::Show { snapshot, path } => run_show(config, &snapshot, &path),
        Commands::Modified {
            snapshot,
            path,
            write,
        } => run_modified(config, &snapshot, &path, write),
        Commands::Resolve {
            snapshot,
            path,
            pretty,
        } => run_resolve(config, &snapshot, &path, pretty),
        Commands::Validate {
            snapshot,
            resource,
            schema,
            json,
        } => run_validate(config, &snapshot, &resource, &schema, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Configuration file first, then command-line overrides.
fn build_config(cli: &Cli) -> Result<MonolithConfig, u8> {
    let mut config = match &cli.config {
        Some(path) => MonolithConfig::load(path).map_err(|e| {
            eprintln!("Error loading config: {}", e);
            e.exit_code() as u8
        })?,
        None => MonolithConfig::default(),
    };
    if let Some(api) = cli.api {
        config.api = match api {
            ApiArg::Redfish => ApiDialect::Redfish,
            ApiArg::Legacy => ApiDialect::Legacy,
        };
    }
    if let Some(schema) = cli.schema_dialect {
        config.schema = match schema {
            SchemaArg::Generic => SchemaDialect::Generic,
            SchemaArg::Redfish => SchemaDialect::Redfish,
        };
    }
    Ok(config)
}

struct CaptureArgs {
    url: String,
    user: Option<String>,
    password: Option<String>,
    token: Option<String>,
    output: Option<PathBuf>,
    pretty: bool,
    reduced: bool,
}

#[cfg(feature = "remote")]
fn run_capture(config: MonolithConfig, args: CaptureArgs) -> Result<(), u8> {
    use ris_monolith::HttpTransport;

    let mut transport = HttpTransport::new(&args.url).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    if let (Some(user), Some(password)) = (args.user, args.password) {
        transport = transport.basic_auth(user, password);
    }
    if let Some(token) = args.token {
        transport = transport.session_token(token);
    }

    let mut monolith = ResourceMonolith::new(config.base_url(args.url.clone()));
    let value = if args.reduced {
        monolith
            .capture_reduced(&transport)
            .map(|reduced| serde_json::json!(reduced))
    } else {
        monolith
            .capture(&transport)
            .map(|snapshot| serde_json::json!(snapshot))
    }
    .map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    write_json(&value, args.output.as_deref(), args.pretty)
}

#[cfg(not(feature = "remote"))]
fn run_capture(_config: MonolithConfig, args: CaptureArgs) -> Result<(), u8> {
    eprintln!(
        "Error: cannot capture {}: built without the `remote` feature",
        args.url
    );
    Err(3)
}

fn load_monolith(config: MonolithConfig, snapshot: &Path) -> Result<ResourceMonolith, u8> {
    let snapshot = MonolithSnapshot::load(snapshot).map_err(|e| {
        eprintln!("Error loading snapshot: {}", e);
        e.exit_code() as u8
    })?;
    Ok(ResourceMonolith::from_snapshot(config, snapshot))
}

fn run_types(config: MonolithConfig, snapshot: &Path, json: bool) -> Result<(), u8> {
    let monolith = load_monolith(config, snapshot)?;
    let counts: Vec<(&str, usize)> = monolith
        .type_index()
        .iter()
        .map(|(name, paths)| (name.as_str(), paths.len()))
        .collect();

    if json {
        let output: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(name, count)| (name.to_string(), serde_json::json!(count)))
            .collect();
        println!("{}", serde_json::Value::Object(output));
    } else {
        for (name, count) in counts {
            println!("{:6}  {}", count, name);
        }
    }
    Ok(())
}

fn run_show(config: MonolithConfig, snapshot: &Path, path: &str) -> Result<(), u8> {
    let monolith = load_monolith(config, snapshot)?;
    let Some(member) = monolith.member(path) else {
        eprintln!("Error: {} is not cached", path);
        return Err(2);
    };
    let value = serde_json::json!(member.to_snapshot());
    write_json(&value, None, true)
}

fn run_modified(config: MonolithConfig, snapshot: &Path, path: &str, write: bool) -> Result<(), u8> {
    let mut monolith = load_monolith(config, snapshot)?;
    if !monolith.contains(path) {
        eprintln!("Error: {} is not cached", path);
        return Err(2);
    }

    let dependents = monolith.mark_modified(path);
    println!("{}", path);
    for dependent in &dependents {
        println!("{}", dependent);
    }

    if write {
        monolith.to_snapshot().save(snapshot, true).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;
    }
    Ok(())
}

fn run_resolve(config: MonolithConfig, snapshot_path: &Path, path: &str, pretty: bool) -> Result<(), u8> {
    let snapshot = MonolithSnapshot::load(snapshot_path).map_err(|e| {
        eprintln!("Error loading snapshot: {}", e);
        e.exit_code() as u8
    })?;
    let transport = snapshot.replay();
    let mut monolith = ResourceMonolith::from_snapshot(config, snapshot);

    let Some(body) = monolith.member(path).map(|m| m.body().clone()) else {
        eprintln!("Error: {} is not cached", path);
        return Err(2);
    };
    let resolved = monolith
        .resolve_schema(&transport, path, body)
        .map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;

    write_json(&resolved, None, pretty)
}

fn run_validate(
    config: MonolithConfig,
    snapshot_path: &Path,
    resource: &str,
    schema: &str,
    json_output: bool,
) -> Result<(), u8> {
    let snapshot = MonolithSnapshot::load(snapshot_path).map_err(|e| {
        report_error(json_output, &format!("loading snapshot: {}", e));
        e.exit_code() as u8
    })?;
    let transport = snapshot.replay();
    let mut monolith = ResourceMonolith::from_snapshot(config, snapshot);

    match monolith.validate_member(&transport, resource, schema) {
        Ok(()) => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(ValidateError::Invalid { errors }) => {
            if json_output {
                let output = serde_json::json!({
                    "valid": false,
                    "errors": errors
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for error in errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(ValidateError::Monolith(e)) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

fn write_json(value: &serde_json::Value, output: Option<&Path>, pretty: bool) -> Result<(), u8> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
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
