use std::env;
use std::path::PathBuf;

use docshred_core::{
    FieldPolicy, LocalFsStorage, LocalWarehouseDriver, NdjsonFileSource, Orchestrator, RunConfig,
    WriteDisposition,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    run_cli()
}

// Extract the main logic into a separate function so we can call it from tests
fn run_cli() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config = RunConfig::default();
    let mut input_file = None;
    let mut collection = "events".to_string();
    let mut database = "warehouse".to_string();
    let mut run_dir: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--overwrite" => {
                config.write_disposition = WriteDisposition::Overwrite;
            }
            "--json-string-arrays" => {
                config.process_array = docshred_core::ProcessArrayPolicy::JsonString;
            }
            "--distributed" => {
                config.use_distributed = true;
            }
            "--shard-key" => {
                if i + 1 < args.len() {
                    config.shard_key = Some(args[i + 1].clone());
                    i += 1;
                } else {
                    return Err("Missing value for --shard-key".into());
                }
            }
            "--require" => {
                if i + 1 < args.len() {
                    for path in args[i + 1].split(',') {
                        config.policies.push(FieldPolicy::new(path).required());
                    }
                    i += 1;
                } else {
                    return Err("Missing value for --require".into());
                }
            }
            "--records-per-part" => {
                if i + 1 < args.len() {
                    config.records_per_part = args[i + 1]
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid value for --records-per-part: {}", args[i + 1]))?;
                    i += 1;
                } else {
                    return Err("Missing value for --records-per-part".into());
                }
            }
            "--max-depth" => {
                if i + 1 < args.len() {
                    config.max_depth = args[i + 1]
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid value for --max-depth: {}", args[i + 1]))?;
                    i += 1;
                } else {
                    return Err("Missing value for --max-depth".into());
                }
            }
            "--collection" => {
                if i + 1 < args.len() {
                    collection = args[i + 1].clone();
                    i += 1;
                } else {
                    return Err("Missing value for --collection".into());
                }
            }
            "--database" => {
                if i + 1 < args.len() {
                    database = args[i + 1].clone();
                    i += 1;
                } else {
                    return Err("Missing value for --database".into());
                }
            }
            "--run-dir" => {
                if i + 1 < args.len() {
                    run_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    return Err("Missing value for --run-dir".into());
                }
            }
            _ => {
                if !args[i].starts_with('-') && input_file.is_none() {
                    input_file = Some(args[i].clone());
                }
            }
        }
        i += 1;
    }

    let input_path = input_file.ok_or("docshred-cli requires an input NDJSON file path")?;
    let source = NdjsonFileSource::new(&input_path);

    let tmp_dir;
    let run_dir = match run_dir {
        Some(dir) => dir,
        None => {
            tmp_dir = tempfile::tempdir()?;
            tmp_dir.path().to_path_buf()
        }
    };

    let store = docshred_core::InMemorySchemaStore::new();
    let storage = LocalFsStorage;
    let warehouse = LocalWarehouseDriver::new();
    let orchestrator = Orchestrator::new(config, &store, &storage, &warehouse);

    let summary = orchestrator.run(&source, &run_dir, &collection, &database)?;

    anstream::println!(
        "Processed {} document(s), rejected {}",
        summary.records_extracted,
        summary.records_rejected
    );
    if let (Some(min), Some(max)) = (&summary.sort_key_min, &summary.sort_key_max) {
        anstream::println!("Sort key range: {min}..={max}");
    }
    anstream::println!("Destination tables: {}", summary.destination_tables.join(", "));
    for file in &summary.output_files {
        anstream::println!("  wrote {}", file.display());
    }

    Ok(())
}

fn print_help() {
    anstream::println!("docshred-cli - relational shredding and warehouse load demo");
    anstream::println!();
    anstream::println!("USAGE:");
    anstream::println!("    docshred-cli [OPTIONS] <FILE>");
    anstream::println!();
    anstream::println!("ARGS:");
    anstream::println!("    <FILE>    Input NDJSON file, one JSON document per line");
    anstream::println!();
    anstream::println!("OPTIONS:");
    anstream::println!("    -h, --help                Print this help message");
    anstream::println!("    --overwrite               Reset the schema and recreate tables before loading");
    anstream::println!("    --json-string-arrays      Serialize arrays as JSON-string columns instead of child tables");
    anstream::println!("    --distributed             Walk documents with a Rayon thread pool instead of sequentially");
    anstream::println!("    --shard-key <path>        Dotted path used to shard the root fragment");
    anstream::println!("    --require <paths>         Comma-separated dotted paths that must be present, else reject");
    anstream::println!("    --records-per-part <N>    Documents per extract/reject part file (default 100000)");
    anstream::println!("    --max-depth <N>           Maximum document nesting depth to walk (default 128)");
    anstream::println!("    --collection <name>       Collection/base table name (default \"events\")");
    anstream::println!("    --database <name>         Warehouse database name (default \"warehouse\")");
    anstream::println!("    --run-dir <path>          Staging directory for extract/shred output (default: a temp dir)");
    anstream::println!();
    anstream::println!("EXAMPLES:");
    anstream::println!("    docshred-cli events.ndjson");
    anstream::println!("    docshred-cli --overwrite --shard-key tenant_id events.ndjson");
}
