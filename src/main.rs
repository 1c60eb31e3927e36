use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use batchflow::client::{upload_artifacts, HttpArtifactUploader, HttpBatchJobClient};
use batchflow::dsl::{parse_dsl, validate_dsl, DslFormat, PipelineSchema};
use batchflow::{build_graph, JobGraphExecutor, JobRegistry, PipelineError, ServiceConfig};

#[derive(Parser)]
#[command(name = "batchflow", version, about = "Run phase-gated batch pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload artifacts and run the pipeline.
    Run(RunArgs),
    /// Parse and validate a pipeline file.
    Validate {
        #[arg(long)]
        pipeline: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    pipeline: PathBuf,
    #[arg(long)]
    skip_upload: bool,
    /// Wait for every job, including parallel phases.
    #[arg(long)]
    wait: bool,
    /// Run a single phase.
    #[arg(long)]
    phase: Option<String>,
    #[arg(long, env = "BATCHFLOW_ENDPOINT", default_value = "")]
    endpoint: String,
    #[arg(long, env = "EMR_APPLICATION_ID", default_value = "")]
    app_id: String,
    #[arg(long, env = "EMR_EXECUTION_ROLE_ARN", default_value = "")]
    role_arn: String,
    #[arg(long, env = "S3_BUCKET_NAME", default_value = "")]
    bucket: String,
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { pipeline } => validate(&pipeline),
        Command::Run(args) => match run(args).await {
            Ok(code) => ExitCode::from(code),
            Err(e) => {
                eprintln!("error: {}", e);
                if let PipelineError::ValidationFailed(report) = &e {
                    for diagnostic in &report.diagnostics {
                        eprintln!("  {}", diagnostic);
                    }
                }
                ExitCode::from(e.exit_code())
            }
        },
    }
}

fn read_pipeline(path: &Path) -> Result<(String, DslFormat), PipelineError> {
    let format = DslFormat::from_path(path).ok_or_else(|| {
        PipelineError::ConfigError(format!(
            "cannot infer DSL format from '{}' (expected .yaml, .yml, .json or .toml)",
            path.display()
        ))
    })?;
    let content = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::ConfigError(format!("{}: {}", path.display(), e)))?;
    Ok((content, format))
}

fn validate(path: &Path) -> ExitCode {
    let (content, format) = match read_pipeline(path) {
        Ok(read) => read,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let report = validate_dsl(&content, format);
    for diagnostic in &report.diagnostics {
        println!("{}", diagnostic);
    }
    if report.is_valid {
        println!(
            "{}: ok ({} warning(s))",
            path.display(),
            report.warnings().len()
        );
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}

async fn run(args: RunArgs) -> Result<u8, PipelineError> {
    let (content, format) = read_pipeline(&args.pipeline)?;
    let schema: PipelineSchema = parse_dsl(&content, format)?;
    let mut graph = build_graph(&schema)?;
    if let Some(phase) = &args.phase {
        graph = graph.select_phase(phase)?;
    }

    let service = ServiceConfig {
        endpoint: args.endpoint,
        application_id: args.app_id,
        execution_role_arn: args.role_arn,
        bucket: args.bucket,
        ..ServiceConfig::default()
    };
    service.validate()?;

    if args.skip_upload {
        tracing::info!("Skipping artifact upload");
    } else {
        let uploader = HttpArtifactUploader::new(&service)
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;
        if let Err(e) = upload_artifacts(&uploader, &schema.artifacts).await {
            eprintln!("error: {}", e);
            return Ok(1);
        }
    }

    let client = HttpBatchJobClient::new(&service)
        .map_err(|e| PipelineError::ConfigError(e.to_string()))?;
    let registry = JobRegistry::with_entries(service.submit_context(), schema.entries.clone());
    let mut executor_config = schema.executor.clone();
    executor_config.wait |= args.wait;

    let executor = JobGraphExecutor::new(Arc::new(client), registry, executor_config);
    let cancel = executor.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling pipeline");
            cancel.trigger("interrupted");
        }
    });

    tracing::info!(pipeline = %schema.name, jobs = graph.len(), "Starting pipeline");
    let report = executor.execute(&graph).await;

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| PipelineError::InternalError(e.to_string()))?;
        println!("{}", json);
    } else {
        println!("{}", report.summary());
    }
    Ok(report.exit_code())
}
