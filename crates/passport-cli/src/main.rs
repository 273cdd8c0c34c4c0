//! Passport CLI: run the Medical Passport services and launch workflow runs.
//!
//! Reuses the core domain logic (passport-core) and the HTTP bindings
//! (passport-server) that the services are deployed with.

mod commands;

use clap::{Parser, Subcommand};

/// Medical Passport: scanned notes to bilingual referrals
#[derive(Parser)]
#[command(name = "passport", version, about = "Medical Passport: scanned notes to bilingual referrals")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start one or all of the pipeline services
    Serve {
        #[command(subcommand)]
        service: ServeTarget,
        /// Host to bind to
        #[arg(long, global = true, default_value = "127.0.0.1")]
        host: String,
    },

    /// List the tools advertised by a capability server
    Tools {
        /// Capability server base URL
        #[arg(long, env = "PASSPORT_CAPABILITY_URL")]
        url: Option<String>,
        /// Print full tool specs (with schemas) as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a scanned document through the orchestrator
    Launch {
        /// Path to the scanned document (image or PDF page)
        document: String,
        /// OCR language of the document (e.g. "ara")
        #[arg(long)]
        locale: String,
        /// Clinic language
        #[arg(long, default_value = "en")]
        target: String,
        /// Optional referral title
        #[arg(long)]
        title: Option<String>,
        /// Orchestrator base URL
        #[arg(long, env = "ORCHESTRATOR_URL")]
        url: Option<String>,
    },

    /// Inspect pipeline definitions
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },
}

#[derive(Subcommand)]
enum ServeTarget {
    /// The capability (tool) server
    Capabilities,
    /// A single stage agent
    Agent {
        /// Stage name: intake, translate, structure, summarize, localize, referral
        #[arg(long)]
        stage: String,
    },
    /// The orchestrator
    Orchestrator {
        /// Attempts per endpoint for transient stage failures
        #[arg(long, default_value_t = 1)]
        retries: u32,
    },
    /// Capability server, every stage agent and the orchestrator in one process
    All {
        /// Attempts per endpoint for transient stage failures
        #[arg(long, default_value_t = 1)]
        retries: u32,
    },
}

#[derive(Subcommand)]
enum PipelineAction {
    /// Print a pipeline definition (the built-in one when no file is given)
    Show {
        /// Path to a pipeline YAML file
        file: Option<String>,
    },
    /// Validate a pipeline YAML file without running it
    Validate {
        /// Path to the pipeline YAML file
        file: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    commands::load_dotenv();
    passport_server::init_tracing();

    let result = match cli.command {
        Commands::Serve { service, host } => match service {
            ServeTarget::Capabilities => commands::serve::capabilities(&host).await,
            ServeTarget::Agent { stage } => commands::serve::agent(&stage, &host).await,
            ServeTarget::Orchestrator { retries } => {
                commands::serve::orchestrator(retries, &host).await
            }
            ServeTarget::All { retries } => commands::serve::all(retries, &host).await,
        },

        Commands::Tools { url, json } => commands::tools::list(url.as_deref(), json).await,

        Commands::Launch {
            document,
            locale,
            target,
            title,
            url,
        } => {
            commands::launch::run(&document, &locale, &target, title, url.as_deref()).await
        }

        Commands::Pipeline { action } => match action {
            PipelineAction::Show { file } => commands::pipeline::show(file.as_deref()),
            PipelineAction::Validate { file } => commands::pipeline::validate(&file),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
