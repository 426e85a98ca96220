mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_PACKAGE_ERROR};
use ovakit_package::install_signal_handler;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "ovakit",
    version,
    about = "Compose OVF descriptors and OVA virtual appliances from YAML"
)]
struct Cli {
    /// Tool settings file (default: ~/.config/ovakit/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
pub struct ComposeArgs {
    /// Appliance description (YAML), or '-' for stdin.
    #[arg(short, long)]
    input: PathBuf,
    /// Output file or directory.
    #[arg(short, long)]
    output: PathBuf,
    /// Output format: ovf, ova or dir (default: from the output extension).
    #[arg(short, long)]
    format: Option<String>,
    /// Write a manifest next to an ovf output (always done for ova and dir).
    #[arg(short, long, default_value_t = false)]
    manifest: bool,
    /// Manifest digest: sha1, sha256, sha384 or sha512.
    #[arg(long)]
    checksum_type: Option<String>,
    /// PEM file holding the signing key and certificate.
    #[arg(short, long, value_name = "KEYFILE")]
    sign: Option<PathBuf>,
    /// Signature digest (default: the checksum type).
    #[arg(long)]
    sign_alg: Option<String>,
    /// Sign with an external script instead of openssl.
    #[arg(long, requires = "sign")]
    sign_script: Option<PathBuf>,
    /// Tar dialect for ova output: gnu, ustar or v7.
    #[arg(long)]
    tar_format: Option<String>,
    /// Path to the vmdk-convert tool.
    #[arg(long)]
    vmdk_convert: Option<PathBuf>,
    /// Path to the openssl binary.
    #[arg(long)]
    openssl: Option<PathBuf>,
    /// Value for a `!param` tag in the input.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
    /// Suppress progress output.
    #[arg(short, long, default_value_t = false)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build an OVF descriptor, OVA archive, or appliance directory.
    Compose(ComposeArgs),
    /// Check the files listed in a manifest against their digests.
    Verify {
        /// Manifest (.mf) file.
        manifest: PathBuf,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("OVAKIT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Compose(args) => commands::compose::run(&args, cli.config.as_deref(), json_output),
        Commands::Verify { manifest } => commands::verify::run(&manifest, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("package error:") {
                EXIT_PACKAGE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
