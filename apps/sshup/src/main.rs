//! `sshup`: upload a file or directory to a configured server over SFTP,
//! resuming interrupted uploads on request.

mod archive;
mod config;
mod prompt;
mod render;
mod signal;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use sshup_sftp::SftpSession;
use sshup_transfer::{
    DEFAULT_CHUNK_SIZE, LocalFile, LocalSource, RemoteSession, TransferOutcome, TransferRequest,
    UploadEngine, remote_upload_path,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use archive::{PreparedUpload, prepare_upload};
use config::{AppConfig, ServerProfile};
use prompt::PromptDecider;
use render::TerminalProgress;

/// Upload a file or directory over SFTP with resume support.
#[derive(Parser, Debug)]
#[command(name = "sshup", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// List configured servers and exit
    #[arg(long)]
    list: bool,

    /// Only compress directories; upload plain files as they are
    #[arg(long)]
    compress_dir_only: bool,

    /// Bytes per SFTP write
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Server profile name (`env` builds one from SSHUP_* variables)
    #[arg(required_unless_present = "list")]
    server: Option<String>,

    /// Local file or directory
    #[arg(required_unless_present = "list")]
    local: Option<PathBuf>,

    /// Remote directory [default: profile remote_dir or /home/<user>/uploads/]
    remote_dir: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,sshup=debug,sshup_transfer=debug,sshup_sftp=debug"
    } else {
        "warn,sshup=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = AppConfig::load().context("loading configuration")?;

    if cli.list {
        print_servers(&config);
        return Ok(ExitCode::SUCCESS);
    }
    let (Some(server), Some(local)) = (cli.server, cli.local) else {
        anyhow::bail!("usage: sshup <server> <local-file | local-directory> [remote-dir]");
    };

    let Some(profile) = config.server(&server) else {
        eprintln!("Error: server \"{server}\" not found");
        print_servers(&config);
        return Ok(ExitCode::FAILURE);
    };
    let remote_dir = cli.remote_dir.unwrap_or_else(|| profile.default_remote_dir());

    let compress_dir_only = cli.compress_dir_only;
    let prepared = tokio::task::spawn_blocking(move || prepare_upload(&local, compress_dir_only))
        .await
        .context("archive task failed")??;

    // The archive is removed when `prepared` drops, including after a signal.
    let finished = tokio::select! {
        result = upload(&profile, &prepared, &remote_dir, cli.chunk_size) => Ok(result),
        interrupt = signal::interrupted() => Err(interrupt),
    };
    match finished {
        Ok(result) => Ok(report(result?)),
        Err(interrupt) => {
            warn!(signal = interrupt.name(), "interrupted");
            eprintln!("\nInterrupted");
            Ok(ExitCode::from(interrupt.exit_code()))
        }
    }
}

fn print_servers(config: &AppConfig) {
    let names = config.server_names();
    if names.is_empty() {
        println!("No servers configured.");
        return;
    }
    println!("Available servers:");
    for name in names {
        println!("- {name}");
    }
}

async fn upload(
    profile: &ServerProfile,
    prepared: &PreparedUpload,
    remote_dir: &str,
    chunk_size: usize,
) -> anyhow::Result<TransferOutcome> {
    let connect = profile.connect_config();
    let mut session = SftpSession::connect(&connect)
        .await
        .with_context(|| format!("SSH connection to {} failed", connect.target()))?;

    let result = transfer(&mut session, prepared, remote_dir, chunk_size).await;

    if let Err(e) = session.disconnect().await {
        warn!(error = %e, "disconnect failed");
    }
    result
}

async fn transfer(
    session: &mut SftpSession,
    prepared: &PreparedUpload,
    remote_dir: &str,
    chunk_size: usize,
) -> anyhow::Result<TransferOutcome> {
    session
        .create_dir_all(remote_dir)
        .await
        .with_context(|| format!("creating remote directory {remote_dir}"))?;

    let remote_path = remote_upload_path(remote_dir, prepared.file_name()?)?;
    let source = LocalFile::open(prepared.path()).await?;
    info!(
        local = %prepared.path().display(),
        remote = %remote_path,
        size = source.size(),
        "starting upload"
    );

    let engine = UploadEngine::new().with_chunk_size(chunk_size);
    let progress = TerminalProgress::stdout();
    let decider = PromptDecider::stdio();

    let outcome = engine
        .upload(
            session,
            TransferRequest::new(&source, remote_path),
            Some(&progress),
            Some(&decider),
        )
        .await;
    if !outcome.is_completed() {
        progress.abandon();
    }
    Ok(outcome)
}

fn report(outcome: TransferOutcome) -> ExitCode {
    match outcome {
        TransferOutcome::Completed(_) => ExitCode::SUCCESS,
        TransferOutcome::Cancelled => {
            println!("Upload cancelled");
            ExitCode::SUCCESS
        }
        TransferOutcome::Failed(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
