//! Docchat CLI
//!
//! Line-oriented terminal front end for the docchat conversation engine.
//! Questions are read from stdin; answers are typed out as they are revealed.
//!
//! # Usage
//!
//! ```bash
//! # Talk to the default service (http://localhost:8000)
//! docchat
//!
//! # Upload a transcript first, against a custom service
//! docchat --api-url http://transcripts.local:9000 --upload minutes.txt
//!
//! # With verbose logging
//! RUST_LOG=debug docchat
//! ```
//!
//! # Commands
//!
//! - `/upload <path>`: upload a document (.txt .pdf .doc .docx .json)
//! - `/retry`: retry the last failed upload
//! - `/clear`: start a new conversation
//! - `/export [html|path]`: save the conversation as Markdown, or as printable
//!   HTML for `html` or a `.html` path
//! - `/data`: show the raw data of the last answer
//! - `/status`: show the turn and upload state
//! - `/quit`: exit
//!
//! # Environment Variables
//!
//! - `DOCCHAT_API_URL`: service base URL
//! - `DOCCHAT_REVEAL_MS`: typewriter speed in ms per character
//! - `DOCCHAT_REQUEST_TIMEOUT_SECS`: request timeout (none by default)
//! - `DOCCHAT_DISABLE_FALLBACK`: "1" or "true" to report unreachable service errors
//! - `DOCCHAT_CONFIG`: config file path
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use docchat_core::export::{self, ExportFormat};
use docchat_core::{
    config::default_config_path, load_config_from_path, ChatUpdate, ConfigOverrides, FileHandle,
    HttpTransport, MessageId, MessageRole, SubmitError, TurnController, TurnPhase,
};

/// Ask questions about a document from the terminal
#[derive(Parser, Debug)]
#[command(name = "docchat", version, about)]
struct Args {
    /// Answering service base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Milliseconds per revealed character
    #[arg(long)]
    reveal_ms: Option<u64>,

    /// Overall request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Report an unreachable service instead of answering offline
    #[arg(long)]
    no_fallback: bool,

    /// Config file (default: $XDG_CONFIG_HOME/docchat/config.toml)
    #[arg(long, env = "DOCCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Document to upload on startup
    #[arg(long)]
    upload: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref url) = self.api_url {
            overrides = overrides.with_base_url(url.clone());
        }
        if let Some(ms) = self.reveal_ms {
            overrides = overrides.with_reveal_ms(ms);
        }
        if let Some(secs) = self.timeout_secs {
            overrides = overrides.with_request_timeout_secs(secs);
        }
        if self.no_fallback {
            overrides = overrides.with_fallback_disabled();
        }
        overrides
    }
}

/// Prints controller updates to stdout
#[derive(Default)]
struct Renderer {
    /// Answer currently being typed out
    streaming: Option<MessageId>,
    /// Bytes of the revealed prefix already printed
    printed: usize,
    /// Whether the streaming answer carries raw data
    has_data: bool,
}

impl Renderer {
    fn render(&mut self, update: ChatUpdate) {
        match update {
            ChatUpdate::Phase {
                phase: TurnPhase::AwaitingResponse,
            } => println!("{}", TurnPhase::AwaitingResponse.description()),
            ChatUpdate::Phase { .. } => {}
            ChatUpdate::MessageAppended {
                role: MessageRole::User,
                ..
            } => {}
            ChatUpdate::MessageAppended {
                id,
                streaming: true,
                auxiliary_data,
                ..
            } => {
                print!("Assistant: ");
                self.streaming = Some(id);
                self.printed = 0;
                self.has_data = auxiliary_data.is_some_and(|d| !d.is_empty());
                flush();
            }
            ChatUpdate::MessageAppended { content, .. } => println!("Assistant: {content}"),
            ChatUpdate::Reveal {
                message_id,
                revealed,
            } => {
                if self.streaming.as_ref() != Some(&message_id) {
                    return;
                }
                if let Some(delta) = revealed.get(self.printed..) {
                    print!("{delta}");
                    self.printed = revealed.len();
                    flush();
                }
            }
            ChatUpdate::StreamEnd { message_id } => {
                if self.streaming.as_ref() == Some(&message_id) {
                    println!();
                    if self.has_data {
                        println!("(raw data available, type /data)");
                    }
                    self.streaming = None;
                }
            }
            ChatUpdate::Cleared => {
                if self.streaming.take().is_some() {
                    println!();
                }
                println!("Conversation cleared.");
            }
            ChatUpdate::UploadStarted { filename } => println!("Uploading {filename}..."),
            ChatUpdate::UploadProgress { filename, percent } => {
                println!("  {filename}: {percent}%");
            }
            ChatUpdate::UploadFailed { filename, error } => {
                println!("Upload of {filename} failed: {error} (type /retry to try again)");
            }
            ChatUpdate::UploadComplete { filename } => {
                println!("Uploaded {filename}. Ask a question about it.");
            }
        }
    }
}

fn flush() {
    let _ = std::io::stdout().flush();
}

/// What the main loop should do after a line of input
enum Flow {
    Continue,
    Quit,
}

async fn handle_line(
    controller: &mut TurnController<HttpTransport>,
    line: &str,
) -> anyhow::Result<Flow> {
    let trimmed = line.trim();
    let Some(command) = trimmed.strip_prefix('/') else {
        match controller.submit(line) {
            Ok(_) | Err(SubmitError::EmptySubmission) => {}
            Err(SubmitError::Busy { phase }) => {
                println!("({}, wait for the current answer)", phase.description());
            }
            Err(e) => return Err(e.into()),
        }
        return Ok(Flow::Continue);
    };

    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(n, a)| (n, a.trim()));

    match name {
        "quit" | "exit" => return Ok(Flow::Quit),
        "clear" => controller.clear(),
        "retry" => {
            if let Err(e) = controller.retry_upload() {
                println!("Cannot retry: {e}");
            }
        }
        "upload" => {
            if arg.is_empty() {
                println!("Usage: /upload <path>");
            } else {
                start_upload(controller, Path::new(arg)).await;
            }
        }
        "export" => {
            // `/export html` picks the default HTML name; a path picks by extension
            let (path, format) = match arg {
                "" | "md" => (None, ExportFormat::Markdown),
                "html" => (None, ExportFormat::Html),
                path => (Some(PathBuf::from(path)), ExportFormat::from_path(Path::new(path))),
            };
            let path = path.unwrap_or_else(|| {
                PathBuf::from(export::default_file_name(
                    chrono::Local::now().date_naive(),
                    format,
                ))
            });
            let written = export::write_export(
                &path,
                format,
                controller.messages(),
                controller.uploaded_file(),
            )
            .await?;
            if written {
                println!("Exported to {}", path.display());
            } else {
                println!("Nothing to export yet.");
            }
        }
        "data" => {
            match controller.last_answer_data() {
                Some(data) => println!("{}", data.to_pretty_json()),
                None => println!("No raw data yet."),
            }
        }
        "status" => {
            println!("Turn: {}", controller.phase().description());
            if let Some(file) = controller.uploaded_file() {
                println!("File: {file}");
            }
            let upload = controller.upload_state();
            if let Some(ref name) = upload.filename {
                println!(
                    "Upload: {name} {}% ({:?})",
                    upload.progress_percent, upload.phase
                );
            }
            if let Some(ref error) = upload.error {
                println!("Upload error: {error}");
            }
        }
        _ => println!(
            "Commands: /upload <path>, /retry, /clear, /export [html|path], /data, /status, /quit"
        ),
    }
    Ok(Flow::Continue)
}

async fn start_upload(controller: &mut TurnController<HttpTransport>, path: &Path) {
    match FileHandle::open(path).await {
        Ok(file) => controller.begin_upload(file),
        Err(e) => println!("Cannot upload: {e}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interleave with answers on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docchat_cli=info".parse()?)
                .add_directive("docchat_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path.as_deref()).await?;
    args.overrides().apply(&mut config);
    config.validate()?;

    info!(
        base_url = %config.base_url,
        source = %config.source(),
        fallback = config.fallback_enabled,
        "Starting docchat"
    );

    let transport = HttpTransport::from_config(&config)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut controller = TurnController::new(transport, config, tx);
    let mut renderer = Renderer::default();

    if let Some(ref path) = args.upload {
        start_upload(&mut controller, path).await;
    }

    println!("Ask a question about your document (/help for commands).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => {
                        if let Flow::Quit = handle_line(&mut controller, &line).await? {
                            break;
                        }
                    }
                    None => stdin_open = false,
                }
            }
            _ = controller.step(), if controller.has_pending_work() => {}
            Some(update) = rx.recv() => renderer.render(update),
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            else => break,
        }

        // Input closed: finish what is in flight, then exit
        if !stdin_open && !controller.has_pending_work() {
            while let Ok(update) = rx.try_recv() {
                renderer.render(update);
            }
            break;
        }
    }

    if controller.has_pending_work() {
        warn!("Exiting with work in flight");
    }
    Ok(())
}
