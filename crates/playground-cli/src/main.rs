use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use playground_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use playground_contracts::events::{new_session_id, EventWriter};
use playground_contracts::messages::{AppMode, Message, Sender};
use playground_contracts::models::ModelSpec;
use playground_engine::{
    ImagePreview, Playground, PlaygroundConfig, RejectReason, SubmitOutcome,
};

#[derive(Debug, Parser)]
#[command(
    name = "playground",
    version,
    about = "Terminal playground for Gemini chat and image analysis"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session with chat and vision modes.
    Chat(ChatArgs),
    /// Send one chat message and print the reply.
    Ask(AskArgs),
    /// Analyze one image and print the result.
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Args)]
struct ClientArgs {
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
    /// Request timeout in seconds.
    #[arg(long)]
    timeout: Option<f64>,
    /// Downscale images whose longest side exceeds this before upload.
    #[arg(long)]
    max_image_dim: Option<u32>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    vision_model: Option<String>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    client: ClientArgs,
    #[arg(long, default_value = "chat")]
    mode: String,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[command(flatten)]
    client: ClientArgs,
    #[arg(long)]
    prompt: String,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[command(flatten)]
    client: ClientArgs,
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: Option<String>,
}

const PENDING_POLL_INTERVAL: Duration = Duration::from_millis(50);
const HISTORY_PREVIEW_CHARS: usize = 160;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("playground error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Ask(args) => run_ask(args),
        Command::Analyze(args) => run_analyze(args),
    }
}

fn build_playground(args: &ClientArgs) -> Result<Playground> {
    let mut config = PlaygroundConfig::from_env();
    config.client = config
        .client
        .with_api_key(args.api_key.clone())
        .with_api_base(args.api_base.clone())
        .with_request_timeout_secs(args.timeout)
        .with_max_image_dim(args.max_image_dim);
    let config = config.with_models(args.model.clone(), args.vision_model.clone());
    let events = EventWriter::from_optional_path(args.events.clone(), new_session_id());
    Playground::new(config, events)
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let Some(initial_mode) = AppMode::parse(&args.mode) else {
        bail!("unknown mode '{}' (expected chat or vision)", args.mode);
    };
    let mut playground = build_playground(&args.client)?;
    playground.set_mode(initial_mode);
    print_model_summary(&playground);

    let stdin = io::stdin();
    let mut line = String::new();

    println!("Playground started. Type /help for commands.");
    for message in playground.chat().messages() {
        print_message(message);
    }

    loop {
        print!("{} ", prompt_marker(playground.mode()));
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        if intent.action == "noop" {
            continue;
        }
        if !handle_intent(&mut playground, &intent)? {
            break;
        }
    }

    playground.finish()?;
    Ok(())
}

/// Returns `false` when the session should end.
fn handle_intent(playground: &mut Playground, intent: &Intent) -> Result<bool> {
    match intent.action.as_str() {
        "help" => {
            println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            println!("Plain text goes to the active mode (chat: message, vision: prompt + analyze).");
        }
        "quit" => return Ok(false),
        "set_mode" => match intent.arg_str("mode").and_then(AppMode::parse) {
            Some(mode) => {
                playground.set_mode(mode);
                println!("Mode: {}", mode.as_str());
            }
            None => println!("/mode expects chat or vision"),
        },
        "select_image" => {
            let Some(path) = intent.arg_str("path") else {
                println!("/image requires a path");
                return Ok(true);
            };
            let selected = playground
                .vision_mut()
                .select_file(Path::new(path))
                .map(format_preview);
            match selected {
                Ok(summary) => {
                    println!("Selected {summary}");
                    playground.set_mode(AppMode::Vision);
                }
                Err(err) => println!("Image not selected: {err:#}"),
            }
        }
        "set_vision_prompt" => match intent.arg_str("text") {
            Some(text) => {
                playground.vision_mut().set_prompt(text);
                println!("Vision prompt set.");
            }
            None => println!("Vision prompt: {}", playground.vision().prompt()),
        },
        "analyze" => run_analysis(playground),
        "history" => {
            for message in playground.chat().display_messages() {
                print_message(&message);
            }
        }
        "status" => print_status(playground),
        "list_models" => {
            let text = playground.text_model().model.name.as_str();
            let vision = playground.vision_model().model.name.as_str();
            for model in playground.models() {
                println!("{}", format_model(model, text, vision));
            }
        }
        "set_text_model" => match intent.arg_str("model") {
            Some(model) => match playground.set_text_model(model) {
                Ok(selection) => {
                    println!("Text model set to {}", selection.model.name);
                    if let Some(reason) = selection.fallback_reason.as_deref() {
                        println!("{reason}");
                    }
                }
                Err(err) => println!("Text model unchanged: {err:#}"),
            },
            None => println!("Text model: {}", playground.text_model().model.name),
        },
        "set_vision_model" => match intent.arg_str("model") {
            Some(model) => match playground.set_vision_model(model) {
                Ok(selection) => {
                    println!("Vision model set to {}", selection.model.name);
                    if let Some(reason) = selection.fallback_reason.as_deref() {
                        println!("{reason}");
                    }
                }
                Err(err) => println!("Vision model unchanged: {err:#}"),
            },
            None => println!("Vision model: {}", playground.vision_model().model.name),
        },
        "submit" => {
            let text = intent.prompt.as_deref().unwrap_or_default();
            match playground.mode() {
                AppMode::Chat => run_chat_turn(playground, text),
                AppMode::Vision => {
                    playground.vision_mut().set_prompt(text);
                    run_analysis(playground);
                }
            }
        }
        "unknown" => {
            let command = intent.arg_str("command").unwrap_or_default();
            println!("Unknown command /{command}. Type /help for commands.");
        }
        other => println!("Unhandled action: {other}"),
    }
    Ok(true)
}

fn run_chat_turn(playground: &mut Playground, text: &str) {
    let chat = playground.chat_mut();
    if let SubmitOutcome::Rejected(reason) = chat.submit(text) {
        println!("{}", reject_reason_text(reason));
        return;
    }
    let reply = loop {
        if !chat.is_pending() {
            break chat.messages().last().cloned();
        }
        if let Some(message) = chat.poll() {
            break Some(message);
        }
        print!(".");
        let _ = io::stdout().flush();
        thread::sleep(PENDING_POLL_INTERVAL);
    };
    println!();
    if let Some(message) = reply {
        print_message(&message);
    }
}

fn run_analysis(playground: &mut Playground) {
    let vision = playground.vision_mut();
    if let SubmitOutcome::Rejected(reason) = vision.analyze() {
        println!("{}", reject_reason_text(reason));
        return;
    }
    println!("Analyzing...");
    if vision.is_analyzing() {
        vision.wait();
    }
    println!("{}", vision.analysis());
}

fn run_ask(args: AskArgs) -> Result<i32> {
    let mut playground = build_playground(&args.client)?;
    let reply = playground.chat_mut().send(&args.prompt);
    playground.finish()?;
    let Some(reply) = reply else {
        bail!("{}", reject_reason_text(RejectReason::Empty));
    };
    println!("{}", reply.text);
    Ok(if reply.sender == Sender::Bot { 0 } else { 1 })
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let mut playground = build_playground(&args.client)?;
    playground.set_mode(AppMode::Vision);
    let vision = playground.vision_mut();
    vision.select_file(&args.image)?;
    if let Some(prompt) = args.prompt.as_deref() {
        vision.set_prompt(prompt);
    }
    if let SubmitOutcome::Rejected(reason) = vision.analyze() {
        bail!("{}", reject_reason_text(reason));
    }
    let analysis = vision.wait().unwrap_or_else(|| vision.analysis().to_string());
    playground.finish()?;
    println!("{analysis}");
    Ok(0)
}

fn prompt_marker(mode: AppMode) -> &'static str {
    match mode {
        AppMode::Chat => ">",
        AppMode::Vision => "vision>",
    }
}

fn reject_reason_text(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::Empty => "Nothing to send: input is empty.",
        RejectReason::Pending => "Still waiting for the previous reply.",
        RejectReason::NoImage => "No image selected. Use /image <path> first.",
    }
}

fn print_model_summary(playground: &Playground) {
    println!(
        "Text model: {} | Vision model: {}",
        playground.text_model().model.name,
        playground.vision_model().model.name
    );
    for selection in [playground.text_model(), playground.vision_model()] {
        if let Some(reason) = selection.fallback_reason.as_deref() {
            println!("{reason}");
        }
    }
    if playground.client_config().api_key().is_none() {
        println!("No API key configured; Gemini requests will report an error.");
    }
}

fn print_status(playground: &Playground) {
    println!("Mode: {}", playground.mode().as_str());
    print_model_summary(playground);
    println!("Messages: {}", playground.chat().messages().len());
    match playground.vision().selected() {
        Some(preview) => println!("Image: {}", format_preview(preview)),
        None => println!("Image: none"),
    }
    println!("Vision prompt: {}", playground.vision().prompt());
    if let Some(path) = playground.event_writer().path() {
        println!("Events: {}", path.display());
    }
}

fn print_message(message: &Message) {
    println!("{}", format_message(message));
}

fn format_message(message: &Message) -> String {
    if message.is_loading {
        return "[Bot] ...".to_string();
    }
    format!(
        "[{}] {}",
        message.sender,
        clamp_text(&message.text, HISTORY_PREVIEW_CHARS)
    )
}

fn format_preview(preview: &ImagePreview) -> String {
    format!(
        "{} ({}, {}x{}, {})",
        preview.file_name(),
        preview.mime_type,
        preview.width,
        preview.height,
        format_bytes(preview.byte_len)
    )
}

/// `name (provider; capabilities; context) [active roles]`.
fn format_model(model: &ModelSpec, text_model: &str, vision_model: &str) -> String {
    let context = model
        .context_window
        .map(|tokens| format!("{tokens} tokens"))
        .unwrap_or_else(|| "context unknown".to_string());
    let mut line = format!(
        "{} ({}; {}; {context})",
        model.name,
        model.provider,
        model.capabilities.join(", ")
    );
    let roles: Vec<&str> = [("text", text_model), ("vision", vision_model)]
        .into_iter()
        .filter(|(_, active)| *active == model.name)
        .map(|(role, _)| role)
        .collect();
    if !roles.is_empty() {
        line.push_str(&format!(" [{}]", roles.join(", ")));
    }
    line
}

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let value = bytes as f64;
    if value < KIB {
        format!("{bytes} B")
    } else if value < KIB * KIB {
        format!("{:.1} KB", value / KIB)
    } else {
        format!("{:.1} MB", value / (KIB * KIB))
    }
}

fn clamp_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
