mod config;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use hook_core::{decode, Attachment, Color, DeliveryFailure, Notifier, Payload, View};

use crate::config::AppConfig;

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        // Called once; the leaked string lives for the whole process.
        Box::leak(VERSION.to_string().into_boxed_str())
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// Send notifications to an incoming webhook.
#[derive(Parser)]
#[command(name = "hook-notify", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Post a message to the webhook and wait for it to settle.
    Send {
        /// Message text.
        #[arg(required_unless_present = "payload")]
        text: Option<String>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Webhook URL. Overrides config file.
        #[arg(long)]
        url: Option<String>,

        /// HTTP proxy address. Overrides config file.
        #[arg(long)]
        proxy: Option<String>,

        /// Attachment title.
        #[arg(long)]
        title: Option<String>,

        /// Attachment color: good, warning, danger or #rrggbb.
        #[arg(long)]
        color: Option<Color>,

        /// Inline HTML rendered in the attachment.
        #[arg(long)]
        html: Option<String>,

        #[arg(long, default_value_t = 400)]
        width: u32,

        #[arg(long, default_value_t = 200)]
        height: u32,

        /// Send a complete JSON payload from a file instead of TEXT.
        #[arg(long, conflicts_with_all = ["text", "title", "color", "html"])]
        payload: Option<PathBuf>,

        /// Print the JSON body without sending it.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// How long to wait for the request to settle, in milliseconds.
        #[arg(long, default_value_t = 15_000)]
        wait_ms: u64,
    },
    /// Validate a config file and print the effective settings.
    CheckConfig {
        /// Path to TOML config file.
        #[arg(short, long)]
        config: PathBuf,
    },
}

struct SendArgs {
    text: Option<String>,
    config: Option<PathBuf>,
    url: Option<String>,
    proxy: Option<String>,
    title: Option<String>,
    color: Option<Color>,
    html: Option<String>,
    width: u32,
    height: u32,
    payload: Option<PathBuf>,
    dry_run: bool,
    wait_ms: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Send {
            text,
            config,
            url,
            proxy,
            title,
            color,
            html,
            width,
            height,
            payload,
            dry_run,
            wait_ms,
        } => {
            let code = run_send(SendArgs {
                text,
                config,
                url,
                proxy,
                title,
                color,
                html,
                width,
                height,
                payload,
                dry_run,
                wait_ms,
            })
            .await;
            std::process::exit(code);
        }
        Commands::CheckConfig { config } => {
            init_tracing("pretty", "warn");
            std::process::exit(run_check_config(&config));
        }
    }
}

async fn run_send(args: SendArgs) -> i32 {
    let app_config = match args.config {
        Some(ref path) => match AppConfig::load(path) {
            Ok(c) => {
                init_tracing(&c.log.format, "warn");
                tracing::debug!(path = %path.display(), "Loaded config file");
                c
            }
            Err(e) => {
                init_tracing("pretty", "warn");
                tracing::error!("{}", e);
                return 1;
            }
        },
        None => {
            init_tracing("pretty", "warn");
            AppConfig::default()
        }
    };

    let payload = match args.payload {
        Some(ref path) => load_payload(path),
        None => Ok(build_payload(
            args.text.unwrap_or_default(),
            args.title,
            args.color,
            args.html,
            args.width,
            args.height,
        )),
    };
    let payload = match payload {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            return 1;
        }
    };

    if args.dry_run {
        match serde_json::to_string_pretty(&payload) {
            Ok(json) => {
                println!("{}", json);
                return 0;
            }
            Err(e) => {
                eprintln!("{} {}", style("error:").red().bold(), e);
                return 1;
            }
        }
    }

    let notifier_config = match app_config.webhook.to_notifier_config(args.url.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            return 1;
        }
    };
    let proxy = args
        .proxy
        .unwrap_or_else(|| app_config.webhook.proxy_address().to_string());

    let failures: Arc<Mutex<Vec<DeliveryFailure>>> = Arc::new(Mutex::new(Vec::new()));
    let notifier = match Notifier::new(notifier_config) {
        Ok(n) => {
            let sink = Arc::clone(&failures);
            n.with_failure_hook(move |f: &DeliveryFailure| {
                if let Ok(mut failures) = sink.lock() {
                    failures.push(f.clone());
                }
            })
        }
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            return 1;
        }
    };

    let host = notifier.endpoint().host_str().unwrap_or("webhook").to_string();

    if !notifier.config().enabled {
        println!(
            "{} notifications are disabled in config; nothing sent",
            style("skipped").yellow().bold()
        );
        return 0;
    }

    notifier.post_payload(&payload, &proxy);

    let spinner_style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let spinner = ProgressBar::new_spinner().with_style(spinner_style);
    spinner.set_message(format!("Posting to {}", host));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let drained = notifier.flush(Duration::from_millis(args.wait_ms)).await;
    spinner.finish_and_clear();

    let failures = failures.lock().map(|f| f.clone()).unwrap_or_default();
    if let Some(failure) = failures.first() {
        println!(
            "{} {}  {}",
            style("failed").red().bold(),
            host,
            style(&failure.error).dim()
        );
        return 1;
    }

    if !drained {
        println!(
            "{} {}  {}",
            style("pending").yellow().bold(),
            host,
            style(format!("no response after {}ms", args.wait_ms)).dim()
        );
        return 2;
    }

    let via = if proxy.is_empty() {
        String::new()
    } else {
        format!(" via {}", proxy)
    };
    println!("{} {}{}", style("sent").green().bold(), host, style(via).dim());
    0
}

fn run_check_config(path: &Path) -> i32 {
    let config = match AppConfig::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            return 1;
        }
    };

    let url = config.webhook.url.as_deref().unwrap_or("(not set)");
    let proxy = match config.webhook.proxy_address() {
        "" => "(direct)",
        p => p,
    };

    println!("{} {}", style("config").bold(), style(path.display()).dim());
    println!("  {} {}", style("url:     ").dim(), url);
    println!("  {} {}", style("proxy:   ").dim(), proxy);
    println!("  {} {}ms", style("timeout: ").dim(), config.webhook.timeout_ms);
    println!("  {} {}ms", style("connect: ").dim(), config.webhook.connect_timeout_ms);
    println!("  {} {}", style("enabled: ").dim(), config.webhook.enabled);
    println!("  {} {}", style("log:     ").dim(), config.log.format);
    0
}

fn build_payload(
    text: String,
    title: Option<String>,
    color: Option<Color>,
    html: Option<String>,
    width: u32,
    height: u32,
) -> Payload {
    let mut attachment = Attachment::new();
    attachment.title = title;
    attachment.color = color;
    attachment.view = html.map(|inline| View::html(inline, width, height));

    let payload = Payload::new(text);
    if attachment.is_empty() {
        payload
    } else {
        payload.with_attachment(attachment)
    }
}

fn load_payload(path: &Path) -> Result<Payload, String> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read payload file {}: {}", path.display(), e))?;
    decode(&bytes).map_err(|e| format!("Invalid payload file {}: {}", path.display(), e))
}

fn init_tracing(log_format: &str, default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match log_format {
        "json" => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
