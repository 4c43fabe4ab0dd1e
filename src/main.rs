use clap::Parser;
use anyhow::Result;

mod app;
mod client;
mod config;
mod handler;
mod sse;
mod transcript;
mod tui;
mod ui;

use app::App;
use config::Config;

#[derive(Parser)]
#[command(name = "cloudchat")]
#[command(about = "Terminal chat for a streaming chat-completions endpoint")]
struct Cli {
    /// Chat completions endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Model identifier sent with each request
    #[arg(long)]
    model: Option<String>,

    /// Bearer token for the endpoint
    #[arg(long)]
    api_key: Option<String>,

    /// Header title
    #[arg(long)]
    title: Option<String>,

    /// Comma-separated tool ids forwarded with each request
    #[arg(long)]
    tool_ids: Option<String>,

    /// Pipe-separated starter prompts
    #[arg(long)]
    prompts: Option<String>,
}

impl Cli {
    /// Flags override both the config file and the environment.
    fn apply(self, config: &mut Config) {
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(api_key) = self.api_key {
            config.api_key = api_key;
        }
        if let Some(title) = self.title {
            config.title = title;
        }
        if let Some(tool_ids) = self.tool_ids {
            config.tool_ids = config::parse_tool_ids(&tool_ids);
        }
        if let Some(prompts) = self.prompts {
            let prompts = config::parse_prompts(&prompts);
            if prompts.is_empty() {
                tracing::warn!("--prompts contained no usable entries, keeping defaults");
            } else {
                config.prompts = prompts;
            }
        }
    }
}

/// Log to a file under the config directory; the TUI owns the terminal.
fn init_logging() {
    let Ok(path) = Config::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(file) = std::fs::File::create(&path) else {
        return;
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloudchat=info".into()),
        )
        .with_writer(file)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    let mut config = Config::load();
    cli.apply(&mut config);
    tracing::info!(endpoint = %config.endpoint, model = %config.model, "starting");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = tui::EventHandler::new();
    let mut app = App::new(config, events.sender());

    let result = run(&mut terminal, &mut events, &mut app).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, events: &mut tui::EventHandler, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(app, event)?;
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}
