use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lingomarker_core::context::ContextExtractor;
use lingomarker_core::highlight::HIGHLIGHT_CLASS;
use lingomarker_core::{
    Document, EngineConfig, HighlightRenderer, HttpRemoteStore, MarkOrigin, MarkRequest, NodeId,
    PageLocation, SyncClient, UserSettings, WordFormIndex,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lingomarker")]
#[command(about = "Mark vocabulary while reading and keep it highlighted", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend URL (overrides LINGOMARKER_BACKEND_URL and the config file)
    #[arg(long)]
    backend_url: Option<String>,

    /// Session cookie (overrides LINGOMARKER_SESSION)
    #[arg(long)]
    session: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the session and show the user's settings
    Session,

    /// Fetch all entries and relations
    Fetch {
        /// Print the full bundle as JSON
        #[arg(long)]
        json: bool,
    },

    /// Highlight known words in a plain-text file
    Highlight {
        /// Text file; blank lines separate paragraphs
        file: PathBuf,
    },

    /// Record a word in a paragraph
    Mark {
        /// Word to mark
        word: String,

        /// Page the paragraph was read on
        #[arg(long)]
        url: String,

        /// Paragraph text
        #[arg(long)]
        paragraph: String,

        /// Page title
        #[arg(long)]
        title: Option<String>,

        /// Existing entry to attach the occurrence to
        #[arg(long)]
        entry_uuid: Option<String>,
    },

    /// Delete an entry and all of its relations
    Delete {
        /// Entry UUID
        uuid: String,
    },

    /// Import a legacy data bundle
    Import {
        /// JSON file
        file: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mut config = config.with_env_overrides()?;

    if let Some(url) = &cli.backend_url {
        config.backend_url = url.clone();
    }
    if let Some(session) = &cli.session {
        config.session_cookie = Some(session.clone());
    }
    config.validate()?;
    Ok(config)
}

/// Page with one `<p>` per blank-line separated paragraph
fn document_from_text(text: &str, title: &str) -> Document {
    let mut doc = Document::new();
    doc.set_title(title);
    let body = doc.body();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let p = doc.append_element(body, "p", &[]);
        doc.append_text(p, paragraph);
    }
    doc
}

/// Plain text with highlights shown as `[[...]]`
fn render_marked(doc: &Document, node: NodeId, out: &mut String) {
    if let Some(text) = doc.text(node) {
        out.push_str(text);
        return;
    }
    if doc.has_class(node, HIGHLIGHT_CLASS) {
        out.push_str("[[");
        out.push_str(&doc.text_content(node));
        out.push_str("]]");
        return;
    }
    for &child in doc.children(node) {
        render_marked(doc, child, out);
    }
    if doc.tag(node) == Some("p") {
        out.push_str("\n\n");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Use specified level for lingomarker, but WARN for noisy HTTP crates
    let filter = EnvFilter::new(format!(
        "lingomarker={},lingomarker_core={},reqwest=warn,hyper=warn",
        level.as_str().to_lowercase(),
        level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("LingoMarker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let store = Arc::new(HttpRemoteStore::new(&config)?);
    let mut sync = SyncClient::new(store);

    match cli.command {
        Commands::Session => {
            let session = sync.session().await?;
            if !session.authenticated {
                println!("Not logged in. Visit {}/login", config.backend_base());
                return Ok(());
            }
            let settings = session.settings.clone().unwrap_or_default().with_defaults();
            println!(
                "Logged in as {}",
                session
                    .username
                    .as_deref()
                    .or(session.name.as_deref())
                    .unwrap_or("unknown user")
            );
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }

        Commands::Fetch { json } => {
            let bundle = sync.fetch_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(bundle)?);
            } else {
                println!(
                    "{} entries, {} urls, {} paragraphs, {} relations",
                    bundle.entries.len(),
                    bundle.urls.len(),
                    bundle.paragraphs.len(),
                    bundle.relations.len()
                );
                for entry in &bundle.entries {
                    println!("  {}  {}", entry.uuid, entry.forms().join(" | "));
                }
            }
            Ok(())
        }

        Commands::Highlight { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let entries = sync.fetch_all().await?.entries.clone();
            let index = WordFormIndex::build(&entries)?;

            let mut doc = document_from_text(&text, &file.display().to_string());
            let renderer = HighlightRenderer::new();
            if let Some(pattern) = index.pattern() {
                let report = renderer.mark(&mut doc, pattern);
                info!(
                    "{} highlights for {} matches",
                    report.highlights.len(),
                    report.matches
                );
            }

            let mut out = String::new();
            render_marked(&doc, doc.body(), &mut out);
            print!("{}", out);
            Ok(())
        }

        Commands::Mark {
            word,
            url,
            paragraph,
            title,
            entry_uuid,
        } => {
            let location = PageLocation::parse(&url)?;
            let mut doc = document_from_text(&paragraph, title.as_deref().unwrap_or(""));
            let body = doc.body();
            let node = doc
                .first_child(body)
                .and_then(|p| doc.first_child(p))
                .context("Paragraph text is empty")?;

            let prefixes = UserSettings::default().with_defaults().allow_fragment_prefixes();
            let extractor = ContextExtractor::new(config.backend_base(), prefixes);
            let context = extractor.extract(&doc, &location, node)?;

            let request = MarkRequest {
                word: word.trim().to_lowercase(),
                entry_uuid,
                url: context.url,
                title: context.title,
                paragraph_text: context.paragraph_text,
                url_hash: context.url_hash,
                paragraph_hash: context.paragraph_hash,
                transcript_segment_ref: None,
            };
            let entry = sync.mark(request, MarkOrigin::Confirmed).await?;
            println!("Marked \"{}\" ({})", entry.word, entry.uuid);
            Ok(())
        }

        Commands::Delete { uuid } => {
            sync.delete_entry(&uuid).await?;
            println!("Deleted entry {}", uuid);
            Ok(())
        }

        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let bundle: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            let summary = sync.import(bundle).await?;
            println!(
                "Imported {} entries, {} urls, {} paragraphs, {} relations",
                summary.imported_entries,
                summary.imported_urls,
                summary.imported_paragraphs,
                summary.imported_relations
            );
            Ok(())
        }
    }
}
