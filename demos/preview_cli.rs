//! Resolves links from the command line and prints their previews.
//!
//! ```text
//! cargo run --example preview_cli -- https://www.rust-lang.org "see example.com"
//! cargo run --example preview_cli --features full -- --db previews.db --verbose <links>
//! ```

use clap::Parser;
use colored::Colorize;
use link_preview::{LinkResolver, MemoryStore, PreviewCache, ResolverConfig};
use std::error::Error;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "preview_cli", about = "Resolve links into previews")]
struct Args {
    /// Links, or free text containing a single link
    #[arg(required = true)]
    links: Vec<String>,

    /// Persist previews in this SQLite file (needs the `sqlite` feature)
    #[arg(long)]
    db: Option<std::path::PathBuf>,

    /// Refuse this host and its subdomains; may be repeated
    #[arg(long = "block")]
    blocked_hosts: Vec<String>,

    /// Print the raw JSON record instead of a summary
    #[arg(long)]
    json: bool,

    /// Log pipeline activity to the console (needs the `logging` feature)
    #[arg(short, long)]
    verbose: bool,
}

fn open_cache(args: &Args) -> Result<PreviewCache, Box<dyn Error>> {
    match &args.db {
        #[cfg(feature = "sqlite")]
        Some(path) => Ok(PreviewCache::new(Arc::new(link_preview::SqliteStore::open(
            path,
        )?))),
        #[cfg(not(feature = "sqlite"))]
        Some(_) => Err("--db needs the `sqlite` feature".into()),
        None => Ok(PreviewCache::new(Arc::new(MemoryStore::new()))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    #[cfg(feature = "logging")]
    if args.verbose {
        link_preview::setup_logging(link_preview::LogConfig::console("debug"))
            .map_err(|e| e.to_string())?;
    }
    #[cfg(not(feature = "logging"))]
    if args.verbose {
        eprintln!("--verbose needs the `logging` feature");
    }

    let config = args
        .blocked_hosts
        .iter()
        .fold(ResolverConfig::new(), |config, host| config.with_blocked_host(host.as_str()));
    let resolver = LinkResolver::new_with_config(config, open_cache(&args)?);

    let previews = futures::future::join_all(
        args.links.iter().map(|link| resolver.resolve_preview(link)),
    )
    .await;

    for (link, result) in args.links.iter().zip(previews) {
        match result {
            Ok(preview) if args.json => println!("{}", serde_json::to_string_pretty(&preview)?),
            Ok(preview) => {
                println!("\n{}", link.bold().blue());
                println!("{}: {}", "URL".bold(), preview.url);
                println!("{}: {}", "Title".bold(), preview.title);
                println!("{}: {}", "Type".bold(), preview.media_type.to_string().cyan());
                if !preview.thumbnail_url.is_empty() {
                    println!(
                        "{}: {} ({} bytes)",
                        "Thumbnail".bold(),
                        preview.thumbnail_url,
                        preview.content_length
                    );
                }
                println!("{}: {}", "Content-Type".bold(), preview.content_type);
            }
            Err(e) => eprintln!("{} {}: {}", "✗".red(), link, e.to_string().red()),
        }
    }

    resolver.close()?;
    Ok(())
}
