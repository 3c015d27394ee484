mod cli;
mod export;

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use onedump_core::auth::{FileTokenStore, OAuthClient, OAuthConfig, SessionManager, Token};
use onedump_core::notes::{self, NotesClient};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use export::ExportSink;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let started = Instant::now();
    match &args.command {
        Command::List => list_notebooks(args.new_session).await?,
        Command::Dump {
            notebook,
            section,
            output,
            max_pages,
            start_page,
        } => {
            dump_notebook(
                args.new_session,
                notebook,
                section.as_deref(),
                output,
                *max_pages,
                *start_page,
            )
            .await?
        }
    }
    info!(
        elapsed_secs = started.elapsed().as_secs_f64(),
        "operation complete"
    );
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn acquire_session(new_session: bool) -> Result<Token> {
    let store = FileTokenStore::with_default_locator()?;
    let oauth = OAuthClient::new(OAuthConfig::with_defaults())?;
    let manager = SessionManager::new(store, oauth);
    let token = manager
        .get_session(new_session, |url| {
            println!("If your browser does not open, authorize access at:\n\n  {url}\n");
            Ok(())
        })
        .await?;
    Ok(token)
}

async fn list_notebooks(new_session: bool) -> Result<()> {
    let token = acquire_session(new_session).await?;
    let client = NotesClient::from_token(&token)?;
    let notebooks = notes::list_notebooks(&client).await?;
    if notebooks.is_empty() {
        println!("No notebooks found.");
        return Ok(());
    }
    println!("Found notebooks:");
    for notebook in &notebooks {
        println!("- {}", notebook.display_name.as_deref().unwrap_or("(unnamed)"));
    }
    Ok(())
}

async fn dump_notebook(
    new_session: bool,
    notebook: &str,
    section: Option<&str>,
    output: &Path,
    max_pages: Option<usize>,
    start_page: Option<usize>,
) -> Result<()> {
    let token = acquire_session(new_session).await?;
    let client = NotesClient::from_token(&token)?;

    info!(notebook, "dumping notebook");
    let mut walk = notes::notebook_pages(&client, notebook, section).await?;
    let mut sink = ExportSink::new(output)?;

    // The completion hook runs whether or not the stream aborted partway.
    let result = stream_pages(&client, &mut walk, &mut sink, start_page, max_pages).await;
    sink.done();
    result
}

async fn stream_pages(
    client: &NotesClient,
    walk: &mut notes::PageWalk<'_>,
    sink: &mut ExportSink,
    start_page: Option<usize>,
    max_pages: Option<usize>,
) -> Result<()> {
    let mut position = 0usize;
    while let Some(page) = walk.next().await {
        let page = page?;
        position += 1;
        let title = page.title_or_untitled();
        if exports_at(position, start_page) {
            info!("page {position}: {title}");
            let content = notes::get_page_content(client, &page).await?;
            sink.write_page(&page, &content)?;
        } else {
            info!("page {position}: {title} [skipped]");
        }
        if stops_after(position, max_pages) {
            break;
        }
    }
    Ok(())
}

// Positions are 1-indexed over the post-section-filter page stream: pages
// before start_page are listed but not exported, and the walk stops once
// position max_pages has been processed.

fn exports_at(position: usize, start_page: Option<usize>) -> bool {
    start_page.map_or(true, |start| position >= start)
}

fn stops_after(position: usize, max_pages: Option<usize>) -> bool {
    max_pages.is_some_and(|max| position >= max)
}
