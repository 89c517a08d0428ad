//! Basic usage example - index a few documents and search them
//!
//! Run with `RUST_LOG=searchdb=debug` to see the indexing and query logs.

use anyhow::Context;
use searchdb::{DocumentMetadata, FieldWeight, IndexRequest, SearchManager, SearchableFields};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Get root path and query from args
    let args: Vec<String> = std::env::args().collect();
    let root = args.get(1).map(|s| s.as_str()).unwrap_or("./example-search");
    let query = args.get(2).map(|s| s.as_str()).unwrap_or("status rep");

    println!("Opening search manager at {}", root);
    let mut manager = SearchManager::new(root).context("failed to create search manager")?;
    manager.setup_search_database("notes")?;

    let documents = [
        ("weekly", "Weekly status report", "Team progress and blockers", 1.0),
        ("q3", "Quarterly status report", "Numbers for the third quarter", 2.0),
        ("retro", "Sprint retrospective", "What the status meetings missed", 1.0),
    ];

    for (id, title, body, boost) in documents {
        let request = IndexRequest::new("notes", id, "en", boost)
            .with_fields(
                SearchableFields::new()
                    .with(FieldWeight::Weight4, title)
                    .with(FieldWeight::Weight1, body),
            )
            .with_metadata(DocumentMetadata::new(title, format!("notes://{}", id)));
        manager.queue_index(&request, "notes")?;
    }

    let report = manager.run_pending();
    println!(
        "Indexed: {} completed, {} failed, {} held",
        report.completed, report.failed, report.held
    );

    println!("Searching for '{}'...", query);
    let results = manager.local_search(query, 10, 0, "notes")?;

    if results.is_empty() {
        println!("No matches.");
    } else {
        for result in results {
            println!(
                "  - {} [{:.2}] {} ({})",
                result.title, result.rank, result.snippet, result.uri
            );
        }
    }

    Ok(())
}
