//! `rml sources` and `rml retry`: operator views of the registry.

use anyhow::Result;

use ragmill_core::models::SourceStatus;
use ragmill_core::registry;
use ragmill_core::store::Store;

/// Print every registered source with its lifecycle status.
pub async fn list_sources<S: Store + ?Sized>(store: &S) -> Result<()> {
    let sources = store.list_sources().await?;
    if sources.is_empty() {
        println!("No sources registered.");
        return Ok(());
    }

    println!("{:<42} {:<12} {:<10} LOCATION", "ID", "STATUS", "TYPE");
    for source in &sources {
        println!(
            "{:<42} {:<12} {:<10} {}",
            source.id, source.status, source.document_type, source.location
        );
        if source.status == SourceStatus::Error {
            if let Some(message) = &source.error_message {
                println!("{:<42} error: {}", "", message);
            }
        }
    }
    Ok(())
}

/// Requeue an errored source by id or location.
pub async fn retry_source<S: Store + ?Sized>(store: &S, id_or_location: &str) -> Result<()> {
    let source = match store.source_by_id(id_or_location).await? {
        Some(source) => source,
        None => store
            .source_by_location(id_or_location)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No source found for '{}'", id_or_location))?,
    };

    let requeued = registry::retry(store, &source.id).await?;
    println!("Source {} requeued ({}).", requeued.location, requeued.status);
    Ok(())
}
