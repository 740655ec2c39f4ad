use std::path::Path;

use anyhow::Result;

use crate::mirror::MirrorStore;

/// Execute the `status` command: print what the local mirror holds.
pub async fn execute(mirror_dir: &Path) -> Result<()> {
    let store = MirrorStore::open(mirror_dir).await?;

    match store.load_metadata().await? {
        Some(metadata) => {
            println!("Mirror: {}", store.dir().display());
            println!("  Songs:     {}", metadata.total_songs);
            println!("  Last run:  {}", metadata.last_run.to_rfc3339());
        }
        None => println!("Mirror {} has not been synced yet.", store.dir().display()),
    }

    if let Some(checkpoint) = store.load_checkpoint().await? {
        println!(
            "  Interrupted run: {} page(s) up to cursor {}, fetching changes since {}",
            checkpoint.pages,
            checkpoint.cursor,
            checkpoint.after_time.to_rfc3339()
        );
    }

    Ok(())
}
