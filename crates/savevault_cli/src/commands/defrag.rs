//! Defrag command implementation.

use savevault_core::{EncryptionKey, SaveStore, StoreOptions};
use std::path::Path;
use tracing::info;

/// Runs the defrag command.
pub fn run(base: &Path, key: EncryptionKey) -> Result<(), Box<dyn std::error::Error>> {
    info!("Compacting store at {:?}", base);

    let options = StoreOptions::new().create_if_missing(false);
    let store = SaveStore::open_with_options(base, key, options)?;

    let stats = store.defrag()?;

    println!("Compaction complete:");
    println!("  Slots scanned:   {}", stats.slots_scanned);
    println!("  Live records:    {}", stats.live_records);
    println!("  Bytes reclaimed: {}", stats.reclaimed_bytes);

    Ok(())
}

/// Reports what a defrag would reclaim without rewriting anything.
///
/// Works from the index alone, so no key is needed.
pub fn dry_run(base: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let entries = super::read_index(base)?;
    let stats = super::inspect::gather(base, &entries)?;

    println!("Compaction analysis (dry run - no changes made):");
    println!("  Slots:           {} ({} live, {} dead)", stats.slots, stats.live, stats.tombstoned);
    println!("  Data log:        {} bytes", stats.data_bytes);
    println!("  Live data:       {} bytes", stats.live_bytes);
    println!("  Reclaimable:     {} bytes of data log garbage", stats.garbage_bytes());

    if stats.tombstoned == 0 && stats.garbage_bytes() == 0 {
        println!();
        println!("No compaction needed - the store is already compact");
    }

    Ok(())
}
