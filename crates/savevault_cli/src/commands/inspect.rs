//! Inspect command implementation.

use savevault_codec::IndexEntry;
use savevault_core::RecordId;
use std::path::Path;

/// Summary of a store's physical state.
#[derive(Debug)]
pub struct InspectStats {
    /// Total index slots, tombstoned included.
    pub slots: usize,
    /// Live slots.
    pub live: usize,
    /// Tombstoned slots.
    pub tombstoned: usize,
    /// Index file size in bytes.
    pub index_bytes: u64,
    /// Data log size in bytes.
    pub data_bytes: u64,
    /// Data log bytes referenced by live entries.
    pub live_bytes: u64,
}

impl InspectStats {
    /// Data log bytes no live entry references (reclaimable by defrag).
    pub fn garbage_bytes(&self) -> u64 {
        self.data_bytes.saturating_sub(self.live_bytes)
    }
}

/// Runs the inspect command.
pub fn run(base: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let entries = super::read_index(base)?;
    let stats = gather(base, &entries)?;

    match format {
        "json" => {
            let slots: Vec<_> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "tombstoned": e.is_tombstone(),
                        "id": if e.is_tombstone() {
                            serde_json::Value::Null
                        } else {
                            RecordId::from_bytes(e.id).to_string().into()
                        },
                        "label": e.label,
                        "offset": e.offset,
                        "len": e.len,
                    })
                })
                .collect();
            let doc = serde_json::json!({
                "slots": slots,
                "index_bytes": stats.index_bytes,
                "data_bytes": stats.data_bytes,
                "live_bytes": stats.live_bytes,
                "garbage_bytes": stats.garbage_bytes(),
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        "text" => {
            println!("Index of {}:", base.display());
            println!();
            println!(
                "{:<5} {:<6} {:<36} {:>10} {:>8}  label",
                "slot", "state", "id", "offset", "len"
            );
            for (slot, entry) in entries.iter().enumerate() {
                let (state, id) = if entry.is_tombstone() {
                    ("dead", "-".to_string())
                } else {
                    ("live", RecordId::from_bytes(entry.id).to_string())
                };
                println!(
                    "{slot:<5} {state:<6} {id:<36} {:>10} {:>8}  {}",
                    entry.offset, entry.len, entry.label
                );
            }
            println!();
            println!("Slots:       {} ({} live, {} dead)", stats.slots, stats.live, stats.tombstoned);
            println!("Index size:  {} bytes", stats.index_bytes);
            println!("Data size:   {} bytes", stats.data_bytes);
            println!("Live data:   {} bytes", stats.live_bytes);
            println!("Garbage:     {} bytes", stats.garbage_bytes());
        }
        other => return Err(format!("unknown format: {other}").into()),
    }

    Ok(())
}

/// Collects the physical stats for a store.
pub fn gather(base: &Path, entries: &[IndexEntry]) -> Result<InspectStats, Box<dyn std::error::Error>> {
    let index_bytes = std::fs::metadata(super::index_path(base))?.len();
    let data_bytes = std::fs::metadata(super::data_path(base))?.len();

    let live = entries.iter().filter(|e| !e.is_tombstone()).count();
    let live_bytes = entries
        .iter()
        .filter(|e| !e.is_tombstone())
        .map(|e| u64::from(e.len))
        .sum();

    Ok(InspectStats {
        slots: entries.len(),
        live,
        tombstoned: entries.len() - live,
        index_bytes,
        data_bytes,
        live_bytes,
    })
}
