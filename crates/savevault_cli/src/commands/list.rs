//! List command implementation.

use savevault_core::RecordId;
use std::path::Path;

/// Runs the list command.
pub fn run(base: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let entries = super::read_index(base)?;
    let live: Vec<_> = entries.iter().filter(|e| !e.is_tombstone()).collect();

    match format {
        "json" => {
            let records: Vec<_> = live
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "id": RecordId::from_bytes(e.id).to_string(),
                        "label": e.label,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        "text" => {
            if live.is_empty() {
                println!("(no live records)");
                return Ok(());
            }

            println!("{:<36}  label", "id");
            for entry in live {
                println!("{:<36}  {}", RecordId::from_bytes(entry.id), entry.label);
            }
        }
        other => return Err(format!("unknown format: {other}").into()),
    }

    Ok(())
}
