//! Verify command implementation.

use savevault_core::{EncryptionKey, SaveStore, StoreOptions};
use std::path::Path;
use tracing::info;

/// Runs the verify command.
///
/// Decrypts and integrity-checks every live record; fails on the first
/// record that does not verify.
pub fn run(base: &Path, key: EncryptionKey) -> Result<(), Box<dyn std::error::Error>> {
    info!("Verifying store at {:?}", base);

    let options = StoreOptions::new().create_if_missing(false);
    let store = SaveStore::open_with_options(base, key, options)?;

    match store.verify() {
        Ok(checked) => {
            println!("✓ {checked} records verified");
            Ok(())
        }
        Err(e) => {
            println!("✗ verification failed: {e}");
            Err(e.into())
        }
    }
}
