//! Keygen and id command implementations.

use bucketsync_core::BucketKeypair;
use std::fs;
use std::path::Path;

/// Runs the keygen command.
pub fn run(out: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if out.exists() && !force {
        return Err(format!(
            "Key file {:?} already exists (use --force to overwrite)",
            out
        )
        .into());
    }

    let keypair = BucketKeypair::generate();
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(out, keypair.private_hex())?;

    println!("Wrote key file: {}", out.display());
    println!("Bucket id:  {}", keypair.bucket_id());
    println!("Public key: {}", keypair.public_key().to_hex());
    Ok(())
}

/// Runs the id command.
pub fn show_id(key: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let keypair = load_keypair(key)?;
    println!("Bucket id:  {}", keypair.bucket_id());
    println!("Public key: {}", keypair.public_key().to_hex());
    Ok(())
}

/// Loads a keypair from a key file written by `keygen`.
pub fn load_keypair(key: &Path) -> Result<BucketKeypair, Box<dyn std::error::Error>> {
    let hex = fs::read_to_string(key)
        .map_err(|err| format!("Cannot read key file {:?}: {}", key, err))?;
    Ok(BucketKeypair::from_private_hex(hex.trim())?)
}
