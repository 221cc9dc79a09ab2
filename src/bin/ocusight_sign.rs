//! Model signing utility for OcuSight artifacts.
//!
//! `keygen` creates an Ed25519 keypair; `sign` writes a `manifest.json`
//! binding the SHA-256 of `model.json` (and `model_meta.json` when present)
//! plus its detached signature `manifest.sig`.
//!
//! # Usage
//!
//! ```bash
//! ocusight-sign keygen --out-seed keys/model.seed [--out-pub keys/model.pub] [--force]
//! ocusight-sign sign models --key keys/model.seed
//! ```
//!
//! The seed is base64 and written with 0600 permissions on Unix. It can also
//! come from `OCUSIGHT_MODEL_SIGNING_KEY_B64_FILE`. Seed bytes are zeroized
//! after use.

use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use ocusight::adapters::artifact::{sign_manifest, ArtifactManifest, METADATA_FILE, MODEL_FILE};

const KEY_FILE_ENV: &str = "OCUSIGHT_MODEL_SIGNING_KEY_B64_FILE";

#[derive(Parser)]
#[command(
    name = "ocusight-sign",
    about = "Generate signing keys and sign OcuSight model directories"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new Ed25519 signing keypair
    Keygen {
        /// Where to write the base64 signing seed
        #[arg(long, value_name = "PATH")]
        out_seed: PathBuf,

        /// Where to write the base64 public key
        #[arg(long, value_name = "PATH")]
        out_pub: Option<PathBuf>,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Write a signed manifest for a model directory
    Sign {
        /// Directory containing model.json
        model_dir: PathBuf,

        /// File holding the base64 signing seed (or set OCUSIGHT_MODEL_SIGNING_KEY_B64_FILE)
        #[arg(long, value_name = "PATH")]
        key: Option<PathBuf>,
    },
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct Seed([u8; 32]);

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Keygen {
            out_seed,
            out_pub,
            force,
        } => keygen(&out_seed, out_pub.as_deref(), force),
        Commands::Sign { model_dir, key } => sign(&model_dir, key),
    }
}

fn open_for_write(path: &Path, mode: u32, force: bool) -> Result<fs::File> {
    if path.exists() && !force {
        bail!("Refusing to overwrite existing file {path:?}. Use --force.");
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {parent:?}"))?;
    }

    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        opts.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    opts.open(path).with_context(|| format!("Failed to open {path:?}"))
}

fn keygen(out_seed: &Path, out_pub: Option<&Path>, force: bool) -> Result<()> {
    let mut seed = Seed([0u8; 32]);
    OsRng.fill_bytes(&mut seed.0);

    let signing_key = SigningKey::from_bytes(&seed.0);
    let verifying_key = signing_key.verifying_key();
    let seed_b64 = Zeroizing::new(general_purpose::STANDARD.encode(seed.0));
    let pub_b64 = general_purpose::STANDARD.encode(verifying_key.as_bytes());

    if let Some(pub_path) = out_pub {
        if pub_path.exists() && !force {
            bail!("Refusing to overwrite existing file {pub_path:?}. Use --force.");
        }
    }

    let mut file = open_for_write(out_seed, 0o600, force)?;
    file.write_all(seed_b64.as_bytes())?;
    file.write_all(b"\n")?;

    if let Some(pub_path) = out_pub {
        // Public key is non-secret; allow read access.
        let mut file = open_for_write(pub_path, 0o644, force)?;
        file.write_all(pub_b64.as_bytes())?;
        file.write_all(b"\n")?;
    }

    // Print only non-secret material.
    println!("Wrote signing seed (base64) to {out_seed:?}");
    if let Some(pub_path) = out_pub {
        println!("Wrote public key (base64) to {pub_path:?}");
    }
    println!("OCUSIGHT_MODEL_PUBKEY_B64={pub_b64}");
    Ok(())
}

fn read_seed(key: Option<PathBuf>) -> Result<Seed> {
    let path = match key {
        Some(p) => p,
        None => match std::env::var(KEY_FILE_ENV) {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p.trim()),
            _ => bail!("Missing signing key. Pass --key <path> or set {KEY_FILE_ENV}."),
        },
    };

    let content = Zeroizing::new(
        fs::read_to_string(&path).with_context(|| format!("Failed reading signing key {path:?}"))?,
    );
    let raw = Zeroizing::new(
        general_purpose::STANDARD
            .decode(content.trim())
            .context("Invalid base64 in signing key")?,
    );
    if raw.len() != 32 {
        bail!(
            "Signing key seed must be 32 bytes after base64 decode (got {})",
            raw.len()
        );
    }

    let mut seed = Seed([0u8; 32]);
    seed.0.copy_from_slice(&raw);
    Ok(seed)
}

fn sign(model_dir: &Path, key: Option<PathBuf>) -> Result<()> {
    let model_dir = if model_dir.is_file() {
        model_dir
            .parent()
            .context("Model path has no parent directory")?
            .to_path_buf()
    } else {
        model_dir.to_path_buf()
    };

    if !model_dir.join(MODEL_FILE).exists() {
        bail!("No {MODEL_FILE} found in {model_dir:?}");
    }
    let mut bound = vec![MODEL_FILE];
    if model_dir.join(METADATA_FILE).exists() {
        bound.push(METADATA_FILE);
    }

    let seed = read_seed(key)?;
    let signing_key = SigningKey::from_bytes(&seed.0);
    drop(seed);

    let manifest = ArtifactManifest::for_files(&model_dir, &bound)?;
    sign_manifest(&model_dir, &manifest, &signing_key)?;

    println!("Signed {} file(s) in {model_dir:?}", manifest.files.len());
    for (name, digest) in &manifest.files {
        println!("  {name}  sha256={digest}");
    }
    println!(
        "OCUSIGHT_MODEL_PUBKEY_B64={}",
        general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes())
    );
    Ok(())
}
