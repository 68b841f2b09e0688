//! ankra-publish
//!
//! Operator CLI for the producing side of the pipeline: generate signing
//! keys, sign event bodies, and derive the content hash and CID an anchor
//! will commit to.
//!
//! Usage:
//!   ankra-publish keygen  [--keyfile <path>]
//!   ankra-publish sign    --event <path> [--keyfile <path>]
//!   ankra-publish hash    --event <path>
//!   ankra-publish verify  --event <path>

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};

use ankra_core::Event;
use ankra_crypto::{
    calculate_event_hash, cid_from_hash, verify_event_signature, EventSigner, SignatureOptions,
    SignatureOutcome,
};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "ankra-publish",
    version,
    about = "Ankra publisher — sign events and derive their anchors"
)]
struct Args {
    /// Path to the keyfile (JSON).
    #[arg(long, global = true, default_value = "ankra-key.json")]
    keyfile: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new signing keypair and save it to the keyfile.
    Keygen,

    /// Sign an event body and print the signed JSON with its anchor hash.
    Sign {
        /// Path to the event JSON file.
        #[arg(long)]
        event: PathBuf,
    },

    /// Print the content hash and CID an anchor for this event commits to.
    Hash {
        #[arg(long)]
        event: PathBuf,
    },

    /// Verify an already-signed event file.
    Verify {
        #[arg(long)]
        event: PathBuf,
    },
}

// ── Keyfile ──────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct Keyfile {
    pubkey: String,
    secret: String,
}

fn load_signer(path: &Path) -> anyhow::Result<EventSigner> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading keyfile {}", path.display()))?;
    let keyfile: Keyfile = serde_json::from_str(&text).context("parsing keyfile JSON")?;
    let bytes = hex::decode(&keyfile.secret).context("decoding secret key hex")?;
    let secret = SecretKey::from_slice(&bytes).context("invalid secret key")?;
    Ok(EventSigner::new(secret))
}

fn load_event(path: &Path) -> anyhow::Result<Event> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading event from {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text).context("parsing event JSON")?;
    Event::from_value(value).map_err(|e| anyhow::anyhow!("invalid event: {e}"))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Keygen => {
            if args.keyfile.exists() {
                bail!("keyfile {} already exists, refusing to overwrite", args.keyfile.display());
            }
            let secret = SecretKey::new(&mut rand::thread_rng());
            let signer = EventSigner::new(secret);
            let keyfile = Keyfile {
                pubkey: signer.pubkey_hex.clone(),
                secret: hex::encode(secret.secret_bytes()),
            };
            std::fs::write(&args.keyfile, serde_json::to_string_pretty(&keyfile)?)
                .with_context(|| format!("writing {}", args.keyfile.display()))?;
            println!("pubkey:  {}", signer.pubkey_hex);
            println!("keyfile: {}", args.keyfile.display());
        }

        Command::Sign { event } => {
            let signer = load_signer(&args.keyfile)?;
            let signed = signer
                .sign(load_event(&event)?)
                .map_err(|e| anyhow::anyhow!("signing failed: {e}"))?;
            let hash = calculate_event_hash(&signed)
                .map_err(|e| anyhow::anyhow!("hashing failed: {e}"))?;
            let cid = cid_from_hash(&hash).map_err(|e| anyhow::anyhow!("cid failed: {e}"))?;
            println!("{}", serde_json::to_string_pretty(&signed)?);
            eprintln!("content_hash: {hash}");
            eprintln!("canonical_cid: {cid}");
        }

        Command::Hash { event } => {
            let event = load_event(&event)?;
            let hash = calculate_event_hash(&event)
                .map_err(|e| anyhow::anyhow!("hashing failed: {e}"))?;
            let cid = cid_from_hash(&hash).map_err(|e| anyhow::anyhow!("cid failed: {e}"))?;
            println!("content_hash: {hash}");
            println!("canonical_cid: {cid}");
        }

        Command::Verify { event } => {
            let event = load_event(&event)?;
            match verify_event_signature(&event, &SignatureOptions::default()) {
                SignatureOutcome::Verified => println!("signature: ok"),
                SignatureOutcome::Bypassed => println!("signature: absent"),
                SignatureOutcome::Failed(reason) => bail!("signature check failed: {reason}"),
            }
        }
    }

    Ok(())
}
