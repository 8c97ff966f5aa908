mod commands;
mod keyfile;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courier_proto::{EngineConfig, EnvelopeEngine};
use tracing_subscriber::EnvFilter;

use crate::commands::WrapArgs;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Signed envelopes and multi-device message encryption", long_about = None)]
struct Cli {
    /// Engine configuration (JSON); COURIER_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the JSON result here instead of stdout
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identity and device management
    #[command(subcommand)]
    Identity(IdentityCommands),

    /// Create or verify envelopes
    #[command(subcommand)]
    Envelope(EnvelopeCommands),

    /// Encrypt a message for every device of both parties
    Wrap {
        /// Sender device key file
        #[arg(long)]
        device: PathBuf,
        /// Sender identity file
        #[arg(long)]
        sender: PathBuf,
        /// Recipient identity file
        #[arg(long)]
        recipient: PathBuf,
        /// Envelope file
        #[arg(long)]
        envelope: PathBuf,
        /// Message text
        #[arg(long)]
        text: String,
        /// Mentioned usernames
        #[arg(long = "mention")]
        mentions: Vec<String>,
        /// Where to keep the sender key map
        #[arg(long)]
        keys_out: PathBuf,
    },

    /// Decrypt a message as recipient, or as author with --sender-keys
    Decrypt {
        /// Device key file
        #[arg(long)]
        device: PathBuf,
        /// Wrapped message or encrypted content file
        #[arg(long)]
        message: PathBuf,
        /// Sender key map written by `wrap`
        #[arg(long)]
        sender_keys: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum IdentityCommands {
    /// Create an identity with its first device
    New {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "primary")]
        label: String,
        #[arg(long)]
        identity_out: PathBuf,
        #[arg(long)]
        device_out: PathBuf,
    },

    /// Enrol another device under an existing identity
    AddDevice {
        /// Identity file, updated in place
        #[arg(long)]
        identity: PathBuf,
        #[arg(long)]
        label: String,
        #[arg(long)]
        device_out: PathBuf,
    },
}

#[derive(Subcommand)]
enum EnvelopeCommands {
    /// Sign a new envelope
    Create {
        /// Author device key file
        #[arg(long)]
        device: PathBuf,
        /// Recipient username
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        seq: u64,
        /// Expiration, Unix epoch milliseconds (0 = never)
        #[arg(long, default_value = "0")]
        expiration: u64,
    },

    /// Check sequence, expiry and signature
    Verify {
        /// Envelope or wrapped message file
        #[arg(long)]
        envelope: PathBuf,
        /// Last accepted sequence number
        #[arg(long)]
        current_seq: Option<u64>,
    },
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let base = match path {
        Some(p) => EngineConfig::from_json_file(p)
            .with_context(|| format!("load config {}", p.display()))?,
        None => EngineConfig::default(),
    };
    Ok(base.with_env_overrides()?)
}

fn emit(value: &serde_json::Value, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => keyfile::write_json(path, value),
        None => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_proto=info,courier_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = EnvelopeEngine::new(load_config(cli.config.as_deref())?);

    let result = match cli.command {
        Commands::Identity(IdentityCommands::New { username, label, identity_out, device_out }) => {
            commands::identity_new(&username, &label, &identity_out, &device_out)?
        }
        Commands::Identity(IdentityCommands::AddDevice { identity, label, device_out }) => {
            commands::identity_add_device(&identity, &label, &device_out)?
        }
        Commands::Envelope(EnvelopeCommands::Create { device, recipient, seq, expiration }) => {
            commands::envelope_create(&device, &recipient, seq, expiration)?
        }
        Commands::Envelope(EnvelopeCommands::Verify { envelope, current_seq }) => {
            commands::envelope_verify(&envelope, current_seq)?
        }
        Commands::Wrap { device, sender, recipient, envelope, text, mentions, keys_out } => {
            commands::wrap(
                &engine,
                WrapArgs {
                    device: &device,
                    sender_identity: &sender,
                    recipient_identity: &recipient,
                    envelope: &envelope,
                    text: &text,
                    mentions,
                    keys_out: &keys_out,
                },
            )?
        }
        Commands::Decrypt { device, message, sender_keys } => {
            commands::decrypt(&engine, &device, &message, sender_keys.as_deref())?
        }
    };

    emit(&result, cli.out.as_deref())
}
