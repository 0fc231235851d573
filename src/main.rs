// CLI driver exercising the six HSM operations against a real BLE
// adapter. Thin by design — the lifecycle logic lives in the library.

use btleplug::api::Manager as _;
use btleplug::platform::Manager;
use clap::{Parser, Subcommand};
use hsm_proxy::config::ConfigStore;
use hsm_proxy::settings::Settings;
use hsm_proxy::transport::{BleConfig, BleUartTransport};
use hsm_proxy::HsmProxy;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hsm-proxy-cli", about = "Host-side proxy to a BLE HSM")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the persisted instance tag, creating the record if absent.
    GetTag,
    /// Print the protocol version this proxy speaks.
    GetProtocol,
    /// Generate a fresh key pair. Requires state = keyless.
    GenerateKeys,
    /// Rotate to a new key pair. Requires state = loneKey.
    RotateKeys,
    /// Erase the HSM's key material and the local record.
    EraseKeys,
    /// Digest hex-encoded bytes (SHA-512, computed by the HSM).
    DigestBytes { hex_bytes: String },
    /// Sign hex-encoded bytes with the current (or one-shot previous) key.
    SignBytes { hex_bytes: String },
    /// Verify a hex-encoded signature against a hex-encoded public key.
    ValidSignature {
        hex_public_key: String,
        hex_signature: String,
        hex_bytes: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cli.settings.tracing_filter()))
        .init();

    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    let adapter = adapters
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no BLE adapter available on this host"))?;

    let transport = BleUartTransport::new(
        adapter,
        BleConfig {
            device_name: cli.settings.device_name.clone(),
            scan_timeout: Duration::from_millis(cli.settings.scan_timeout_ms),
        },
    );
    let store = ConfigStore::new(&cli.settings.directory, hsm_proxy::PROTOCOL_VERSION);
    let proxy = HsmProxy::new(transport, store, cli.settings.max_attempts);

    match cli.command {
        Command::GetTag => println!("{}", proxy.get_tag().await?),
        Command::GetProtocol => println!("{}", proxy.get_protocol()),
        Command::GenerateKeys => println!("{}", hex::encode(proxy.generate_keys().await?)),
        Command::RotateKeys => println!("{}", hex::encode(proxy.rotate_keys().await?)),
        Command::EraseKeys => println!("{}", proxy.erase_keys().await?),
        Command::DigestBytes { hex_bytes } => {
            let bytes = hex::decode(hex_bytes)?;
            println!("{}", hex::encode(proxy.digest_bytes(&bytes).await?));
        }
        Command::SignBytes { hex_bytes } => {
            let bytes = hex::decode(hex_bytes)?;
            println!("{}", hex::encode(proxy.sign_bytes(&bytes).await?));
        }
        Command::ValidSignature {
            hex_public_key,
            hex_signature,
            hex_bytes,
        } => {
            let public_key = hex::decode(hex_public_key)?;
            let signature = hex::decode(hex_signature)?;
            let bytes = hex::decode(hex_bytes)?;
            let valid = proxy
                .valid_signature(&public_key, &signature, &bytes)
                .await?;
            println!("{valid}");
        }
    }

    Ok(())
}
