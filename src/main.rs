use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::*;
use std::path::{Path, PathBuf};
use wxdat_rusted::batch::{self, BatchSummary};
use wxdat_rusted::message::split_local_type;
use wxdat_rusted::{Config, RawMessage, UnwrapOptions, CONFIG_FILE};

#[derive(Parser)]
#[command(name = "wxdat")]
#[command(about = "Decode WeChat .dat media files and v4 message records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// AES key (32 hex chars or 16 ASCII chars), overrides the config file
    #[arg(long)]
    aes: Option<String>,

    /// XOR key, decimal or 0x-prefixed hex, overrides the config file
    #[arg(long, value_parser = parse_xor)]
    xor: Option<u8>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a single .dat file
    Convert {
        input: PathBuf,
        /// Output file, defaults to the input path with the detected extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Convert every .dat file under a directory
    Batch { input: PathBuf, output: PathBuf },
    /// Recover the XOR key from the thumbnails in a directory
    ScanXor {
        dir: PathBuf,
        /// Write the recovered key back to the config file
        #[arg(long)]
        save: bool,
    },
    /// Unwrap a v4 message record and print it as JSON
    Message {
        /// PackedInfoData as hex
        packed_info: String,
        /// local_type column
        #[arg(long = "type")]
        local_type: i64,
        #[arg(long)]
        talker: String,
        /// create_time, unix seconds
        #[arg(long)]
        time: i64,
        /// Sender user name, defaults to the talker
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = 0)]
        server_id: i64,
        /// Message body, plain text
        #[arg(long, default_value = "")]
        body: String,
        /// Host used to build media URLs
        #[arg(long, default_value = "127.0.0.1:5030")]
        host: String,
        /// Fail instead of leaving media paths empty when a field is missing
        #[arg(long)]
        strict: bool,
    },
}

fn parse_xor(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid XOR key {:?}: {}", s, e))
}

fn load_config(cli: &Cli) -> Config {
    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            debug!("使用默认配置: {}", e);
            Config::default()
        }
    };
    if let Some(aes) = &cli.aes {
        config.aes = aes.clone();
    }
    if let Some(xor) = cli.xor {
        config.xor = Some(xor);
    }
    config
}

fn convert(config: &Config, input: &Path, output: Option<PathBuf>) -> Result<()> {
    let converter = config.converter()?;
    let media = converter
        .convert_file(input)
        .with_context(|| format!("failed to convert {}", input.display()))?;

    let output = output.unwrap_or_else(|| input.with_extension(media.extension()));
    std::fs::write(&output, media.bytes())
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!("{} -> {} ({})", input.display(), output.display(), media.mime_type());
    Ok(())
}

async fn run_batch(config: &Config, input: &Path, output: &Path) -> Result<()> {
    let converter = config.converter()?;
    let outcomes = batch::convert_dir(&converter, input, output).await?;

    for outcome in outcomes.iter().filter(|o| !o.is_success()) {
        if let Some(error) = &outcome.error {
            warn!("{}: {}", outcome.input.display(), error);
        }
    }

    println!("{}", serde_json::to_string_pretty(&BatchSummary::of(&outcomes))?);
    Ok(())
}

fn scan_xor(cli: &Cli, mut config: Config, dir: &Path, save: bool) -> Result<()> {
    let key = batch::scan_xor_key(dir)
        .with_context(|| format!("no XOR key found under {}", dir.display()))?;
    println!("0x{:02X}", key);

    if save {
        config.xor = Some(key);
        config.save(&cli.config)?;
        info!("已写入 {}", cli.config.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli);

    match &cli.command {
        Commands::Convert { input, output } => convert(&config, input, output.clone()),
        Commands::Batch { input, output } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_batch(&config, input, output))
        }
        Commands::ScanXor { dir, save } => scan_xor(&cli, config.clone(), dir, *save),
        Commands::Message {
            packed_info,
            local_type,
            talker,
            time,
            user,
            server_id,
            body,
            host,
            strict,
        } => {
            let raw = RawMessage {
                sort_seq: 0,
                server_id: *server_id,
                local_type: *local_type,
                user_name: user.clone().unwrap_or_else(|| talker.clone()),
                create_time: *time,
                message_content: body.as_bytes().to_vec(),
                packed_info_data: hex::decode(packed_info.trim())
                    .context("packed info must be hex")?,
                status: 0,
            };
            debug!("local_type 拆分: {:?}", split_local_type(*local_type));

            let unwrapper = config.unwrapper(UnwrapOptions {
                strict_media: *strict,
            });
            let message = unwrapper.wrap(&raw, talker)?;

            let urls = message.media_urls(host);
            let output = serde_json::json!({
                "message": message,
                "urls": urls,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}
