use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use log::info;

use retina::chat::{InboundContent, InboundMessage};
use retina::{chat, BuiltinBackbone, Engine, ModelManager, PendingLabels};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the training set (ledger + cached images)
    #[arg(short, long, default_value = "assets")]
    data_dir: String,

    /// Force a fresh download of the backbone file
    #[arg(short, long)]
    fresh: bool,

    /// URL of the image to classify or train on
    url: String,

    /// Train on the image under this label instead of classifying it
    #[arg(short, long)]
    label: Option<String>,
}

async fn ensure_backbone_downloaded(fresh: bool) -> Result<()> {
    let manager = ModelManager::new_default()?;
    let backbone = BuiltinBackbone::InceptionV1;

    if fresh {
        info!("Fresh download requested - removing any existing backbone files...");
        manager.remove_download(backbone)?;
    }
    manager.ensure_downloaded(backbone).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    ensure_backbone_downloaded(args.fresh).await?;

    let start_time = Instant::now();
    info!("Building engine over {}...", args.data_dir);
    let engine = Engine::builder()
        .with_data_dir(&args.data_dir)
        .with_backbone(BuiltinBackbone::InceptionV1)?
        .build()?;
    let engine_info = engine.info();
    info!(
        "Engine built in {:.2?}: {} examples, {} classes",
        start_time.elapsed(),
        engine_info.training_examples,
        engine_info.num_classes
    );

    // Drive the same two-step conversation the chat channel would.
    let pending = PendingLabels::new();
    let sender = "cli".to_string();
    if let Some(label) = &args.label {
        let command = InboundMessage {
            sender: sender.clone(),
            content: InboundContent::Text {
                body: format!("train {label}"),
            },
        };
        if let Some(reply) = chat::respond(&engine, &pending, &command).await {
            println!("{reply}");
        }
    }

    let message = InboundMessage {
        sender,
        content: InboundContent::Image {
            url: args.url.clone(),
        },
    };
    let request_start = Instant::now();
    if let Some(reply) = chat::respond(&engine, &pending, &message).await {
        println!("{reply}");
    }
    info!("Handled message in {:.2?}", request_start.elapsed());

    Ok(())
}
