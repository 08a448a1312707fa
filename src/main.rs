#[macro_use]
extern crate log;

use clap::Parser;
use dylive_rs::{config::Config, live::Api, share::Input, stream::StreamFormat};

/// Print the stream URL of Douyin live rooms.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Stream quality: uhd, hd, ld or sd. Anything else picks the default
    #[arg(short, long, default_value = "")]
    quality: String,

    /// Stream format: flv or hls
    #[arg(short, long, default_value = "flv")]
    format: StreamFormat,

    /// Print the whole room as JSON instead of a URL
    #[arg(long)]
    json: bool,

    /// Device id sent to the profile API
    #[arg(long)]
    device_id: Option<u64>,

    /// Share messages, short links, room ids or account handles
    #[arg(required = true)]
    inputs: Vec<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut config = Config::default();
    if let Some(device_id) = args.device_id {
        config = config.with_device_id(device_id);
    }

    let api = match Api::new(config) {
        Ok(api) => api,
        Err(e) => {
            error!("Could not create HttpClient: {}", e);
            std::process::exit(1);
        }
    };

    for arg in &args.inputs {
        let input = Input::parse(arg);
        let mut room = match api.get_room_for_input(&input).await {
            Ok(room) => room,
            Err(e) => {
                error!("{}: {}", arg, e);
                continue;
            }
        };

        if let Err(e) = api.ensure_stream(&mut room).await {
            warn!("{}: could not fetch stream data: {}", arg, e);
        }

        if args.json {
            match serde_json::to_string_pretty(&room) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("{}: {}", arg, e),
            }
            continue;
        }

        if !room.is_operating() {
            info!("{} ({}) is not live", room.title, room.id);
        }
        let url = room.url_for(args.format, &args.quality);
        if url.is_empty() {
            error!("{}: room {} has no stream", arg, room.id);
        } else {
            println!("{}", url);
        }
    }
}
