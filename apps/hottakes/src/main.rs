use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use hottakes_client_core::api::{ApiClient, ApiConfig};
use hottakes_client_core::client::comments::{CommentsChange, CommentsClient};
use hottakes_client_core::client::feed::{FeedChange, FeedClient};
use hottakes_client_core::config::Config;
use hottakes_client_core::telemetry;
use hottakes_wire::SortMode;

#[derive(Parser, Debug)]
#[command(name = "hottakes")]
struct Cli {
    /// Base address of the takes API
    #[arg(long, env = "HOTTAKES_API_BASE")]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the current feed, then stream live changes
    Tail {
        #[arg(long, value_enum, default_value = "newest")]
        sort: SortArg,
    },
    /// Post a new take
    Post { content: String },
    /// Print a take's comments, then stream new ones
    Comments { take_id: String },
    /// Comment on a take
    Comment { take_id: String, content: String },
    /// Like a take
    Like { take_id: String },
    /// Delete a take
    Delete { take_id: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Newest,
    Hottest24h,
    Hottest7d,
}

impl From<SortArg> for SortMode {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Newest => SortMode::Newest,
            SortArg::Hottest24h => SortMode::Hottest24h,
            SortArg::Hottest7d => SortMode::Hottest7d,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }

    match cli.command {
        Commands::Tail { sort } => tail(&config, sort.into()).await,
        Commands::Post { content } => {
            let take = api_client(&config)?.create_take(&content).await?;
            println!("posted {} by {}", take.id, take.username);
            Ok(())
        }
        Commands::Comments { take_id } => comments(&config, &take_id).await,
        Commands::Comment { take_id, content } => {
            let comment = api_client(&config)?.create_comment(&take_id, &content).await?;
            println!("commented {} on {}", comment.id, comment.take_id);
            Ok(())
        }
        Commands::Like { take_id } => {
            api_client(&config)?.set_like(&take_id, true).await?;
            println!("liked {take_id}");
            Ok(())
        }
        Commands::Delete { take_id } => {
            api_client(&config)?.delete_take(&take_id).await?;
            println!("deleted {take_id}");
            Ok(())
        }
    }
}

fn api_client(config: &Config) -> Result<ApiClient> {
    let api_config =
        ApiConfig::new(&config.api_base)?.with_session_token(config.session_token.clone());
    Ok(ApiClient::new(api_config)?)
}

async fn tail(config: &Config, sort: SortMode) -> Result<()> {
    let mut feed = FeedClient::connect(config, sort).await?;
    for take in feed.takes() {
        println!(
            "{}  [{} likes, {} comments]  {}: {}",
            take.id, take.like_count, take.comment_count, take.username, take.content
        );
    }

    while let Some(change) = feed.next_change().await {
        match change {
            FeedChange::Inserted(take) => {
                println!("+ {}  {}: {}", take.id, take.username, take.content);
            }
            FeedChange::LikeChanged { id, like_count } => {
                println!("~ {id} now has {like_count} likes");
            }
            FeedChange::Removed { id } => {
                println!("- {id} deleted");
            }
        }
    }
    feed.close().await;
    Ok(())
}

async fn comments(config: &Config, take_id: &str) -> Result<()> {
    let mut thread = CommentsClient::connect(config, take_id).await?;
    let take = thread.take();
    println!("{}: {}", take.username, take.content);
    for comment in thread.comments() {
        println!("  {}: {}", comment.username, comment.content);
    }

    while let Some(change) = thread.next_change().await {
        let CommentsChange::CommentAdded(comment) = change;
        println!("  + {}: {}", comment.username, comment.content);
    }
    thread.close().await;
    Ok(())
}
