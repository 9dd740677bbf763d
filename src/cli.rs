use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record a visited page
    Insert {
        /// Page url
        #[clap(short, long, allow_hyphen_values = true)]
        url: String,

        /// Page title
        #[clap(short, long)]
        title: String,

        /// Visit time. Defaults to now (RFC 3339)
        #[clap(long)]
        timestamp: Option<String>,
    },
    /// Import captured history from a csv file (url,title,timestamp)
    Import {
        /// Path to the csv file
        path: std::path::PathBuf,
    },
    /// Print the category a title would be stored under
    Classify {
        title: String,
    },
    /// Rebuild the vector index from the full history
    BuildIndex {},
    /// Recommend related topics for a query
    Recommend {
        /// Free-text query
        query: String,

        /// Number of titles to return
        #[clap(short = 'n', long)]
        top_n: Option<usize>,

        /// Minimum similarity for ranked matches
        #[clap(short, long, allow_hyphen_values = true)]
        threshold: Option<f32>,

        /// Don't fill missing slots with random history titles
        #[clap(long, default_value = "false")]
        no_backfill: bool,

        /// Plain nearest-neighbour lookup: threshold 0 and no backfill
        #[clap(long, default_value = "false")]
        ranked_only: bool,

        /// Print ids, scores and sources instead of bare titles
        #[clap(long, default_value = "false")]
        scores: bool,
    },
    /// Show store and index statistics
    Status {},
    /// Serve recommendations over http
    Daemon {
        /// Address to listen on
        #[clap(long, default_value = "127.0.0.1:8080")]
        listen: String,
    },
}
