use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use revsync::cache::{CacheRecord, EntityCache, ReviewCache, ReviewFilter, SKETCH_DIR};
use revsync::config::Config;
use revsync::download::remove_dir_contents;
use revsync::logging;

#[derive(Parser, Debug)]
#[command(name = "revsync")]
#[command(about = "Inspect and maintain a local review cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/revsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache root, overriding the configured one
  #[arg(long)]
  cache: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Count cached reviews per staleness predicate
  Status,
  /// Complete reviews with the most sketches
  Candidates {
    #[arg(long, default_value_t = 10)]
    top: usize,
  },
  /// List cached reviews, optionally only those matching a predicate
  List {
    #[arg(long)]
    filter: Option<ReviewFilter>,
  },
  /// Print the notes exported for a review
  Notes { review_id: String },
  /// Unpack a review's sketch archive next to its metadata
  Sketches { review_id: String },
  /// Delete a review and its items from the cache
  Purge { review_id: String },
  /// Empty the download directory
  CleanDownloads,
}

fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let config = match args.cache {
    Some(cache_location) => Config {
      cache_location,
      ..config
    },
    None => config,
  };

  let _guard = logging::init(&config.cache_location.join("logs"))
    .map_err(|e| eyre!("Failed to initialise logging: {}", e))?;

  let cache = EntityCache::new(&config.cache_location);
  match args.command {
    Command::Status => {
      let analytics = cache.analytics();
      let reviews = analytics.reviews()?;
      print!("{}", analytics.report(&reviews));
    }
    Command::Candidates { top } => {
      let analytics = cache.analytics();
      let reviews = analytics.reviews()?;
      for review in analytics.candidate_reviews(&reviews, top) {
        println!(
          "{:>8}  {:>5} sketches  {:>5} media  {:>9}  {}",
          review.id(),
          review.num_sketches().unwrap_or(0),
          review.media_count(),
          review.total_size().humanized(),
          review.name()
        );
      }
    }
    Command::List { filter } => {
      let analytics = cache.analytics();
      let reviews = analytics.reviews()?;
      let selected = match filter {
        Some(filter) => analytics.filter_reviews(&reviews, filter),
        None => reviews.iter().collect(),
      };
      for review in selected {
        println!(
          "{:>8}  {:>5} items  {:>5} notes  {}",
          review.id(),
          review.review_items().len(),
          review.total_notes(),
          review.name()
        );
      }
    }
    Command::Notes { review_id } => {
      let review = open_cached(&cache, &review_id)?;
      for note in review.notes()? {
        let fields: Vec<String> = note.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("{}", fields.join("  "));
      }
    }
    Command::Sketches { review_id } => {
      let review = open_cached(&cache, &review_id)?;
      let sketches = review.extract_sketches()?;
      println!(
        "Extracted {} sketches to {}",
        sketches.len(),
        review.cache_dir().join(SKETCH_DIR).display()
      );
    }
    Command::Purge { review_id } => {
      if cache.purge_review(&review_id)? {
        println!("Purged review {}", review_id);
      } else {
        println!("Review {} is not cached", review_id);
      }
    }
    Command::CleanDownloads => {
      remove_dir_contents(&config.download_location).map_err(|e| {
        eyre!(
          "Failed to clean {}: {}",
          config.download_location.display(),
          e
        )
      })?;
      println!("Emptied {}", config.download_location.display());
    }
  }

  Ok(())
}

fn open_cached(cache: &EntityCache, review_id: &str) -> Result<ReviewCache> {
  let review = cache.open_review(review_id)?;
  if !review.exists() {
    return Err(eyre!("Review {} is not cached", review_id));
  }
  Ok(review)
}
