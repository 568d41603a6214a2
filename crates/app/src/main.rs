use std::collections::HashMap;
use std::fmt;
use std::io;

use services::{ReviewEngine, ReviewEngineError};
use srs_core::model::{
    Card, CardId, Content, ContentError, DeckId, Rating, RatingError, ReviewSettings,
    SchedulingState, SessionSummary, UserId,
};
use storage::repository::Storage;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidRating(RatingError),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidRating(err) => write!(f, "invalid --ratings value: {err}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number(flag: &'static str, raw: &str) -> Result<u64, ArgsError> {
    raw.trim().parse().map_err(|_| ArgsError::InvalidNumber {
        flag,
        raw: raw.to_string(),
    })
}

fn parse_u32(flag: &'static str, raw: &str) -> Result<u32, ArgsError> {
    let value = parse_number(flag, raw)?;
    u32::try_from(value).map_err(|_| ArgsError::InvalidNumber {
        flag,
        raw: raw.to_string(),
    })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- seed    [options]");
    eprintln!("  cargo run -p app -- queue   [options] [--max-cards <n>]");
    eprintln!("  cargo run -p app -- review  [options] [--ratings good,again,...] [--secs <n>]");
    eprintln!("  cargo run -p app -- history [options] [--card-id <id>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>   default sqlite:srs.sqlite3");
    eprintln!("  --user-id <id>      default 1");
    eprintln!("  --deck-id <id>      default 1");
    eprintln!("  --max-cards <n>     default 20");
    eprintln!("  --shuffle           shuffle new cards within a session");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SRS_DB_URL, SRS_USER_ID, SRS_DECK_ID, SRS_MAX_CARDS, SRS_SHUFFLE_NEW, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Seed,
    Queue,
    Review,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "queue" => Some(Self::Queue),
            "review" => Some(Self::Review),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    user_id: UserId,
    deck_id: DeckId,
    max_cards: Option<u32>,
    shuffle_new: bool,
    ratings: Vec<Rating>,
    secs_per_card: u32,
    card_id: Option<CardId>,
}

impl Args {
    fn from_env() -> Result<Self, ArgsError> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let db_url = env("SRS_DB_URL").map_or_else(
            || normalize_sqlite_url("sqlite:srs.sqlite3".into()),
            normalize_sqlite_url,
        );
        let user_id = match env("SRS_USER_ID") {
            Some(raw) => UserId::new(parse_number("SRS_USER_ID", &raw)?),
            None => UserId::new(1),
        };
        let deck_id = match env("SRS_DECK_ID") {
            Some(raw) => DeckId::new(parse_number("SRS_DECK_ID", &raw)?),
            None => DeckId::new(1),
        };
        let max_cards = env("SRS_MAX_CARDS")
            .map(|raw| parse_u32("SRS_MAX_CARDS", &raw))
            .transpose()?;
        let shuffle_new = env("SRS_SHUFFLE_NEW")
            .is_some_and(|raw| matches!(raw.trim(), "1" | "true" | "yes" | "on"));

        Ok(Self {
            db_url,
            user_id,
            deck_id,
            max_cards,
            shuffle_new,
            ratings: vec![Rating::Good],
            secs_per_card: 8,
            card_id: None,
        })
    }

    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self::from_env()?;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--user-id" => {
                    let value = require_value(args, "--user-id")?;
                    parsed.user_id = UserId::new(parse_number("--user-id", &value)?);
                }
                "--deck-id" => {
                    let value = require_value(args, "--deck-id")?;
                    parsed.deck_id = DeckId::new(parse_number("--deck-id", &value)?);
                }
                "--max-cards" => {
                    let value = require_value(args, "--max-cards")?;
                    parsed.max_cards = Some(parse_u32("--max-cards", &value)?);
                }
                "--shuffle" => parsed.shuffle_new = true,
                "--card-id" => {
                    let value = require_value(args, "--card-id")?;
                    parsed.card_id = Some(CardId::new(parse_number("--card-id", &value)?));
                }
                "--secs" => {
                    let value = require_value(args, "--secs")?;
                    parsed.secs_per_card = parse_u32("--secs", &value)?;
                }
                "--ratings" => {
                    let value = require_value(args, "--ratings")?;
                    let ratings = value
                        .split(',')
                        .filter(|s| !s.trim().is_empty())
                        .map(|s| s.trim().parse::<Rating>())
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(ArgsError::InvalidRating)?;
                    if !ratings.is_empty() {
                        parsed.ratings = ratings;
                    }
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn settings(&self) -> Result<ReviewSettings, ReviewEngineError> {
        let defaults = ReviewSettings::default();
        Ok(match self.max_cards {
            Some(max) => defaults.with_max_cards(max)?,
            None => defaults,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    let trimmed = raw.trim().to_string();
    // every pooled connection must see the same in-memory database
    if trimmed == "sqlite::memory:" {
        return "sqlite:file:srs_app?mode=memory&cache=shared".into();
    }
    if trimmed.starts_with("sqlite://") || trimmed.starts_with("sqlite:file:") {
        return trimmed;
    }

    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        // in-memory or URI form; nothing on disk to prepare
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

/// Starter deck: Spanish vocabulary with one card of each content kind.
fn demo_cards(deck_id: DeckId) -> Result<Vec<Card>, ContentError> {
    let base = deck_id.value().saturating_mul(1_000);
    let entries = [
        (Content::text("el perro")?, Content::text("the dog")?),
        (Content::text("la casa")?, Content::text("the house")?),
        (
            Content::cloze("Yo ___ estudiante.", "soy")?,
            Content::text("I am a student.")?,
        ),
        (
            Content::image("https://cdn.example.com/img/gato.png", Some("a cat".into()))?,
            Content::text("el gato")?,
        ),
        (
            Content::audio("https://cdn.example.com/audio/gracias.mp3", Some("gracias".into()))?,
            Content::text("thank you")?,
        ),
        (Content::text("el libro")?, Content::text("the book")?),
    ];

    Ok(entries
        .into_iter()
        .zip(0_u32..)
        .map(|((front, back), position)| {
            Card::new(
                CardId::new(base + u64::from(position) + 1),
                deck_id,
                front,
                back,
                position,
            )
        })
        .collect())
}

async fn seed(storage: &Storage, deck_id: DeckId) -> Result<(), Box<dyn std::error::Error>> {
    let cards = demo_cards(deck_id)?;
    for card in &cards {
        storage.cards.upsert_card(card).await?;
    }
    info!(deck_id = %deck_id, cards = cards.len(), "deck seeded");
    println!("seeded {} cards into deck {deck_id}", cards.len());
    Ok(())
}

async fn print_queue(
    engine: &ReviewEngine,
    labels: &HashMap<CardId, String>,
    deck_id: DeckId,
    max_cards: Option<u32>,
) -> Result<(), ReviewEngineError> {
    let queue = engine.queue(deck_id, max_cards).await?;
    if queue.is_empty() {
        println!("nothing due in deck {deck_id}");
        return Ok(());
    }
    for (i, queued) in queue.iter().enumerate() {
        println!(
            "{:>3}. {:<28} {}",
            i + 1,
            label(labels, queued.card_id),
            describe(&queued.state)
        );
    }
    Ok(())
}

async fn review(
    engine: &ReviewEngine,
    labels: &HashMap<CardId, String>,
    args: &Args,
) -> Result<(), ReviewEngineError> {
    let session = engine.start(args.deck_id, None).await?;
    println!(
        "session {} started with {} cards",
        session.id(),
        session.cards().len()
    );

    let mut script = args.ratings.iter().copied().cycle();
    while let Some(current) = engine
        .current_session()
        .await?
        .and_then(|s| s.current_card().cloned())
    {
        let Some(rating) = script.next() else { break };
        let hints = engine.preview(current.card_id).await?;
        println!(
            "{:<28} again {}d | hard {}d | good {}d | easy {}d",
            label(labels, current.card_id),
            hints.again.interval_days,
            hints.hard.interval_days,
            hints.good.interval_days,
            hints.easy.interval_days,
        );

        let outcome = engine
            .submit_rating(session.id(), current.card_id, rating, args.secs_per_card)
            .await?;
        println!(
            "  {} -> {} ({} left)",
            rating.as_str(),
            describe(&outcome.state),
            outcome.remaining
        );
    }

    let summary = engine.end(session.id()).await?;
    print_summary(&summary);
    Ok(())
}

async fn history(
    engine: &ReviewEngine,
    labels: &HashMap<CardId, String>,
    args: &Args,
) -> Result<(), ReviewEngineError> {
    if let Some(card_id) = args.card_id {
        match engine.history(card_id).await? {
            Some(state) => println!(
                "{}: {} (lapses {}, last reviewed {})",
                label(labels, card_id),
                describe(&state),
                state.lapses,
                state
                    .last_reviewed_at
                    .map_or_else(|| "never".to_string(), |t| t.to_rfc3339()),
            ),
            None => println!("{}: never reviewed", label(labels, card_id)),
        }
        return Ok(());
    }

    let progress = engine.progress(args.deck_id).await?;
    println!(
        "deck {}: new {} | learning {} | review {} | mastered {} | due {}",
        args.deck_id,
        progress.cards_new,
        progress.cards_learning,
        progress.cards_review,
        progress.cards_mastered,
        progress.due_today
    );
    println!(
        "streak {} (best {}), {} sessions, accuracy {:.0}%",
        progress.streak,
        progress.longest_streak,
        progress.sessions_completed,
        progress.accuracy() * 100.0
    );
    for summary in engine.recent_summaries(args.deck_id, 10).await? {
        println!(
            "  {}  {} cards, {:.0}% correct, {}s",
            summary.ended_at().to_rfc3339(),
            summary.cards_reviewed(),
            summary.accuracy() * 100.0,
            summary.active_secs()
        );
    }
    Ok(())
}

fn print_summary(summary: &SessionSummary) {
    let b = summary.breakdown();
    let t = summary.transitions();
    println!(
        "reviewed {} ({} unique) in {}s, accuracy {:.0}%, {:.1}s per card",
        summary.cards_reviewed(),
        summary.unique_cards(),
        summary.active_secs(),
        summary.accuracy() * 100.0,
        summary.average_time_per_card_secs()
    );
    println!(
        "again {} | hard {} | good {} | easy {}",
        b.again, b.hard, b.good, b.easy
    );
    println!(
        "new->learning {} | new->review {} | learning->review {} | review->mastered {} | lapses {}",
        t.new_to_learning(),
        t.new_to_review(),
        t.learning_to_review(),
        t.review_to_mastered(),
        t.to_relearning()
    );
    println!("streak {}", summary.progress_after().streak);
}

fn describe(state: &SchedulingState) -> String {
    format!(
        "{} ease {:.2} interval {}d reps {} due {}",
        state.card_state.as_str(),
        state.ease_factor,
        state.interval_days,
        state.repetitions,
        state.due_at.format("%Y-%m-%d")
    )
}

fn label(labels: &HashMap<CardId, String>, card_id: CardId) -> String {
    labels
        .get(&card_id)
        .cloned()
        .unwrap_or_else(|| format!("card {card_id}"))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            print_usage();
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown subcommand: {first}"),
            )
        })?,
    };

    let mut iter = argv.into_iter().skip(1);
    let args = Args::parse(&mut iter).inspect_err(|_| print_usage())?;

    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url, args.user_id).await?;

    if cmd == Command::Seed {
        return seed(&storage, args.deck_id).await;
    }

    let engine = ReviewEngine::new(args.user_id, storage.clone(), args.settings()?)?
        .with_shuffle_new(args.shuffle_new);
    let labels: HashMap<CardId, String> = storage
        .cards
        .cards_for_deck(args.deck_id)
        .await?
        .into_iter()
        .map(|card| (card.id(), card.front().label().to_string()))
        .collect();

    match cmd {
        Command::Queue => print_queue(&engine, &labels, args.deck_id, args.max_cards).await?,
        Command::Review => review(&engine, &labels, &args).await?,
        Command::History => history(&engine, &labels, &args).await?,
        Command::Seed => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "srs failed");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(&mut iter)
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&[
            "--db",
            "sqlite::memory:",
            "--user-id",
            "7",
            "--deck-id",
            "3",
            "--max-cards",
            "5",
            "--ratings",
            "good, a ,easy",
            "--shuffle",
        ])
        .unwrap();
        assert_eq!(args.db_url, "sqlite:file:srs_app?mode=memory&cache=shared");
        assert_eq!(args.user_id, UserId::new(7));
        assert_eq!(args.deck_id, DeckId::new(3));
        assert_eq!(args.max_cards, Some(5));
        assert_eq!(args.ratings, vec![Rating::Good, Rating::Again, Rating::Easy]);
        assert!(args.shuffle_new);
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(matches!(
            parse(&["--deck-id", "x"]),
            Err(ArgsError::InvalidNumber { flag: "--deck-id", .. })
        ));
        assert!(matches!(
            parse(&["--ratings", "meh"]),
            Err(ArgsError::InvalidRating(_))
        ));
        assert!(matches!(
            parse(&["--max-cards"]),
            Err(ArgsError::MissingValue { flag: "--max-cards" })
        ));
        assert!(matches!(parse(&["--wat"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn zero_max_cards_is_rejected_by_settings() {
        let args = parse(&["--max-cards", "0"]).unwrap();
        assert!(args.settings().is_err());
    }

    #[test]
    fn demo_deck_has_unique_ids_in_order() {
        let cards = demo_cards(DeckId::new(2)).unwrap();
        assert_eq!(cards.len(), 6);
        assert_eq!(cards[0].id(), CardId::new(2_001));
        assert!(cards.iter().zip(0_u32..).all(|(c, i)| c.position() == i));
        assert!(cards.iter().any(|c| c.front().has_media()));
    }

    #[test]
    fn sqlite_urls_are_normalized() {
        assert!(normalize_sqlite_url("sqlite:data/srs.db".into()).starts_with("sqlite:///"));
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/x.db".into()),
            "sqlite:///tmp/x.db"
        );
    }
}
