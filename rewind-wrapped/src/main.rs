//! rewind-wrapped - Media Server Year in Review CLI
//!
//! Generate Spotify Wrapped-style summaries of your media server history.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::Parser;
use rewind_core::format::{
    day_name, format_date, format_minutes, format_timestamp_date, hour_display, month_name,
};
use rewind_core::stats::{Histogram, RankedItem};
use rewind_core::{
    Config, Database, PlaybackRecord, ServerStats, Stats, StatsOptions, StatsService, UserStats,
};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "rewind-wrapped")]
#[command(about = "Media Wrapped - Your Year in Review")]
#[command(version)]
struct Args {
    /// Year to generate wrapped for (default: current year)
    #[arg(long)]
    year: Option<i32>,

    /// Subject (user) id; omit for server-wide stats
    #[arg(long)]
    user: Option<i64>,

    /// Recalculate even if cached stats are fresh
    #[arg(long)]
    force: bool,

    /// Cache TTL in seconds (overrides config)
    #[arg(long)]
    ttl: Option<i64>,

    /// Print stats as JSON
    #[arg(long)]
    json: bool,

    /// Import playback history from a JSON Lines file before reporting
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Drop cached stats (scoped by --user and --year) and exit
    #[arg(long)]
    invalidate: bool,

    /// Database path (default: $XDG_DATA_HOME/rewind/history.db)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Disable fun mode (no emoji headers)
    #[arg(long)]
    serious: bool,
}

/// One line of an import file: a play plus optional subject and show details.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportRow {
    #[serde(flatten)]
    record: PlaybackRecord,
    #[serde(default)]
    subject_name: Option<String>,
    /// Episode count of the play's show, if known
    #[serde(default)]
    show_total_episodes: Option<u32>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration and database
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = rewind_core::logging::init(&config.logging).ok();

    let db_path = args.db.clone().unwrap_or_else(Config::database_path);
    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    db.migrate().context("failed to run database migrations")?;

    let service = StatsService::new(Arc::clone(&db), Arc::clone(&db), config.stats.clone());

    if let Some(path) = &args.import {
        let imported = import_history(&db, path)
            .with_context(|| format!("failed to import {}", path.display()))?;
        // Imported plays make every cached aggregate stale
        service
            .invalidate_cache(None, None)
            .context("failed to invalidate cached stats")?;
        eprintln!("Imported {} plays from {}", imported, path.display());
    }

    if args.invalidate {
        let removed = service
            .invalidate_cache(args.user, args.year)
            .context("failed to invalidate cached stats")?;
        println!("Removed {} cached stats entr{}", removed, if removed == 1 { "y" } else { "ies" });
        return Ok(());
    }

    let year = args.year.unwrap_or_else(|| Utc::now().year());
    let options = StatsOptions {
        force_recalculate: args.force,
        cache_ttl_secs: args.ttl,
        post_process: false,
    };
    let fun_mode = !args.serious;

    match args.user {
        Some(subject_id) => {
            let stats = service
                .get_user_stats(subject_id, year, &options)
                .context("failed to generate user stats")?;
            if args.json {
                print_json(&Stats::User(stats))?;
            } else {
                print_user_terminal(&stats, fun_mode);
            }
        }
        None => {
            let stats = service
                .get_server_stats(year, &options)
                .context("failed to generate server stats")?;
            if args.json {
                print_json(&Stats::Server(stats))?;
            } else {
                print_server_terminal(&stats, fun_mode);
            }
        }
    }

    Ok(())
}

fn import_history(db: &Database, path: &Path) -> Result<usize> {
    let file = std::fs::File::open(path).context("failed to open import file")?;
    let mut records = Vec::new();

    for (i, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.context("failed to read import file")?;
        if line.trim().is_empty() {
            continue;
        }
        let row: ImportRow = serde_json::from_str(&line)
            .with_context(|| format!("invalid play on line {}", i + 1))?;

        if let Some(name) = &row.subject_name {
            db.upsert_subject(row.record.subject_id, Some(name))?;
        }
        if let (Some(show_key), Some(total)) =
            (&row.record.grandparent_rating_key, row.show_total_episodes)
        {
            db.upsert_show_metadata(show_key, total)?;
        }
        records.push(row.record);
    }

    let count = db.insert_playbacks(&records)?;
    tracing::info!(count, path = %path.display(), "Imported playback history");
    Ok(count)
}

fn section(fun_mode: bool, emoji: &str, title: &str) {
    if fun_mode {
        println!("{} {}", emoji, title);
    } else {
        println!("{}", title);
    }
}

fn header(title: &str) {
    println!();
    println!("╭{}╮", "─".repeat(60));
    println!("│{:^60}│", title);
    println!("╰{}╯", "─".repeat(60));
    println!();
}

fn print_ranked(fun_mode: bool, emoji: &str, title: &str, items: &[RankedItem]) {
    if items.is_empty() {
        return;
    }
    section(fun_mode, emoji, title);
    for item in items.iter().take(5) {
        let rank = match item.rank {
            1 if fun_mode => "🥇".to_string(),
            2 if fun_mode => "🥈".to_string(),
            3 if fun_mode => "🥉".to_string(),
            n => format!("{}.", n),
        };
        println!(
            "   {} {:<36} {:>5} play{}",
            rank,
            item.title,
            item.count,
            if item.count == 1 { "" } else { "s" }
        );
    }
    println!();
}

fn print_patterns(fun_mode: bool, monthly: &Histogram, hourly: &Histogram, weekday: &Histogram) {
    section(fun_mode, "⏰", "TIME PATTERNS");
    if let Some(hour) = hourly.peak_bucket() {
        println!("   Peak hour:     {}", hour_display(hour));
    }
    if let Some(day) = weekday.peak_bucket() {
        println!("   Busiest day:   {}", day_name(day));
    }
    if let Some(month) = monthly.peak_bucket() {
        println!(
            "   Top month:     {} ({})",
            month_name(month),
            format_minutes(monthly.minutes[month])
        );
    }
}

fn print_user_terminal(stats: &UserStats, fun_mode: bool) {
    let title = if fun_mode {
        format!("🎉 YOUR {} WRAPPED 🎉", stats.year)
    } else {
        format!("Viewing Summary: {}", stats.year)
    };
    header(&title);

    if stats.totals.total_plays == 0 {
        println!("  No plays found for this year.");
        println!();
        return;
    }

    section(fun_mode, "📊", "THE NUMBERS");
    println!(
        "   Plays:    {:<12} Watch time: {}",
        stats.totals.total_plays,
        stats.totals.duration_display()
    );
    println!(
        "   Titles:   {:<12} Days active: {}",
        stats.totals.unique_titles, stats.totals.days_active
    );
    println!(
        "   Movies:   {:<12} Episodes: {:<8} Tracks: {}",
        stats.content_types.movie.count,
        stats.content_types.episode.count,
        stats.content_types.track.count
    );
    println!("   You watched more than {:.0}% of the server", stats.percentile);
    println!();

    print_ranked(fun_mode, "🎬", "TOP MOVIES", &stats.top_movies);
    print_ranked(fun_mode, "📺", "TOP SHOWS", &stats.top_shows);
    print_ranked(fun_mode, "🎵", "TOP ARTISTS", &stats.top_artists);
    print_ranked(fun_mode, "🏷️", "TOP GENRES", &stats.top_genres);

    if !stats.top_rewatches.is_empty() {
        section(fun_mode, "🔁", "ON REPEAT");
        for item in stats.top_rewatches.iter().take(3) {
            println!("   {}. {} ({} times)", item.rank, item.title, item.count);
        }
        println!();
    }

    print_patterns(fun_mode, &stats.monthly, &stats.hourly, &stats.weekday);
    if let Some(binge) = &stats.longest_binge {
        println!(
            "   Longest binge: {} plays, {} on {}",
            binge.plays,
            format_minutes(binge.total_minutes),
            format_timestamp_date(binge.start_time)
        );
    }
    if let Some(marathon) = &stats.marathon_day {
        println!(
            "   Marathon:      {} - {} across {} plays",
            format_date(marathon.date),
            format_minutes(marathon.total_minutes),
            marathon.plays
        );
    }
    println!();

    if let Some(streak) = &stats.watch_streak {
        section(fun_mode, "🔥", "STREAKS");
        println!(
            "   Longest:  {} day{} ({} - {})",
            streak.longest_streak,
            if streak.longest_streak == 1 { "" } else { "s" },
            format_date(streak.start_date),
            format_date(streak.end_date)
        );
        if let (Some(first), Some(last)) = (&stats.first_watch, &stats.last_watch) {
            println!(
                "   First:    {} on {}",
                first.title,
                format_timestamp_date(first.viewed_at)
            );
            println!(
                "   Last:     {} on {}",
                last.title,
                format_timestamp_date(last.viewed_at)
            );
        }
        println!();
    }

    if let Some(comparison) = &stats.year_comparison {
        section(fun_mode, "📈", "VS PREVIOUS YEAR");
        println!(
            "   {}: {}  │  {}: {}  │  Change: {}",
            comparison.previous_year,
            format_minutes(comparison.previous_minutes),
            stats.year,
            format_minutes(comparison.current_minutes),
            comparison.format_change()
        );
        println!();
    }

    if !stats.series_completion.is_empty() {
        section(fun_mode, "✅", "SERIES PROGRESS");
        for show in stats.series_completion.iter().take(5) {
            println!(
                "   {:<36} {:>3}/{:<3} {:>5.1}%",
                show.show_title, show.watched_episodes, show.total_episodes, show.percent
            );
        }
        println!();
    }
}

fn print_server_terminal(stats: &ServerStats, fun_mode: bool) {
    let title = if fun_mode {
        format!("🎉 THE SERVER'S {} WRAPPED 🎉", stats.year)
    } else {
        format!("Server Summary: {}", stats.year)
    };
    header(&title);

    if stats.totals.total_plays == 0 {
        println!("  No plays found for this year.");
        println!();
        return;
    }

    section(fun_mode, "📊", "THE NUMBERS");
    println!(
        "   Plays:    {:<12} Watch time: {}",
        stats.totals.total_plays,
        stats.totals.duration_display()
    );
    println!(
        "   Users:    {:<12} Titles: {}",
        stats.total_subjects, stats.totals.unique_titles
    );
    println!();

    if !stats.top_subjects.is_empty() {
        section(fun_mode, "🏆", "TOP WATCHERS");
        for subject in stats.top_subjects.iter().take(5) {
            println!(
                "   {}. {:<30} {}",
                subject.rank,
                subject.name,
                format_minutes(subject.total_minutes)
            );
        }
        println!();
    }

    print_ranked(fun_mode, "🎬", "TOP MOVIES", &stats.top_movies);
    print_ranked(fun_mode, "📺", "TOP SHOWS", &stats.top_shows);
    print_ranked(fun_mode, "🎵", "TOP ARTISTS", &stats.top_artists);
    print_ranked(fun_mode, "🏷️", "TOP GENRES", &stats.top_genres);

    print_patterns(fun_mode, &stats.monthly, &stats.hourly, &stats.weekday);
    if let Some(marathon) = &stats.marathon_day {
        println!(
            "   Marathon:      {} - {} across {} plays",
            format_date(marathon.date),
            format_minutes(marathon.total_minutes),
            marathon.plays
        );
    }
    println!();

    if let Some(comparison) = &stats.year_comparison {
        section(fun_mode, "📈", "VS PREVIOUS YEAR");
        println!(
            "   {}: {}  │  {}: {}  │  Change: {}",
            comparison.previous_year,
            format_minutes(comparison.previous_minutes),
            stats.year,
            format_minutes(comparison.current_minutes),
            comparison.format_change()
        );
        println!();
    }
}

fn print_json(stats: &Stats) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(stats)?);
    Ok(())
}
