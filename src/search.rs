//! `scholar search`: one-shot and interactive fuzzy search from the CLI.
//!
//! The interactive mode drives a [`SearchSession`] from stdin. Each line
//! is a keystroke batch: it restarts the debounce timer, and the search
//! only runs once no new line has arrived for the debounce window. Piping
//! several lines in quickly therefore searches only for the last one.
//!
//! Lines starting with `:` are commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `:open N` | select result N and record the query as recent |
//! | `:recent` | list recent queries |
//! | `:popular` | list suggested queries |
//! | `:clear` | forget recent queries |
//! | `:quit` | exit |

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;

use scholar_site_core::search::{search, SearchResult};
use scholar_site_core::session::SearchSession;

use crate::config::Config;
use crate::content::load_site;

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, result) in results.iter().enumerate() {
        let record = &result.record;
        println!(
            "{}. [{}] {} / {}",
            i + 1,
            result.relevance_score,
            record.record_type.as_str(),
            record.title
        );
        println!("    url: {}", record.url);
        for h in &result.highlights {
            println!("    match: \"{}\"", h.replace('\n', " ").trim());
        }
        println!("    id: {}", record.id);
        println!();
    }
}

/// One-shot search: prints ranked results for `query`.
pub fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let site = load_site(config)?;
    let mut opts = config.search.options();
    if let Some(limit) = limit {
        if limit == 0 {
            anyhow::bail!("--limit must be >= 1");
        }
        opts.limit = Some(limit);
    }

    let trimmed = query.trim();
    if trimmed.chars().count() < opts.min_query_chars {
        println!(
            "Query must be at least {} characters.",
            opts.min_query_chars
        );
        return Ok(());
    }

    let results = search(&site.corpus, trimmed, &opts);
    print_results(&results);
    Ok(())
}

enum Command {
    Open(usize),
    Recent,
    Popular,
    Clear,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let rest = line.strip_prefix(':')?;
    let mut parts = rest.split_whitespace();
    let cmd = match parts.next().unwrap_or("") {
        "open" => match parts.next().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if n >= 1 => Command::Open(n),
            _ => Command::Unknown(line.to_string()),
        },
        "recent" => Command::Recent,
        "popular" => Command::Popular,
        "clear" => Command::Clear,
        "quit" | "q" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(cmd)
}

/// Interactive search over stdin.
pub async fn run_interactive(config: &Config) -> Result<()> {
    let site = load_site(config)?;
    let mut session = SearchSession::new(
        config.search.options(),
        config.search.debounce(),
        config.search.max_recent,
    )
    .with_popular(config.search.popular.clone());

    println!(
        "Type to search ({} records). Commands: :open N, :recent, :popular, :clear, :quit",
        site.corpus.len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match session.deadline() {
            Some(deadline) => {
                tokio::select! {
                    line = lines.next_line() => line?,
                    _ = tokio::time::sleep_until(Instant::from_std(deadline)) => {
                        if session.poll(&site.corpus, std::time::Instant::now()) {
                            print_results(session.results());
                        }
                        continue;
                    }
                }
            }
            None => lines.next_line().await?,
        };

        let Some(line) = line else {
            // Flush a pending search before exiting on EOF.
            if let Some(deadline) = session.deadline() {
                tokio::time::sleep_until(Instant::from_std(deadline)).await;
                if session.poll(&site.corpus, std::time::Instant::now()) {
                    print_results(session.results());
                }
            }
            break;
        };

        match parse_command(line.trim()) {
            None => {
                session.input(&line, std::time::Instant::now());
                if !session.is_searching() {
                    println!("(cleared)");
                }
            }
            Some(Command::Open(_)) if session.is_searching() => {
                println!("Search still pending, try again.");
            }
            Some(Command::Open(n)) => match session.select(n - 1) {
                Some(result) => println!("open {} ({})", result.record.url, result.record.title),
                None => println!("No result {}.", n),
            },
            Some(Command::Recent) => {
                for q in session.recent_queries() {
                    println!("  {}", q);
                }
            }
            Some(Command::Popular) => {
                for q in session.popular_queries() {
                    println!("  {}", q);
                }
            }
            Some(Command::Clear) => {
                session.clear_recent();
                println!("Recent searches cleared.");
            }
            Some(Command::Quit) => break,
            Some(Command::Unknown(cmd)) => println!("Unknown command: {}", cmd),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert!(parse_command("memory").is_none());
        assert!(matches!(parse_command(":open 2"), Some(Command::Open(2))));
        assert!(matches!(parse_command(":open 0"), Some(Command::Unknown(_))));
        assert!(matches!(parse_command(":open"), Some(Command::Unknown(_))));
        assert!(matches!(parse_command(":recent"), Some(Command::Recent)));
        assert!(matches!(parse_command(":q"), Some(Command::Quit)));
        assert!(matches!(parse_command(":bogus"), Some(Command::Unknown(_))));
    }
}
