//! Session statistics and health overview.
//!
//! Quick summary of what shell-sage has accumulated: interaction counts,
//! embedding coverage, and documentation cache usage. Used by `sage stats`
//! to give confidence that recording and embedding are working.

use anyhow::Result;

use crate::config::Config;
use crate::db;

/// Run the stats command: query the database and cache and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_interactions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions")
        .fetch_one(&pool)
        .await?;

    let total_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interaction_vectors")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    let (cache_files, cache_size) = docs_cache_usage(&config.docs.cache_dir);

    println!("shell-sage — Session Stats");
    println!("==========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Interactions:  {}", total_interactions);
    println!(
        "  Embedded:      {} / {} ({}%)",
        total_embedded,
        total_interactions,
        if total_interactions > 0 {
            (total_embedded * 100) / total_interactions
        } else {
            0
        }
    );
    println!();
    println!("  Docs cache:    {}", config.docs.cache_dir.display());
    println!(
        "  Cached docs:   {} file(s), {} (ceiling {} MB)",
        cache_files,
        format_bytes(cache_size),
        config.docs.max_cache_mb
    );

    pool.close().await;
    Ok(())
}

fn docs_cache_usage(dir: &std::path::Path) -> (usize, u64) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return (0, 0);
    };

    let mut count = 0usize;
    let mut size = 0u64;
    for entry in entries.flatten() {
        if entry.path().extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            count += 1;
            size += meta.len();
        }
    }
    (count, size)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_docs_cache_usage_missing_dir() {
        assert_eq!(docs_cache_usage(std::path::Path::new("/nonexistent/x")), (0, 0));
    }
}
