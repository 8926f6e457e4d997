//! Run ID generation with date-based sequencing.
//!
//! Run ids have the format `YYYY-MM-DD-SSS-XXX` where SSS is a base36
//! sequence scoped to the date and XXX is a random base36 suffix. Partial
//! prefixes resolve to a unique run for `status`, `logs`, and `cancel`.

use anyhow::{anyhow, Result};
use chrono::Local;
use rand::Rng;
use std::path::Path;

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a new run ID by scanning the runs directory for today's
/// highest sequence number.
pub fn generate_run_id(runs_dir: &Path) -> Result<String> {
    let date = Local::now().format("%Y-%m-%d").to_string();
    let seq = next_sequence_for_date(runs_dir, &date)?;
    let rand = random_base36(3);

    Ok(format!("{}-{}-{}", date, format_base36(seq, 3), rand))
}

fn next_sequence_for_date(runs_dir: &Path, date: &str) -> Result<u32> {
    let mut max_seq = 0u32;

    if runs_dir.exists() {
        for entry in std::fs::read_dir(runs_dir)? {
            let entry = entry?;
            let filename = entry.file_name();
            let name = filename.to_string_lossy();

            // Match pattern: YYYY-MM-DD-SSS-XXX.yml
            if name.starts_with(date) && name.ends_with(".yml") {
                let parts: Vec<&str> = name.trim_end_matches(".yml").split('-').collect();
                if parts.len() >= 5 {
                    // parts: [YYYY, MM, DD, SSS, XXX]
                    if let Some(seq) = parse_base36(parts[3]) {
                        max_seq = max_seq.max(seq);
                    }
                }
            }
        }
    }

    Ok(max_seq + 1)
}

/// Format a number as base36 with zero-padding.
pub fn format_base36(n: u32, width: usize) -> String {
    if n == 0 {
        return "0".repeat(width);
    }

    let mut result = Vec::new();
    let mut num = n;

    while num > 0 {
        let digit = (num % 36) as usize;
        result.push(BASE36_CHARS[digit] as char);
        num /= 36;
    }

    result.reverse();
    let s: String = result.into_iter().collect();

    if s.len() < width {
        format!("{:0>width$}", s, width = width)
    } else {
        s
    }
}

fn parse_base36(s: &str) -> Option<u32> {
    let mut result = 0u32;

    for c in s.chars() {
        result *= 36;
        if let Some(pos) = BASE36_CHARS.iter().position(|&b| b as char == c) {
            result += pos as u32;
        } else {
            return None;
        }
    }

    Some(result)
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36_CHARS[rng.gen_range(0..36)] as char)
        .collect()
}

/// Resolve a possibly-partial run ID against the recorded run ids.
///
/// Accepts the full id, a prefix, or any unique substring. Fails when
/// nothing matches or the fragment is ambiguous.
pub fn resolve_run_id(fragment: &str, known_ids: &[String]) -> Result<String> {
    if fragment.is_empty() {
        return Err(anyhow!("Run ID cannot be empty"));
    }

    if known_ids.iter().any(|id| id == fragment) {
        return Ok(fragment.to_string());
    }

    let prefix_matches: Vec<&String> = known_ids
        .iter()
        .filter(|id| id.starts_with(fragment))
        .collect();
    match prefix_matches.len() {
        1 => return Ok(prefix_matches[0].clone()),
        n if n > 1 => {
            return Err(anyhow!(
                "Run ID '{}' is ambiguous ({} matches)",
                fragment,
                n
            ))
        }
        _ => {}
    }

    let substring_matches: Vec<&String> = known_ids
        .iter()
        .filter(|id| id.contains(fragment))
        .collect();
    match substring_matches.len() {
        1 => Ok(substring_matches[0].clone()),
        0 => Err(anyhow!("No run found matching '{}'", fragment)),
        n => Err(anyhow!(
            "Run ID '{}' is ambiguous ({} matches)",
            fragment,
            n
        )),
    }
}
