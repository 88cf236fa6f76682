//! Expensive "fun" statistics: text analysis over every friendly name.
//!
//! These scale with entity count times name length and are dispatched to the
//! blocking worker pool.

use super::constants::{DEVICE_QUOTES, HOUSE_MASCOTS, NO_EMOJI, NO_REDUNDANT_NAME, POKEMON_NAMES};
use super::{metric_failure, round_to, MetricContext, MetricResult, MetricSpec};
use std::collections::HashMap;
use time::OffsetDateTime;

pub static SPECS: &[MetricSpec] = &[
    MetricSpec::expensive("most_used_emoji", most_used_emoji),
    MetricSpec::expensive("emoji_density", emoji_density),
    MetricSpec::expensive("devices_named_after_pokemon", devices_named_after_pokemon),
    MetricSpec::expensive("most_redundant_name", most_redundant_name),
    MetricSpec::expensive("names_with_numbers", names_with_numbers),
    MetricSpec::expensive("avg_entity_id_length", entity_id_lengths),
    MetricSpec::expensive("random_daily_quote", random_daily_quote),
    MetricSpec::expensive("house_mascot", house_mascot),
];

const EMOJI_RANGES: &[(u32, u32)] = &[
    (0x1F600, 0x1F64F),
    (0x1F300, 0x1F5FF),
    (0x1F680, 0x1F6FF),
    (0x1F700, 0x1F77F),
    (0x1F780, 0x1F7FF),
    (0x1F800, 0x1F8FF),
    (0x1F900, 0x1F9FF),
    (0x1FA00, 0x1FA6F),
    (0x1FA70, 0x1FAFF),
    (0x2600, 0x26FF),
    (0x2700, 0x27BF),
];

pub fn is_emoji(ch: char) -> bool {
    let cp = ch as u32;
    EMOJI_RANGES.iter().any(|&(lo, hi)| (lo..=hi).contains(&cp))
}

/// Most frequent emoji code point; ties go to the one seen first.
fn most_used_emoji(ctx: &MetricContext) -> MetricResult {
    let mut order: Vec<char> = Vec::new();
    let mut tally: HashMap<char, u64> = HashMap::new();
    for ch in ctx.registry.friendly_names().flat_map(str::chars).filter(|c| is_emoji(*c)) {
        let count = tally.entry(ch).or_insert(0);
        if *count == 0 {
            order.push(ch);
        }
        *count += 1;
    }

    let mut best: Option<(char, u64)> = None;
    for ch in order {
        let count = tally[&ch];
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((ch, count));
        }
    }

    let (emoji, count) = match best {
        Some((ch, count)) => (ch.to_string(), count),
        None => (NO_EMOJI.to_string(), 0),
    };
    Ok(vec![
        ("most_used_emoji", emoji.into()),
        ("most_used_emoji_count", count.into()),
    ])
}

/// Percentage of name code points that are emoji.
fn emoji_density(ctx: &MetricContext) -> MetricResult {
    let (mut total, mut emoji) = (0u64, 0u64);
    for ch in ctx.registry.friendly_names().flat_map(str::chars) {
        total += 1;
        if is_emoji(ch) {
            emoji += 1;
        }
    }
    let density = if total == 0 {
        0.0
    } else {
        round_to(emoji as f64 / total as f64 * 100.0, 1)
    };
    Ok(vec![("emoji_density", density.into())])
}

fn devices_named_after_pokemon(ctx: &MetricContext) -> MetricResult {
    let matches = ctx
        .registry
        .friendly_names()
        .map(str::to_lowercase)
        .filter(|name| POKEMON_NAMES.iter().any(|p| name.contains(p)))
        .count();
    Ok(vec![("devices_named_after_pokemon", matches.into())])
}

/// Most repeated normalized name, formatted `'name' (×N)`.
fn most_redundant_name(ctx: &MetricContext) -> MetricResult {
    let mut freq: HashMap<String, u64> = HashMap::new();
    for name in ctx.registry.friendly_names() {
        let clean = name.trim().to_lowercase();
        if !clean.is_empty() {
            *freq.entry(clean).or_insert(0) += 1;
        }
    }

    let best = freq.into_iter().min_by(|(a, a_count), (b, b_count)| {
        b_count
            .cmp(a_count)
            .then_with(|| a.chars().count().cmp(&b.chars().count()))
            .then_with(|| a.cmp(b))
    });
    let label = match best {
        Some((name, count)) if count > 1 => format!("'{name}' (×{count})"),
        _ => NO_REDUNDANT_NAME.to_string(),
    };
    Ok(vec![("most_redundant_name", label.into())])
}

/// Digit characters in any script, superscripts included. Vulgar fractions
/// and the Number Forms block (roman numerals) are numeric but not digits.
fn is_digit(ch: char) -> bool {
    ch.is_numeric() && !matches!(ch, '\u{00BC}'..='\u{00BE}' | '\u{2150}'..='\u{218F}')
}

fn names_with_numbers(ctx: &MetricContext) -> MetricResult {
    let with_digits = ctx
        .registry
        .friendly_names()
        .filter(|name| name.chars().any(is_digit))
        .count();
    Ok(vec![("names_with_numbers", with_digits.into())])
}

/// Average, longest and shortest entity id.
fn entity_id_lengths(ctx: &MetricContext) -> MetricResult {
    let mut ids = ctx.registry.states().map(|e| e.entity_id.as_str());
    let Some(first) = ids.next() else {
        return Ok(vec![
            ("avg_entity_id_length", 0.0.into()),
            ("longest_entity_id", "".into()),
            ("shortest_entity_id", "".into()),
        ]);
    };

    let len = |id: &str| id.chars().count();
    let (mut longest, mut shortest) = (first, first);
    let (mut total, mut n) = (len(first), 1usize);
    for id in ids {
        let l = len(id);
        if l > len(longest) {
            longest = id;
        }
        if l < len(shortest) {
            shortest = id;
        }
        total += l;
        n += 1;
    }
    Ok(vec![
        ("avg_entity_id_length", round_to(total as f64 / n as f64, 2).into()),
        ("longest_entity_id", longest.into()),
        ("shortest_entity_id", shortest.into()),
    ])
}

/// Entry of `list` for the calendar day of `now`.
pub fn daily_pick(list: &'static [&'static str], now: OffsetDateTime) -> Option<&'static str> {
    if list.is_empty() {
        return None;
    }
    list.get(usize::from(now.ordinal()) % list.len()).copied()
}

fn random_daily_quote(ctx: &MetricContext) -> MetricResult {
    let quote = daily_pick(DEVICE_QUOTES, ctx.now)
        .ok_or_else(|| metric_failure("random_daily_quote", "quote list is empty"))?;
    Ok(vec![("random_daily_quote", quote.into())])
}

fn house_mascot(ctx: &MetricContext) -> MetricResult {
    let mascot = daily_pick(HOUSE_MASCOTS, ctx.now)
        .ok_or_else(|| metric_failure("house_mascot", "mascot list is empty"))?;
    Ok(vec![("house_mascot", mascot.into())])
}
