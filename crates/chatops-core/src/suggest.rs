//! "Did you mean" suggestions for text that matched no trigger.

use crate::handler::Handler;
use crate::trigger::clean_text;
use std::sync::Arc;

/// Levenshtein distance, giving up once every value in a row exceeds `bound`.
///
/// Returns `None` when the distance is known to exceed the bound.
pub fn bounded_distance(a: &str, b: &str, bound: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > bound {
        return None;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        if curr.iter().all(|&d| d > bound) {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let distance = prev[b.len()];
    (distance <= bound).then_some(distance)
}

fn shares_affix(text: &str, trigger: &str) -> bool {
    text.starts_with(trigger)
        || text.ends_with(trigger)
        || trigger.starts_with(text)
        || trigger.ends_with(text)
}

/// Closest trigger text to `text` across `handlers`, or `default`.
pub fn find_suggestion(text: &str, handlers: &[Arc<dyn Handler>], default: &str) -> String {
    let text = clean_text(text);
    if text.is_empty() {
        return default.to_string();
    }

    let mut best: Option<usize> = None;
    let mut candidates: Vec<(&str, String)> = Vec::new();
    for handler in handlers {
        for trigger in &handler.handles_what().triggers {
            let trigger_text = clean_text(trigger.text());
            let bound = text.chars().count().min(trigger_text.chars().count());
            let Some(distance) = bounded_distance(&text, &trigger_text, bound) else {
                continue;
            };
            match best {
                Some(b) if distance > b => continue,
                Some(b) if distance < b => candidates.clear(),
                _ => {}
            }
            best = Some(distance);
            candidates.push((trigger.text(), trigger_text));
        }
    }

    if candidates.len() > 1 {
        candidates.sort_by_key(|(_, normalized)| !shares_affix(&text, normalized));
    }
    candidates
        .first()
        .map(|(original, _)| original.to_string())
        .unwrap_or_else(|| default.to_string())
}
