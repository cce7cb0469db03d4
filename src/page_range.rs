//! Page selection syntax used by the split endpoint.
//!
//! A selection is a comma-separated list of 1-based page numbers (`5`) and
//! inclusive ranges (`1-3`). The result keeps the order in which pages were
//! written, duplicates included. Tokens that do not parse, and pages outside
//! `1..=total`, are skipped rather than rejected: a partly valid selection
//! still yields the valid pages, and callers decide what an empty result means.

/// Parse `spec` against a document with `total` pages into zero-based indices.
pub fn parse_page_ranges(spec: &str, total: usize) -> Vec<usize> {
    let mut selected = Vec::new();

    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if let Some((start, end)) = token.split_once('-') {
            let (Ok(start), Ok(end)) = (start.trim().parse::<i64>(), end.trim().parse::<i64>())
            else {
                continue;
            };
            let last = end.min(total as i64);
            for page in start.max(1)..=last {
                push_if_in_bounds(&mut selected, page, total);
            }
        } else if let Ok(page) = token.parse::<i64>() {
            push_if_in_bounds(&mut selected, page, total);
        }
    }

    selected
}

fn push_if_in_bounds(selected: &mut Vec<usize>, page: i64, total: usize) {
    if page >= 1 && (page as u64) <= total as u64 {
        selected.push(page as usize - 1);
    }
}
