use sentinel_core::{BoundedLog, SamplerState, TimeSeriesPoint};

const ALLOWED_MARK: char = '+';
const BLOCKED_MARK: char = 'x';
const BOTH_MARK: char = '#';

pub fn status_line(state: &SamplerState) -> String {
    let status = if state.connected {
        "System Online"
    } else {
        "System Offline"
    };
    match state.latest {
        Some(m) => format!(
            "[{}] allowed={} blocked={} redis_errors={}",
            status, m.allowed_requests, m.blocked_requests, m.redis_errors
        ),
        None => format!("[{}] waiting for first sample", status),
    }
}

/// Plot allowed/blocked series, one column per point, oldest on the left.
/// Rows scale linearly from zero to the window's maximum.
pub fn render(history: &BoundedLog<TimeSeriesPoint>, rows: usize) -> String {
    let rows = rows.max(1);
    if history.is_empty() {
        return String::new();
    }

    let max = history
        .iter()
        .map(|p| p.allowed.max(p.blocked))
        .max()
        .unwrap_or(0)
        .max(1);
    let level = |value: u64| -> usize { ((value as u128 * rows as u128) / max as u128) as usize };

    let mut out = String::new();
    for row in (1..=rows).rev() {
        for point in history.iter() {
            let allowed = level(point.allowed) >= row;
            let blocked = level(point.blocked) >= row;
            out.push(match (allowed, blocked) {
                (true, true) => BOTH_MARK,
                (true, false) => ALLOWED_MARK,
                (false, true) => BLOCKED_MARK,
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }
    out.push_str(&"-".repeat(history.len()));

    if let (Some(first), Some(last)) = (history.oldest(), history.newest()) {
        out.push_str(&format!("\n{} .. {} (max {})", first.timestamp, last.timestamp, max));
    }
    out
}
