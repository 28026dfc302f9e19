use crate::replay::ReplaySummary;
use anyhow::Result;

pub fn render_text(summary: &ReplaySummary) -> String {
    let state = if summary.quiescent {
        "quiescent"
    } else if summary.timed_out {
        "timed out"
    } else if summary.stalled {
        "stalled"
    } else {
        "not quiescent"
    };
    let mut out = format!(
        "events: {}  applied: {}  rejected: {}\nstate: {}\n",
        summary.events, summary.applied, summary.rejected, state
    );

    if !summary.remaining.is_empty() {
        out.push_str("still open:\n");
        for row in &summary.remaining {
            out.push_str(&format!(
                "  {}  (opened {})\n",
                row.handle,
                row.opened_at.format("%H:%M:%S%.3f")
            ));
        }
    }
    if summary.force_closed > 0 {
        out.push_str(&format!("force-closed: {}\n", summary.force_closed));
    }
    out
}

pub fn render_json(summary: &ReplaySummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}
