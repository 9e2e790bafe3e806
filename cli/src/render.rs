//! Plain-text transcript rendering.

use toolgate_engine::{TranscriptEvent, TranscriptSink};

/// Prints each transcript event as a marked line on stdout.
pub struct StdoutSink;

impl TranscriptSink for StdoutSink {
    fn emit(&mut self, event: &TranscriptEvent) {
        println!("{} {event}", marker(event));
    }

    fn output(&mut self, chunk: &str) {
        for line in chunk.lines() {
            println!("  │ {line}");
        }
    }
}

fn marker(event: &TranscriptEvent) -> &'static str {
    match event {
        TranscriptEvent::RoundStarted { .. } => "…",
        TranscriptEvent::PermissionRequested { .. } => "?",
        TranscriptEvent::PermissionGranted { .. }
        | TranscriptEvent::RoundCompleted { .. } => "✓",
        TranscriptEvent::PermissionDenied { .. } => "✗",
        TranscriptEvent::TurnConcluded { summary } if !summary.max_reached => "✓",
        TranscriptEvent::TurnConcluded { .. }
        | TranscriptEvent::CeilingReached { .. }
        | TranscriptEvent::Cancelled => "⚠",
        TranscriptEvent::Errored { .. } => "❌",
    }
}
