//! Operator prompt on stdin.

use std::io::{self, BufRead, Write};

use toolgate_engine::{OperatorPrompt, PermissionDecision, PermissionRequest, PromptFut};

/// Reads `y` / `a` / `n` from stdin. End of input denies.
pub struct StdinOperator;

impl OperatorPrompt for StdinOperator {
    fn decide(&self, request: PermissionRequest) -> PromptFut {
        let tool = request.call.name().to_string();
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || read_decision(&tool)).await {
                Ok(decision) => decision,
                Err(err) => {
                    tracing::warn!(%err, "Operator prompt failed; denying");
                    PermissionDecision::deny()
                }
            }
        })
    }
}

fn read_decision(tool: &str) -> PermissionDecision {
    let stdin = io::stdin();
    loop {
        print!("Allow {tool}? [y] once  [a] always  [n] deny: ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => return PermissionDecision::deny(),
            Ok(_) => {}
        }
        if let Some(decision) = PermissionDecision::from_key(line.trim()) {
            return decision;
        }
        println!("Please answer y, a or n.");
    }
}
