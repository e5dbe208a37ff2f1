//! Confirmation prompt with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{ShipyardError, ShipyardResult};

/// Ask before a destructive action.
///
/// `--yes` approves without asking. Without a terminal the answer is
/// `default`, so scripted runs never hang on stdin.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> ShipyardResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }

    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on the terminal
    let message = message.to_string();
    let answer = tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message).initial_value(default).interact()
    })
    .await
    .map_err(|e| ShipyardError::Internal(format!("prompt task failed: {}", e)))?;

    answer.map_err(|e| ShipyardError::User(format!("Prompt failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn confirm_auto_yes() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        assert!(confirm(&ctx, "Clear caches?", false).await.unwrap());
    }

    #[tokio::test]
    async fn confirm_non_interactive_default() {
        let ctx = UiContext::non_interactive();
        assert!(confirm(&ctx, "Prune?", true).await.unwrap());
        assert!(!confirm(&ctx, "Prune?", false).await.unwrap());
    }
}
