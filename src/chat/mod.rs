pub mod charts;
pub mod client;
pub mod session;

use anyhow::Result;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::config::AppConfig;

pub use charts::{chart_for_replies, chart_from_text, render_chart};
pub use client::RasaClient;
pub use session::{ChatMessage, ChatSession, Role};

const THINKING_DELAY: Duration = Duration::from_millis(700);

pub const EXAMPLE_QUESTIONS: &str = "\
Try asking these questions:

Rainfall Analysis:
  Compare rainfall in Maharashtra and Gujarat
  Show rainfall trend in Kerala
  Predict rainfall for 2025 in Tamil Nadu
  Which district got highest rainfall in Rajasthan?

Crop Insights:
  Identify the district with highest Rice production and lowest in Gujarat
  Show top 3 Rice-producing districts in Maharashtra
  Compare Rice and Jowar production in Tamil Nadu

Correlation & Trends:
  Analyze the production trend of Jowar in Maharashtra and correlate it with rainfall

Policy Suggestions:
  Suggest a policy to promote Rice over Jowar in Rajasthan

Multi-source Analysis:
  Analyze crop yield stability with respect to rainfall variations in Gujarat

Type 'exit' to quit.";

pub fn render_bubble(message: &ChatMessage) -> String {
    format!("{}: {}", message.role.speaker(), message.content.trim_end())
}

/// Interactive terminal chat against the NLU server's REST channel.
pub async fn run_chat(config: &AppConfig) -> Result<()> {
    let client = RasaClient::new(&config.chat)?;
    let mut session = ChatSession::new();

    println!("Samarth Rainfall & Climate Assistant\n");
    for message in session.messages() {
        println!("{}\n", render_bubble(message));
    }
    println!("{}\n", EXAMPLE_QUESTIONS);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        session.push_user(line);
        println!("🧠 Samarth is thinking...");
        tokio::time::sleep(THINKING_DELAY).await;

        let replies = match client.send(line).await {
            Ok(replies) => Some(replies),
            Err(e) => {
                warn!("Chat backend error: {:#}", e);
                None
            }
        };

        let message = session.push_replies(replies.as_deref());
        println!("{}\n", render_bubble(message));

        if let Some(chart) = replies.as_deref().and_then(chart_for_replies) {
            println!("{}", render_chart(&chart));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_bubble_names_speaker() {
        let message = ChatMessage {
            role: Role::Assistant,
            content: "Average: 10.00 mm\n\n".to_string(),
        };
        assert_eq!(render_bubble(&message), "Samarth: Average: 10.00 mm");

        let message = ChatMessage {
            role: Role::User,
            content: "hi".to_string(),
        };
        assert_eq!(render_bubble(&message), "You: hi");
    }
}
