use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;

use switchboard::models::message::Message;
use switchboard::router::{execute, Request, Router};

#[derive(Debug, Deserialize, JsonSchema)]
struct Answer {
    summary: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Expects a config.yaml (or LLM_CONFIG_PATH) with an llm.models section.
    let router = Router::from_default_config()?;

    let answer: Answer = execute(
        &router,
        Request {
            model: "gpt4o".to_string(),
            messages: vec![Message::user("Return JSON {\"summary\":\"Hello\"}")],
            ..Default::default()
        },
    )
    .await?;

    println!("{}", answer.summary);
    Ok(())
}
