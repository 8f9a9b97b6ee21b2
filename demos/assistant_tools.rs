use dotenvy::dotenv;
use openai_assistant::{
    AssistantSession, Credentials, FunctionDefinition, MessageOutcome, SessionConfig, Tool,
    ToolRegistry,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::io::{stdin, stdout, Write};

#[derive(Deserialize, JsonSchema)]
struct WeatherQuery {
    /// City to report the weather for, e.g. "Paris"
    city: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let mut tools = ToolRegistry::new();
    tools.register_fn("get_weather", |query: WeatherQuery| {
        Ok(json!({ "city": query.city, "sky": "clear", "temperature_c": 21 }))
    });

    let config = SessionConfig::builder()
        .credentials(Credentials::from_env())
        .tool_log("tool_calls_log")
        .build()?;
    let session = AssistantSession::new(config, tools)?;

    session
        .create_assistant(
            "Weather helper",
            "Answer weather questions using the get_weather tool.",
            vec![Tool::function(FunctionDefinition::from_schema::<WeatherQuery>(
                "get_weather",
                "Current weather for a city",
            ))],
        )
        .await?;

    let mut thread_id: Option<String> = None;

    loop {
        print!("User: ");
        stdout().flush()?;

        let mut user_message = String::new();
        if stdin().read_line(&mut user_message)? == 0 {
            break;
        }
        let user_message = user_message.trim();

        let thread = match &thread_id {
            Some(thread) => {
                if let MessageOutcome::PendingToolCalls(run_id) =
                    session.add_message(thread, user_message, None).await?
                {
                    println!("(finishing run {run_id} before sending your message)");
                    session.run_to_completion(thread).await?;

                    if let MessageOutcome::PendingToolCalls(run_id) =
                        session.add_message(thread, user_message, None).await?
                    {
                        anyhow::bail!("run {run_id} still waits for tool outputs");
                    }
                }
                thread.clone()
            }
            None => session.create_thread(user_message, None).await?,
        };

        session.run_to_completion(&thread).await?;

        if let Some(reply) = session.latest_message(&thread).await? {
            println!("Assistant: {}", reply.text());
        }
        thread_id = Some(thread);
    }

    Ok(())
}
