//! Integration tests against a live LiteLLM-compatible endpoint.
//!
//! These tests make real API calls.
//! Run with: LITELLM_API_BASE=http://localhost:4000 cargo test --test llm_integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use codeloop::conversation::{Conversation, LlmConversation};
use codeloop::debugger::{DebugController, LoopConfig};
use codeloop::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
use codeloop::output::OutputRequirement;

fn create_test_client() -> LiteLlmClient {
    LiteLlmClient::from_env()
        .expect("LITELLM_API_BASE environment variable must be set for integration tests")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_generation() {
    let client = create_test_client();

    let request = GenerationRequest::new(
        "",
        vec![
            Message::system("You are a helpful assistant. Reply concisely."),
            Message::user("What is 2 + 2? Reply with just the number."),
        ],
    )
    .with_max_tokens(10)
    .with_temperature(0.0);

    let response = client.generate(request).await;
    assert!(response.is_ok(), "Generation failed: {:?}", response.err());

    let response = response.expect("Should have response");
    assert!(
        response.content.contains('4'),
        "Response should contain '4', got: {}",
        response.content
    );
    assert!(!response.is_truncated());
}

#[tokio::test]
#[ignore]
async fn test_live_debug_loop() {
    let client = Arc::new(create_test_client());
    let mut conversation = LlmConversation::new(
        client,
        Conversation::from_messages(vec![
            Message::system("You write Python code. Answer with one ```python code block."),
            Message::user("Write code that saves the 10th Fibonacci number to fib.txt."),
        ]),
    )
    .with_temperature(0.0);

    let config = LoopConfig::default()
        .with_requirement(OutputRequirement::text("fib.txt"))
        .with_timeout(Duration::from_secs(10));
    let mut controller = DebugController::new(config);

    let outcome = controller
        .run(&mut conversation)
        .await
        .expect("Loop should complete");
    assert!(outcome.is_success(), "Loop gave up: {:?}", outcome.result);

    let text = outcome
        .result
        .artifacts()
        .and_then(|a| a.single_output())
        .and_then(|c| c.as_text())
        .expect("Should have text output");
    assert_eq!(text.trim(), "55");
}
