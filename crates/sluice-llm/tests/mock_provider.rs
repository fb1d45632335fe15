use futures::StreamExt;
use sluice_core::ContentKind;
use sluice_llm::providers::mock::ANSWER;
use sluice_llm::{MockProvider, MockSettings, StreamProvider};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn emits_reasoning_then_answer() {
    let provider = MockProvider::new(MockSettings::instant());
    let stream = provider.stream(CancellationToken::new(), "rust").await.unwrap();
    let fragments: Vec<_> = stream.map(|f| f.unwrap()).collect().await;

    let reasoning: String = fragments
        .iter()
        .filter(|f| f.kind == ContentKind::Reasoning)
        .map(|f| f.content.as_str())
        .collect();
    let text: String = fragments
        .iter()
        .filter(|f| f.kind == ContentKind::Text)
        .map(|f| f.content.as_str())
        .collect();

    assert_eq!(reasoning, "Hmm... let me think about rust...");
    assert_eq!(text, ANSWER);

    // All reasoning precedes all text
    let first_text = fragments.iter().position(|f| f.kind == ContentKind::Text).unwrap();
    assert!(fragments[first_text..].iter().all(|f| f.kind == ContentKind::Text));
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_stream() {
    let provider = MockProvider::new(MockSettings::default());
    let scope = CancellationToken::new();
    let mut stream = provider.stream(scope.clone(), "slow").await.unwrap();

    // Start delay plus a few fragments
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.kind, ContentKind::Reasoning);
    assert_eq!(first.content, "H");

    scope.cancel();
    let rest = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("stream must end promptly after cancellation");
    assert!(rest.is_none());
}

#[tokio::test]
async fn cancelled_before_start_yields_nothing() {
    let provider = MockProvider::new(MockSettings::instant());
    let scope = CancellationToken::new();
    scope.cancel();
    let stream = provider.stream(scope, "never").await.unwrap();
    assert_eq!(stream.count().await, 0);
}
