//! Turn Controller Tests
//!
//! End-to-end behaviour of the conversation engine against a scripted
//! transport. Time is paused, so delays run instantly and deterministically.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use docchat_core::network::fallback_records;
use docchat_core::network::FALLBACK_ANSWERS;
use docchat_core::{
    AuxiliaryData, ChatConfig, ChatUpdate, FileHandle, MessageRole, QueryRequest, QueryResponse,
    SubmitError, Transport, TransportError, TurnController, TurnPhase, UploadPhase,
    QUERY_ERROR_MESSAGE,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

// ============================================================================
// Scripted service
// ============================================================================

/// Transport that replays scripted results and records every call
#[derive(Default)]
struct ScriptedService {
    query_replies: Mutex<VecDeque<Result<QueryResponse, TransportError>>>,
    upload_replies: Mutex<VecDeque<Result<(), TransportError>>>,
    query_delay: Duration,
    upload_delay: Duration,
    queries: Mutex<Vec<String>>,
    uploads: Mutex<Vec<FileHandle>>,
}

impl ScriptedService {
    fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    fn reply(self, reply: Result<QueryResponse, TransportError>) -> Self {
        self.query_replies.lock().unwrap().push_back(reply);
        self
    }

    fn upload_reply(self, reply: Result<(), TransportError>) -> Self {
        self.upload_replies.lock().unwrap().push_back(reply);
        self
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    fn uploads(&self) -> Vec<FileHandle> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedService {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, TransportError> {
        self.queries.lock().unwrap().push(request.query.clone());
        let reply = self.query_replies.lock().unwrap().pop_front();
        tokio::time::sleep(self.query_delay).await;
        reply.unwrap_or_else(|| {
            Ok(QueryResponse {
                answer: format!("Answer to: {}", request.query),
                data: None,
            })
        })
    }

    async fn upload(&self, file: &FileHandle) -> Result<(), TransportError> {
        self.uploads.lock().unwrap().push(file.clone());
        let reply = self.upload_replies.lock().unwrap().pop_front();
        tokio::time::sleep(self.upload_delay).await;
        reply.unwrap_or(Ok(()))
    }
}

fn answer(text: &str, data: Option<serde_json::Value>) -> Result<QueryResponse, TransportError> {
    Ok(QueryResponse {
        answer: text.to_string(),
        data: data.map(|v| serde_json::from_value(v).unwrap()),
    })
}

fn unreachable(path: &str) -> TransportError {
    TransportError::Unreachable {
        endpoint: format!("http://localhost:8000{path}"),
        reason: "connection refused".to_string(),
    }
}

fn server_error(path: &str) -> TransportError {
    TransportError::Status {
        endpoint: format!("http://localhost:8000{path}"),
        status: 500,
        body: "internal error".to_string(),
    }
}

fn setup(
    service: ScriptedService,
    config: ChatConfig,
) -> (
    TurnController<ScriptedService>,
    mpsc::UnboundedReceiver<ChatUpdate>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TurnController::new(service, config, tx), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ChatUpdate>) -> Vec<ChatUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

fn phases(updates: &[ChatUpdate]) -> Vec<TurnPhase> {
    updates
        .iter()
        .filter_map(|u| match u {
            ChatUpdate::Phase { phase } => Some(*phase),
            _ => None,
        })
        .collect()
}

fn reveals(updates: &[ChatUpdate]) -> Vec<String> {
    updates
        .iter()
        .filter_map(|u| match u {
            ChatUpdate::Reveal { revealed, .. } => Some(revealed.clone()),
            _ => None,
        })
        .collect()
}

fn upload_percents(updates: &[ChatUpdate]) -> Vec<u8> {
    updates
        .iter()
        .filter_map(|u| match u {
            ChatUpdate::UploadProgress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

async fn run_until_idle(controller: &mut TurnController<ScriptedService>) {
    while controller.step().await {}
}

// ============================================================================
// Turns
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_question_is_answered_and_revealed() {
    let service = ScriptedService::default().reply(answer(
        "Budget, timeline.",
        Some(serde_json::json!([{ "topic": "Budget" }, { "topic": "Timeline" }])),
    ));
    let (mut controller, mut rx) = setup(service, ChatConfig::default());

    let question_id = controller.submit("What are the main topics?").unwrap();
    assert_eq!(controller.phase(), TurnPhase::AwaitingResponse);
    assert!(controller.has_started());

    run_until_idle(&mut controller).await;

    assert_eq!(controller.phase(), TurnPhase::Idle);
    assert_eq!(
        controller.client().transport().queries(),
        vec!["What are the main topics?".to_string()]
    );

    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, question_id);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].content, "What are the main topics?");
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].content, "Budget, timeline.");
    assert_eq!(
        messages[1]
            .auxiliary_data
            .as_ref()
            .map(AuxiliaryData::len),
        Some(2)
    );
    assert!(controller.active_stream().is_none());

    let updates = drain(&mut rx);
    assert_eq!(
        phases(&updates),
        vec![
            TurnPhase::AwaitingResponse,
            TurnPhase::Streaming,
            TurnPhase::Idle
        ]
    );

    // Every prefix from empty to full, in order
    let text = "Budget, timeline.";
    let expected: Vec<String> = (0..=text.len()).map(|n| text[..n].to_string()).collect();
    assert_eq!(reveals(&updates), expected);

    assert!(matches!(
        updates.last(),
        Some(ChatUpdate::Phase {
            phase: TurnPhase::Idle
        })
    ));
    assert!(updates
        .iter()
        .any(|u| matches!(u, ChatUpdate::StreamEnd { message_id } if *message_id == messages[1].id)));
}

#[tokio::test(start_paused = true)]
async fn test_question_sent_untrimmed() {
    let (mut controller, _rx) = setup(ScriptedService::default(), ChatConfig::default());

    controller.submit("  spaced out  ").unwrap();
    run_until_idle(&mut controller).await;

    assert_eq!(controller.messages()[0].content, "  spaced out  ");
    assert_eq!(
        controller.client().transport().queries(),
        vec!["  spaced out  ".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reveal_pace_follows_config() {
    let mut config = ChatConfig::default();
    config.reveal_interval = Duration::from_millis(100);
    let service = ScriptedService::default().reply(answer("abcd", None));
    let (mut controller, _rx) = setup(service, config);

    let start = tokio::time::Instant::now();
    controller.submit("q").unwrap();
    run_until_idle(&mut controller).await;

    // First frame is immediate, then one per interval for each character
    assert_eq!(start.elapsed(), Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn test_submission_rejected_while_busy() {
    let service = ScriptedService::default().with_query_delay(Duration::from_secs(2));
    let (mut controller, mut rx) = setup(service, ChatConfig::default());

    controller.submit("first").unwrap();
    drain(&mut rx);

    assert_eq!(
        controller.submit("second"),
        Err(SubmitError::Busy {
            phase: TurnPhase::AwaitingResponse
        })
    );
    assert!(drain(&mut rx).is_empty());

    // Answer arrives; still busy while streaming
    assert!(controller.step().await);
    assert_eq!(controller.phase(), TurnPhase::Streaming);
    assert_eq!(
        controller.submit("third"),
        Err(SubmitError::Busy {
            phase: TurnPhase::Streaming
        })
    );

    run_until_idle(&mut controller).await;
    assert_eq!(controller.messages().len(), 2);
    assert_eq!(
        controller.client().transport().queries(),
        vec!["first".to_string()]
    );

    // Accepted again once idle
    controller.submit("fourth").unwrap();
    run_until_idle(&mut controller).await;
    assert_eq!(controller.messages().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_empty_submission_makes_no_call() {
    let (mut controller, mut rx) = setup(ScriptedService::default(), ChatConfig::default());

    assert_eq!(controller.submit(""), Err(SubmitError::EmptySubmission));
    assert_eq!(controller.submit(" \t "), Err(SubmitError::EmptySubmission));

    assert!(!controller.has_started());
    assert!(!controller.step().await);
    assert!(controller.client().transport().queries().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_message_ids_unique_across_many_turns() {
    let (mut controller, _rx) = setup(ScriptedService::default(), ChatConfig::default());

    for turn in 0..20 {
        controller.submit(&format!("q{turn}")).unwrap();
        run_until_idle(&mut controller).await;
    }

    let messages = controller.messages();
    assert_eq!(messages.len(), 40);
    let ids: HashSet<_> = messages.iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids.len(), 40);

    // Strict alternation, answers follow their questions
    for (i, pair) in messages.chunks(2).enumerate() {
        assert_eq!(pair[0].role, MessageRole::User);
        assert_eq!(pair[1].role, MessageRole::Assistant);
        assert_eq!(pair[1].content, format!("Answer to: q{i}"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_last_answer_data_follows_latest_answer() {
    let service = ScriptedService::default()
        .reply(answer(
            "Budget.",
            Some(serde_json::json!([{ "topic": "Budget" }])),
        ))
        .reply(Err(server_error("/query")));
    let (mut controller, _rx) = setup(service, ChatConfig::default());
    assert_eq!(controller.last_answer_data(), None);

    controller.submit("topics?").unwrap();
    run_until_idle(&mut controller).await;
    assert_eq!(controller.last_answer_data().map(AuxiliaryData::len), Some(1));

    // A failed turn has no data of its own
    controller.submit("again").unwrap();
    run_until_idle(&mut controller).await;
    assert_eq!(controller.last_answer_data(), None);

    controller.clear();
    assert_eq!(controller.last_answer_data(), None);
}

// ============================================================================
// Clear
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_clear_mid_stream_stops_reveal() {
    let service = ScriptedService::default().reply(answer("A fairly long answer", None));
    let (mut controller, mut rx) = setup(service, ChatConfig::default());

    controller.submit("q").unwrap();
    while controller.phase() != TurnPhase::Streaming {
        assert!(controller.step().await);
    }
    controller.step().await;
    controller.step().await;
    drain(&mut rx);

    controller.clear();
    assert_eq!(controller.phase(), TurnPhase::Idle);
    assert!(controller.messages().is_empty());
    assert!(controller.active_stream().is_none());
    assert!(!controller.has_started());
    assert!(!controller.has_pending_work());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!controller.step().await);

    let updates = drain(&mut rx);
    assert_eq!(
        updates,
        vec![
            ChatUpdate::Cleared,
            ChatUpdate::Phase {
                phase: TurnPhase::Idle
            }
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_clear_while_awaiting_discards_answer() {
    let service = ScriptedService::default().with_query_delay(Duration::from_secs(1));
    let (mut controller, mut rx) = setup(service, ChatConfig::default());

    controller.submit("q").unwrap();
    controller.clear();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!controller.step().await);
    assert!(controller.messages().is_empty());
    assert!(!drain(&mut rx)
        .iter()
        .any(|u| matches!(u, ChatUpdate::MessageAppended { role: MessageRole::Assistant, .. })));

    // A new turn works normally
    controller.submit("again").unwrap();
    run_until_idle(&mut controller).await;
    assert_eq!(controller.messages().len(), 2);
    assert_eq!(controller.messages()[1].content, "Answer to: again");
}

// ============================================================================
// Failures and fallback
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unreachable_service_answers_offline() {
    let service = ScriptedService::default().reply(Err(unreachable("/query")));
    let (mut controller, mut rx) = setup(service, ChatConfig::default());

    let start = tokio::time::Instant::now();
    controller.submit("What are the main topics?").unwrap();
    assert!(controller.step().await);
    assert_eq!(start.elapsed(), Duration::from_millis(1000));
    assert_eq!(controller.phase(), TurnPhase::Streaming);

    run_until_idle(&mut controller).await;

    let answer = &controller.messages()[1];
    assert!(FALLBACK_ANSWERS.contains(&answer.content.as_str()));
    assert_eq!(
        answer.auxiliary_data,
        Some(AuxiliaryData::new(fallback_records()))
    );
    assert!(!phases(&drain(&mut rx)).contains(&TurnPhase::Error));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_without_fallback_shows_error() {
    let mut config = ChatConfig::default();
    config.fallback_enabled = false;
    let service = ScriptedService::default().reply(Err(unreachable("/query")));
    let (mut controller, mut rx) = setup(service, config);

    controller.submit("q").unwrap();
    run_until_idle(&mut controller).await;

    assert_eq!(controller.messages()[1].content, QUERY_ERROR_MESSAGE);
    assert_eq!(
        phases(&drain(&mut rx)),
        vec![
            TurnPhase::AwaitingResponse,
            TurnPhase::Error,
            TurnPhase::Idle
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_server_error_shows_error_message() {
    let service = ScriptedService::default().reply(Err(server_error("/query")));
    let (mut controller, mut rx) = setup(service, ChatConfig::default());

    controller.submit("q").unwrap();
    run_until_idle(&mut controller).await;

    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].content, QUERY_ERROR_MESSAGE);
    assert_eq!(messages[1].auxiliary_data, None);
    assert_eq!(controller.phase(), TurnPhase::Idle);

    let updates = drain(&mut rx);
    assert_eq!(
        phases(&updates),
        vec![
            TurnPhase::AwaitingResponse,
            TurnPhase::Error,
            TurnPhase::Idle
        ]
    );
    // Error messages are shown whole, never typed out
    assert!(reveals(&updates).is_empty());

    // No automatic retry
    assert_eq!(controller.client().transport().queries().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_answer_shows_error_message() {
    let service = ScriptedService::default().reply(Err(TransportError::Decode {
        endpoint: "http://localhost:8000/query".to_string(),
        reason: "missing field `answer`".to_string(),
    }));
    let (mut controller, _rx) = setup(service, ChatConfig::default());

    controller.submit("q").unwrap();
    run_until_idle(&mut controller).await;
    assert_eq!(controller.messages()[1].content, QUERY_ERROR_MESSAGE);
}

// ============================================================================
// Uploads
// ============================================================================

fn transcript() -> FileHandle {
    FileHandle::from_bytes("minutes.txt", b"Budget review\nTimeline review\n".to_vec())
}

#[tokio::test(start_paused = true)]
async fn test_offline_upload_completes() {
    let service = ScriptedService::default().upload_reply(Err(unreachable("/upload")));
    let (mut controller, mut rx) = setup(service, ChatConfig::default());

    controller.begin_upload(transcript());
    run_until_idle(&mut controller).await;

    let updates = drain(&mut rx);
    assert_eq!(
        updates.first(),
        Some(&ChatUpdate::UploadStarted {
            filename: "minutes.txt".to_string()
        })
    );
    // Simulated steps up to the cap, then confirmation
    assert_eq!(upload_percents(&updates), vec![20, 40, 60, 80, 90, 100]);
    assert_eq!(
        updates.last(),
        Some(&ChatUpdate::UploadComplete {
            filename: "minutes.txt".to_string()
        })
    );

    assert_eq!(controller.uploaded_file(), Some("minutes.txt"));
    assert_eq!(controller.upload_state().phase, UploadPhase::Idle);
    assert_eq!(controller.phase(), TurnPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_fast_upload_jumps_to_complete() {
    let (mut controller, mut rx) = setup(ScriptedService::default(), ChatConfig::default());

    controller.begin_upload(transcript());
    run_until_idle(&mut controller).await;

    let updates = drain(&mut rx);
    assert_eq!(upload_percents(&updates), vec![100]);
    assert_eq!(controller.uploaded_file(), Some("minutes.txt"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_upload_retries_same_file() {
    let service = ScriptedService::default()
        .with_upload_delay(Duration::from_millis(300))
        .upload_reply(Err(server_error("/upload")))
        .upload_reply(Ok(()));
    let (mut controller, mut rx) = setup(service, ChatConfig::default());

    controller.begin_upload(transcript());
    run_until_idle(&mut controller).await;

    let state = controller.upload_state();
    assert_eq!(state.phase, UploadPhase::Failed);
    assert!(state.can_retry());
    assert_eq!(state.progress_percent, 20);
    assert!(state.error.as_deref().is_some_and(|e| e.contains("500")));
    assert!(controller.uploaded_file().is_none());
    assert!(drain(&mut rx)
        .iter()
        .any(|u| matches!(u, ChatUpdate::UploadFailed { filename, .. } if filename == "minutes.txt")));

    controller.retry_upload().unwrap();
    assert_eq!(controller.upload_state().progress_percent, 0);
    assert_eq!(controller.upload_state().error, None);
    run_until_idle(&mut controller).await;

    assert_eq!(controller.uploaded_file(), Some("minutes.txt"));
    let uploads = controller.client().transport().uploads();
    assert_eq!(uploads.len(), 2);
    assert!(uploads[0].same_file(&uploads[1]));
}

#[tokio::test(start_paused = true)]
async fn test_retry_without_failure_is_rejected() {
    let (mut controller, _rx) = setup(ScriptedService::default(), ChatConfig::default());
    assert!(controller.retry_upload().is_err());

    controller.begin_upload(transcript());
    run_until_idle(&mut controller).await;
    assert!(controller.retry_upload().is_err());
    assert_eq!(controller.client().transport().uploads().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_upload_runs_alongside_a_turn() {
    let service = ScriptedService::default().with_upload_delay(Duration::from_secs(1));
    let (mut controller, _rx) = setup(service, ChatConfig::default());

    controller.begin_upload(transcript());
    controller.submit("What is in the file?").unwrap();
    run_until_idle(&mut controller).await;

    assert_eq!(controller.messages().len(), 2);
    assert_eq!(controller.uploaded_file(), Some("minutes.txt"));
}

#[tokio::test(start_paused = true)]
async fn test_clear_forgets_uploaded_file() {
    let (mut controller, _rx) = setup(ScriptedService::default(), ChatConfig::default());

    controller.begin_upload(transcript());
    run_until_idle(&mut controller).await;
    assert_eq!(controller.uploaded_file(), Some("minutes.txt"));

    controller.clear();
    assert_eq!(controller.uploaded_file(), None);
    assert_eq!(controller.upload_state().phase, UploadPhase::Idle);
}

fn upload_finished(updates: &[ChatUpdate]) -> bool {
    updates
        .iter()
        .any(|u| matches!(u, ChatUpdate::UploadComplete { .. } | ChatUpdate::UploadFailed { .. }))
}

#[tokio::test(start_paused = true)]
async fn test_clear_while_uploading_discards_upload() {
    let service = ScriptedService::default().with_upload_delay(Duration::from_secs(2));
    let (mut controller, mut rx) = setup(service, ChatConfig::default());

    controller.begin_upload(transcript());
    assert!(controller.step().await);
    assert_eq!(controller.upload_state().phase, UploadPhase::Uploading);
    drain(&mut rx);

    controller.clear();
    assert!(!controller.has_pending_work());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!controller.step().await);

    let updates = drain(&mut rx);
    assert!(!upload_finished(&updates));
    assert!(upload_percents(&updates).is_empty());
    assert_eq!(controller.uploaded_file(), None);
    assert_eq!(controller.upload_state().phase, UploadPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_clear_while_settling_discards_upload() {
    let (mut controller, mut rx) = setup(ScriptedService::default(), ChatConfig::default());

    controller.begin_upload(transcript());
    while controller.upload_state().phase != UploadPhase::Settling {
        assert!(controller.step().await);
    }
    assert_eq!(controller.upload_state().progress_percent, 100);
    drain(&mut rx);

    controller.clear();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!controller.step().await);

    assert!(!upload_finished(&drain(&mut rx)));
    assert_eq!(controller.uploaded_file(), None);
    assert_eq!(controller.upload_state().phase, UploadPhase::Idle);
}
