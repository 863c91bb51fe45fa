//! Turn coordinator — one conversational turn from request to stored reply.
//!
//! 1. **Resolve** the agent profile (and occasionally sweep idle windows)
//! 2. **Select knowledge**: fetch the namespace, rank it against the turn
//! 3. **Budget**: estimate the call, plan pruning of the window, drop
//!    knowledge as a last resort before refusing with `ContextOverflow`
//! 4. **Admit**: wait out the minimum spacing or refuse on rate
//! 5. **Call** the provider
//! 6. **Record**: apply the planned prune, append the exchange, persist
//!    to the transcript sink
//!
//! The window is neither pruned nor appended to unless the provider call
//! succeeds.

use agentgate_config::AppConfig;
use agentgate_core::error::{BudgetError, Error};
use agentgate_core::message::{ContentBlock, ConversationKey, Role, Turn};
use agentgate_core::provider::{Provider, ProviderRequest, Usage};
use agentgate_core::{AgentProfile, NoopTranscriptSink, TranscriptSink};
use agentgate_knowledge::{
    KnowledgeCache, SelectionRanker, SelectionRequest, SizePressure, render_knowledge,
};
use agentgate_providers::AdmissionController;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::{
    BudgetLevel, ContextBudget, ConversationStore, PruneOutcome, TokenEstimate, plan_prune,
};

/// An uploaded file. Decoded as UTF-8 (lossy) into corpus text.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// One incoming conversational turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub agent_id: String,
    pub conversation_id: String,
    pub message: String,
    pub attachments: Vec<Attachment>,
    /// Persona and task instructions.
    pub instructions: String,
}

impl TurnRequest {
    pub fn new(
        agent_id: impl Into<String>,
        conversation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            conversation_id: conversation_id.into(),
            message: message.into(),
            attachments: Vec::new(),
            instructions: String::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// The user turn this request appends.
    fn user_turn(&self) -> Turn {
        if self.attachments.is_empty() {
            return Turn::user(self.message.clone());
        }
        let mut blocks = vec![ContentBlock::Text {
            text: self.message.clone(),
        }];
        blocks.extend(self.attachments.iter().map(|a| ContentBlock::Attachment {
            name: a.name.clone(),
            text: a.text(),
        }));
        Turn::blocks(Role::User, blocks)
    }
}

/// What happened during a turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The provider's reply as received (reasoning included).
    pub reply: Turn,
    pub prune: PruneOutcome,
    /// Estimate of the request that was actually sent.
    pub estimate: TokenEstimate,
    pub selected_documents: Vec<String>,
    /// Knowledge was left out to fit the absolute ceiling.
    pub knowledge_dropped: bool,
    /// Spacing delay waited before the call.
    pub waited: Duration,
    pub usage: Option<Usage>,
}

pub struct TurnCoordinator {
    profiles: HashMap<String, AgentProfile>,
    provider: Arc<dyn Provider>,
    admission: Arc<AdmissionController>,
    conversations: Arc<ConversationStore>,
    knowledge: Arc<KnowledgeCache>,
    ranker: SelectionRanker,
    budget: ContextBudget,
    transcript: Arc<dyn TranscriptSink>,
    medium_attachment_chars: usize,
    large_attachment_chars: usize,
}

impl TurnCoordinator {
    pub fn new(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        knowledge: Arc<KnowledgeCache>,
    ) -> Self {
        Self {
            profiles: config
                .agents
                .iter()
                .map(|p| (p.id.clone(), p.clone()))
                .collect(),
            provider,
            admission: Arc::new(AdmissionController::new(&config.admission)),
            conversations: Arc::new(ConversationStore::new(&config.conversations)),
            knowledge,
            ranker: SelectionRanker::default(),
            budget: ContextBudget::new(&config.context),
            transcript: Arc::new(NoopTranscriptSink),
            medium_attachment_chars: config.knowledge.medium_attachment_chars,
            large_attachment_chars: config.knowledge.large_attachment_chars,
        }
    }

    /// Share an admission controller with other coordinators.
    pub fn with_admission(mut self, admission: Arc<AdmissionController>) -> Self {
        self.admission = admission;
        self
    }

    pub fn with_conversations(mut self, conversations: Arc<ConversationStore>) -> Self {
        self.conversations = conversations;
        self
    }

    pub fn with_ranker(mut self, ranker: SelectionRanker) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn with_transcript_sink(mut self, sink: Arc<dyn TranscriptSink>) -> Self {
        self.transcript = sink;
        self
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn knowledge(&self) -> &KnowledgeCache {
        &self.knowledge
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    pub fn profile(&self, agent_id: &str) -> Option<&AgentProfile> {
        self.profiles.get(agent_id)
    }

    /// Process one turn.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnOutcome, Error> {
        let profile = self
            .profiles
            .get(&request.agent_id)
            .ok_or_else(|| Error::UnknownAgent(request.agent_id.clone()))?;
        let key = ConversationKey::new(&profile.id, &request.conversation_id);

        self.conversations.maybe_sweep();

        // === Knowledge selection ===
        let user_turn = request.user_turn();
        let attachment_text = request
            .attachments
            .iter()
            .map(Attachment::text)
            .collect::<Vec<_>>()
            .join("\n");
        let pressure = SizePressure::from_attachment_len(
            attachment_text.len(),
            self.medium_attachment_chars,
            self.large_attachment_chars,
        );

        let documents = self.knowledge.get_namespace(&profile.knowledge_namespace).await;
        let history = self.conversations.snapshot(&key);
        let history_text = history.iter().map(Turn::text).collect::<Vec<_>>().join("\n");

        let mut selected = self.ranker.select_relevant(
            &SelectionRequest {
                task: &profile.id,
                message: &request.message,
                attachment_text: &attachment_text,
                history: &history_text,
                primary_document: profile.primary_document.as_deref(),
                pressure,
            },
            &documents,
        );
        let mut knowledge_text = render_knowledge(&selected);

        // === Budget ===
        let pending = user_turn.text();
        let estimate = self
            .budget
            .estimate(&history, &knowledge_text, &request.instructions, &pending);
        match self.budget.classify(estimate.total) {
            BudgetLevel::Normal => {}
            BudgetLevel::Warning => warn!(
                conversation = %key,
                estimated_tokens = estimate.total,
                "Context approaching the hard threshold"
            ),
            level => info!(
                conversation = %key,
                estimated_tokens = estimate.total,
                ?level,
                "Context over the hard threshold, pruning"
            ),
        }

        let prune = plan_prune(&key, &history, profile, &self.budget, &estimate);
        let history = history[prune.removed()..].to_vec();
        let mut estimate = self.budget.with_history(&history, &estimate);

        let mut knowledge_dropped = false;
        if estimate.total > self.budget.absolute_tokens() && !selected.is_empty() {
            warn!(
                conversation = %key,
                estimated_tokens = estimate.total,
                documents = selected.len(),
                "Dropping knowledge to fit the context window"
            );
            selected.clear();
            knowledge_text.clear();
            knowledge_dropped = true;
            estimate = self.budget.estimate(&history, "", &request.instructions, &pending);
        }
        if estimate.total > self.budget.absolute_tokens() {
            return Err(BudgetError::ContextOverflow {
                estimated: estimate.total,
                limit: self.budget.absolute_tokens(),
            }
            .into());
        }

        // === Admission ===
        let waited = self.admission.try_admit().into_result()?;
        if !waited.is_zero() {
            debug!(wait_ms = waited.as_millis() as u64, "Waiting out call spacing");
            tokio::time::sleep(waited).await;
        }
        self.admission.record_call();

        // === Call ===
        let system = if knowledge_text.is_empty() {
            request.instructions.clone()
        } else if request.instructions.is_empty() {
            knowledge_text
        } else {
            format!("{}\n\n{knowledge_text}", request.instructions)
        };
        let mut turns = history;
        turns.push(user_turn.clone());

        let response = self
            .provider
            .complete(ProviderRequest {
                agent_id: profile.id.clone(),
                system,
                turns,
                max_tokens: u32::try_from(self.budget.output_reserve()).ok(),
            })
            .await?;

        if let Some(usage) = &response.usage {
            debug!(
                provider = self.provider.name(),
                estimated = estimate.total,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Provider usage"
            );
        }

        // === Record ===
        let stored_user = user_turn.without_reasoning();
        let stored_reply = response.turn.clone().without_reasoning();
        self.conversations.commit_exchange(
            &key,
            prune.removed(),
            stored_user.clone(),
            stored_reply.clone(),
        );

        for turn in [&stored_user, &stored_reply] {
            if let Err(e) = self.transcript.persist(&key, turn).await {
                warn!(
                    conversation = %key,
                    sink = self.transcript.name(),
                    error = %e,
                    "Transcript persist failed"
                );
            }
        }

        Ok(TurnOutcome {
            reply: response.turn,
            prune,
            estimate,
            selected_documents: selected.into_iter().map(|d| d.filename).collect(),
            knowledge_dropped,
            waited,
            usage: response.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_core::error::{AdmissionError, KnowledgeError, ProviderError};
    use agentgate_core::knowledge::{OriginFile, OriginStore};
    use agentgate_core::provider::ProviderResponse;
    use agentgate_knowledge::InMemoryCacheStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Echoes the last user message back, with a reasoning block attached.
    struct ScriptedProvider {
        requests: Mutex<Vec<ProviderRequest>>,
        failing: AtomicBool,
    }

    impl ScriptedProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                failing: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> ProviderRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ProviderError::Network("connection reset".into()));
            }
            let echoed = request.turns.last().map(Turn::text).unwrap_or_default();
            self.requests.lock().unwrap().push(request);
            Ok(ProviderResponse {
                turn: Turn::blocks(
                    Role::Assistant,
                    vec![
                        ContentBlock::Reasoning {
                            text: "thinking it over".into(),
                        },
                        ContentBlock::Text {
                            text: format!("re: {echoed}"),
                        },
                    ],
                ),
                usage: None,
            })
        }
    }

    struct StaticOrigin {
        fetches: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OriginStore for StaticOrigin {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_namespace(&self, _namespace: &str) -> Result<Vec<OriginFile>, KnowledgeError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                OriginFile {
                    filename: "grant-card-template.md".into(),
                    mime_type: "text/markdown".into(),
                    content: b"Grant card layout".to_vec(),
                    modified: chrono::Utc::now(),
                },
                OriginFile {
                    filename: "hiring-criteria.md".into(),
                    mime_type: "text/markdown".into(),
                    content: b"Wage subsidy rules for hiring".to_vec(),
                    modified: chrono::Utc::now(),
                },
            ])
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.admission.min_spacing_ms = 0;
        config.conversations.sweep_probability = 0.0;
        config.agents = vec![AgentProfile::new("grant-cards", 2).with_primary_document("grant-card")];
        config
    }

    fn build(config: &AppConfig) -> (TurnCoordinator, Arc<ScriptedProvider>, Arc<StaticOrigin>) {
        let provider = ScriptedProvider::new();
        let origin = Arc::new(StaticOrigin {
            fetches: AtomicUsize::new(0),
        });
        let knowledge = Arc::new(KnowledgeCache::new(
            origin.clone(),
            Arc::new(InMemoryCacheStore::new()),
            &config.knowledge,
        ));
        let coordinator = TurnCoordinator::new(config, provider.clone(), knowledge);
        (coordinator, provider, origin)
    }

    fn key() -> ConversationKey {
        ConversationKey::new("grant-cards", "c1")
    }

    #[tokio::test]
    async fn unknown_agent_is_rejected() {
        let (coordinator, provider, _) = build(&test_config());
        let err = coordinator
            .handle_turn(TurnRequest::new("nobody", "c1", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAgent(id) if id == "nobody"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn reply_is_stored_without_reasoning() {
        let (coordinator, provider, _) = build(&test_config());

        let outcome = coordinator
            .handle_turn(TurnRequest::new("grant-cards", "c1", "hello"))
            .await
            .unwrap();
        assert!(matches!(
            &outcome.reply.content,
            agentgate_core::TurnContent::Blocks(b) if b.len() == 2
        ));

        coordinator
            .handle_turn(TurnRequest::new("grant-cards", "c1", "again"))
            .await
            .unwrap();

        let sent = provider.last_request();
        assert_eq!(sent.turns.len(), 3);
        for turn in &sent.turns {
            if let agentgate_core::TurnContent::Blocks(blocks) = &turn.content {
                assert!(!blocks.iter().any(|b| matches!(b, ContentBlock::Reasoning { .. })));
            }
        }
        assert_eq!(coordinator.conversations().len(&key()), 4);
    }

    #[tokio::test]
    async fn history_is_pruned_to_exchange_ceiling() {
        let (coordinator, provider, _) = build(&test_config());

        for i in 0..4 {
            coordinator
                .handle_turn(TurnRequest::new("grant-cards", "c1", format!("message {i}")))
                .await
                .unwrap();
        }

        // Two exchanges of history plus the pending turn.
        let sent = provider.last_request();
        assert_eq!(sent.turns.len(), 5);
        assert_eq!(sent.turns[0].text(), "message 1");
        assert_eq!(sent.turns[4].text(), "message 3");
    }

    #[tokio::test]
    async fn knowledge_is_selected_and_fetched_once() {
        let (coordinator, provider, origin) = build(&test_config());

        let outcome = coordinator
            .handle_turn(TurnRequest::new("grant-cards", "c1", "hiring question"))
            .await
            .unwrap();
        coordinator
            .handle_turn(TurnRequest::new("grant-cards", "c1", "follow up"))
            .await
            .unwrap();

        assert_eq!(origin.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.selected_documents[0], "grant-card-template.md");
        assert!(provider.last_request().system.contains("=== grant-card-template.md ==="));
    }

    #[tokio::test]
    async fn oversized_input_is_refused_before_calling() {
        let mut config = test_config();
        config.context.absolute_tokens = 20_000;
        config.context.hard_tokens = 15_000;
        config.context.warning_tokens = 10_000;
        let (coordinator, provider, _) = build(&config);

        let err = coordinator
            .handle_turn(TurnRequest::new("grant-cards", "c1", "x".repeat(200_000)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Budget(BudgetError::ContextOverflow { limit: 20_000, .. })
        ));
        assert_eq!(provider.calls(), 0);
        assert_eq!(coordinator.conversations().len(&key()), 0);
    }

    #[tokio::test]
    async fn knowledge_is_dropped_before_refusing() {
        let mut config = test_config();
        config.context.output_reserve = 0;
        let (coordinator, _, _) = build(&config);

        // Measure the call with and without knowledge, then sit the ceiling between them.
        let with = coordinator
            .handle_turn(TurnRequest::new("grant-cards", "c2", "hiring"))
            .await
            .unwrap();
        assert!(!with.knowledge_dropped);

        let mut config = test_config();
        config.context.output_reserve = 0;
        config.context.absolute_tokens = with.estimate.total - 1;
        config.context.hard_tokens = config.context.absolute_tokens;
        config.context.warning_tokens = config.context.absolute_tokens;
        let (coordinator, provider, _) = build(&config);

        let outcome = coordinator
            .handle_turn(TurnRequest::new("grant-cards", "c2", "hiring"))
            .await
            .unwrap();
        assert!(outcome.knowledge_dropped);
        assert!(outcome.selected_documents.is_empty());
        assert!(provider.last_request().system.is_empty());
    }

    #[tokio::test]
    async fn rate_refusal_leaves_window_untouched() {
        let mut config = test_config();
        config.admission.max_calls_per_window = 1;
        let (coordinator, provider, _) = build(&config);

        coordinator
            .handle_turn(TurnRequest::new("grant-cards", "c1", "first"))
            .await
            .unwrap();
        let err = coordinator
            .handle_turn(TurnRequest::new("grant-cards", "c1", "second"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Admission(AdmissionError::RateExceeded { .. })));
        assert_eq!(provider.calls(), 1);
        assert_eq!(coordinator.conversations().len(&key()), 2);
    }

    #[tokio::test]
    async fn refused_turn_does_not_prune_the_window() {
        let mut config = test_config();
        config.admission.max_calls_per_window = 3;
        let (coordinator, provider, _) = build(&config);

        for i in 0..3 {
            coordinator
                .handle_turn(TurnRequest::new("grant-cards", "c1", format!("message {i}")))
                .await
                .unwrap();
        }
        assert_eq!(coordinator.conversations().len(&key()), 6);

        let err = coordinator
            .handle_turn(TurnRequest::new("grant-cards", "c1", "message 3"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Admission(AdmissionError::RateExceeded { .. })));

        let stored = coordinator.conversations().snapshot(&key());
        assert_eq!(stored.len(), 6);
        assert_eq!(stored[0].text(), "message 0");

        assert_eq!(provider.calls(), 3);

        let mut config = test_config();
        config.admission.max_calls_per_window = 10;
        let (retry, failing, _) = build(&config);
        let retry = retry.with_conversations(coordinator.conversations.clone());
        failing.failing.store(true, Ordering::SeqCst);
        assert!(retry
            .handle_turn(TurnRequest::new("grant-cards", "c1", "message 3"))
            .await
            .is_err());
        assert_eq!(coordinator.conversations().len(&key()), 6);
    }

    #[tokio::test]
    async fn provider_failure_appends_nothing() {
        let (coordinator, provider, _) = build(&test_config());
        provider.failing.store(true, Ordering::SeqCst);

        let err = coordinator
            .handle_turn(TurnRequest::new("grant-cards", "c1", "hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::Network(_))));
        assert_eq!(coordinator.conversations().len(&key()), 0);
    }

    #[tokio::test]
    async fn attachments_become_blocks() {
        let (coordinator, provider, _) = build(&test_config());

        coordinator
            .handle_turn(
                TurnRequest::new("grant-cards", "c1", "see attached")
                    .with_attachment(Attachment::new("notes.txt", "hiring plan")),
            )
            .await
            .unwrap();

        let sent = provider.last_request();
        assert_eq!(sent.turns[0].text(), "see attached\n[notes.txt]\nhiring plan");
    }
}
