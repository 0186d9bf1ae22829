//! The reasoning loop of a single turn.
//!
//! A turn alternates between asking the model what to do and doing it:
//!
//! ```text
//! Deciding --tool proposal--> Invoking --observation--> Deciding
//! Deciding --answer/handoff--> Answering (done)
//! ```
//!
//! Every Deciding step either ends the turn, dispatches a tool chain or
//! counts a correction, and both counters are bounded, so a turn always ends.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::decision::{interpret, ModelDecision, ToolProposal, HANDOFF_PREFIX};
use crate::cancellation::CancellationToken;
use crate::config::AgentChatConfig;
use crate::error::{AgentChatError, Result, ValidationError};
use crate::logging::{LlmCallEvent, ToolCallEvent};
use crate::models::{AssistantContent, ChatCompletionClient, CreateResultContent, LlmMessage};
use crate::policy::{DispatchFailure, ErrorKind, ErrorPolicy, FallbackChain, PolicyDecision};
use crate::team::ParticipantDefinition;
use crate::tools::{
    InvocationContext, Observation, OutputKind, OutputNormalizer, ParameterMarshaler, ToolDescriptor,
    ToolOutcome, ToolRegistry, ToolSpec, TypedArgs,
};
use crate::types::{Limitation, ToolCall, ToolExchange, ToolResult};

/// Per-turn bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Tool call chains a single turn may dispatch
    pub max_invocations: u32,
    /// Rejected proposals tolerated before the turn gives up
    pub max_corrections: u32,
    /// Deadline of one tool dispatch
    pub tool_timeout_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_invocations: 8,
            max_corrections: 3,
            tool_timeout_ms: 30_000,
        }
    }
}

/// Shared collaborators of the loop
#[derive(Debug, Clone)]
pub struct LoopContext {
    pub registry: Arc<ToolRegistry>,
    pub marshaler: ParameterMarshaler,
    pub normalizer: OutputNormalizer,
    pub policy: ErrorPolicy,
    pub config: LoopConfig,
}

impl LoopContext {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            marshaler: ParameterMarshaler::new(),
            normalizer: OutputNormalizer::default(),
            policy: ErrorPolicy::default(),
            config: LoopConfig::default(),
        }
    }

    pub fn from_config(registry: Arc<ToolRegistry>, config: &AgentChatConfig) -> Self {
        Self {
            registry,
            marshaler: ParameterMarshaler::new(),
            normalizer: OutputNormalizer::new(config.normalizer.clone()),
            policy: ErrorPolicy::from_config(config),
            config: config.reasoning.clone(),
        }
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_loop_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }
}

/// Everything the loop needs to produce one turn
pub struct TurnRequest<'a> {
    pub session_id: &'a str,
    /// Sequence number the turn will receive
    pub turn_id: u64,
    pub participant: &'a ParticipantDefinition,
    pub client: &'a dyn ChatCompletionClient,
    /// Shared conversation rendered for this participant
    pub history: Vec<LlmMessage>,
    /// Peers this participant may hand the conversation to
    pub handoff_targets: Vec<HandoffTarget>,
}

/// A peer offered to the model as a handoff target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffTarget {
    pub participant_id: String,
    pub description: Option<String>,
}

impl HandoffTarget {
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl From<&ParticipantDefinition> for HandoffTarget {
    fn from(definition: &ParticipantDefinition) -> Self {
        Self {
            participant_id: definition.id.clone(),
            description: definition.description.clone(),
        }
    }
}

/// Result of a completed turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub message: String,
    pub tool_calls: Vec<ToolExchange>,
    pub handoff: Option<String>,
    pub limitation: Option<Limitation>,
    pub observations: Vec<Observation>,
}

#[derive(Debug)]
enum LoopState {
    Deciding,
    Invoking(ToolProposal),
    Answering {
        message: String,
        handoff: Option<String>,
        limitation: Option<Limitation>,
    },
}

/// Private working state of one turn. Discarded if the turn is cancelled.
#[derive(Default)]
struct Scratch {
    messages: Vec<LlmMessage>,
    tool_calls: Vec<ToolExchange>,
    observations: Vec<Observation>,
    unavailable: Vec<String>,
    invocations: u32,
    corrections: u32,
}

enum ChainEnd {
    Observed(Observation),
    Rejected(ValidationError),
}

#[derive(Debug, Clone)]
pub struct ReasoningLoop {
    ctx: Arc<LoopContext>,
}

impl ReasoningLoop {
    pub fn new(ctx: LoopContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &LoopContext {
        &self.ctx
    }

    /// Run one turn for `request.participant`.
    ///
    /// Returns `AgentChatError::Cancelled` if `cancel` fires; model client
    /// errors are propagated unchanged. Tool failures never fail the turn.
    pub async fn run_turn(&self, request: TurnRequest<'_>, cancel: &CancellationToken) -> Result<TurnOutcome> {
        let participant = request.participant;
        let allowed = self.ctx.registry.list_for(&participant.tool_allow_list);
        let mut tools: Vec<ToolSpec> = allowed.iter().map(|d| d.spec()).collect();
        tools.extend(request.handoff_targets.iter().map(handoff_spec));

        let mut scratch = Scratch::default();
        scratch.messages.push(LlmMessage::system(participant.system_prompt.clone()));
        scratch.messages.extend(request.history.iter().cloned());

        let bounds = &self.ctx.config;
        let mut state = LoopState::Deciding;
        loop {
            cancel.throw_if_cancelled()?;
            state = match state {
                LoopState::Deciding => {
                    let result = cancel
                        .run_with_cancellation(request.client.create(
                            &scratch.messages,
                            &tools,
                            &participant.model,
                            cancel,
                        ))
                        .await??;
                    LlmCallEvent::new(
                        request.session_id,
                        &participant.id,
                        request.client.model_name(),
                        scratch.messages.len(),
                        result.usage.prompt_tokens,
                        result.usage.completion_tokens,
                    )
                    .emit();

                    let parsed = interpret(&result.content);
                    self.record_assistant(&mut scratch, &result.content);

                    match parsed.decision {
                        ModelDecision::Answer(message) => LoopState::Answering {
                            message,
                            handoff: None,
                            limitation: None,
                        },
                        ModelDecision::Handoff { target, message } => {
                            if request.handoff_targets.iter().any(|peer| peer.participant_id == target) {
                                let message = if message.trim().is_empty() {
                                    format!("Handing off to {}.", target)
                                } else {
                                    message
                                };
                                LoopState::Answering {
                                    message,
                                    handoff: Some(target),
                                    limitation: None,
                                }
                            } else {
                                warn!(
                                    session_id = %request.session_id,
                                    participant = %participant.id,
                                    target = %target,
                                    "Handoff to unknown peer rejected"
                                );
                                let feedback = format!(
                                    "'{}' is not a participant you can hand off to. Valid targets: {}.",
                                    target,
                                    list_or_none(
                                        &request
                                            .handoff_targets
                                            .iter()
                                            .map(|peer| peer.participant_id.clone())
                                            .collect::<Vec<_>>()
                                    )
                                );
                                self.correct(&mut scratch, LlmMessage::user(feedback, None))
                            }
                        }
                        ModelDecision::Invoke(proposal) => {
                            if parsed.extra_calls > 0 {
                                debug!(
                                    participant = %participant.id,
                                    dropped = parsed.extra_calls,
                                    "Model requested several tool calls; running the first"
                                );
                                scratch.messages.push(LlmMessage::user(
                                    format!(
                                        "Only the first tool call ('{}') was executed; {} further calls were ignored. Request tools one at a time.",
                                        proposal.tool_name, parsed.extra_calls
                                    ),
                                    None,
                                ));
                            }
                            LoopState::Invoking(proposal)
                        }
                    }
                }
                LoopState::Invoking(proposal) => {
                    if !participant.allows(&proposal.tool_name) {
                        warn!(
                            session_id = %request.session_id,
                            participant = %participant.id,
                            tool = %proposal.tool_name,
                            "Tool outside allow-list rejected"
                        );
                        let feedback = format!(
                            "Tool '{}' is not available to you. Available tools: {}.",
                            proposal.tool_name,
                            list_or_none(&participant.tool_allow_list)
                        );
                        self.correct(&mut scratch, function_feedback(&proposal, feedback))
                    } else if scratch.invocations >= bounds.max_invocations {
                        info!(
                            session_id = %request.session_id,
                            participant = %participant.id,
                            max_invocations = bounds.max_invocations,
                            "Tool invocation bound reached"
                        );
                        degraded(
                            &scratch,
                            Limitation::LoopBoundExceeded {
                                max_invocations: bounds.max_invocations,
                            },
                        )
                    } else {
                        match self.run_chain(&request, &proposal, &mut scratch, cancel).await? {
                            ChainEnd::Observed(observation) => {
                                scratch.invocations += 1;
                                let content = observation.content.clone();
                                let is_error = observation.is_error;
                                scratch.observations.push(observation);
                                scratch.messages.push(LlmMessage::FunctionResult {
                                    call_id: proposal.call_id.clone(),
                                    name: proposal.tool_name.clone(),
                                    content,
                                    is_error,
                                });
                                LoopState::Deciding
                            }
                            ChainEnd::Rejected(err) => {
                                debug!(
                                    participant = %participant.id,
                                    tool = %proposal.tool_name,
                                    error = %err,
                                    "Arguments rejected"
                                );
                                let feedback = format!(
                                    "Invalid arguments for '{}': {}. Correct the arguments and try again.",
                                    proposal.tool_name, err
                                );
                                self.correct(&mut scratch, function_feedback(&proposal, feedback))
                            }
                        }
                    }
                }
                LoopState::Answering {
                    message,
                    handoff,
                    limitation,
                } => {
                    let limitation = limitation.or_else(|| {
                        (!scratch.unavailable.is_empty()).then(|| Limitation::ToolsUnavailable {
                            tools: scratch.unavailable.clone(),
                        })
                    });
                    return Ok(TurnOutcome {
                        message,
                        tool_calls: scratch.tool_calls,
                        handoff,
                        limitation,
                        observations: scratch.observations,
                    });
                }
            };
        }
    }

    /// Count a rejected proposal and tell the model why
    fn correct(&self, scratch: &mut Scratch, feedback: LlmMessage) -> LoopState {
        scratch.corrections += 1;
        scratch.messages.push(feedback);
        let max_corrections = self.ctx.config.max_corrections;
        if scratch.corrections >= max_corrections {
            degraded(scratch, Limitation::CorrectionsExhausted { max_corrections })
        } else {
            LoopState::Deciding
        }
    }

    /// Keep the model's own output in the scratch context; only the first call is kept
    fn record_assistant(&self, scratch: &mut Scratch, content: &CreateResultContent) {
        let message = match content {
            CreateResultContent::FunctionCalls(calls) => LlmMessage::Assistant {
                content: AssistantContent::FunctionCalls(calls.iter().take(1).cloned().collect()),
                source: None,
            },
            CreateResultContent::Text(text) => LlmMessage::assistant_text(text.clone(), None),
        };
        scratch.messages.push(message);
    }

    /// Dispatch a proposal, retrying and falling back per policy, until it
    /// yields an observation or its arguments are rejected.
    async fn run_chain(
        &self,
        request: &TurnRequest<'_>,
        proposal: &ToolProposal,
        scratch: &mut Scratch,
        cancel: &CancellationToken,
    ) -> Result<ChainEnd> {
        let participant = request.participant;
        let mut descriptor = match self.ctx.registry.lookup(&proposal.tool_name) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                warn!(tool = %proposal.tool_name, error = %err, "Allowed tool is not registered");
                scratch.unavailable.push(proposal.tool_name.clone());
                let failure = DispatchFailure::UnknownTool(proposal.tool_name.clone());
                return Ok(ChainEnd::Observed(self.ctx.normalizer.normalize_failure(
                    &proposal.tool_name,
                    self.ctx.policy.classify(&failure),
                    &failure.detail(),
                )));
            }
        };
        let mut args = match self.ctx.marshaler.marshal(&descriptor, &proposal.arguments) {
            Ok(args) => args,
            Err(err) => return Ok(ChainEnd::Rejected(err)),
        };

        let mut chain = FallbackChain::new(descriptor.name());
        let mut tool_attempt: u32 = 1;
        let mut chain_attempt: u32 = 1;
        loop {
            let call = ToolCall {
                call_id: if chain_attempt == 1 {
                    proposal.call_id.clone()
                } else {
                    uuid::Uuid::new_v4().to_string()
                },
                chain_id: proposal.call_id.clone(),
                tool_name: descriptor.name().to_string(),
                arguments: args.to_json_map(),
                attempt: chain_attempt,
                session_id: request.session_id.to_string(),
                turn_id: request.turn_id,
                issued_at: Utc::now(),
            };
            debug!(
                session_id = %request.session_id,
                participant = %participant.id,
                tool = %call.tool_name,
                attempt = call.attempt,
                "Dispatching tool"
            );

            let started = Instant::now();
            let outcome = self.dispatch(&descriptor, &args, &call, &participant.id, cancel).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let failure = match outcome {
                Ok(payload) => {
                    let observation = self.ctx.normalizer.normalize(
                        descriptor.output_kind(),
                        &payload,
                        participant.interest_for(descriptor.name()),
                    );
                    let result = ToolResult::ok(&call, payload, elapsed_ms);
                    self.record(scratch, &participant.id, call, result);
                    return Ok(ChainEnd::Observed(observation));
                }
                Err(DispatchFailure::Cancelled) => return Err(AgentChatError::Cancelled),
                Err(failure) => failure,
            };

            let kind = self.ctx.policy.classify(&failure);
            let detail = failure.detail();
            warn!(
                session_id = %request.session_id,
                participant = %participant.id,
                tool = %call.tool_name,
                attempt = call.attempt,
                kind = %kind,
                "Tool call failed: {}",
                detail
            );
            let result = ToolResult::error(&call, kind, detail.clone(), elapsed_ms);
            self.record(scratch, &participant.id, call, result);

            match self.ctx.policy.decide(kind, tool_attempt, &descriptor, &chain) {
                PolicyDecision::Retry { delay } => {
                    cancel.run_with_cancellation(tokio::time::sleep(delay)).await?;
                    tool_attempt += 1;
                    chain_attempt += 1;
                }
                PolicyDecision::Fallback { tool } => {
                    match self.next_usable_fallback(tool, kind, &descriptor, &mut chain, participant, proposal) {
                        Some((next, next_args)) => {
                            info!(
                                session_id = %request.session_id,
                                from = %descriptor.name(),
                                to = %next.name(),
                                "Falling back to alternate tool"
                            );
                            descriptor = next;
                            args = next_args;
                            tool_attempt = 1;
                            chain_attempt += 1;
                        }
                        None => return Ok(self.abort_chain(scratch, &chain, &descriptor, kind, &detail)),
                    }
                }
                PolicyDecision::Abort => return Ok(self.abort_chain(scratch, &chain, &descriptor, kind, &detail)),
            }
        }
    }

    /// Walk the fallback list until a candidate is allowed, registered and
    /// accepts the original arguments.
    fn next_usable_fallback(
        &self,
        first: String,
        kind: ErrorKind,
        failed: &ToolDescriptor,
        chain: &mut FallbackChain,
        participant: &ParticipantDefinition,
        proposal: &ToolProposal,
    ) -> Option<(Arc<ToolDescriptor>, TypedArgs)> {
        let mut candidate = Some(first);
        while let Some(name) = candidate {
            chain.mark_tried(&name);
            if participant.allows(&name) {
                if let Ok(next) = self.ctx.registry.lookup(&name) {
                    if let Ok(args) = self.ctx.marshaler.marshal(&next, &proposal.arguments) {
                        return Some((next, args));
                    }
                }
            }
            debug!(tool = %name, "Skipping unusable fallback");
            candidate = match self.ctx.policy.decide(kind, u32::MAX, failed, chain) {
                PolicyDecision::Fallback { tool } => Some(tool),
                _ => None,
            };
        }
        None
    }

    fn abort_chain(
        &self,
        scratch: &mut Scratch,
        chain: &FallbackChain,
        descriptor: &ToolDescriptor,
        kind: ErrorKind,
        detail: &str,
    ) -> ChainEnd {
        if !scratch.unavailable.iter().any(|t| t == chain.origin()) {
            scratch.unavailable.push(chain.origin().to_string());
        }
        ChainEnd::Observed(self.ctx.normalizer.normalize_failure(descriptor.name(), kind, detail))
    }

    fn record(&self, scratch: &mut Scratch, participant: &str, call: ToolCall, result: ToolResult) {
        let exchange = ToolExchange { call, result };
        ToolCallEvent::from_exchange(participant, &exchange).emit();
        scratch.tool_calls.push(exchange);
    }

    async fn dispatch(
        &self,
        descriptor: &ToolDescriptor,
        args: &TypedArgs,
        call: &ToolCall,
        participant: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<serde_json::Value, DispatchFailure> {
        let token = cancel.child_token();
        let ctx = InvocationContext {
            session_id: call.session_id.clone(),
            participant_id: participant.to_string(),
            call_id: call.call_id.clone(),
            attempt: call.attempt,
            cancellation: token.clone(),
        };
        let timeout = Duration::from_millis(self.ctx.config.tool_timeout_ms);

        match token.run_with_timeout(timeout, descriptor.invoker().invoke(args, &ctx)).await {
            Ok(ToolOutcome::Ok { payload }) => {
                if descriptor.output_kind() == OutputKind::Structured {
                    descriptor
                        .validate_result(&payload)
                        .map_err(DispatchFailure::MalformedOutput)?;
                }
                Ok(payload)
            }
            Ok(ToolOutcome::Error { kind, detail }) => Err(DispatchFailure::Reported { kind, detail }),
            Err(AgentChatError::Timeout { timeout_ms }) => {
                token.cancel();
                Err(DispatchFailure::TimedOut { timeout_ms })
            }
            Err(_) => Err(DispatchFailure::Cancelled),
        }
    }
}

fn degraded(scratch: &Scratch, limitation: Limitation) -> LoopState {
    let mut message = format!("I could not fully complete this request: {}.", limitation);
    if let Some(last) = scratch.observations.iter().rev().find(|o| !o.is_error) {
        message.push_str(" Best available result: ");
        message.push_str(&last.content);
    }
    LoopState::Answering {
        message,
        handoff: None,
        limitation: Some(limitation),
    }
}

fn function_feedback(proposal: &ToolProposal, content: String) -> LlmMessage {
    LlmMessage::FunctionResult {
        call_id: proposal.call_id.clone(),
        name: proposal.tool_name.clone(),
        content,
        is_error: true,
    }
}

fn handoff_spec(peer: &HandoffTarget) -> ToolSpec {
    let mut description = format!("Hand the conversation over to {}.", peer.participant_id);
    if let Some(about) = peer.description.as_deref().filter(|d| !d.trim().is_empty()) {
        description.push(' ');
        description.push_str(about.trim());
    }
    ToolSpec {
        name: format!("{}{}", HANDOFF_PREFIX, peer.participant_id),
        description,
        parameters: serde_json::json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": [],
        }),
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
