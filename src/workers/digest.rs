//! Digest Worker: the per-message supervisor that turns one inbound
//! [`MessageCycle`] into a routed, streamed reply and hands the exchange
//! off to consolidation (§4.7).
//!
//! Grounded on `actors::thought` (the teacher's existing actor owning one
//! thought's lifecycle end-to-end): this worker is that actor's supervisor
//! shape re-pointed at a `MessageCycle` and this chain's own
//! classify/assemble/route/act stages instead of a single monolithic
//! thought record. It reuses `api::sse::StreamEvent` as the bus wire
//! envelope, the same type `main.rs`'s scheduler loop already publishes
//! with.

use super::{Result, WorkerError};
use crate::act::{ActLoop, ActLoopResult, Planner, VerificationCritic};
use crate::act::handlers::HandlerRegistry;
use crate::api::sse::StreamEvent;
use crate::assembly::{self, AssembledContext, Candidate};
use crate::config::{ActBudgets, AssemblyBudgets, RouterWeights};
use crate::embeddings::SharedEmbeddingEngine;
use crate::memory::types::{EventType, InteractionEvent, Mode, MessageCycle, RoutingDecision, Topic};
use crate::memory::MemoryStore;
use crate::persistence::PersistenceStore;
use crate::queues::{names, EventBus, QueueClient};
use crate::router::{self, Signals};
use crate::topic::{self, boundary::{BoundaryDetector, BoundaryState}, Classification};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Injected so this module stays free of any specific LLM client, matching
/// the `act::Planner` injection shape. RESPOND/CLARIFY/ACKNOWLEDGE go
/// through [`Self::generate`] (one call); ACT's own loop runs separately
/// and its conclusion goes through [`Self::synthesize`] (§4.7 step 5).
#[async_trait]
pub trait DigestGenerator: Send + Sync {
    async fn generate(&self, mode: Mode, context: &AssembledContext, request: &str) -> Option<String>;
    async fn synthesize(&self, act_result: &ActLoopResult, request: &str) -> Option<String>;
}

/// Generates nothing. Keeps the digest pipeline callable end to end (an
/// empty reply still streams `status -> message -> done`) when no real
/// generator has been configured yet.
#[derive(Debug, Default)]
pub struct NullGenerator;

#[async_trait]
impl DigestGenerator for NullGenerator {
    async fn generate(&self, _mode: Mode, _context: &AssembledContext, _request: &str) -> Option<String> {
        None
    }

    async fn synthesize(&self, _act_result: &ActLoopResult, _request: &str) -> Option<String> {
        None
    }
}

/// The payload dequeued from [`names::PROMPT`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestJob {
    pub cycle: MessageCycle,
    pub user_id: String,
    pub channel_id: String,
}

/// Approximate token budget handed to [`assembly::assemble`] per exchange.
const ASSEMBLY_TOKEN_BUDGET: usize = 8_000;

/// Run the digest pipeline for one dequeued [`DigestJob`] (§4.7 steps 1-7).
///
/// On a failure inside the mode generator step (step 5), this still
/// streams an `error` event and still enqueues the memory-chunker job
/// (step 7, with the failure recorded on the cycle) so the exchange stays
/// learnable; failures in steps 1-4 propagate so the caller leaves the
/// entry unacked for redelivery, matching the other consolidation workers.
#[allow(clippy::too_many_arguments)]
pub async fn process_job(
    store: &MemoryStore,
    embeddings: &SharedEmbeddingEngine,
    router_weights: &RouterWeights,
    assembly_budgets: &AssemblyBudgets,
    act_budgets: &ActBudgets,
    handlers: &HandlerRegistry,
    planner: &dyn Planner,
    critic: Option<&dyn VerificationCritic>,
    generator: &dyn DigestGenerator,
    bus: &EventBus,
    queue: &mut QueueClient,
    persistence: &mut PersistenceStore,
    job: &DigestJob,
) -> Result<()> {
    let thread_id = job.cycle.thread_id.to_string();
    let channel = EventBus::user_channel(&job.user_id);

    // Step 1: audit event + working-memory append.
    let mut event = InteractionEvent::new(
        EventType::UserInput,
        serde_json::json!({ "content": job.cycle.content }),
    );
    event.thread_id = Some(job.cycle.thread_id);
    event.exchange_id = Some(job.cycle.cycle_id.to_string());
    store.ephemeral.append_event(&event).await?;
    store
        .ephemeral
        .append_turn(&thread_id, &crate::memory::ephemeral::new_turn("user", &job.cycle.content))
        .await?;

    // Step 2: classify.
    let embedding = {
        let mut engine = embeddings.write().await;
        engine.embed(&job.cycle.content)?
    };
    let (topic_id, topic_changed) = classify_and_update_topic(store, &thread_id, &embedding, &job.cycle.cycle_id.to_string()).await?;

    // Step 3: assemble.
    let context = assembly::assemble(
        store,
        assembly_budgets,
        &embedding,
        &job.cycle.content,
        &thread_id,
        &job.user_id,
        topic_id,
        ASSEMBLY_TOKEN_BUDGET,
    )
    .await?;

    // Step 4: route. No per-thread "previous mode" history is threaded
    // through yet (would mean looking up the last decision for this
    // thread specifically, not just the global replay ring), so this
    // always routes with `previous_mode: None`.
    let signals = collect_signals(&context, &job.cycle.content, handlers);
    let routing = router::route(router_weights, &signals, None)?;

    let decision = RoutingDecision {
        id: uuid::Uuid::new_v4(),
        topic: topic_id,
        exchange_id: job.cycle.cycle_id.to_string(),
        selected_mode: routing.selected,
        router_confidence: routing.router_confidence,
        scores: routing.scores.clone(),
        tiebreaker_used: routing.tiebreaker_used,
        margin: routing.margin,
        effective_margin: routing.margin,
        signal_snapshot: serde_json::to_value(&signals).unwrap_or_default(),
        weight_snapshot: serde_json::to_value(router_weights).unwrap_or_default(),
        reflection: None,
        created_at: Utc::now(),
    };
    persistence.record_routing_decision(&decision).await?;

    publish_event(
        bus,
        &channel,
        "status",
        serde_json::json!({ "mode": routing.selected.to_string(), "cycle_id": job.cycle.cycle_id }),
    )
    .await;

    // Step 5: invoke the mode generator.
    let response = match routing.selected {
        Mode::Act => {
            let act_loop = ActLoop::new(act_budgets, handlers, planner, critic);
            match act_loop.run(&job.cycle.content).await {
                Ok(result) => generator
                    .synthesize(&result, &job.cycle.content)
                    .await
                    .unwrap_or_else(|| result.response.clone()),
                Err(e) => {
                    publish_event(bus, &channel, "error", serde_json::json!({ "error": e.to_string() })).await;
                    enqueue_chunker(queue, job, topic_changed, Some(e.to_string())).await?;
                    return Ok(());
                }
            }
        }
        mode => generator.generate(mode, &context, &job.cycle.content).await.unwrap_or_default(),
    };

    // Step 6: stream message -> done.
    publish_event(
        bus,
        &channel,
        "message",
        serde_json::json!({ "content": response, "mode": routing.selected.to_string() }),
    )
    .await;
    store
        .ephemeral
        .append_turn(&thread_id, &crate::memory::ephemeral::new_turn("assistant", &response))
        .await?;
    publish_event(bus, &channel, "done", serde_json::json!({ "cycle_id": job.cycle.cycle_id })).await;

    // Step 7: enqueue memory consolidation.
    enqueue_chunker(queue, job, topic_changed, None).await?;

    info!(cycle_id = %job.cycle.cycle_id, mode = %routing.selected, "digest cycle complete");
    Ok(())
}

/// Classify against the thread's active topics, persisting the updated or
/// newly-created topic and boundary-detector state (§4.4).
async fn classify_and_update_topic(
    store: &MemoryStore,
    thread_id: &str,
    embedding: &[f32],
    cycle_id: &str,
) -> Result<(Option<crate::core::types::TopicId>, bool)> {
    let boundary_key = format!("topic_boundary:{thread_id}");
    let active_topics = store.ephemeral.active_topics(thread_id).await?;
    let mut state: BoundaryState = store.ephemeral.get_state(&boundary_key).await?.unwrap_or_default();
    let mut detector = BoundaryDetector::default_spec();
    let message_count = active_topics.iter().map(|t| t.message_count).sum::<u64>() as usize + 1;

    let classification = topic::classify(embedding, &active_topics, &mut detector, &mut state, message_count);
    store.ephemeral.set_state(&boundary_key, &state, 24 * 3600).await?;

    match classification {
        Classification::Attach { topic, similarity } => {
            if let Some(mut attached) = active_topics.into_iter().find(|t| t.topic_id == topic) {
                attached.attach(embedding, similarity);
                store.ephemeral.save_topic(thread_id, &attached).await?;
            }
            Ok((Some(topic), false))
        }
        Classification::NewTopic => {
            let new_topic = Topic::new(format!("topic-{cycle_id}"), embedding.to_vec());
            let id = new_topic.topic_id;
            store.ephemeral.save_topic(thread_id, &new_topic).await?;
            Ok((Some(id), true))
        }
    }
}

async fn enqueue_chunker(
    queue: &mut QueueClient,
    job: &DigestJob,
    topic_changed: bool,
    failure: Option<String>,
) -> Result<()> {
    let mut cycle = job.cycle.clone();
    if let Some(reason) = failure {
        cycle.intent = Some(serde_json::json!({ "failed": true, "reason": reason }));
    }
    let chunker_job = super::chunker::ChunkerJob {
        cycle,
        user_id: job.user_id.clone(),
        topic_changed,
    };
    queue.enqueue(names::MEMORY_CHUNKER, &chunker_job).await?;
    Ok(())
}

async fn publish_event(bus: &EventBus, channel: &str, event: &str, data: serde_json::Value) {
    let payload = StreamEvent {
        event: event.to_string(),
        data,
    };
    if let Err(e) = bus.publish(channel, &payload).await {
        warn!(error = %e, event, "digest worker: failed to publish stream event");
    }
}

fn collect_signals(context: &AssembledContext, content: &str, handlers: &HandlerRegistry) -> Signals {
    let mut signals = Signals::default();

    signals.context_warmth = (context.working_memory.candidates.len() as f64 / 20.0).min(1.0);
    signals.turns_in_topic = context.working_memory.candidates.len() as f64;
    signals.fact_count = context.facts.candidates.len() as f64;
    signals.message_length = content.len() as f64;
    signals.question_mark_count = content.matches('?').count() as f64;
    signals.greeting_pattern = f64::from(is_greeting(content));
    signals.imperative_verb_count = f64::from(starts_with_imperative(content));

    let scores: Vec<f32> = context.ordered.iter().map(Candidate::score).collect();
    signals.memory_confidence = if scores.is_empty() {
        0.0
    } else {
        f64::from(scores.iter().sum::<f32>() / scores.len() as f32)
    };

    let freshnesses: Vec<f32> = context
        .episodes
        .candidates
        .iter()
        .filter_map(|c| match c {
            Candidate::Episode(e) => Some(e.freshness),
            _ => None,
        })
        .collect();
    let avg_freshness = if freshnesses.is_empty() {
        1.0
    } else {
        freshnesses.iter().sum::<f32>() / freshnesses.len() as f32
    };
    signals.freshness_risk = f64::from((1.0 - avg_freshness).clamp(0.0, 1.0));

    signals.open_loop_count = context
        .episodes
        .candidates
        .iter()
        .filter_map(|c| match c {
            Candidate::Episode(e) => Some(e.open_loops.len() as f64),
            _ => None,
        })
        .sum();

    signals.tool_available = f64::from(handlers.has_search_tool());
    signals.tool_trigger_count = if handlers.has_search_tool() && content.to_lowercase().contains("search") {
        1.0
    } else {
        0.0
    };

    signals
}

fn is_greeting(content: &str) -> bool {
    const GREETINGS: &[&str] = &["hi", "hello", "hey", "good morning", "good evening", "good afternoon"];
    let lower = content.trim().to_lowercase();
    GREETINGS.iter().any(|g| lower.starts_with(g))
}

fn starts_with_imperative(content: &str) -> bool {
    const IMPERATIVES: &[&str] = &[
        "please", "do", "find", "create", "make", "send", "schedule", "remind", "set", "delete",
        "update", "run", "build", "fetch", "check", "cancel", "add", "remove",
    ];
    content
        .split_whitespace()
        .next()
        .is_some_and(|w| IMPERATIVES.contains(&w.to_lowercase().as_str()))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::core::types::ThreadId;
    use crate::memory::types::CycleType;

    #[test]
    fn job_round_trips_through_json() {
        let job = DigestJob {
            cycle: MessageCycle::root(ThreadId::new(), CycleType::User, "hello there".into()),
            user_id: "user-1".into(),
            channel_id: "channel-1".into(),
        };
        let json = serde_json::to_string(&job).expect("serializes");
        let back: DigestJob = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.user_id, job.user_id);
    }

    #[test]
    fn greeting_pattern_detects_common_openers() {
        assert!(is_greeting("Hey, how's it going?"));
        assert!(!is_greeting("What's the weather like"));
    }

    #[test]
    fn imperative_detection_looks_at_first_word_only() {
        assert!(starts_with_imperative("please schedule a reminder"));
        assert!(!starts_with_imperative("the schedule looks fine"));
    }

    #[test]
    fn collect_signals_counts_question_marks() {
        let handlers = HandlerRegistry::new(std::time::Duration::from_secs(1));
        let context = AssembledContext::default();
        let signals = collect_signals(&context, "what time is it? and where?", &handlers);
        assert_eq!(signals.question_mark_count, 2.0);
    }
}
