#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! cortexd - a standing memory and conversational-continuity daemon.
//!
//! # Usage
//!
//! ```sh
//! cortexd
//! ```
//!
//! A single binary runs the HTTP front door, the consolidation workers
//! (memory chunker, episodic, semantic, decay), the scheduler, and the
//! routing-stability regulator side by side, all sharing one Redis and one
//! Qdrant connection pool. Extraction, synthesis, and reflection are
//! injected traits (see `workers::chunker::ChunkExtractor` and siblings) so
//! this crate stays free of any concrete LLM client; until one is wired in
//! through an embedding application, the consolidation loops run against
//! the no-op defaults and simply drain their queues.

use clap::Parser;
use cortexd::config::Config;
use cortexd::embeddings::EmbeddingEngine;
use cortexd::graph::ConceptGraph;
use cortexd::memory::MemoryStore;
use cortexd::persistence::PersistenceStore;
use cortexd::queues::{names, EventBus, QueueClient};
use cortexd::regulators::reflection::NullJudge;
use cortexd::resilience;
use cortexd::scheduler::ScheduledItemStore;
use cortexd::workers::chunker::{self, ChunkerJob, ExchangeCounter, NullExtractor as NullChunkExtractor};
use cortexd::workers::digest::{self, DigestJob, NullGenerator};
use cortexd::workers::episodic::{self, EpisodicJob, NullSynthesizer};
use cortexd::workers::semantic::{self, NullExtractor as NullConceptExtractor, SemanticJob};
use cortexd::workers::decay;
use cortexd::act::{HandlerRegistry, NullPlanner};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// cortexd - standing memory and conversational-continuity daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn main() {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_new(&args.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    if let Err(e) = resilience::install_panic_hooks() {
        eprintln!("warning: failed to install panic hooks: {e}");
    }

    let runtime = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
    runtime.block_on(run());
}

#[cfg_attr(coverage_nightly, coverage(off))]
async fn run() {
    let bootstrap_redis_url =
        std::env::var("CORTEXD_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let mut persistence = match PersistenceStore::connect(&bootstrap_redis_url).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "cannot reach persistence store, exiting");
            return;
        }
    };

    let persisted = match persistence.load_config().await {
        Ok(cfg) => cfg.and_then(|c| serde_json::to_string(&c).ok()),
        Err(e) => {
            warn!(error = %e, "failed to load persisted config, using defaults");
            None
        }
    };

    let mut config = match Config::load(persisted.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "invalid configuration, exiting");
            return;
        }
    };

    info!(redis_url = %config.redis_url, qdrant_url = %config.qdrant_url, "cortexd starting");

    let resolved_dimension = match qdrant_client::Qdrant::from_url(&config.qdrant_url).build() {
        Ok(probe) => {
            match EmbeddingEngine::resolve_dimension(&probe, cortexd::memory::collections::EPISODES).await {
                Ok(dim) => dim,
                Err(e) => {
                    warn!(error = %e, "failed to resolve embedding dimension from store, using configured hint");
                    config.embedding_dimension_hint
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to probe qdrant for dimension resolution, using configured hint");
            config.embedding_dimension_hint
        }
    };

    let memory = match MemoryStore::connect(&config.qdrant_url, &config.redis_url, resolved_dimension).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "cannot reach memory stores, exiting");
            return;
        }
    };

    let embeddings = match EmbeddingEngine::new(resolved_dimension) {
        Ok(engine) => Arc::new(tokio::sync::RwLock::new(engine)),
        Err(e) => {
            error!(error = %e, "cannot initialize embedding engine, exiting");
            return;
        }
    };

    let graph = match ConceptGraph::connect(&config.redis_url, "cortexd") {
        Ok(graph) => Arc::new(graph),
        Err(e) => {
            error!(error = %e, "cannot reach concept graph, exiting");
            return;
        }
    };

    let mut boot_queue = match QueueClient::new(&config.redis_url) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "cannot construct queue client, exiting");
            return;
        }
    };
    if let Err(e) = boot_queue.connect().await {
        error!(error = %e, "cannot reach queue store, exiting");
        return;
    }
    for queue in names::ALL {
        if let Err(e) = boot_queue.ensure_group(queue).await {
            warn!(queue, error = %e, "failed to ensure consumer group");
        }
    }

    let bus = match EventBus::new(&config.redis_url) {
        Ok(bus) => Arc::new(bus),
        Err(e) => {
            error!(error = %e, "cannot construct event bus, exiting");
            return;
        }
    };

    let exchange_counter = match ExchangeCounter::new(&config.redis_url) {
        Ok(counter) => Arc::new(counter),
        Err(e) => {
            error!(error = %e, "cannot construct exchange counter, exiting");
            return;
        }
    };

    let scheduled_items = match ScheduledItemStore::connect(&config.redis_url) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "cannot construct scheduled item store, exiting");
            return;
        }
    };

    let api_port = config.api_port;
    let api_state = cortexd::api::AppState {
        queue: Arc::new(Mutex::new(boot_queue)),
        bus: bus.clone(),
        graph: Some(graph.clone()),
        redis: match redis::Client::open(config.redis_url.as_str()) {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "invalid redis url, exiting");
                return;
            }
        },
    };

    tokio::spawn(serve_api(api_state, api_port));
    tokio::spawn(run_chunker_worker(
        memory.clone(),
        exchange_counter,
        config.redis_url.clone(),
    ));
    tokio::spawn(run_episodic_worker(
        memory.clone(),
        embeddings.clone(),
        config.salience_weights.clone(),
        config.redis_url.clone(),
    ));
    tokio::spawn(run_semantic_worker(memory.clone(), embeddings.clone(), graph, config.redis_url.clone()));
    tokio::spawn(run_decay_loop(memory.clone(), config.decay.clone()));
    tokio::spawn(run_scheduler_loop(scheduled_items, bus.clone()));
    tokio::spawn(run_digest_worker(
        memory,
        embeddings,
        config.router_weights.clone(),
        config.assembly_budgets,
        config.act_budgets,
        bus,
        config.redis_url.clone(),
    ));

    run_routing_stability_loop(&mut config, &mut persistence).await;
}

#[cfg_attr(coverage_nightly, coverage(off))]
async fn serve_api(state: cortexd::api::AppState, port: u16) {
    let app = cortexd::api::router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!(%addr, "HTTP front door listening");
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "API server error");
            }
        }
        Err(e) => error!(%addr, error = %e, "failed to bind API server"),
    }
}

/// Drain [`names::MEMORY_CHUNKER`], extracting gists/facts/traits per cycle.
#[cfg_attr(coverage_nightly, coverage(off))]
async fn run_chunker_worker(memory: Arc<MemoryStore>, counter: Arc<ExchangeCounter>, redis_url: String) {
    let extractor = NullChunkExtractor;
    let mut queue = match QueueClient::new(&redis_url) {
        Ok(mut client) => {
            if let Err(e) = client.connect().await {
                error!(error = %e, "chunker worker: cannot reach queue");
                return;
            }
            client
        }
        Err(e) => {
            error!(error = %e, "chunker worker: invalid redis url");
            return;
        }
    };

    loop {
        let jobs = match queue.dequeue::<ChunkerJob>(names::MEMORY_CHUNKER, "chunker-1", 10, 5000).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "chunker worker: dequeue failed");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
        };
        for (entry_id, job) in jobs {
            match chunker::process_job(&memory, &extractor, &counter, &mut queue, &job).await {
                Ok(_) => {
                    if let Err(e) = queue.ack(names::MEMORY_CHUNKER, &entry_id).await {
                        warn!(entry_id, error = %e, "chunker worker: ack failed");
                    }
                }
                Err(e) => error!(entry_id, error = %e, "chunker worker: job failed"),
            }
        }
    }
}

/// Drain [`names::EPISODIC`], synthesizing and persisting episodes.
#[cfg_attr(coverage_nightly, coverage(off))]
async fn run_episodic_worker(
    memory: Arc<MemoryStore>,
    embeddings: cortexd::embeddings::SharedEmbeddingEngine,
    salience_weights: cortexd::config::SalienceWeights,
    redis_url: String,
) {
    let synthesizer = NullSynthesizer;
    let mut queue = match QueueClient::new(&redis_url) {
        Ok(mut client) => {
            if let Err(e) = client.connect().await {
                error!(error = %e, "episodic worker: cannot reach queue");
                return;
            }
            client
        }
        Err(e) => {
            error!(error = %e, "episodic worker: invalid redis url");
            return;
        }
    };

    loop {
        let jobs = match queue.dequeue::<EpisodicJob>(names::EPISODIC, "episodic-1", 10, 5000).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "episodic worker: dequeue failed");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
        };
        for (entry_id, job) in jobs {
            match episodic::process_job(&memory, &embeddings, &synthesizer, &salience_weights, &mut queue, &job).await
            {
                Ok(_) => {
                    if let Err(e) = queue.ack(names::EPISODIC, &entry_id).await {
                        warn!(entry_id, error = %e, "episodic worker: ack failed");
                    }
                }
                Err(e) => error!(entry_id, error = %e, "episodic worker: job failed"),
            }
        }
    }
}

/// Drain [`names::SEMANTIC`], extracting and reinforcing concepts.
#[cfg_attr(coverage_nightly, coverage(off))]
async fn run_semantic_worker(
    memory: Arc<MemoryStore>,
    embeddings: cortexd::embeddings::SharedEmbeddingEngine,
    graph: Arc<ConceptGraph>,
    redis_url: String,
) {
    let extractor = NullConceptExtractor;
    let mut queue = match QueueClient::new(&redis_url) {
        Ok(mut client) => {
            if let Err(e) = client.connect().await {
                error!(error = %e, "semantic worker: cannot reach queue");
                return;
            }
            client
        }
        Err(e) => {
            error!(error = %e, "semantic worker: invalid redis url");
            return;
        }
    };

    loop {
        let jobs = match queue.dequeue::<SemanticJob>(names::SEMANTIC, "semantic-1", 10, 5000).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "semantic worker: dequeue failed");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
        };
        for (entry_id, job) in jobs {
            match semantic::process_job(&memory, &embeddings, &graph, &extractor, &job).await {
                Ok(_) => {
                    if let Err(e) = queue.ack(names::SEMANTIC, &entry_id).await {
                        warn!(entry_id, error = %e, "semantic worker: ack failed");
                    }
                }
                Err(e) => error!(entry_id, error = %e, "semantic worker: job failed"),
            }
        }
    }
}

/// Drain [`names::PROMPT`], running the classify/assemble/route/act pipeline
/// per message and streaming the reply to the user's event channel.
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(clippy::too_many_arguments)]
async fn run_digest_worker(
    memory: Arc<MemoryStore>,
    embeddings: cortexd::embeddings::SharedEmbeddingEngine,
    router_weights: cortexd::config::RouterWeights,
    assembly_budgets: cortexd::config::AssemblyBudgets,
    act_budgets: cortexd::config::ActBudgets,
    bus: Arc<EventBus>,
    redis_url: String,
) {
    let handlers = HandlerRegistry::new(act_budgets.action_timeout);
    let planner = NullPlanner;
    let generator = NullGenerator;

    let mut queue = match QueueClient::new(&redis_url) {
        Ok(mut client) => {
            if let Err(e) = client.connect().await {
                error!(error = %e, "digest worker: cannot reach queue");
                return;
            }
            client
        }
        Err(e) => {
            error!(error = %e, "digest worker: invalid redis url");
            return;
        }
    };

    let mut persistence = match PersistenceStore::connect(&redis_url).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "digest worker: cannot reach persistence store");
            return;
        }
    };

    loop {
        let jobs = match queue.dequeue::<DigestJob>(names::PROMPT, "digest-1", 10, 5000).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "digest worker: dequeue failed");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
        };
        for (entry_id, job) in jobs {
            let result = digest::process_job(
                &memory,
                &embeddings,
                &router_weights,
                &assembly_budgets,
                &act_budgets,
                &handlers,
                &planner,
                None,
                &generator,
                &bus,
                &mut queue,
                &mut persistence,
                &job,
            )
            .await;
            match result {
                Ok(()) => {
                    if let Err(e) = queue.ack(names::PROMPT, &entry_id).await {
                        warn!(entry_id, error = %e, "digest worker: ack failed");
                    }
                }
                Err(e) => error!(entry_id, error = %e, "digest worker: job failed"),
            }
        }
    }
}

/// Run one decay sweep per [`cortexd::config::DecayConfig::decay_interval`].
#[cfg_attr(coverage_nightly, coverage(off))]
async fn run_decay_loop(memory: Arc<MemoryStore>, decay_config: cortexd::config::DecayConfig) {
    loop {
        tokio::time::sleep(decay_config.decay_interval).await;
        match decay::run_sweep(&memory, &decay_config, chrono::Utc::now()).await {
            Ok(report) => info!(
                episodes_decayed = report.episodes_decayed,
                concepts_decayed = report.concepts_decayed,
                "decay sweep completed"
            ),
            Err(e) => error!(error = %e, "decay sweep failed"),
        }
    }
}

/// Poll due reminders/tasks every [`cortexd::scheduler::POLL_INTERVAL`] and
/// publish fired notifications onto the event bus.
///
/// `ScheduledItem` carries no user id of its own (it's grouped by
/// `group_id`, not addressed to a subscriber), so fired items are
/// broadcast on a group-keyed channel; routing a fired item to the right
/// user's SSE stream is left to whatever enqueued it in the first place.
#[cfg_attr(coverage_nightly, coverage(off))]
async fn run_scheduler_loop(store: Arc<ScheduledItemStore>, bus: Arc<EventBus>) {
    loop {
        tokio::time::sleep(cortexd::scheduler::POLL_INTERVAL).await;
        let now = chrono::Utc::now();
        match cortexd::scheduler::tick(&store, now).await {
            Ok(fired) => {
                for item in fired {
                    let (event, item) = match item {
                        cortexd::scheduler::FiredItem::Notification(item) => ("notification", item),
                        cortexd::scheduler::FiredItem::Prompt(item) => ("task", item),
                    };
                    let channel = EventBus::user_channel(&item.group_id.to_string());
                    let payload = cortexd::api::sse::StreamEvent {
                        event: event.to_string(),
                        data: serde_json::json!({ "item_id": item.id, "message": item.message }),
                    };
                    if let Err(e) = bus.publish(&channel, &payload).await {
                        warn!(error = %e, "scheduler: failed to publish fired item");
                    }
                }
            }
            Err(e) => error!(error = %e, "scheduler tick failed"),
        }
    }
}

/// 24h single-writer regulator loop over `router_weights` (§4.8, §5).
/// Reflection runs first so the day's unreflected decisions get a verdict
/// before the stability regulator reads pressure from them.
#[cfg_attr(coverage_nightly, coverage(off))]
async fn run_routing_stability_loop(config: &mut Config, persistence: &mut PersistenceStore) {
    let judge = NullJudge;
    loop {
        tokio::time::sleep(std::time::Duration::from_secs(24 * 3600)).await;

        let decisions = match persistence.recent_routing_decisions().await {
            Ok(decisions) => decisions,
            Err(e) => {
                warn!(error = %e, "routing stability: failed to load decisions");
                continue;
            }
        };

        let verdicts = cortexd::regulators::reflection::run_pass(&judge, &decisions, chrono::Utc::now()).await;
        if !verdicts.is_empty() {
            info!(count = verdicts.len(), "reflection pass produced verdicts");
        }

        match cortexd::regulators::routing_stability::run_cycle(config, persistence, &decisions, &decisions).await {
            Ok(changed) if !changed.is_empty() => {
                info!(?changed, "routing stability regulator applied an update");
                if let Err(e) = persistence.save_config(config).await {
                    warn!(error = %e, "routing stability: failed to persist updated config");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "routing stability regulator cycle rejected or failed"),
        }
    }
}
