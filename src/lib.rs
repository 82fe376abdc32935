pub mod agents;
pub mod config;
pub mod error;
pub mod insights;
pub mod ipc;
pub mod reviews;
pub mod storage;
pub mod tickets;

// Re-export auth so main.rs can use deskd::auth directly.
pub use ipc::auth;

use agents::board::WorkBoard;
use agents::AgentRegistry;
use config::DeskConfig;
use insights::storage::InsightStore;
use ipc::event::EventBroadcaster;
use reviews::ReviewDesk;
use storage::Storage;
use tickets::responses::ResponseRecorder;
use tickets::service::TicketEngine;

/// Shared application state passed to every RPC handler and background task.
pub struct AppContext {
    pub config: DeskConfig,
    pub storage: Storage,
    pub events: EventBroadcaster,
    /// Ticket lifecycle: create, claim, assign, transition, list.
    pub tickets: TicketEngine,
    /// Conversation threads attached to tickets.
    pub responses: ResponseRecorder,
    /// Agent registration, availability, workload accounting.
    pub agents: AgentRegistry,
    /// Per-company workload board and per-agent performance stats.
    pub board: WorkBoard,
    /// Customer satisfaction reviews and moderation.
    pub reviews: ReviewDesk,
    /// Company-wide reporting rollups.
    pub insights: InsightStore,
    /// Local WebSocket auth token.  Every new connection must send a
    /// `daemon.auth` RPC with this token before any other method call.
    /// Empty string means auth is disabled (not recommended).
    pub auth_token: String,
    /// Random per-boot identity, reported by `daemon.status`.
    pub daemon_id: String,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Wire the engine components onto a shared storage pool.
    pub fn new(config: DeskConfig, storage: Storage, auth_token: String) -> Self {
        let pool = storage.pool();
        let events = EventBroadcaster::new();
        Self {
            tickets: TicketEngine::new(
                pool.clone(),
                events.clone(),
                config.engine.ticket_number_attempts,
            ),
            responses: ResponseRecorder::new(pool.clone(), events.clone()),
            agents: AgentRegistry::new(pool.clone(), config.engine.default_max_concurrent),
            board: WorkBoard::new(pool.clone()),
            reviews: ReviewDesk::new(pool.clone(), config.engine.review_edit_window_hours),
            insights: InsightStore::new(pool),
            config,
            storage,
            events,
            auth_token,
            daemon_id: uuid::Uuid::new_v4().to_string(),
            started_at: std::time::Instant::now(),
        }
    }
}
