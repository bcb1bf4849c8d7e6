//! External Service Connectors
//!
//! Adapters for the services live chat depends on but does not own
//! (organizations, memberships, widgets, agent profiles).
//!
//! ## Architecture Pattern
//!
//! 1. Define trait in `{service}/mod.rs` → allows mocking in tests
//! 2. Implement HTTP client in `{service}/client.rs`
//! 3. Configuration in `config.rs` → enable/disable per environment
//! 4. Inject trait object into the live chat service → handlers never depend on HTTP
//!
//! ## Testing
//!
//! ```ignore
//! let team = Arc::new(InMemoryTeamService::new());
//! team.add_organization("org-1", "Acme").await;
//! let service = LiveChatService::new(store, team, hub, settings);
//! ```

pub mod config;
pub mod errors;
pub mod team_service;

pub use config::{ConnectorConfig, TeamServiceConfig};
pub use errors::ConnectorError;
pub use team_service::{InMemoryTeamService, TeamService, TeamServiceClient};

pub use team_service::init as init_team_service;
