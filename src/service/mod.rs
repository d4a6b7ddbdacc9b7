//! Q&A social REST service.
//!
//! Exposes the core managers over HTTP. Callers are identified by the
//! `X-User-Id` header, which an upstream authentication layer sets.
//!
//! ## Endpoints
//!
//! - `POST /api/votes`, `GET /api/votes/:kind/:id` - Cast a vote, read a tally
//! - `POST /api/handbook`, `/api/handbook/items/:id[/move|/next|/prev]` - Ranked handbook
//! - `/api/handbook/items/:id/draft[/publish]` - Owner drafts of handbook items
//! - `GET /api/handbook/categories[/:category]` - Category listing
//! - `POST /api/questions`, `/api/questions/:id[/answers|/thread]` - Questions and answers
//! - `GET /api/questions[/hottest|/suggested]`, `/api/topics[/:topic/questions]`,
//!   `/api/users/:id/questions` - Question listings
//! - `POST /api/posts` - Timeline posts
//! - `/api/answers/:id/comments`, `/api/comments/:id[/brief|/replies]` - Comment forest
//! - `/api/users/:id/follow|followers|following` - Follow graph
//! - `POST /api/users/:id/pairing`, `GET /api/users/:id/matches` - Pairing scores
//! - `/api/users/:id/tags` - Interest tags feeding cold-start matches
//! - `/api/moments`, `/api/users/:id/moments` - Moments feed
//! - `/api/chats`, `/api/chats/:id/messages`, `DELETE /api/chat-messages/:id` - Chats
//! - `GET /api/messages/:id/thread`, `GET /api/timeline` - Message projection
//! - `GET /health`, `/health/live`, `/health/ready` - Health checks

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_pairing_scheduled};
pub use routes::{create_router, ApiError, ErrorResponse, USER_HEADER};
pub use state::{HealthCheck, ServiceState};
