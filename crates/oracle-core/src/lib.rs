//! Core of the oracle bot.
//!
//! A bounded-rate request mediator between chat users and an unreliable
//! hosted text-generation service:
//!
//! ```text
//! (user_id, text) ──> Mediator ──> Cooldown ──> DecisionPolicy ──┬──> Catalog
//!                                                                └──> UpstreamClient
//!                                                                        │ failure
//!                                                                        └──> Catalog
//! ```
//!
//! ## Modules
//!
//! - [`cooldown`] -- per-user cooldown store behind the [`CooldownStore`] trait.
//! - [`policy`] -- probabilistic catalog-versus-upstream routing.
//! - [`upstream`] -- HTTP client and [`UpstreamResult`] classification.
//! - [`catalog`] -- canned fallback answers.
//! - [`random`] -- injectable random source.
//! - [`mediator`] -- composition root.
//! - [`config`] -- layered configuration.
//! - [`error`] -- error types.

pub mod catalog;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod mediator;
pub mod policy;
pub mod random;
pub mod upstream;

pub use catalog::ResponseCatalog;
pub use config::{MediatorSettings, OracleConfig, UpstreamApi, UpstreamSettings};
pub use cooldown::{CooldownDecision, CooldownStore, InMemoryCooldownStore, UserId};
pub use error::{OracleError, Result};
pub use mediator::{Answer, AnswerSource, Mediator};
pub use policy::DecisionPolicy;
pub use random::{RandomSource, ScriptedRandom, ThreadRandom};
pub use upstream::{TextGenerator, UpstreamClient, UpstreamRequest, UpstreamResult};
