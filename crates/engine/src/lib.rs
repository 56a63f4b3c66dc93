//! The stewardship engine: policy resolution and every operation on
//! grants, appeals, interventions and activity logs, over a [`Store`].
//!
//! [`Service`] is the entry point. It resolves a subject's chain through
//! [`ChainSource`], admitting only layers whose author still holds
//! effective authority (see [`Authority`]), and memoizes the fold in a
//! [`Resolver`] keyed by [`policy::ChainVersion`].
//!
//! [`Store`]: storage::Store

mod authority;
mod clock;
mod error;
mod resolver;
mod service;
mod source;

pub use authority::{Arbitrators, Authority};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use resolver::Resolver;
pub use service::{GrantView, PolicyWrite, Service, SweepReport};
pub use source::{assemble_chain, ChainSource, FetchedChain};
