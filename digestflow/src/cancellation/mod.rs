//! Cooperative cancellation shared by every stage of a run.
//!
//! One [`CancellationToken`] is created per run. Every suspension point
//! (semaphore acquisition, rate-limiter wait, cool-down sleeps, network calls)
//! races its work against [`CancellationToken::cancelled`].

mod token;

pub use token::CancellationToken;
