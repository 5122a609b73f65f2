//! Batched GraphQL client for the remote provider.

pub mod client;
pub mod query;
pub mod rate_limit;
pub mod response;
pub mod transport;

pub use client::{dedup_identities, BatchedRemoteClient, RemoteFetcher, SnapshotSink};
pub use query::GraphQlRequest;
pub use rate_limit::{Backoff, RateBudget};
pub use response::{GraphQlResponse, RateLimitNode};
pub use transport::{classify, CallOutcome, GraphQlTransport, HttpReply, ReqwestTransport, TransportError};
