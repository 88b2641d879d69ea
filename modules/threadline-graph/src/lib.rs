pub mod client;
pub mod migrate;
pub mod replies;
pub mod writer;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::GraphClient;
pub use neo4rs::query;
pub use replies::ReplyGraphReader;
pub use writer::ConversationWriter;
