//! Core link-relevance search for LinkScout.
//!
//! This crate renders the relevance prompt for each content chunk, sends it
//! to a text-generation backend, parses the answer into a link mapping, and
//! merges the mappings into pipeline state (`SearchLinkNode`).

pub mod backend;
pub mod bridge;
pub mod parse;
pub mod prompt;
pub mod search_link;
