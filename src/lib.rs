//! # KB Engine
//!
//! A retrieval-augmented query engine over per-source vector indexes
//! for commercial lease knowledge bases.
//!
//! KB Engine ingests tabular knowledge bases (Q&A pairs, property
//! listings, master lease clauses) and free-text lease documents,
//! normalizes them into embedded documents, and answers questions by
//! routing a query to one or more source indexes, fusing the ranked
//! hits, and optionally generating an answer over the assembled
//! context.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Uploads  │──▶│  Normalize    │──▶│  Per-source  │
//! │ CSV/text  │   │ Chunk+Embed  │   │ JSON indexes │
//! └───────────┘   └──────────────┘   └──────┬───────┘
//!                                           │
//!                        ┌──────────────────┤
//!                        ▼                  ▼
//!                  ┌──────────┐      ┌────────────┐
//!                  │  Router   │─────▶│ Retrieve +  │
//!                  │ auto/kb  │      │ Fuse + Ask │
//!                  └──────────┘      └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kbq ingest qa ./data/qa.csv              # index a Q&A knowledge base
//! kbq ingest lease ./leases/unit-4b.txt    # chunk and index a lease
//! kbq search "termination notice period"   # ranked passages
//! kbq ask "When can the tenant terminate?" # generated answer
//! kbq stats                                # per-source index counts
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Source-specific upload normalization |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Per-source vector index store |
//! | [`router`] | Source selection and fusion choice |
//! | [`retrieve`] | Multi-source retrieval and fusion |
//! | [`context`] | Prompt assembly under a budget |
//! | [`completion`] | Answer generation |
//! | [`pipeline`] | Normalize→embed→index ingestion |
//! | [`engine`] | The query engine facade |

pub mod chunk;
pub mod completion;
pub mod config;
pub mod context;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod retrieve;
pub mod retry;
pub mod router;
pub mod store;
