//! # Psychoanalyze
//!
//! Analysis sessions for psychological interview transcripts.
//!
//! A transcript is validated locally, sent to a language-model backed
//! analysis client, and the structured result (risk level, defense
//! mechanisms, attachment profile, emotion trends, quotes and notes) is
//! recorded in a bounded local history. Any two history entries can be
//! compared side by side.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────────────┐
//! │  CLI (psa)  │──▶│   Session   │──▶│   Analysis client    │
//! │  progress   │   │ state mach. │   │ gemini→ollama→offline│
//! └─────────────┘   └──────┬──────┘   └──────────────────────┘
//!                          │
//!               ┌──────────┴──────────┐
//!               ▼                     ▼
//!         ┌───────────┐        ┌────────────┐
//!         │  History  │        │  Compare   │
//!         │  (≤ 20)   │        │ selection  │
//!         └─────┬─────┘        └────────────┘
//!               ▼
//!         ┌───────────┐
//!         │ FileStore │
//!         └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! psa analyze interview.txt          # analyze a transcript
//! psa history --search anxiety       # list past analyses
//! psa compare <ID_A> <ID_B>          # side-by-side comparison
//! psa export <ID> --format md --output report.md
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Analysis result and history types |
//! | [`session`] | Session state machine |
//! | [`history`] | Bounded, persisted history |
//! | [`compare`] | Two-item compare selection |
//! | [`analysis`] | Analysis client trait and providers |
//! | [`storage`] | Key-value persistence |
//! | [`progress`] | Synthetic progress and reporters |
//! | [`export`] | Markdown and JSON reports |
//! | [`theme`] | Light/dark preference |
//! | [`error`] | Session and store error taxonomy |

pub mod analysis;
pub mod compare;
pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod models;
pub mod progress;
pub mod session;
pub mod storage;
pub mod theme;
