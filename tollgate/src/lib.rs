//! Core domain logic for the tollgate access-gating payment gateway.
//!
//! A tollgate deployment inspects each incoming request, classifies its
//! origin (human, search indexer, AI agent), and charges AI-classified
//! traffic a per-request toll: the gateway answers with a machine-payable
//! challenge, the agent pays on chain and resubmits with a proof, and the
//! gateway verifies the payment before granting access. Every decision is
//! appended to an immutable audit ledger.
//!
//! This crate holds the transport-agnostic pieces:
//!
//! - [`classify`] — identity-string classification over pattern lists
//! - [`tenant`] — per-tenant configuration and the hot-swappable directory
//! - [`challenge`] — toll challenges and their fixed wire body
//! - [`proof`] — client-submitted payment proofs
//! - [`chain`] — the injected transaction-lookup capability
//! - [`verify`] — payment verification against the external chain
//! - [`wallet`] — payee wallets, custody and store seams
//! - [`ledger`] — the append-only decision ledger
//! - [`request`] — the per-request input envelope
//! - [`decision`] — the request state machine and terminal decisions
//!
//! HTTP integration lives in `tollgate-http`; concrete chain and custody
//! clients in `tollgate-chain`; the durable store in `tollgate-store`.

pub mod chain;
pub mod challenge;
pub mod classify;
pub mod decision;
pub mod error;
pub mod ledger;
pub mod proof;
pub mod request;
pub mod tenant;
pub mod timestamp;
pub mod verify;
pub mod wallet;
