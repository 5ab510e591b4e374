//! Labsight — blood-report upload and analysis server.
//!
//! A client uploads a lab-report file with patient metadata; the server
//! stores the file, extracts glucose/HbA1c from its text, generates
//! lifestyle guidance and persists a report record the owner can list later.

pub mod auth; // bearer-credential verification
pub mod config;
pub mod db;
pub mod extract; // text recognition + lab-value extraction
pub mod http;
pub mod models;
pub mod pipeline; // per-request orchestration
pub mod recommend; // rule-based + generative guidance
pub mod storage; // blob store
pub mod store; // report record store
