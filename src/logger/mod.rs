//! Structured activity logging (JSONL) with graceful degradation.

pub mod jsonl;
