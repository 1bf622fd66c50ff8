//! Tests for the routine runtime
//!
//! Organized by how a command is processed

mod helpers;
