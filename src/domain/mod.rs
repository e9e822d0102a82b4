// src/domain/mod.rs
//
// Pure clinical workflow rules. Nothing in here touches the database;
// handlers load rows, call into these functions, then persist.

pub mod access;
pub mod calls;
pub mod category;
pub mod dashboard;
pub mod schedule;
pub mod search;
pub mod validation;
