//! Plain-text helpers shared by the agent: query sanitizing, URL handling
//! and answer extraction. All functions are pure and never fail.

pub mod answer;
pub mod sanitize;
pub mod urls;
