//! Fixtures for exercising showmmr end to end without the real service.

mod gateway;
mod history;

pub use gateway::{LoginAttempt, MockGateway, MockGatewayConfig, PageQuery};
pub use history::{CursorSemantics, MatchHistory};
